use std::{net::TcpListener, sync::Arc};

use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};

use crate::{
    configuration::ApplicationSettings,
    routes::{health_route, message_route},
    services::{DeliveryQueue, Orchestrator},
};

pub fn run(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    delivery: Arc<DeliveryQueue>,
    application: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let orchestrator = web::Data::from(orchestrator);
    let delivery = web::Data::from(delivery);
    let application = web::Data::new(application);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(health_route::health)
            .service(message_route::dispatch)
            .service(message_route::tab_ready)
            .app_data(orchestrator.clone())
            .app_data(delivery.clone())
            .app_data(application.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
