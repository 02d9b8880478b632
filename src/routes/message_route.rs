use std::time::Duration;

use actix_web::{get, post, web, HttpResponse};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    configuration::ApplicationSettings,
    domain::{
        message::{Ack, ErrorReply, NavigationStatus, Request, TabDataReply},
        tab_state::TabId,
    },
    services::{DeliveryQueue, Orchestrator, OrchestratorError, TabNotification},
};

const READY_TIMEOUT: Duration = Duration::from_secs(30);

#[post("/message")]
async fn dispatch(
    request: web::Json<Request>,
    orchestrator: web::Data<Orchestrator>,
    delivery: web::Data<DeliveryQueue>,
    application: web::Data<ApplicationSettings>,
) -> HttpResponse {
    match request.into_inner() {
        Request::TabUpdated {
            tab_id,
            url,
            status,
            html,
        } => {
            match status {
                NavigationStatus::Loading => {
                    orchestrator.navigation_started(tab_id, &url).await;
                }
                NavigationStatus::Complete => {
                    let orchestrator = orchestrator.into_inner();
                    tokio::spawn(async move {
                        orchestrator.navigation_completed(tab_id, &url, html).await
                    });
                }
            }
            HttpResponse::Ok().json(Ack { success: true })
        }
        Request::TabRemoved { tab_id } => {
            orchestrator.tab_removed(tab_id).await;
            HttpResponse::Ok().json(Ack { success: true })
        }
        Request::GetPageContent { url, html } => match orchestrator.extract_page(&url, &html).await
        {
            Ok(record) => HttpResponse::Ok().json(record),
            Err(e) => {
                log::error!("Page content extraction failed for {}: {:#}", url, e);
                HttpResponse::Ok().json(ErrorReply::new(e.to_string()))
            }
        },
        Request::GetTabData { tab_id } => HttpResponse::Ok().json(TabDataReply {
            tab_id,
            data: orchestrator.tab_data(tab_id).await,
        }),
        Request::GetTransmissionState => {
            HttpResponse::Ok().json(delivery.transmission_state().await)
        }
        Request::SetTransmissionStatus { status } => {
            delivery.set_status(status).await;
            HttpResponse::Ok().json(delivery.transmission_state().await)
        }
        Request::ManualRetry => {
            delivery.manual_retry_queue().await;
            HttpResponse::Ok().json(delivery.transmission_state().await)
        }
        Request::RerunExtraction { tab_id } => {
            if orchestrator.current_url(tab_id).await.is_none() {
                let e = OrchestratorError::UnknownTab(tab_id);
                return HttpResponse::NotFound().json(ErrorReply::new(e.to_string()));
            }

            let orchestrator = orchestrator.into_inner();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.rerun_extraction(tab_id).await {
                    log::error!("Re-run failed: {}", e);
                }
            });
            HttpResponse::Accepted().json(Ack { success: true })
        }
        Request::ForwardBackgroundLog { level, message } => {
            if application.debug {
                log::log!(target: "background", log::Level::from(level), "{}", message);
            }
            HttpResponse::Ok().json(Ack {
                success: application.debug,
            })
        }
    }
}

/// Long-polls for the next `tabDataReady` push of one tab.
#[get("/tabs/{tab_id}/ready")]
async fn tab_ready(path: web::Path<TabId>, orchestrator: web::Data<Orchestrator>) -> HttpResponse {
    let tab_id = path.into_inner();
    let mut notifications = orchestrator.subscribe();

    let next = async {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    let TabNotification::TabDataReady { tab_id: id, .. } = &notification;
                    if *id == tab_id {
                        return Some(notification);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Ready listener for tab {} skipped {}", tab_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    };

    match tokio::time::timeout(READY_TIMEOUT, next).await {
        Ok(Some(notification)) => HttpResponse::Ok().json(notification),
        _ => HttpResponse::NoContent().finish(),
    }
}
