//! Scripted HTTP server for exercising outbound requests in tests.

use std::{
    collections::{HashMap, VecDeque},
    net::TcpListener,
    sync::{Arc, Mutex},
};

use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
}

#[derive(Default)]
struct MockState {
    /// Responses per path; the last one repeats once the rest are used up.
    responses: HashMap<String, VecDeque<(u16, String)>>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
pub struct MockServer {
    pub address: String,
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .responses
            .entry(path.to_string())
            .or_default()
            .push_back((status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn handle(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<Arc<Mutex<MockState>>>,
) -> HttpResponse {
    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        method: req.method().to_string(),
        path: req.path().to_string(),
        query: req.query_string().to_string(),
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let scripted = state.responses.get_mut(req.path()).and_then(|queue| {
        match queue.len() {
            0 => None,
            1 => queue.front().cloned(),
            _ => queue.pop_front(),
        }
    });

    match scripted {
        Some((status, body)) => {
            HttpResponse::build(StatusCode::from_u16(status).unwrap()).body(body)
        }
        None => HttpResponse::NotFound().finish(),
    }
}

pub fn spawn_mock_server() -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(MockState::default()));
    let data = web::Data::new(state.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .default_service(web::to(handle))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen on mock port")
    .run();
    tokio::spawn(server);

    MockServer {
        address: format!("http://127.0.0.1:{}", port),
        state,
    }
}
