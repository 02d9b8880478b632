pub mod health_route;
pub mod message_route;
