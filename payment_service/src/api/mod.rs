pub mod callback_routes;
pub mod error;
pub mod grpc_service;
pub mod http_routes;
pub mod identity;
pub mod proto;
pub mod response;
