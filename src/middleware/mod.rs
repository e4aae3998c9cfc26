pub mod logger_middleware;
pub mod role_middleware;
