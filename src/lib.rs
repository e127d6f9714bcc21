//! TLS-terminating HTTP/1.1 request server library.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod routing;

pub use config::schema::ServerConfig;
pub use http::{Request, ResponseWriter, Server};
pub use lifecycle::Shutdown;
pub use routing::{Handler, Router};
