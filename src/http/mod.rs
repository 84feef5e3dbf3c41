//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → request.rs (GatewayRequest with headers, query, body, attributes)
//!     → Gateway::dispatch
//!     → response.rs (status, gateway headers, JSON body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{X_GATEWAY_ROUTE, X_GATEWAY_TARGET};
pub use server::HttpServer;
