//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! HTTP layer builds GatewayRequest (request.rs)
//!     → dispatcher.rs (resolve route, evaluate policies)
//!     → RouteDecision (decision.rs)
//! ```

pub mod decision;
pub mod dispatcher;
pub mod request;

pub use decision::{Annotations, Decision, DenyReason, Evaluation, PolicyTrace, RouteDecision, Verdict};
pub use dispatcher::Dispatcher;
pub use request::{GatewayRequest, RequestContext};
