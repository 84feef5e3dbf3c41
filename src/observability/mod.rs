//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every dispatch produces:
//!     → metrics.rs (counters, histograms)
//!     → records.rs (DispatchRecord → RecordSink)
//!
//! Everything else:
//!     → logging.rs (structured tracing events)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Log-analytics pipeline (ChannelSink receiver)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the HTTP layer into every record
//! - Sinks are injected per gateway; there is no global record buffer

pub mod logging;
pub mod metrics;
pub mod records;

pub use records::{ChannelSink, DispatchRecord, NullSink, RecordSink, TracingSink};
