//! Process lifecycle: startup wiring, signals, graceful shutdown.
//!
//! # Data Flow
//! ```text
//! startup::run
//!     metrics exporter → Gateway::from_config → sweeper + signals + reloader
//!     → admin listener (optional) → decision listener
//!
//! SIGINT / SIGTERM ──▶ Shutdown::trigger ──▶ listeners drain, sweeper exits
//! SIGHUP ───────────▶ reload channel ─────▶ Gateway::apply_config
//! file change ──────▶ ConfigWatcher ──────▶ Gateway::apply_config
//! ```
//!
//! # Design Decisions
//! - A reload that fails validation is logged and counted; the running
//!   snapshots stay in place
//! - Background tasks hold a `Shutdown` clone and exit when it fires

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
