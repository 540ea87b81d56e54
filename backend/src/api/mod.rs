//! HTTP API module.
//!
//! HTTP server, JSON response types and the run log shared with the pipeline.

pub mod server;
pub mod types;
pub mod logs;

pub use server::start_server;
pub use types::*;
pub use logs::*;
