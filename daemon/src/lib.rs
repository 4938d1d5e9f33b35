/// Quill Daemon: runs the job queue and index queue drains for a Quill
/// installation
pub mod errors;
pub mod logging;
pub mod runtime;

// Re-export commonly used types
pub use errors::{DaemonError, DaemonResult};
pub use logging::{effective_level, init_logging};
pub use runtime::Services;

/// Daemon version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
