//! Administrative tooling for the restaurant point-of-sale databases.

pub mod config;
pub mod deep_delete;
pub mod error;
pub mod logging;

pub use error::{AppError, AppResult};
pub use logging::{flush_file_logs, init_file_logging, init_logging};

/// Git commit the binary was built from, or `unknown`.
pub const GIT_HASH: &str = env!("KERZZ_ADMIN_GIT_HASH");
