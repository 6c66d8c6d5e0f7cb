//! Roamdeck library
//!
//! Configuration and the roam session controller, shared by the binary and
//! integration tests.

pub mod config;
pub mod errors;
pub mod session;

pub use config::{Config, LoggingConfig, SessionSettings};
pub use errors::{ConfigError, SessionError};
pub use session::{abbrev, format_time_left, pick, RoamSession, UserLog};
