//! Security primitives for the sandbox service
//!
//! - Filename sanitization and workspace containment (path escapes)
//! - Token-bucket rate limiting (request floods)
//!
//! Process-level containment (deadlines, process-group termination, output
//! caps) lives next to the process runner in [`crate::exec`].

pub mod path;
pub mod rate_limit;

pub use path::{resolve_within, sanitize_filename};
pub use rate_limit::RateLimiter;
