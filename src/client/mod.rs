//! Agent-side client for the sandbox service

mod sandbox;

pub use sandbox::{ClientError, SandboxClient};
