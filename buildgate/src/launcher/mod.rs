//! The single entry point every trigger converges on.

mod request;
mod start;

pub use request::LaunchRequest;
pub use start::BuildLauncher;
