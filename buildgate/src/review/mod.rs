//! Manual review: reviewer resolution, authorization and decisions.

mod gate;
mod types;

pub use gate::ReviewGate;
pub use types::{ReviewAction, ReviewDescriptor, ReviewRequest};
