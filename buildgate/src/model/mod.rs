//! The versioned pipeline model.
//!
//! A model is an ordered list of stages, each holding containers, each
//! holding elements. Stage 0 is the trigger stage: its single container
//! carries the trigger elements and the declared start parameters.

mod element;
mod node;
mod param;
mod pipeline;

pub use element::{Container, ContainerKind, Element, ElementKind, ManualReviewParam, TriggerKind};
pub use node::ModelNode;
pub use param::BuildFormProperty;
pub use pipeline::{PipelineModel, Stage};
