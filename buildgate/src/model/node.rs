//! Shared capability of stages, containers and elements.

use super::{Container, Element, Stage};

/// Common view over every node of a pipeline model.
pub trait ModelNode {
    /// The node id.
    fn id(&self) -> &str;

    /// The display name.
    fn name(&self) -> &str;

    /// Whether the node takes part in execution.
    fn is_enabled(&self) -> bool;
}
