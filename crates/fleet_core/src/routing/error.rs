use std::fmt;

use crate::graph::NodeId;
use crate::spatial::Location;

/// Errors from a single routing query. Neither is fatal to a run: callers record
/// the failure and move on.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingError {
    /// The location could not be mapped to any graph node.
    NodeResolutionFailure { location: Location },
    /// Both endpoints resolved, but the graph has no route between them.
    NoPathFound { from: NodeId, to: NodeId },
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::NodeResolutionFailure { location } => {
                write!(f, "no graph node near {location}")
            }
            RoutingError::NoPathFound { from, to } => {
                write!(f, "no path from node {from} to node {to}")
            }
        }
    }
}

impl std::error::Error for RoutingError {}
