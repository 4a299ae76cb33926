//! Road-network routing: nearest-node resolution, an anchor path cache built
//! before the run, and point-to-point queries that stitch through it.
//!
//! - [`CellNodeIndex`]: graph nodes grouped by H3 cell, one anchor per cell
//! - [`PathCache`]: anchor-to-anchor shortest paths, optionally built on a rayon pool
//! - [`RoutingService`]: `shortest_path` and path interpolation
//!
//! The service is shared with the simulation through the [`Routing`] resource.

mod cells;
mod error;
mod interpolate;
mod path_cache;
mod service;

pub use cells::CellNodeIndex;
pub use error::RoutingError;
pub use interpolate::{interpolate, interpolate_timed, point_count};
pub use path_cache::{BuildMode, CachedPath, PathCache};
pub use service::{Route, RouteStrategy, Routing, RoutingService};
