pub mod config;
pub mod errors;
pub mod types;

pub use config::{BufferingSystem, GraphConfig};
pub use errors::{ErrorCode, GraphError, Result};
pub use types::{Edge, GraphUpdate, NodeId, UpdateKind, VecIndex};
