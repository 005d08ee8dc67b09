// ============================================================================
// CORE TYPES, ERRORS & CONFIGURATION
// ============================================================================
pub mod core;

// ============================================================================
// SKETCH PRIMITIVES
// ============================================================================
pub mod sketch;

// ============================================================================
// STREAM BUFFERING & WORKERS
// ============================================================================
pub mod buffer;
pub mod worker;

// ============================================================================
// CONNECTIVITY ENGINE
// ============================================================================
pub mod dsu;
pub mod graph;

#[cfg(feature = "verify")]
pub mod verify;

// Re-export commonly used types
pub use crate::core::{
    BufferingSystem, Edge, ErrorCode, GraphConfig, GraphError, GraphUpdate, NodeId, Result,
    UpdateKind, VecIndex,
};
pub use crate::buffer::{BatchRequest, GutterSystem, GutterTree, NodeBatch, StandaloneGutters};
pub use crate::dsu::DisjointSets;
pub use crate::graph::{ComponentPartition, Graph, GraphStats};
pub use crate::sketch::{SampleResult, Sketch, SketchSample, Supernode};
#[cfg(feature = "verify")]
pub use crate::verify::{ExactVerifier, SampleVerifier};
