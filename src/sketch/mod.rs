pub mod bucket;
pub mod sketch;
pub mod supernode;

pub use sketch::{Sketch, SketchSample};
pub use supernode::{SampleResult, Supernode};
