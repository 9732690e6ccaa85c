pub mod engine;
pub mod outcome;
pub mod tracker;

pub use engine::{CycleRunner, CycleSummary};
pub use outcome::{CheckOutcome, Liveness};
pub use tracker::LivenessTracker;
