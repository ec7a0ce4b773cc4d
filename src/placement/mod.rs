//! Queue placement: rule variants and the compiled policy chain.

pub mod policy;
pub mod rule;

pub use policy::QueuePlacementPolicy;
pub use rule::{Placement, PlacementRule, SubmissionContext, DEFAULT_QUEUE};
