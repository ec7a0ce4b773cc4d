//! Fair-share allocation file engine: parse hierarchical queue
//! definitions, resolve inherited limits, compile the queue placement
//! policy, and hot-reload the whole configuration as one immutable
//! snapshot.

pub mod allocation;
pub mod error;
pub mod placement;
pub mod reload;
pub mod resources;
pub mod settings;

pub use allocation::{AllocationConfiguration, QueueKind};
pub use error::{AllocResult, AllocationConfigError};
pub use placement::{Placement, QueuePlacementPolicy, SubmissionContext};
pub use reload::AllocationFileLoader;
pub use resources::{Acl, Resource};
pub use settings::LoaderSettings;
