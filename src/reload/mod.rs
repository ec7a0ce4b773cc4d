//! Hot reload: clock abstraction, the loader, and its poll loop.

pub mod clock;
pub mod controller;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{AllocationFileLoader, LoaderState, ReloadListener};
