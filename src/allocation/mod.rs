//! Allocation file parsing, resolution, and the published snapshot.
//!
//! # Data Flow
//! ```text
//! allocation file (XML-like)
//!     → document.rs (recursive-descent read into an element tree)
//!     → parse.rs (raw queue forest + global defaults + rule declarations)
//!     → resolve.rs (inheritance + defaults → resolved queue configs)
//!       + placement (compiled rule chain)
//!     → AllocationConfiguration (immutable snapshot)
//!     → shared via Arc with the scheduler
//!
//! On reload:
//!     reload::controller detects a changed file
//!     → re-runs the full pipeline
//!     → atomic swap of Arc<AllocationConfiguration>
//!     → listener observes the new snapshot; the old one stays valid
//! ```
//!
//! # Design Decisions
//! - A snapshot is immutable once built; a bad edit to the file degrades
//!   to "stale but valid", never "partially applied"
//! - Name validation happens at parse time, before any resolution
//! - Undeclared queue paths answer queries exactly like declared but
//!   property-empty queues

pub mod document;
pub mod parse;
pub mod resolve;
pub mod snapshot;

pub use parse::AllocationDocument;
pub use resolve::resolve;
pub use snapshot::{AclOperation, AllocationConfiguration, ConfiguredQueues, QueueKind};
