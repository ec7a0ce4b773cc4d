//! Typed resource quantities and ACL strings.
//!
//! Leaf utilities with no dependency on the rest of the pipeline: the
//! document parser and the resolver both build on these.

pub mod acl;
pub mod expression;

pub use acl::Acl;
pub use expression::Resource;
