//! The resolved allocation configuration snapshot.
//!
//! # Responsibilities
//! - Hold one complete, internally consistent resolved configuration
//! - Answer every per-queue lookup the scheduler needs
//! - Serve defaults for paths that were never declared
//!
//! # Design Decisions
//! - Immutable after construction: published behind `Arc`, read by any
//!   number of scheduler threads without locks. A reload builds an
//!   entirely new snapshot; it never touches an old one.
//! - Queues are an arena keyed by dotted path; each entry stores its
//!   parent's path rather than a pointer, so there are no ownership
//!   cycles and ancestor lookups are plain map walks.
//! - Lookups of undeclared paths answer exactly as a declared but
//!   property-empty queue at that position would: default-filled fields
//!   come from the global defaults, inherited fields from the nearest
//!   resolved ancestor.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::allocation::parse::GlobalDefaults;
use crate::placement::QueuePlacementPolicy;
use crate::resources::{Acl, Resource};

pub const POLICY_FAIR: &str = "fair";
pub const POLICY_DRF: &str = "drf";
pub const POLICY_FIFO: &str = "fifo";

/// Policy applied wherever nothing else is configured.
pub const DEFAULT_SCHEDULING_POLICY: &str = POLICY_DRF;

/// AM share applied when no explicit value and no global default exist.
pub const DEFAULT_QUEUE_MAX_AM_SHARE: f32 = 0.5;

/// Sentinel for a disabled preemption timeout.
pub const UNSET_TIMEOUT_MS: i64 = -1;

/// Sentinel for an unset preemption threshold.
pub const UNSET_THRESHOLD: f32 = -1.0;

pub fn is_known_policy(name: &str) -> bool {
    matches!(name, POLICY_FAIR | POLICY_DRF | POLICY_FIFO)
}

/// Whether a queue holds running applications or distributes to children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueueKind {
    Leaf,
    Parent,
}

/// Which ACL a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclOperation {
    Administer,
    Submit,
}

/// Fully resolved settings for one queue.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedQueueConfig {
    pub path: String,
    pub parent_path: Option<String>,
    pub kind: QueueKind,
    pub min_resources: Resource,
    pub max_resources: Resource,
    pub max_child_resources: Option<Resource>,
    pub max_running_apps: u32,
    pub max_am_share: f32,
    pub min_share_preemption_timeout_ms: i64,
    pub fair_share_preemption_timeout_ms: i64,
    pub fair_share_preemption_threshold: f32,
    pub scheduling_policy: String,
    pub acl_administer: Acl,
    pub acl_submit: Acl,
}

/// The configured queue paths partitioned by kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfiguredQueues {
    pub leaf: BTreeSet<String>,
    pub parent: BTreeSet<String>,
}

impl ConfiguredQueues {
    pub fn contains(&self, path: &str) -> bool {
        self.leaf.contains(path) || self.parent.contains(path)
    }

    pub fn kind_of(&self, path: &str) -> Option<QueueKind> {
        if self.leaf.contains(path) {
            Some(QueueKind::Leaf)
        } else if self.parent.contains(path) {
            Some(QueueKind::Parent)
        } else {
            None
        }
    }

    pub fn by_kind(&self, kind: QueueKind) -> &BTreeSet<String> {
        match kind {
            QueueKind::Leaf => &self.leaf,
            QueueKind::Parent => &self.parent,
        }
    }
}

/// One complete resolved configuration: resolved queues, queue partition,
/// per-user limits, the global defaults that were applied, and the
/// compiled placement policy.
#[derive(Debug, Serialize)]
pub struct AllocationConfiguration {
    pub(crate) queues: BTreeMap<String, ResolvedQueueConfig>,
    pub(crate) configured: ConfiguredQueues,
    pub(crate) user_max_apps: HashMap<String, u32>,
    pub(crate) defaults: GlobalDefaults,
    pub(crate) placement_policy: QueuePlacementPolicy,
}

impl AllocationConfiguration {
    /// The resolved configuration of a declared queue, if any.
    pub fn queue_config(&self, path: &str) -> Option<&ResolvedQueueConfig> {
        self.queues.get(path)
    }

    pub fn configured_queues(&self) -> &ConfiguredQueues {
        &self.configured
    }

    pub fn placement_policy(&self) -> &QueuePlacementPolicy {
        &self.placement_policy
    }

    pub fn min_resources(&self, path: &str) -> Resource {
        self.queues
            .get(path)
            .map(|q| q.min_resources)
            .unwrap_or(Resource::ZERO)
    }

    pub fn max_resources(&self, path: &str) -> Resource {
        if let Some(queue) = self.queues.get(path) {
            return queue.max_resources;
        }
        let fallback = self
            .defaults
            .queue_max_resources
            .unwrap_or_else(Resource::unbounded);
        // An undeclared child is still capped by its parent's declared
        // maxChildResources, like a declared-but-empty sibling would be.
        match parent_of(path).and_then(|p| self.queues.get(p)) {
            Some(parent) => match parent.max_child_resources {
                Some(cap) => fallback.min(cap),
                None => fallback,
            },
            None => fallback,
        }
    }

    pub fn max_child_resources(&self, path: &str) -> Option<Resource> {
        self.queues.get(path).and_then(|q| q.max_child_resources)
    }

    pub fn queue_max_apps(&self, path: &str) -> u32 {
        self.queues
            .get(path)
            .map(|q| q.max_running_apps)
            .or(self.defaults.queue_max_apps)
            .unwrap_or(u32::MAX)
    }

    pub fn queue_max_am_share(&self, path: &str) -> f32 {
        self.queues
            .get(path)
            .map(|q| q.max_am_share)
            .or(self.defaults.queue_max_am_share)
            .unwrap_or(DEFAULT_QUEUE_MAX_AM_SHARE)
    }

    pub fn min_share_preemption_timeout(&self, path: &str) -> i64 {
        self.nearest_resolved(path)
            .map(|q| q.min_share_preemption_timeout_ms)
            .unwrap_or(UNSET_TIMEOUT_MS)
    }

    pub fn fair_share_preemption_timeout(&self, path: &str) -> i64 {
        self.nearest_resolved(path)
            .map(|q| q.fair_share_preemption_timeout_ms)
            .unwrap_or(UNSET_TIMEOUT_MS)
    }

    pub fn fair_share_preemption_threshold(&self, path: &str) -> f32 {
        self.nearest_resolved(path)
            .map(|q| q.fair_share_preemption_threshold)
            .unwrap_or(UNSET_THRESHOLD)
    }

    /// The effective scheduling policy: the queue's own, or the nearest
    /// resolved ancestor's, or the global default.
    pub fn scheduling_policy(&self, path: &str) -> &str {
        match self.nearest_resolved(path) {
            Some(queue) => queue.scheduling_policy.as_str(),
            None => self
                .defaults
                .scheduling_policy
                .as_deref()
                .unwrap_or(DEFAULT_SCHEDULING_POLICY),
        }
    }

    pub fn queue_acl(&self, path: &str, operation: AclOperation) -> Acl {
        self.queues
            .get(path)
            .map(|q| match operation {
                AclOperation::Administer => q.acl_administer.clone(),
                AclOperation::Submit => q.acl_submit.clone(),
            })
            .unwrap_or_else(Acl::nobody)
    }

    pub fn user_max_apps(&self, user: &str) -> u32 {
        self.user_max_apps
            .get(user)
            .copied()
            .or(self.defaults.user_max_apps)
            .unwrap_or(u32::MAX)
    }

    /// The queue's own resolved config, or the nearest declared
    /// ancestor's.
    fn nearest_resolved(&self, path: &str) -> Option<&ResolvedQueueConfig> {
        let mut current = path;
        loop {
            if let Some(queue) = self.queues.get(current) {
                return Some(queue);
            }
            current = parent_of(current)?;
        }
    }
}

/// The parent path of a dotted queue path, `None` for the root.
pub(crate) fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('.').map(|(parent, _)| parent)
}
