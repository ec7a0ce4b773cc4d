//! Resource inheritance resolution.
//!
//! Walks the raw queue tree in pre-order (parent before children) and
//! computes the final settings for every queue:
//!
//! - minResources is explicit or zero and never inherited.
//! - maxResources is explicit, else the global default capped by the
//!   direct parent's maxChildResources, else unbounded.
//! - Preemption timeouts, the preemption threshold, and the scheduling
//!   policy inherit the parent's *resolved* value, so a global default
//!   applied at root flows down to every queue that does not override it.
//! - maxRunningApps and maxAMShare are default-filled, not inherited.
//! - root always exists, is always a parent, and gets the everyone ACL
//!   unless the file explicitly overrides it.

use std::collections::BTreeMap;

use crate::allocation::parse::{
    parse_share, parse_timeout_seconds, parse_u32, AllocationDocument, RawQueueNode,
};
use crate::allocation::snapshot::{
    is_known_policy, AllocationConfiguration, ConfiguredQueues, QueueKind, ResolvedQueueConfig,
    DEFAULT_QUEUE_MAX_AM_SHARE, DEFAULT_SCHEDULING_POLICY, UNSET_THRESHOLD, UNSET_TIMEOUT_MS,
};
use crate::error::{AllocResult, AllocationConfigError};
use crate::placement::QueuePlacementPolicy;
use crate::resources::{Acl, Resource};
use crate::settings::LoaderSettings;

/// Resolve a parsed document into a complete configuration snapshot,
/// compiling the placement chain along the way.
pub fn resolve(
    doc: &AllocationDocument,
    settings: &LoaderSettings,
) -> AllocResult<AllocationConfiguration> {
    let mut resolver = Resolver {
        doc,
        queues: BTreeMap::new(),
        configured: ConfiguredQueues::default(),
    };
    resolver.resolve_queue(&doc.root, None)?;

    let placement_policy = QueuePlacementPolicy::from_declarations(
        doc.placement_rules.as_deref(),
        settings.allow_undeclared_pools,
        settings.user_as_default_queue,
    )?;

    Ok(AllocationConfiguration {
        queues: resolver.queues,
        configured: resolver.configured,
        user_max_apps: doc.user_max_apps.clone(),
        defaults: doc.defaults.clone(),
        placement_policy,
    })
}

struct Resolver<'a> {
    doc: &'a AllocationDocument,
    queues: BTreeMap<String, ResolvedQueueConfig>,
    configured: ConfiguredQueues,
}

impl Resolver<'_> {
    fn resolve_queue(
        &mut self,
        node: &RawQueueNode,
        parent: Option<&ResolvedQueueConfig>,
    ) -> AllocResult<()> {
        let defaults = &self.doc.defaults;
        let path = match parent {
            Some(parent) => format!("{}.{}", parent.path, node.name),
            None => node.name.clone(),
        };
        let is_root = parent.is_none();

        let kind = if !node.children.is_empty() || is_root {
            QueueKind::Parent
        } else {
            node.kind_hint.unwrap_or(QueueKind::Leaf)
        };

        let min_resources = match node.properties.get("minResources") {
            Some(raw) => Resource::parse(raw)?,
            None => Resource::ZERO,
        };

        let max_resources = match node.properties.get("maxResources") {
            Some(raw) => Resource::parse(raw)?,
            None => {
                let fallback = defaults
                    .queue_max_resources
                    .unwrap_or_else(Resource::unbounded);
                // Capped by the direct parent's declared ceiling on its
                // children; the cap does not travel further down the tree.
                match parent.and_then(|p| p.max_child_resources) {
                    Some(cap) => fallback.min(cap),
                    None => fallback,
                }
            }
        };

        let max_child_resources = match node.properties.get("maxChildResources") {
            Some(raw) => {
                let cap = Resource::parse(raw)?;
                if kind == QueueKind::Leaf {
                    tracing::warn!(
                        queue = %path,
                        "Ignoring maxChildResources declared on a leaf queue"
                    );
                    None
                } else {
                    Some(cap)
                }
            }
            None => None,
        };

        let max_running_apps = match node.properties.get("maxRunningApps") {
            Some(raw) => parse_u32("maxRunningApps", raw)?,
            None => defaults.queue_max_apps.unwrap_or(u32::MAX),
        };

        let max_am_share = match node.properties.get("maxAMShare") {
            Some(raw) => validate_share(&path, "maxAMShare", parse_share("maxAMShare", raw)?)?,
            None => defaults
                .queue_max_am_share
                .unwrap_or(DEFAULT_QUEUE_MAX_AM_SHARE),
        };

        let min_share_preemption_timeout_ms =
            match node.properties.get("minSharePreemptionTimeout") {
                Some(raw) => parse_timeout_seconds("minSharePreemptionTimeout", raw)?,
                None => match parent {
                    Some(parent) => parent.min_share_preemption_timeout_ms,
                    None => defaults
                        .min_share_preemption_timeout_ms
                        .unwrap_or(UNSET_TIMEOUT_MS),
                },
            };

        let fair_share_preemption_timeout_ms =
            match node.properties.get("fairSharePreemptionTimeout") {
                Some(raw) => parse_timeout_seconds("fairSharePreemptionTimeout", raw)?,
                None => match parent {
                    Some(parent) => parent.fair_share_preemption_timeout_ms,
                    None => defaults
                        .fair_share_preemption_timeout_ms
                        .unwrap_or(UNSET_TIMEOUT_MS),
                },
            };

        let fair_share_preemption_threshold =
            match node.properties.get("fairSharePreemptionThreshold") {
                Some(raw) => validate_share(
                    &path,
                    "fairSharePreemptionThreshold",
                    parse_share("fairSharePreemptionThreshold", raw)?,
                )?,
                None => match parent {
                    Some(parent) => parent.fair_share_preemption_threshold,
                    None => defaults
                        .fair_share_preemption_threshold
                        .unwrap_or(UNSET_THRESHOLD),
                },
            };

        // fifo is rejected as a *default* policy at parse time but remains
        // a legal explicit per-queue override.
        let scheduling_policy = match node.properties.get("schedulingPolicy") {
            Some(raw) => {
                let name = raw.trim();
                if !is_known_policy(name) {
                    return Err(AllocationConfigError::InvalidValue {
                        setting: format!("schedulingPolicy for queue '{path}'"),
                        value: raw.clone(),
                        reason: "unknown scheduling policy".to_string(),
                    });
                }
                name.to_string()
            }
            None => match parent {
                Some(parent) => parent.scheduling_policy.clone(),
                None => defaults
                    .scheduling_policy
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SCHEDULING_POLICY.to_string()),
            },
        };

        let acl_administer = resolve_acl(node, "aclAdministerApps", is_root);
        let acl_submit = resolve_acl(node, "aclSubmitApps", is_root);

        let resolved = ResolvedQueueConfig {
            path: path.clone(),
            parent_path: parent.map(|p| p.path.clone()),
            kind,
            min_resources,
            max_resources,
            max_child_resources,
            max_running_apps,
            max_am_share,
            min_share_preemption_timeout_ms,
            fair_share_preemption_timeout_ms,
            fair_share_preemption_threshold,
            scheduling_policy,
            acl_administer,
            acl_submit,
        };

        match kind {
            QueueKind::Leaf => self.configured.leaf.insert(path.clone()),
            QueueKind::Parent => self.configured.parent.insert(path.clone()),
        };

        let for_children = resolved.clone();
        self.queues.insert(path, resolved);
        for child in &node.children {
            self.resolve_queue(child, Some(&for_children))?;
        }
        Ok(())
    }
}

fn resolve_acl(node: &RawQueueNode, property: &str, is_root: bool) -> Acl {
    match node.properties.get(property) {
        Some(raw) => Acl::from_text(raw),
        None if is_root => Acl::everyone(),
        None => Acl::nobody(),
    }
}

fn validate_share(path: &str, setting: &str, value: f32) -> AllocResult<f32> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AllocationConfigError::InvalidValue {
            setting: format!("{setting} for queue '{path}'"),
            value: value.to_string(),
            reason: "must lie in [0, 1]".to_string(),
        })
    }
}
