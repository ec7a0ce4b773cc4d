//! Allocation document parsing.
//!
//! # Responsibilities
//! - Map the element tree onto the raw queue forest and global defaults
//! - Validate queue names (fail fast, before any resolution happens)
//! - Collect placement rule declarations in document order
//! - Warn about and skip unknown elements instead of failing
//!
//! # Design Decisions
//! - Per-queue property values stay raw text here; the resolver parses
//!   them in context. Global defaults are typed immediately because the
//!   fifo rejection must happen at parse time.
//! - `<pool>` is a legacy alias for `<queue>` and treated identically.

use std::collections::HashMap;

use crate::allocation::snapshot::{is_known_policy, QueueKind, POLICY_FIFO};
use crate::error::{AllocResult, AllocationConfigError};
use crate::resources::Resource;

/// The reserved name of the queue hierarchy root.
pub const ROOT_QUEUE: &str = "root";

/// Per-queue child elements the parser records into the property map.
const QUEUE_PROPERTIES: &[&str] = &[
    "minResources",
    "maxResources",
    "maxChildResources",
    "maxRunningApps",
    "maxAMShare",
    "minSharePreemptionTimeout",
    "fairSharePreemptionTimeout",
    "fairSharePreemptionThreshold",
    "schedulingPolicy",
    "aclAdministerApps",
    "aclSubmitApps",
];

/// One declared queue, exactly as written: local name, optional type hint,
/// child queues, and raw property text keyed by element name. Discarded
/// once the resolver has produced the snapshot.
#[derive(Debug, Clone)]
pub struct RawQueueNode {
    pub name: String,
    pub kind_hint: Option<QueueKind>,
    pub children: Vec<RawQueueNode>,
    pub properties: HashMap<String, String>,
}

impl RawQueueNode {
    fn named(name: String) -> Self {
        Self {
            name,
            kind_hint: None,
            children: Vec::new(),
            properties: HashMap::new(),
        }
    }
}

/// Global default settings declared at the top level of the document.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GlobalDefaults {
    pub queue_max_apps: Option<u32>,
    pub user_max_apps: Option<u32>,
    pub queue_max_resources: Option<Resource>,
    pub queue_max_am_share: Option<f32>,
    pub min_share_preemption_timeout_ms: Option<i64>,
    pub fair_share_preemption_timeout_ms: Option<i64>,
    pub fair_share_preemption_threshold: Option<f32>,
    pub scheduling_policy: Option<String>,
}

/// A placement rule exactly as declared, prior to compilation.
#[derive(Debug, Clone)]
pub struct RuleDecl {
    pub name: String,
    pub create: Option<bool>,
    pub queue: Option<String>,
    pub nested: Vec<RuleDecl>,
}

/// The parsed but unresolved allocation document.
#[derive(Debug, Clone)]
pub struct AllocationDocument {
    /// Synthetic root node; top-level queues are its children. Carries the
    /// explicit `<queue name="root">` properties when that form is used.
    pub root: RawQueueNode,
    pub defaults: GlobalDefaults,
    pub user_max_apps: HashMap<String, u32>,
    pub placement_rules: Option<Vec<RuleDecl>>,
}

impl AllocationDocument {
    /// Parse document text into the raw queue forest plus the flat default
    /// and placement declarations.
    pub fn parse(text: &str) -> AllocResult<Self> {
        let top = super::document::parse_document(text)?;
        if top.name != "allocations" {
            return Err(AllocationConfigError::InvalidValue {
                setting: "top-level element".to_string(),
                value: top.name.clone(),
                reason: "allocation files must be rooted at <allocations>".to_string(),
            });
        }

        let mut queues = Vec::new();
        let mut defaults = GlobalDefaults::default();
        let mut legacy_fair_share_timeout_ms = None;
        let mut user_max_apps = HashMap::new();
        let mut placement_rules = None;

        for child in &top.children {
            match child.name.as_str() {
                "queue" | "pool" => queues.push(parse_queue(child, false)?),
                "user" => {
                    let name = required_name(child, "user")?;
                    for setting in &child.children {
                        match setting.name.as_str() {
                            "maxRunningApps" => {
                                let value =
                                    parse_u32("user maxRunningApps", setting.trimmed_text())?;
                                user_max_apps.insert(name.clone(), value);
                            }
                            other => warn_unknown("user", other),
                        }
                    }
                }
                "queueMaxAppsDefault" => {
                    defaults.queue_max_apps =
                        Some(parse_u32("queueMaxAppsDefault", child.trimmed_text())?);
                }
                "userMaxAppsDefault" => {
                    defaults.user_max_apps =
                        Some(parse_u32("userMaxAppsDefault", child.trimmed_text())?);
                }
                "queueMaxResourcesDefault" => {
                    defaults.queue_max_resources = Some(Resource::parse(child.trimmed_text())?);
                }
                "queueMaxAMShareDefault" => {
                    defaults.queue_max_am_share =
                        Some(parse_unit_share("queueMaxAMShareDefault", child.trimmed_text())?);
                }
                "defaultMinSharePreemptionTimeout" => {
                    defaults.min_share_preemption_timeout_ms = Some(parse_timeout_seconds(
                        "defaultMinSharePreemptionTimeout",
                        child.trimmed_text(),
                    )?);
                }
                "defaultFairSharePreemptionTimeout" => {
                    defaults.fair_share_preemption_timeout_ms = Some(parse_timeout_seconds(
                        "defaultFairSharePreemptionTimeout",
                        child.trimmed_text(),
                    )?);
                }
                // Legacy singular form, applied only when the default form
                // is absent.
                "fairSharePreemptionTimeout" => {
                    legacy_fair_share_timeout_ms = Some(parse_timeout_seconds(
                        "fairSharePreemptionTimeout",
                        child.trimmed_text(),
                    )?);
                }
                "defaultFairSharePreemptionThreshold" => {
                    defaults.fair_share_preemption_threshold = Some(parse_unit_share(
                        "defaultFairSharePreemptionThreshold",
                        child.trimmed_text(),
                    )?);
                }
                "defaultQueueSchedulingPolicy" | "defaultQueueSchedulingMode" => {
                    let policy = child.trimmed_text().to_string();
                    if policy == POLICY_FIFO {
                        return Err(AllocationConfigError::UnsupportedDefaultPolicy(policy));
                    }
                    if !is_known_policy(&policy) {
                        return Err(AllocationConfigError::InvalidValue {
                            setting: "defaultQueueSchedulingPolicy".to_string(),
                            value: policy,
                            reason: "unknown scheduling policy".to_string(),
                        });
                    }
                    defaults.scheduling_policy = Some(policy);
                }
                "queuePlacementPolicy" => {
                    let mut rules = Vec::new();
                    for rule in &child.children {
                        rules.push(parse_rule(rule)?);
                    }
                    placement_rules = Some(rules);
                }
                other => warn_unknown("allocations", other),
            }
        }

        if defaults.fair_share_preemption_timeout_ms.is_none() {
            defaults.fair_share_preemption_timeout_ms = legacy_fair_share_timeout_ms;
        }

        let root = assemble_root(queues)?;

        Ok(Self {
            root,
            defaults,
            user_max_apps,
            placement_rules,
        })
    }
}

/// Fold the top-level queue list into the synthetic root node. An explicit
/// `<queue name="root">` wrapper is unwrapped; any sibling alongside it is
/// rejected.
fn assemble_root(queues: Vec<RawQueueNode>) -> AllocResult<RawQueueNode> {
    let has_explicit_root = queues.iter().any(|q| q.name == ROOT_QUEUE);
    if has_explicit_root {
        if queues.len() > 1 {
            return Err(AllocationConfigError::InvalidQueueName {
                name: ROOT_QUEUE.to_string(),
                reason: "no other queues may be declared alongside the root queue".to_string(),
            });
        }
        let mut root = queues.into_iter().next().unwrap_or_else(|| unreachable!());
        root.kind_hint = Some(QueueKind::Parent);
        return Ok(root);
    }

    let mut root = RawQueueNode::named(ROOT_QUEUE.to_string());
    root.kind_hint = Some(QueueKind::Parent);
    root.children = queues;
    Ok(root)
}

fn parse_queue(element: &super::document::Element, nested: bool) -> AllocResult<RawQueueNode> {
    let name = required_name(element, "queue")?;
    let name = validate_queue_name(&name)?;
    // Only the top level may carry the reserved root name (as the
    // explicit wrapper form).
    if nested && name == ROOT_QUEUE {
        return Err(AllocationConfigError::InvalidQueueName {
            name,
            reason: "the root queue may not be declared below the top level".to_string(),
        });
    }
    let mut node = RawQueueNode::named(name);

    if let Some(kind) = element.attr("type") {
        if kind.eq_ignore_ascii_case("parent") {
            node.kind_hint = Some(QueueKind::Parent);
        } else {
            tracing::warn!(queue = %node.name, %kind, "Ignoring unknown queue type attribute");
        }
    }

    for child in &element.children {
        match child.name.as_str() {
            "queue" | "pool" => node.children.push(parse_queue(child, true)?),
            prop if QUEUE_PROPERTIES.contains(&prop) => {
                node.properties
                    .insert(prop.to_string(), child.trimmed_text().to_string());
            }
            other => warn_unknown(&node.name, other),
        }
    }

    Ok(node)
}

fn parse_rule(element: &super::document::Element) -> AllocResult<RuleDecl> {
    if element.name != "rule" {
        return Err(AllocationConfigError::InvalidPlacementRuleStructure(format!(
            "unexpected element <{}> inside <queuePlacementPolicy>",
            element.name
        )));
    }
    let name = element
        .attr("name")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            AllocationConfigError::InvalidPlacementRuleStructure(
                "rule element without a name attribute".to_string(),
            )
        })?
        .to_string();

    let create = match element.attr("create") {
        None => None,
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => {
                return Err(AllocationConfigError::InvalidValue {
                    setting: format!("rule '{name}' create attribute"),
                    value: raw.to_string(),
                    reason: "expected 'true' or 'false'".to_string(),
                })
            }
        },
    };

    let mut nested = Vec::new();
    for child in &element.children {
        nested.push(parse_rule(child)?);
    }

    Ok(RuleDecl {
        name,
        create,
        queue: element.attr("queue").map(|q| q.trim().to_string()),
        nested,
    })
}

/// Queue names must be non-empty after a Unicode-aware trim (covering
/// non-breaking space) and may not contain the path separator.
fn validate_queue_name(name: &str) -> AllocResult<String> {
    let trimmed = name.trim_matches(char::is_whitespace);
    if trimmed.is_empty() {
        return Err(AllocationConfigError::InvalidQueueName {
            name: name.to_string(),
            reason: "queue name is empty or whitespace-only".to_string(),
        });
    }
    if trimmed.contains('.') {
        return Err(AllocationConfigError::InvalidQueueName {
            name: name.to_string(),
            reason: "queue name may not contain '.'".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn required_name(element: &super::document::Element, what: &str) -> AllocResult<String> {
    element
        .attr("name")
        .map(|n| n.to_string())
        .ok_or_else(|| AllocationConfigError::InvalidQueueName {
            name: String::new(),
            reason: format!("<{what}> element without a name attribute"),
        })
}

fn warn_unknown(context: &str, element: &str) {
    tracing::warn!(%context, %element, "Ignoring unknown element in allocation file");
}

pub(crate) fn parse_u32(setting: &str, text: &str) -> AllocResult<u32> {
    text.trim()
        .parse()
        .map_err(|_| AllocationConfigError::InvalidValue {
            setting: setting.to_string(),
            value: text.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
}

/// Timeouts are written in seconds and resolved in milliseconds.
pub(crate) fn parse_timeout_seconds(setting: &str, text: &str) -> AllocResult<i64> {
    let seconds: i64 = text
        .trim()
        .parse()
        .map_err(|_| AllocationConfigError::InvalidValue {
            setting: setting.to_string(),
            value: text.to_string(),
            reason: "expected a whole number of seconds".to_string(),
        })?;
    Ok(seconds.saturating_mul(1000))
}

/// A share that must lie in [0, 1], such as the global AM-share and
/// preemption-threshold defaults.
pub(crate) fn parse_unit_share(setting: &str, text: &str) -> AllocResult<f32> {
    let value = parse_share(setting, text)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AllocationConfigError::InvalidValue {
            setting: setting.to_string(),
            value: text.to_string(),
            reason: "must lie in [0, 1]".to_string(),
        })
    }
}

/// Shares accept a trailing float suffix, as in `0.5f`.
pub(crate) fn parse_share(setting: &str, text: &str) -> AllocResult<f32> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_suffix(['f', 'F'])
        .unwrap_or(trimmed);
    trimmed
        .parse()
        .map_err(|_| AllocationConfigError::InvalidValue {
            setting: setting.to_string(),
            value: text.to_string(),
            reason: "expected a fractional share".to_string(),
        })
}
