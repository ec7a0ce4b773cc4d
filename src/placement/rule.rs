//! Placement rule variants and their evaluation.
//!
//! # Responsibilities
//! - Represent each declared rule as a tagged variant, with the nested
//!   case owning its child rule
//! - Evaluate one rule against a submission: assign, reject, or fall
//!   through to the next rule in the chain
//!
//! # Design Decisions
//! - Recursion is structural: `NestedUserQueue` delegates to its owned
//!   child to find the parent queue, then appends the per-user leaf
//! - A non-create rule falls through when its target leaf queue is not
//!   configured; only `Default` and `Reject` decide unconditionally

use serde::Serialize;

use crate::allocation::parse::{RuleDecl, ROOT_QUEUE};
use crate::allocation::snapshot::{ConfiguredQueues, QueueKind};
use crate::error::{AllocResult, AllocationConfigError};

/// The queue every submission lands in when nothing else matches.
pub const DEFAULT_QUEUE: &str = "root.default";

/// A single step of the queue placement chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlacementRule {
    /// Use the queue the application asked for, if it asked for one.
    Specified { create: bool },
    /// Queue named after the submitting user.
    User { create: bool },
    /// Queue named after the user's primary group.
    PrimaryGroup { create: bool },
    /// First of the user's secondary groups with an existing leaf queue.
    SecondaryGroupExistingQueue { create: bool },
    /// Delegate to the nested rule for a parent queue, then place the app
    /// in a per-user child underneath it.
    NestedUserQueue {
        create: bool,
        nested: Box<PlacementRule>,
    },
    /// Fall back to a fixed queue.
    Default {
        create: bool,
        queue: Option<String>,
    },
    /// Refuse the submission.
    Reject,
}

/// The facts about a submission a placement decision depends on. Group
/// membership is supplied by the caller; this crate does not resolve it.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionContext<'a> {
    /// Queue name the application declared, possibly `"default"`.
    pub requested_queue: &'a str,
    pub user: &'a str,
    pub primary_group: &'a str,
    pub secondary_groups: &'a [&'a str],
}

/// Outcome of evaluating the chain for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Assign(String),
    Reject,
}

impl PlacementRule {
    /// Compile one declared rule, validating its structure.
    pub(crate) fn from_decl(decl: &RuleDecl) -> AllocResult<PlacementRule> {
        let create = decl.create.unwrap_or(true);

        if !decl.nested.is_empty() && decl.name != "nestedUserQueue" {
            return Err(AllocationConfigError::InvalidPlacementRuleStructure(
                format!("rule '{}' may not contain a nested rule", decl.name),
            ));
        }

        let rule = match decl.name.as_str() {
            "specified" => PlacementRule::Specified { create },
            "user" => PlacementRule::User { create },
            "primaryGroup" => PlacementRule::PrimaryGroup { create },
            "secondaryGroupExistingQueue" => {
                PlacementRule::SecondaryGroupExistingQueue { create }
            }
            "default" => PlacementRule::Default {
                create,
                queue: decl.queue.clone().filter(|q| !q.is_empty()),
            },
            "reject" => PlacementRule::Reject,
            "nestedUserQueue" => {
                if decl.nested.len() != 1 {
                    return Err(AllocationConfigError::InvalidPlacementRuleStructure(
                        format!(
                            "nestedUserQueue requires exactly one nested rule, found {}",
                            decl.nested.len()
                        ),
                    ));
                }
                let inner = &decl.nested[0];
                if inner.name == "nestedUserQueue" {
                    return Err(AllocationConfigError::InvalidPlacementRuleStructure(
                        "nestedUserQueue may not be nested inside itself".to_string(),
                    ));
                }
                PlacementRule::NestedUserQueue {
                    create,
                    nested: Box::new(PlacementRule::from_decl(inner)?),
                }
            }
            unknown => {
                return Err(AllocationConfigError::InvalidPlacementRuleStructure(
                    format!("unknown placement rule '{unknown}'"),
                ))
            }
        };
        Ok(rule)
    }

    /// Whether this rule always produces a decision.
    pub fn is_terminal(&self) -> bool {
        match self {
            PlacementRule::Default { .. } | PlacementRule::Reject => true,
            PlacementRule::User { create } | PlacementRule::PrimaryGroup { create } => *create,
            PlacementRule::Specified { .. }
            | PlacementRule::SecondaryGroupExistingQueue { .. }
            | PlacementRule::NestedUserQueue { .. } => false,
        }
    }

    /// Evaluate this rule; `None` falls through to the next rule.
    pub(crate) fn evaluate(
        &self,
        ctx: &SubmissionContext<'_>,
        queues: &ConfiguredQueues,
    ) -> Option<Placement> {
        match self {
            PlacementRule::Specified { create } => {
                if ctx.requested_queue.is_empty() || ctx.requested_queue == "default" {
                    None
                } else {
                    assign_if_allowed(qualify(ctx.requested_queue), *create, queues)
                }
            }
            PlacementRule::User { create } => {
                assign_if_allowed(qualify(&clean_name(ctx.user)), *create, queues)
            }
            PlacementRule::PrimaryGroup { create } => {
                assign_if_allowed(qualify(&clean_name(ctx.primary_group)), *create, queues)
            }
            PlacementRule::SecondaryGroupExistingQueue { .. } => {
                for group in ctx.secondary_groups {
                    let candidate = qualify(&clean_name(group));
                    if queues.leaf.contains(&candidate) {
                        return Some(Placement::Assign(candidate));
                    }
                }
                None
            }
            PlacementRule::NestedUserQueue { create, nested } => {
                match nested.evaluate(ctx, queues)? {
                    Placement::Assign(parent) => {
                        // The per-user queue must hang off a non-leaf
                        // parent; nesting under a configured leaf would
                        // corrupt the hierarchy.
                        if queues.kind_of(&parent) == Some(QueueKind::Leaf) {
                            return None;
                        }
                        let candidate = format!("{parent}.{}", clean_name(ctx.user));
                        assign_if_allowed(candidate, *create, queues)
                    }
                    Placement::Reject => None,
                }
            }
            PlacementRule::Default { queue, .. } => {
                let target = queue
                    .as_deref()
                    .map(qualify)
                    .unwrap_or_else(|| DEFAULT_QUEUE.to_string());
                Some(Placement::Assign(target))
            }
            PlacementRule::Reject => Some(Placement::Reject),
        }
    }
}

fn assign_if_allowed(
    candidate: String,
    create: bool,
    queues: &ConfiguredQueues,
) -> Option<Placement> {
    if create || queues.leaf.contains(&candidate) {
        Some(Placement::Assign(candidate))
    } else {
        None
    }
}

/// Qualify a bare queue name under root.
fn qualify(name: &str) -> String {
    if name == ROOT_QUEUE || name.starts_with("root.") {
        name.to_string()
    } else {
        format!("root.{name}")
    }
}

/// Periods would read as hierarchy separators, so user and group names
/// have them replaced before becoming queue names.
fn clean_name(name: &str) -> String {
    name.replace('.', "_dot_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(requested: &'a str, user: &'a str) -> SubmissionContext<'a> {
        SubmissionContext {
            requested_queue: requested,
            user,
            primary_group: "engineers",
            secondary_groups: &[],
        }
    }

    fn queues_with_leaves(leaves: &[&str]) -> ConfiguredQueues {
        let mut queues = ConfiguredQueues::default();
        queues.parent.insert("root".to_string());
        for leaf in leaves {
            queues.leaf.insert((*leaf).to_string());
        }
        queues
    }

    #[test]
    fn specified_falls_through_on_default_queue() {
        let rule = PlacementRule::Specified { create: true };
        let queues = queues_with_leaves(&[]);
        assert_eq!(rule.evaluate(&ctx("default", "alice"), &queues), None);
        assert_eq!(
            rule.evaluate(&ctx("queueA", "alice"), &queues),
            Some(Placement::Assign("root.queueA".to_string()))
        );
    }

    #[test]
    fn non_create_rule_requires_configured_leaf() {
        let rule = PlacementRule::User { create: false };
        let queues = queues_with_leaves(&["root.bob"]);
        assert_eq!(rule.evaluate(&ctx("default", "alice"), &queues), None);
        assert_eq!(
            rule.evaluate(&ctx("default", "bob"), &queues),
            Some(Placement::Assign("root.bob".to_string()))
        );
    }

    #[test]
    fn nested_user_queue_places_user_under_parent() {
        let rule = PlacementRule::NestedUserQueue {
            create: true,
            nested: Box::new(PlacementRule::PrimaryGroup { create: true }),
        };
        let mut queues = queues_with_leaves(&[]);
        queues.parent.insert("root.engineers".to_string());
        assert_eq!(
            rule.evaluate(&ctx("default", "alice"), &queues),
            Some(Placement::Assign("root.engineers.alice".to_string()))
        );
    }

    #[test]
    fn nested_user_queue_refuses_leaf_parent() {
        let rule = PlacementRule::NestedUserQueue {
            create: true,
            nested: Box::new(PlacementRule::PrimaryGroup { create: true }),
        };
        let queues = queues_with_leaves(&["root.engineers"]);
        assert_eq!(rule.evaluate(&ctx("default", "alice"), &queues), None);
    }

    #[test]
    fn secondary_group_needs_an_existing_queue() {
        let rule = PlacementRule::SecondaryGroupExistingQueue { create: true };
        let queues = queues_with_leaves(&["root.ops"]);
        let context = SubmissionContext {
            requested_queue: "default",
            user: "alice",
            primary_group: "engineers",
            secondary_groups: &["research", "ops"],
        };
        assert_eq!(
            rule.evaluate(&context, &queues),
            Some(Placement::Assign("root.ops".to_string()))
        );
    }

    #[test]
    fn dots_in_user_names_are_escaped() {
        let rule = PlacementRule::User { create: true };
        let queues = queues_with_leaves(&[]);
        assert_eq!(
            rule.evaluate(&ctx("default", "first.last"), &queues),
            Some(Placement::Assign("root.first_dot_last".to_string()))
        );
    }

    #[test]
    fn default_rule_honours_configured_queue() {
        let rule = PlacementRule::Default {
            create: true,
            queue: Some("misc".to_string()),
        };
        let queues = queues_with_leaves(&[]);
        assert_eq!(
            rule.evaluate(&ctx("default", "alice"), &queues),
            Some(Placement::Assign("root.misc".to_string()))
        );
    }
}
