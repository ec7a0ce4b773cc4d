//! Queue placement policy compilation.
//!
//! Compiles declared rules into an ordered, immutable chain whose final
//! rule always produces a decision. The chain is stored verbatim in the
//! snapshot so the scheduler evaluates submissions deterministically.

use serde::Serialize;

use crate::allocation::parse::RuleDecl;
use crate::allocation::snapshot::ConfiguredQueues;
use crate::error::{AllocResult, AllocationConfigError};
use crate::placement::rule::{Placement, PlacementRule, SubmissionContext};

/// An ordered chain of placement rules, terminal rule last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuePlacementPolicy {
    rules: Vec<PlacementRule>,
}

impl QueuePlacementPolicy {
    /// Compile the declared rule list, or the implicit chain when the
    /// document has no `queuePlacementPolicy` section.
    pub fn from_declarations(
        decls: Option<&[RuleDecl]>,
        allow_undeclared_pools: bool,
        user_as_default_queue: bool,
    ) -> AllocResult<Self> {
        match decls {
            Some(decls) => Self::from_rule_decls(decls),
            None => Ok(Self::implicit(allow_undeclared_pools, user_as_default_queue)),
        }
    }

    fn from_rule_decls(decls: &[RuleDecl]) -> AllocResult<Self> {
        let mut rules = Vec::with_capacity(decls.len());
        for decl in decls {
            rules.push(PlacementRule::from_decl(decl)?);
        }

        // A terminal rule anywhere before the end makes its successors
        // unreachable, which is a configuration mistake worth failing on.
        if let Some(position) = rules
            .iter()
            .position(PlacementRule::is_terminal)
            .filter(|p| p + 1 < rules.len())
        {
            return Err(AllocationConfigError::InvalidPlacementRuleStructure(
                format!("rules after position {} can never be reached", position + 1),
            ));
        }

        // A chain that can fall off the end gets the canonical fallback.
        if !rules.last().map_or(false, PlacementRule::is_terminal) {
            rules.push(PlacementRule::Default {
                create: true,
                queue: None,
            });
        }

        Ok(Self { rules })
    }

    /// The canonical chain used when no policy section is declared:
    /// honour the requested queue, optionally group per-user queues under
    /// the primary-group parent, and fall back to the default queue.
    fn implicit(allow_undeclared_pools: bool, user_as_default_queue: bool) -> Self {
        let mut rules = vec![PlacementRule::Specified {
            create: allow_undeclared_pools,
        }];
        if user_as_default_queue {
            rules.push(PlacementRule::NestedUserQueue {
                create: allow_undeclared_pools,
                nested: Box::new(PlacementRule::PrimaryGroup {
                    create: allow_undeclared_pools,
                }),
            });
        }
        rules.push(PlacementRule::Default {
            create: true,
            queue: None,
        });
        Self { rules }
    }

    /// The ordered rule chain, exactly as compiled.
    pub fn rules(&self) -> &[PlacementRule] {
        &self.rules
    }

    /// Route one submission through the chain to its decision.
    pub fn assign(
        &self,
        ctx: &SubmissionContext<'_>,
        queues: &ConfiguredQueues,
    ) -> Placement {
        for rule in &self.rules {
            if let Some(placement) = rule.evaluate(ctx, queues) {
                return placement;
            }
        }
        // The builder guarantees a terminal tail, so this is unreachable
        // for any compiled policy; rejecting is the safe answer anyway.
        Placement::Reject
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str) -> RuleDecl {
        RuleDecl {
            name: name.to_string(),
            create: None,
            queue: None,
            nested: Vec::new(),
        }
    }

    fn decl_nested(name: &str, nested: Vec<RuleDecl>) -> RuleDecl {
        RuleDecl {
            nested,
            ..decl(name)
        }
    }

    #[test]
    fn explicit_chain_preserves_order_and_kinds() {
        let decls = vec![
            decl("specified"),
            decl_nested("nestedUserQueue", vec![decl("primaryGroup")]),
            decl("default"),
        ];
        let policy = QueuePlacementPolicy::from_declarations(Some(&decls), true, true).unwrap();

        let rules = policy.rules();
        assert_eq!(rules.len(), 3);
        assert!(matches!(rules[0], PlacementRule::Specified { .. }));
        match &rules[1] {
            PlacementRule::NestedUserQueue { nested, .. } => {
                assert!(matches!(**nested, PlacementRule::PrimaryGroup { .. }));
            }
            other => panic!("expected nestedUserQueue, got {other:?}"),
        }
        assert!(matches!(rules[2], PlacementRule::Default { .. }));
    }

    #[test]
    fn nested_user_queue_requires_exactly_one_child() {
        for nested in [Vec::new(), vec![decl("user"), decl("primaryGroup")]] {
            let decls = vec![decl_nested("nestedUserQueue", nested), decl("default")];
            assert!(QueuePlacementPolicy::from_declarations(Some(&decls), true, true).is_err());
        }
    }

    #[test]
    fn double_nesting_is_rejected() {
        let decls = vec![
            decl_nested(
                "nestedUserQueue",
                vec![decl_nested("nestedUserQueue", vec![decl("user")])],
            ),
            decl("default"),
        ];
        assert!(QueuePlacementPolicy::from_declarations(Some(&decls), true, true).is_err());
    }

    #[test]
    fn nesting_under_other_rules_is_rejected() {
        let decls = vec![decl_nested("specified", vec![decl("user")]), decl("default")];
        assert!(QueuePlacementPolicy::from_declarations(Some(&decls), true, true).is_err());
    }

    #[test]
    fn unknown_rule_name_is_rejected() {
        let decls = vec![decl("roundRobin")];
        assert!(QueuePlacementPolicy::from_declarations(Some(&decls), true, true).is_err());
    }

    #[test]
    fn non_terminal_tail_gets_implicit_default() {
        let decls = vec![decl("specified")];
        let policy = QueuePlacementPolicy::from_declarations(Some(&decls), true, true).unwrap();
        assert_eq!(policy.rules().len(), 2);
        assert!(matches!(
            policy.rules()[1],
            PlacementRule::Default { create: true, .. }
        ));
    }

    #[test]
    fn unreachable_rules_are_rejected() {
        let decls = vec![decl("reject"), decl("default")];
        assert!(QueuePlacementPolicy::from_declarations(Some(&decls), true, true).is_err());
    }

    #[test]
    fn implicit_chain_respects_switches() {
        let policy = QueuePlacementPolicy::from_declarations(None, false, false).unwrap();
        assert_eq!(
            policy.rules(),
            &[
                PlacementRule::Specified { create: false },
                PlacementRule::Default {
                    create: true,
                    queue: None
                },
            ]
        );

        let policy = QueuePlacementPolicy::from_declarations(None, true, true).unwrap();
        assert_eq!(policy.rules().len(), 3);
        assert!(matches!(
            policy.rules()[1],
            PlacementRule::NestedUserQueue { .. }
        ));
    }

    #[test]
    fn assignment_walks_the_chain() {
        let policy = QueuePlacementPolicy::from_declarations(None, false, false).unwrap();
        let mut queues = ConfiguredQueues::default();
        queues.leaf.insert("root.queueA".to_string());

        let requested = SubmissionContext {
            requested_queue: "queueA",
            user: "alice",
            primary_group: "engineers",
            secondary_groups: &[],
        };
        assert_eq!(
            policy.assign(&requested, &queues),
            Placement::Assign("root.queueA".to_string())
        );

        let unconfigured = SubmissionContext {
            requested_queue: "nosuch",
            ..requested
        };
        assert_eq!(
            policy.assign(&unconfigured, &queues),
            Placement::Assign("root.default".to_string())
        );
    }
}
