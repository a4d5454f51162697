//! Permission effect resolution (`spec.md` §4.1, property 3/4/5 in §8).
//!
//! Pure function over a caller-supplied candidate set: C2 (the entity
//! graph) is responsible for walking ancestors and handing this function
//! the union of directly-owned and inherited permissions. This module
//! never touches the graph itself.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entity::{Effect, EntityId, Permission, Verb};
use super::pattern::UriPattern;

/// One candidate permission together with the entity that owns it.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub owner: EntityId,
    pub permission: &'a Permission,
}

/// The outcome of evaluating a request against a candidate set.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub allowed: bool,
    /// The most specific matching Deny, if any contributed to the result.
    pub denying_owner: Option<EntityId>,
    /// The most specific matching Grant, if any contributed to the result.
    pub granting_owner: Option<EntityId>,
}

/// Resolve the effect of a request against a set of candidate permissions.
///
/// Implements the four-step decision function in `spec.md` §4.1:
/// 1. filter to matching, non-expired permissions,
/// 2. any Deny => Deny,
/// 3. else any Grant => Grant,
/// 4. else default-deny.
#[must_use]
pub fn evaluate(
    candidates: &[Candidate<'_>],
    uri: &str,
    verb: Verb,
    at: DateTime<Utc>,
) -> EvaluationOutcome {
    let mut best_deny: Option<(Candidate<'_>, super::pattern::Specificity)> = None;
    let mut best_grant: Option<(Candidate<'_>, super::pattern::Specificity)> = None;

    for cand in candidates {
        if cand.permission.verb != verb {
            continue;
        }
        if cand.permission.is_expired_at(at) {
            continue;
        }
        let pattern = UriPattern::parse(&cand.permission.uri);
        if !pattern.matches(uri) {
            continue;
        }
        let spec = pattern.specificity();
        match cand.permission.effect {
            Effect::Deny => {
                if best_deny.as_ref().map_or(true, |(_, best)| spec < *best) {
                    best_deny = Some((cand.clone(), spec));
                }
            }
            Effect::Grant => {
                if best_grant.as_ref().map_or(true, |(_, best)| spec < *best) {
                    best_grant = Some((cand.clone(), spec));
                }
            }
        }
    }

    if let Some((deny, _)) = best_deny {
        return EvaluationOutcome {
            allowed: false,
            denying_owner: Some(deny.owner),
            granting_owner: best_grant.map(|(g, _)| g.owner),
        };
    }

    match best_grant {
        Some((grant, _)) => EvaluationOutcome {
            allowed: true,
            denying_owner: None,
            granting_owner: Some(grant.owner),
        },
        None => EvaluationOutcome {
            allowed: false,
            denying_owner: None,
            granting_owner: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Effect, Permission, Verb};
    use chrono::Utc;

    fn perm(uri: &str, effect: Effect) -> Permission {
        Permission {
            uri: uri.to_owned(),
            verb: Verb::Get,
            effect,
            scheme: "ApiUriAuthorization".to_owned(),
            expires_at: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn default_deny_with_no_candidates() {
        let out = evaluate(&[], "/api/projects", Verb::Get, Utc::now());
        assert!(!out.allowed);
    }

    #[test]
    fn grant_wins_with_no_deny() {
        let p = perm("/api/projects", Effect::Grant);
        let cands = [Candidate {
            owner: 10,
            permission: &p,
        }];
        let out = evaluate(&cands, "/api/projects", Verb::Get, Utc::now());
        assert!(out.allowed);
        assert_eq!(out.granting_owner, Some(10));
    }

    #[test]
    fn deny_dominates_grant_same_owner() {
        let grant = perm("/api/projects", Effect::Grant);
        let deny = perm("/api/projects", Effect::Deny);
        let cands = [
            Candidate {
                owner: 1,
                permission: &grant,
            },
            Candidate {
                owner: 1,
                permission: &deny,
            },
        ];
        let out = evaluate(&cands, "/api/projects", Verb::Get, Utc::now());
        assert!(!out.allowed);
    }

    #[test]
    fn specific_deny_beats_wildcard_grant() {
        let grant = perm("/api/*", Effect::Grant);
        let deny = perm("/api/secret", Effect::Deny);
        let cands = [
            Candidate {
                owner: 1,
                permission: &grant,
            },
            Candidate {
                owner: 1,
                permission: &deny,
            },
        ];
        assert!(!evaluate(&cands, "/api/secret", Verb::Get, Utc::now()).allowed);
        assert!(evaluate(&cands, "/api/public", Verb::Get, Utc::now()).allowed);
    }

    #[test]
    fn expired_permission_is_ignored() {
        let mut p = perm("/api/projects", Effect::Grant);
        p.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let cands = [Candidate {
            owner: 1,
            permission: &p,
        }];
        assert!(!evaluate(&cands, "/api/projects", Verb::Get, Utc::now()).allowed);
    }
}
