//! Capability checks for walk and review operations.
//!
//! Every rule pairs the roles allowed to attempt an operation with the identity the actor
//! must hold on the target record. Both must match; a walker role alone never grants
//! access to another walker's request.

use std::fmt;

use super::domain::{Actor, Review, Role, UserId, WalkRequest, WalkTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateRequest,
    ViewRequest,
    ListRequests,
    Accept,
    Reject,
    Complete,
    Cancel,
    CreateReview,
    ViewReview,
    ListReviews,
    ListPendingReviews,
}

impl Operation {
    pub const fn label(self) -> &'static str {
        match self {
            Operation::CreateRequest => "create walk requests",
            Operation::ViewRequest => "view this walk request",
            Operation::ListRequests => "list walk requests",
            Operation::Accept => "accept this walk request",
            Operation::Reject => "reject this walk request",
            Operation::Complete => "complete this walk request",
            Operation::Cancel => "cancel this walk request",
            Operation::CreateReview => "review this walk",
            Operation::ViewReview => "view this review",
            Operation::ListReviews => "list reviews",
            Operation::ListPendingReviews => "list pending reviews",
        }
    }
}

impl From<WalkTransition> for Operation {
    fn from(transition: WalkTransition) -> Self {
        match transition {
            WalkTransition::Accept => Operation::Accept,
            WalkTransition::Reject => Operation::Reject,
            WalkTransition::Complete => Operation::Complete,
            WalkTransition::Cancel => Operation::Cancel,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity the actor must hold on the target record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// No record-level identity requirement (self-scoped or record-less operations).
    Any,
    /// Actor acting as OWNER must be the record's owner.
    Owner,
    /// Actor acting as WALKER must be the record's walker.
    Walker,
    /// Owner as OWNER or walker as WALKER.
    EitherParty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub roles: &'static [Role],
    pub party: Party,
}

const OWNER_ONLY: &[Role] = &[Role::Owner];
const WALKER_ONLY: &[Role] = &[Role::Walker];
const PARTIES: &[Role] = &[Role::Owner, Role::Walker];
const EVERYONE: &[Role] = &[Role::Owner, Role::Walker, Role::Admin];

/// The authorization matrix.
pub const fn rule(operation: Operation) -> Rule {
    match operation {
        Operation::CreateRequest => Rule {
            roles: OWNER_ONLY,
            party: Party::Any,
        },
        Operation::ViewRequest => Rule {
            roles: PARTIES,
            party: Party::EitherParty,
        },
        Operation::ListRequests | Operation::ListReviews => Rule {
            roles: EVERYONE,
            party: Party::Any,
        },
        Operation::Accept | Operation::Reject | Operation::Complete => Rule {
            roles: WALKER_ONLY,
            party: Party::Walker,
        },
        Operation::Cancel => Rule {
            roles: PARTIES,
            party: Party::EitherParty,
        },
        Operation::CreateReview => Rule {
            roles: OWNER_ONLY,
            party: Party::Owner,
        },
        Operation::ViewReview => Rule {
            roles: PARTIES,
            party: Party::EitherParty,
        },
        Operation::ListPendingReviews => Rule {
            roles: OWNER_ONLY,
            party: Party::Any,
        },
    }
}

/// Record an operation is checked against.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    None,
    Request(&'a WalkRequest),
    Review(&'a Review),
}

impl Target<'_> {
    fn parties(&self) -> Option<(&UserId, &UserId)> {
        match self {
            Target::None => None,
            Target::Request(request) => Some((&request.owner_id, &request.walker_id)),
            Target::Review(review) => Some((&review.owner_id, &review.walker_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("role {role} may not {operation}")]
    RoleNotPermitted { role: Role, operation: Operation },
    #[error("only a party to the walk may {operation}")]
    NotAParty { operation: Operation },
}

/// Stateless evaluator of [`rule`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGate;

impl AuthorizationGate {
    pub fn new() -> Self {
        Self
    }

    pub fn check(
        &self,
        actor: &Actor,
        operation: Operation,
        target: Target<'_>,
    ) -> Result<(), AccessDenied> {
        let rule = rule(operation);
        if !rule.roles.contains(&actor.role) {
            return Err(AccessDenied::RoleNotPermitted {
                role: actor.role,
                operation,
            });
        }

        let is_owner = || {
            target
                .parties()
                .is_some_and(|(owner, _)| actor.role == Role::Owner && owner == &actor.id)
        };
        let is_walker = || {
            target
                .parties()
                .is_some_and(|(_, walker)| actor.role == Role::Walker && walker == &actor.id)
        };

        let allowed = match rule.party {
            Party::Any => true,
            Party::Owner => is_owner(),
            Party::Walker => is_walker(),
            Party::EitherParty => is_owner() || is_walker(),
        };

        if allowed {
            Ok(())
        } else {
            Err(AccessDenied::NotAParty { operation })
        }
    }

    pub fn allows(&self, actor: &Actor, operation: Operation, target: Target<'_>) -> bool {
        self.check(actor, operation, target).is_ok()
    }
}
