use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of an owner, walker or administrator account.
    UserId
);
string_id!(PetId);
string_id!(
    /// Opaque, immutable identifier of a walk request.
    WalkRequestId
);
string_id!(ReviewId);

/// Closed set of roles the authentication layer may assert for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Walker,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Walker => "WALKER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OWNER" => Ok(Role::Owner),
            "WALKER" => Ok(Role::Walker),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(value.to_string())),
        }
    }
}

/// Authenticated caller as asserted by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }

    pub fn owner(id: impl Into<String>) -> Self {
        Self::new(id, Role::Owner)
    }

    pub fn walker(id: impl Into<String>) -> Self {
        Self::new(id, Role::Walker)
    }
}

/// Lifecycle status of a walk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalkStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl WalkStatus {
    pub const fn label(self) -> &'static str {
        match self {
            WalkStatus::Pending => "PENDING",
            WalkStatus::Accepted => "ACCEPTED",
            WalkStatus::Rejected => "REJECTED",
            WalkStatus::Completed => "COMPLETED",
            WalkStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            WalkStatus::Rejected | WalkStatus::Completed | WalkStatus::Cancelled
        )
    }
}

impl fmt::Display for WalkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WalkStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(WalkStatus::Pending),
            "ACCEPTED" => Ok(WalkStatus::Accepted),
            "REJECTED" => Ok(WalkStatus::Rejected),
            "COMPLETED" => Ok(WalkStatus::Completed),
            "CANCELLED" | "CANCELED" => Ok(WalkStatus::Cancelled),
            _ => Err(format!("unknown walk status '{value}'")),
        }
    }
}

/// The edges of the walk request state machine.
///
/// ```text
/// PENDING  --accept-->   ACCEPTED --complete--> COMPLETED
/// PENDING  --reject-->   REJECTED
/// ACCEPTED --cancel-->   CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkTransition {
    Accept,
    Reject,
    Complete,
    Cancel,
}

impl WalkTransition {
    pub const fn all() -> [Self; 4] {
        [Self::Accept, Self::Reject, Self::Complete, Self::Cancel]
    }

    pub const fn from_status(self) -> WalkStatus {
        match self {
            Self::Accept | Self::Reject => WalkStatus::Pending,
            Self::Complete | Self::Cancel => WalkStatus::Accepted,
        }
    }

    pub const fn to_status(self) -> WalkStatus {
        match self {
            Self::Accept => WalkStatus::Accepted,
            Self::Reject => WalkStatus::Rejected,
            Self::Complete => WalkStatus::Completed,
            Self::Cancel => WalkStatus::Cancelled,
        }
    }

    pub const fn verb(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }

    /// Transition leading from `from` to `to`, if the state machine has such an edge.
    pub fn between(from: WalkStatus, to: WalkStatus) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|edge| edge.from_status() == from && edge.to_status() == to)
    }
}

/// A scheduled booking linking an owner, a walker and a pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkRequest {
    pub id: WalkRequestId,
    pub owner_id: UserId,
    pub walker_id: UserId,
    pub pet_id: PetId,
    pub status: WalkStatus,
    pub scheduled_at: DateTime<Utc>,
    pub duration_min: u32,
    pub notes: Option<String>,
    pub walker_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalkRequest {
    /// `completedAt` is present exactly when the walk is completed.
    pub fn completion_consistent(&self) -> bool {
        self.completed_at.is_some() == (self.status == WalkStatus::Completed)
    }
}

/// Owner-supplied fields for a new walk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWalkRequest {
    pub walker_id: UserId,
    pub pet_id: PetId,
    pub scheduled_at: DateTime<Utc>,
    pub duration_min: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Conditional status write: applied only while the stored status equals `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    transition: WalkTransition,
    walker_notes: Option<String>,
    at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(transition: WalkTransition, walker_notes: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            transition,
            walker_notes,
            at,
        }
    }

    pub fn expected(&self) -> WalkStatus {
        self.transition.from_status()
    }

    pub fn target(&self) -> WalkStatus {
        self.transition.to_status()
    }

    /// Apply the change to a record whose status already matched `expected`.
    pub fn apply_to(&self, request: &mut WalkRequest) {
        request.status = self.target();
        if let Some(notes) = &self.walker_notes {
            request.walker_notes = Some(notes.clone());
        }
        if self.target() == WalkStatus::Completed {
            request.completed_at = Some(self.at);
        }
        request.updated_at = self.at;
    }
}

/// Integer rating between 1 and 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = u8> {
        Self::MIN..=Self::MAX
    }
}

impl TryFrom<i64> for Rating {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(format!(
                "rating must be an integer between {} and {} (found {value})",
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// A one-time, owner-authored rating tied to exactly one completed walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub walk_request_id: WalkRequestId,
    pub owner_id: UserId,
    pub walker_id: UserId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Review payload as submitted by an owner. The rating stays unchecked until validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub walk_request_id: WalkRequestId,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    pub fn is_active_walker(&self) -> bool {
        self.active && self.role == Role::Walker
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetProfile {
    pub id: PetId,
    pub owner_id: UserId,
    pub name: String,
    pub breed: Option<String>,
}

impl PetProfile {
    pub fn summary(&self) -> PetSummary {
        PetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            breed: self.breed.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetSummary {
    pub id: PetId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
}

/// Source of "now" for validation and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_cover_exactly_the_state_machine_edges() {
        let statuses = [
            WalkStatus::Pending,
            WalkStatus::Accepted,
            WalkStatus::Rejected,
            WalkStatus::Completed,
            WalkStatus::Cancelled,
        ];
        let mut edges = Vec::new();
        for from in statuses {
            for to in statuses {
                if let Some(edge) = WalkTransition::between(from, to) {
                    edges.push((from, to, edge));
                }
            }
        }

        assert_eq!(
            edges,
            vec![
                (WalkStatus::Pending, WalkStatus::Accepted, WalkTransition::Accept),
                (WalkStatus::Pending, WalkStatus::Rejected, WalkTransition::Reject),
                (WalkStatus::Accepted, WalkStatus::Completed, WalkTransition::Complete),
                (WalkStatus::Accepted, WalkStatus::Cancelled, WalkTransition::Cancel),
            ]
        );
        assert!(statuses
            .iter()
            .filter(|status| status.is_terminal())
            .all(|status| WalkTransition::all()
                .iter()
                .all(|edge| edge.from_status() != *status)));
    }

    #[test]
    fn rating_accepts_only_one_through_five() {
        assert!(Rating::try_from(0).is_err());
        assert!(Rating::try_from(6).is_err());
        assert!(Rating::try_from(-3).is_err());
        assert_eq!(Rating::try_from(4).map(Rating::value), Ok(4));

        let parsed: Result<Rating, _> = serde_json::from_str("7");
        assert!(parsed.is_err());
        let parsed: Rating = serde_json::from_str("5").expect("valid rating");
        assert_eq!(serde_json::to_string(&parsed).expect("serializes"), "5");
    }

    #[test]
    fn roles_and_statuses_parse_case_insensitively() {
        assert_eq!("walker".parse::<Role>(), Ok(Role::Walker));
        assert_eq!(" OWNER ".parse::<Role>(), Ok(Role::Owner));
        assert!("groomer".parse::<Role>().is_err());
        assert_eq!("canceled".parse::<WalkStatus>(), Ok(WalkStatus::Cancelled));
        assert_eq!(
            serde_json::to_string(&WalkStatus::Completed).expect("serializes"),
            "\"COMPLETED\""
        );
    }

    #[test]
    fn completing_change_sets_completed_at_and_keeps_notes_when_absent() {
        let at = Utc::now();
        let mut request = WalkRequest {
            id: WalkRequestId::new("walk-1"),
            owner_id: UserId::new("owner-1"),
            walker_id: UserId::new("walker-1"),
            pet_id: PetId::new("pet-1"),
            status: WalkStatus::Accepted,
            scheduled_at: at,
            duration_min: 30,
            notes: None,
            walker_notes: Some("on my way".to_string()),
            completed_at: None,
            created_at: at,
            updated_at: at,
        };

        StatusChange::new(WalkTransition::Complete, None, at).apply_to(&mut request);

        assert_eq!(request.status, WalkStatus::Completed);
        assert_eq!(request.completed_at, Some(at));
        assert_eq!(request.walker_notes.as_deref(), Some("on my way"));
        assert!(request.completion_consistent());
    }
}
