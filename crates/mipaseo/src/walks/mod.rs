//! Walk request lifecycle and review integrity.
//!
//! A walk request moves through a small state machine driven by the owner and the walker.
//! Once a walk is completed its owner may leave exactly one review, and reviews feed the
//! walker's public rating aggregate. Both guarantees are enforced at the store boundary:
//! status changes are conditional writes and review uniqueness is a constraint on insert.

pub mod authorization;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod policy;
pub mod reviews;
pub mod router;
pub mod seed;
pub mod store;

#[cfg(test)]
mod tests;

pub use authorization::{AccessDenied, AuthorizationGate, Operation};
pub use domain::{
    Actor, Clock, NewReview, NewWalkRequest, PetId, PetProfile, Rating, Review, ReviewId, Role,
    SystemClock, UserId, UserProfile, WalkRequest, WalkRequestId, WalkStatus, WalkTransition,
};
pub use error::WalkError;
pub use lifecycle::{LifecycleController, WalkRequestPage};
pub use policy::WalkPolicy;
pub use reviews::{PendingReviews, ReviewPage, ReviewService, WalkerStats};
pub use router::{walk_router, WalkApiState, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use seed::{SeedBatch, SeedError, SeedImporter, SeedSummary};
pub use store::projection::{PendingReview, ReviewView, WalkRequestView};
pub use store::{
    Directory, InMemoryDirectory, InMemoryRequestStore, InMemoryReviewStore, Pagination,
    RequestStore, ReviewStore, StoreError,
};
