use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::cache::QueryCache;
use crate::walks::domain::{
    Actor, Clock, NewReview, NewWalkRequest, PetId, PetProfile, Review, ReviewId, Role,
    StatusChange, UserId, UserProfile, WalkRequest, WalkRequestId,
};
use crate::walks::store::{
    Page, PageRequest, RatingAggregate, RequestQuery, RequestStore, ReviewFilter, ReviewStore,
    StoreError,
};
use crate::walks::{
    walk_router, InMemoryDirectory, InMemoryRequestStore, InMemoryReviewStore,
    LifecycleController, ReviewService, WalkApiState, WalkPolicy,
};

pub(super) type Lifecycle = LifecycleController<InMemoryRequestStore, InMemoryDirectory>;
pub(super) type Reviews =
    ReviewService<InMemoryRequestStore, InMemoryReviewStore, InMemoryDirectory>;

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock the tests move by hand.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) struct Harness {
    pub(super) requests: Arc<InMemoryRequestStore>,
    pub(super) reviews: Arc<InMemoryReviewStore>,
    pub(super) directory: Arc<InMemoryDirectory>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) lifecycle: Arc<Lifecycle>,
    pub(super) review_service: Arc<Reviews>,
}

fn user(id: &str, name: &str, role: Role, active: bool) -> UserProfile {
    UserProfile {
        id: UserId::new(id),
        name: name.to_string(),
        role,
        active,
        avatar_url: None,
    }
}

fn pet(id: &str, owner: &str, name: &str) -> PetProfile {
    PetProfile {
        id: PetId::new(id),
        owner_id: UserId::new(owner),
        name: name.to_string(),
        breed: Some("Beagle".to_string()),
    }
}

pub(super) fn build_harness() -> Harness {
    let requests = Arc::new(InMemoryRequestStore::new());
    let reviews = Arc::new(InMemoryReviewStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let clock = Arc::new(ManualClock::new(base_time()));

    for profile in [
        user("owner-1", "Ana", Role::Owner, true),
        user("owner-2", "Bruno", Role::Owner, true),
        user("walker-1", "Luis", Role::Walker, true),
        user("walker-2", "Marta", Role::Walker, true),
        user("walker-retired", "Pablo", Role::Walker, false),
        user("admin-1", "Ops", Role::Admin, true),
    ] {
        directory.upsert_user(profile).expect("directory write");
    }
    for profile in [pet("pet-1", "owner-1", "Toby"), pet("pet-2", "owner-2", "Luna")] {
        directory.upsert_pet(profile).expect("directory write");
    }

    let lifecycle = Arc::new(LifecycleController::with_clock(
        Arc::clone(&requests),
        Arc::clone(&directory),
        WalkPolicy::default(),
        clock.clone(),
    ));
    let review_service = Arc::new(ReviewService::with_clock(
        Arc::clone(&requests),
        Arc::clone(&reviews),
        Arc::clone(&directory),
        WalkPolicy::default(),
        clock.clone(),
    ));

    Harness {
        requests,
        reviews,
        directory,
        clock,
        lifecycle,
        review_service,
    }
}

pub(super) fn owner() -> Actor {
    Actor::owner("owner-1")
}

pub(super) fn walker() -> Actor {
    Actor::walker("walker-1")
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub(super) fn draft(walker_id: &str, pet_id: &str) -> NewWalkRequest {
    NewWalkRequest {
        walker_id: UserId::new(walker_id),
        pet_id: PetId::new(pet_id),
        scheduled_at: base_time() + Duration::days(1),
        duration_min: 45,
        notes: Some("Leash is by the door".to_string()),
    }
}

pub(super) fn review_of(walk: &WalkRequest, rating: i64) -> NewReview {
    NewReview {
        walk_request_id: walk.id.clone(),
        rating,
        comment: Some("Toby came home happy".to_string()),
    }
}

impl Harness {
    pub(super) fn pending_walk(&self) -> WalkRequest {
        self.lifecycle
            .create(&owner(), draft("walker-1", "pet-1"))
            .expect("create walk request")
    }

    pub(super) fn accepted_walk(&self) -> WalkRequest {
        let walk = self.pending_walk();
        self.lifecycle
            .accept(&walk.id, &walker(), None)
            .expect("accept walk request")
    }

    pub(super) fn completed_walk(&self) -> WalkRequest {
        let walk = self.accepted_walk();
        self.lifecycle
            .complete(&walk.id, &walker(), Some("Two laps of the park".to_string()))
            .expect("complete walk request")
    }

    /// Completes a walk, reviews it with `rating` and moves the clock on a minute.
    pub(super) fn reviewed_walk(&self, rating: i64) -> Review {
        let walk = self.completed_walk();
        let review = self
            .review_service
            .create_review(&owner(), review_of(&walk, rating))
            .expect("create review");
        self.clock.advance(Duration::minutes(1));
        review
    }

    pub(super) fn stored(&self, id: &WalkRequestId) -> WalkRequest {
        self.requests
            .fetch(id)
            .expect("fetch walk request")
            .expect("walk request stored")
    }

    pub(super) fn router(&self) -> Router {
        walk_router(WalkApiState {
            lifecycle: Arc::clone(&self.lifecycle),
            reviews: Arc::clone(&self.review_service),
            cache: Arc::new(QueryCache::new(None)),
        })
    }
}

/// Request store whose backend is always down.
pub(super) struct UnavailableRequestStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

impl RequestStore for UnavailableRequestStore {
    fn insert(&self, _request: WalkRequest) -> Result<WalkRequest, StoreError> {
        Err(down())
    }

    fn fetch(&self, _id: &WalkRequestId) -> Result<Option<WalkRequest>, StoreError> {
        Err(down())
    }

    fn transition(
        &self,
        _id: &WalkRequestId,
        _change: &StatusChange,
    ) -> Result<WalkRequest, StoreError> {
        Err(down())
    }

    fn query(&self, _query: &RequestQuery) -> Result<Page<WalkRequest>, StoreError> {
        Err(down())
    }
}

/// Review store that rejects every insert as a duplicate, like a unique index would.
pub(super) struct ConflictReviewStore;

impl ReviewStore for ConflictReviewStore {
    fn insert(&self, _review: Review) -> Result<Review, StoreError> {
        Err(StoreError::Conflict)
    }

    fn fetch(&self, _id: &ReviewId) -> Result<Option<Review>, StoreError> {
        Ok(None)
    }

    fn query(
        &self,
        _filter: &ReviewFilter,
        page: PageRequest,
    ) -> Result<Page<Review>, StoreError> {
        Ok(page.slice(Vec::new()))
    }

    fn walker_aggregate(&self, _walker_id: &UserId) -> Result<RatingAggregate, StoreError> {
        Ok(RatingAggregate::default())
    }

    fn reviewed_walks(&self, _owner_id: &UserId) -> Result<HashSet<WalkRequestId>, StoreError> {
        Ok(HashSet::new())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
