use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::authorization::{AuthorizationGate, Operation, Target};
use super::domain::{
    Actor, Clock, NewReview, Rating, Review, ReviewId, Role, SystemClock, UserId, WalkStatus,
};
use super::error::WalkError;
use super::policy::WalkPolicy;
use super::store::projection::{PendingReview, Projector, ReviewView};
use super::store::{
    Directory, Pagination, RatingAggregate, RequestQuery, RequestStore, ReviewFilter,
    ReviewStore, StoreError,
};

static REVIEW_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_review_id() -> ReviewId {
    let id = REVIEW_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ReviewId(format!("rev-{id:06}"))
}

/// Rating aggregate for one walker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkerStats {
    pub walker_id: UserId,
    /// Mean rating rounded to one decimal; `0.0` without reviews.
    pub average_rating: f64,
    pub total_reviews: u64,
    /// Always carries every rating from 1 to 5.
    pub rating_distribution: BTreeMap<u8, u64>,
}

impl WalkerStats {
    pub fn from_aggregate(walker_id: UserId, aggregate: &RatingAggregate) -> Self {
        let mut rating_distribution: BTreeMap<u8, u64> =
            Rating::all().map(|rating| (rating, 0)).collect();
        for (rating, count) in &aggregate.by_rating {
            if let Some(slot) = rating_distribution.get_mut(rating) {
                *slot = *count;
            }
        }

        let average_rating = if aggregate.count == 0 {
            0.0
        } else {
            ((aggregate.sum * 10) as f64 / aggregate.count as f64).round() / 10.0
        };

        Self {
            walker_id,
            average_rating,
            total_reviews: aggregate.count,
            rating_distribution,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReviews {
    pub pending_reviews: Vec<PendingReview>,
}

/// Review creation and rating aggregation over the request and review stores.
pub struct ReviewService<R, V, D> {
    requests: Arc<R>,
    reviews: Arc<V>,
    directory: Arc<D>,
    gate: AuthorizationGate,
    clock: Arc<dyn Clock>,
    policy: WalkPolicy,
}

impl<R, V, D> ReviewService<R, V, D>
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    pub fn new(requests: Arc<R>, reviews: Arc<V>, directory: Arc<D>, policy: WalkPolicy) -> Self {
        Self::with_clock(requests, reviews, directory, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        requests: Arc<R>,
        reviews: Arc<V>,
        directory: Arc<D>,
        policy: WalkPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            reviews,
            directory,
            gate: AuthorizationGate::new(),
            clock,
            policy,
        }
    }

    /// Record the owner's review of a completed walk.
    ///
    /// Uniqueness is decided by the store's insert alone; a concurrent duplicate surfaces
    /// as `Conflict` even though both callers passed every earlier check.
    pub fn create_review(&self, actor: &Actor, submission: NewReview) -> Result<Review, WalkError> {
        let rating = Rating::try_from(submission.rating).map_err(WalkError::Validation)?;
        let comment = self.policy.comment(submission.comment)?;

        let request = self
            .requests
            .fetch(&submission.walk_request_id)?
            .ok_or(WalkError::NotFound("walk request"))?;

        if request.status != WalkStatus::Completed {
            return Err(WalkError::InvalidState(format!(
                "only completed walks may be reviewed (walk is {})",
                request.status
            )));
        }

        self.gate
            .check(actor, Operation::CreateReview, Target::Request(&request))?;

        let review = Review {
            id: next_review_id(),
            walk_request_id: request.id.clone(),
            owner_id: request.owner_id.clone(),
            walker_id: request.walker_id.clone(),
            rating,
            comment,
            created_at: self.clock.now(),
        };

        match self.reviews.insert(review) {
            Ok(stored) => {
                info!(
                    review_id = %stored.id,
                    walk_request_id = %stored.walk_request_id,
                    walker_id = %stored.walker_id,
                    rating = stored.rating.value(),
                    "review created"
                );
                Ok(stored)
            }
            Err(StoreError::Conflict) => {
                warn!(walk_request_id = %request.id, "duplicate review rejected");
                Err(WalkError::Conflict(
                    "a review already exists for this walk".to_string(),
                ))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Unknown, inactive or non-walker ids are `NotFound`.
    pub fn walker_stats(&self, walker_id: &UserId) -> Result<WalkerStats, WalkError> {
        match self.directory.user(walker_id)? {
            Some(profile) if profile.is_active_walker() => {}
            _ => return Err(WalkError::NotFound("walker")),
        }

        let aggregate = self.reviews.walker_aggregate(walker_id)?;
        debug!(walker_id = %walker_id, total = aggregate.count, "walker stats computed");
        Ok(WalkerStats::from_aggregate(walker_id.clone(), &aggregate))
    }

    /// Owners see reviews they wrote, walkers reviews about them, admins every review.
    pub fn list_reviews(
        &self,
        actor: &Actor,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ReviewPage, WalkError> {
        self.gate
            .check(actor, Operation::ListReviews, Target::None)?;
        let page = self.policy.page(page, limit);
        let filter = match actor.role {
            Role::Owner => ReviewFilter {
                owner_id: Some(actor.id.clone()),
                walker_id: None,
            },
            Role::Walker => ReviewFilter {
                owner_id: None,
                walker_id: Some(actor.id.clone()),
            },
            Role::Admin => ReviewFilter::default(),
        };

        let found = self.reviews.query(&filter, page)?;
        let projector = self.projector();
        let reviews = found
            .items
            .into_iter()
            .map(|review| projector.review(review))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReviewPage {
            reviews,
            pagination: Pagination::new(page, found.total),
        })
    }

    /// Completed walks owned by the actor that have no review yet.
    pub fn list_pending_reviews(&self, actor: &Actor) -> Result<PendingReviews, WalkError> {
        self.gate
            .check(actor, Operation::ListPendingReviews, Target::None)?;

        let completed = self.requests.query(&RequestQuery {
            owner_id: Some(actor.id.clone()),
            status: Some(WalkStatus::Completed),
            ..RequestQuery::default()
        })?;
        let reviewed = self.reviews.reviewed_walks(&actor.id)?;

        let projector = self.projector();
        let pending_reviews = completed
            .items
            .into_iter()
            .filter(|request| !reviewed.contains(&request.id))
            .map(|request| projector.pending_review(request))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PendingReviews { pending_reviews })
    }

    pub fn get_review(&self, actor: &Actor, review_id: &ReviewId) -> Result<ReviewView, WalkError> {
        let review = self
            .reviews
            .fetch(review_id)?
            .ok_or(WalkError::NotFound("review"))?;
        self.gate
            .check(actor, Operation::ViewReview, Target::Review(&review))?;
        Ok(self.projector().review(review)?)
    }

    fn projector(&self) -> Projector<'_, R, D> {
        Projector::new(self.requests.as_ref(), self.directory.as_ref())
    }
}
