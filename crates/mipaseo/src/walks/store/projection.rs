//! Read-side joins. Entities stay normalized; summaries are looked up at query time and
//! a missing directory entry simply leaves the summary empty.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Directory, RequestStore, StoreError};
use crate::walks::domain::{
    PetId, PetSummary, Rating, Review, ReviewId, UserId, UserSummary, WalkRequest, WalkRequestId,
};

/// Review enriched with participant and walk summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: ReviewId,
    pub walk_request_id: WalkRequestId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub owner: Option<UserSummary>,
    pub walker: Option<UserSummary>,
    pub walk: Option<WalkSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkSummary {
    pub scheduled_at: DateTime<Utc>,
    pub duration_min: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub walker_notes: Option<String>,
    pub pet: Option<PetSummary>,
}

/// Completed walk the owner has not reviewed yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReview {
    pub walk_request_id: WalkRequestId,
    pub scheduled_at: DateTime<Utc>,
    pub duration_min: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub walker: Option<UserSummary>,
    pub pet: Option<PetSummary>,
    pub walker_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkRequestView {
    #[serde(flatten)]
    pub request: WalkRequest,
    pub owner: Option<UserSummary>,
    pub walker: Option<UserSummary>,
    pub pet: Option<PetSummary>,
}

/// Builds views over one request store and the directory.
pub struct Projector<'a, R: ?Sized, D: ?Sized> {
    requests: &'a R,
    directory: &'a D,
}

impl<'a, R, D> Projector<'a, R, D>
where
    R: RequestStore + ?Sized,
    D: Directory + ?Sized,
{
    pub fn new(requests: &'a R, directory: &'a D) -> Self {
        Self {
            requests,
            directory,
        }
    }

    fn user(&self, id: &UserId) -> Result<Option<UserSummary>, StoreError> {
        Ok(self.directory.user(id)?.map(|profile| profile.summary()))
    }

    fn pet(&self, id: &PetId) -> Result<Option<PetSummary>, StoreError> {
        Ok(self.directory.pet(id)?.map(|profile| profile.summary()))
    }

    pub fn review(&self, review: Review) -> Result<ReviewView, StoreError> {
        let walk = match self.requests.fetch(&review.walk_request_id)? {
            Some(request) => Some(WalkSummary {
                scheduled_at: request.scheduled_at,
                duration_min: request.duration_min,
                completed_at: request.completed_at,
                pet: self.pet(&request.pet_id)?,
                walker_notes: request.walker_notes,
            }),
            None => None,
        };

        Ok(ReviewView {
            owner: self.user(&review.owner_id)?,
            walker: self.user(&review.walker_id)?,
            id: review.id,
            walk_request_id: review.walk_request_id,
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
            walk,
        })
    }

    pub fn pending_review(&self, request: WalkRequest) -> Result<PendingReview, StoreError> {
        Ok(PendingReview {
            walker: self.user(&request.walker_id)?,
            pet: self.pet(&request.pet_id)?,
            walk_request_id: request.id,
            scheduled_at: request.scheduled_at,
            duration_min: request.duration_min,
            completed_at: request.completed_at,
            walker_notes: request.walker_notes,
        })
    }

    pub fn request(&self, request: WalkRequest) -> Result<WalkRequestView, StoreError> {
        Ok(WalkRequestView {
            owner: self.user(&request.owner_id)?,
            walker: self.user(&request.walker_id)?,
            pet: self.pet(&request.pet_id)?,
            request,
        })
    }
}
