//! Storage boundary for walk requests, reviews and the read-only user/pet directory.
//!
//! Both write paths are single atomic operations with a precondition: status changes
//! are compare-and-set on the expected prior status, and review inserts are guarded by
//! a uniqueness constraint on the reviewed walk. Callers never lock a store across
//! several steps.

mod memory;
pub mod projection;

pub use memory::{InMemoryDirectory, InMemoryRequestStore, InMemoryReviewStore};

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::domain::{
    PetId, PetProfile, Review, ReviewId, StatusChange, UserId, UserProfile, WalkRequest,
    WalkRequestId, WalkStatus,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("status precondition failed (current status {current})")]
    StatusMismatch { current: WalkStatus },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence of walk requests.
pub trait RequestStore: Send + Sync {
    fn insert(&self, request: WalkRequest) -> Result<WalkRequest, StoreError>;
    fn fetch(&self, id: &WalkRequestId) -> Result<Option<WalkRequest>, StoreError>;
    /// Atomically applies `change` if and only if the stored status equals
    /// `change.expected()`; otherwise reports `StatusMismatch` with the status found.
    fn transition(
        &self,
        id: &WalkRequestId,
        change: &StatusChange,
    ) -> Result<WalkRequest, StoreError>;
    /// Ordered by `scheduled_at` ascending, then id.
    fn query(&self, query: &RequestQuery) -> Result<Page<WalkRequest>, StoreError>;
}

/// Persistence of reviews. `insert` is the only authority on review uniqueness.
pub trait ReviewStore: Send + Sync {
    /// Fails with `StoreError::Conflict` when a review for the same walk (or with the same
    /// id) already exists.
    fn insert(&self, review: Review) -> Result<Review, StoreError>;
    fn fetch(&self, id: &ReviewId) -> Result<Option<Review>, StoreError>;
    /// Newest first.
    fn query(&self, filter: &ReviewFilter, page: PageRequest)
        -> Result<Page<Review>, StoreError>;
    fn walker_aggregate(&self, walker_id: &UserId) -> Result<RatingAggregate, StoreError>;
    fn reviewed_walks(&self, owner_id: &UserId) -> Result<HashSet<WalkRequestId>, StoreError>;
}

/// Read-only lookups owned by the profile subsystem.
pub trait Directory: Send + Sync {
    fn user(&self, id: &UserId) -> Result<Option<UserProfile>, StoreError>;
    fn pet(&self, id: &PetId) -> Result<Option<PetProfile>, StoreError>;
}

/// Filter for walk request listings. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub owner_id: Option<UserId>,
    pub walker_id: Option<UserId>,
    pub status: Option<WalkStatus>,
    /// `None` returns every match.
    pub page: Option<PageRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub owner_id: Option<UserId>,
    pub walker_id: Option<UserId>,
}

/// One-based page selection, already normalized by [`PageRequest::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Clamp caller input: pages start at 1, a zero limit falls back to the default and
    /// limits never exceed `max_limit`.
    pub fn normalized(
        page: Option<u32>,
        limit: Option<u32>,
        default_limit: u32,
        max_limit: u32,
    ) -> Self {
        let max_limit = max_limit.max(1);
        let limit = match limit {
            Some(limit) if limit > 0 => limit,
            _ => default_limit.max(1),
        };
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.min(max_limit),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }

    /// Slice an already ordered result set.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect();
        Page { items, total }
    }
}

/// A window of an ordered result set plus the size of the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Pagination metadata returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let limit = u64::from(request.limit.max(1));
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages: total.div_ceil(limit),
        }
    }
}

/// Count, sum and per-rating histogram of one walker's reviews.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RatingAggregate {
    pub count: u64,
    pub sum: u64,
    /// Only ratings that occur are present.
    pub by_rating: BTreeMap<u8, u64>,
}

impl RatingAggregate {
    pub fn record(&mut self, rating: u8) {
        self.count += 1;
        self.sum += u64::from(rating);
        *self.by_rating.entry(rating).or_default() += 1;
    }
}
