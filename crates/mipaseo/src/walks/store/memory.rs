//! In-memory stores. Each write holds the table's write lock for the whole
//! check-and-apply, which makes it the single atomic operation the services rely on.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use super::{
    Directory, Page, PageRequest, RatingAggregate, RequestQuery, RequestStore, ReviewFilter,
    ReviewStore, StoreError,
};
use crate::walks::domain::{
    PetId, PetProfile, Review, ReviewId, StatusChange, UserId, UserProfile, WalkRequest,
    WalkRequestId,
};

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    records: RwLock<HashMap<WalkRequestId, WalkRequest>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestStore for InMemoryRequestStore {
    fn insert(&self, request: WalkRequest) -> Result<WalkRequest, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&request.id) {
            return Err(StoreError::Conflict);
        }
        records.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &WalkRequestId) -> Result<Option<WalkRequest>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(id).cloned())
    }

    fn transition(
        &self,
        id: &WalkRequestId,
        change: &StatusChange,
    ) -> Result<WalkRequest, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;
        if record.status != change.expected() {
            return Err(StoreError::StatusMismatch {
                current: record.status,
            });
        }
        change.apply_to(record);
        Ok(record.clone())
    }

    fn query(&self, query: &RequestQuery) -> Result<Page<WalkRequest>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        let mut matches: Vec<WalkRequest> = records
            .values()
            .filter(|request| {
                query
                    .owner_id
                    .as_ref()
                    .map_or(true, |owner| &request.owner_id == owner)
                    && query
                        .walker_id
                        .as_ref()
                        .map_or(true, |walker| &request.walker_id == walker)
                    && query.status.map_or(true, |status| request.status == status)
            })
            .cloned()
            .collect();
        drop(records);

        matches.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(match query.page {
            Some(page) => page.slice(matches),
            None => Page {
                total: matches.len() as u64,
                items: matches,
            },
        })
    }
}

/// Rows in insertion order plus the two unique indexes.
#[derive(Debug, Default)]
struct ReviewTable {
    rows: Vec<Review>,
    by_id: HashMap<ReviewId, usize>,
    by_walk: HashMap<WalkRequestId, usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    table: RwLock<ReviewTable>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().map(|table| table.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReviewStore for InMemoryReviewStore {
    fn insert(&self, review: Review) -> Result<Review, StoreError> {
        let mut table = self.table.write().map_err(poisoned)?;
        if table.by_walk.contains_key(&review.walk_request_id)
            || table.by_id.contains_key(&review.id)
        {
            return Err(StoreError::Conflict);
        }
        let position = table.rows.len();
        table.by_id.insert(review.id.clone(), position);
        table
            .by_walk
            .insert(review.walk_request_id.clone(), position);
        table.rows.push(review.clone());
        Ok(review)
    }

    fn fetch(&self, id: &ReviewId) -> Result<Option<Review>, StoreError> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table
            .by_id
            .get(id)
            .and_then(|position| table.rows.get(*position))
            .cloned())
    }

    fn query(
        &self,
        filter: &ReviewFilter,
        page: PageRequest,
    ) -> Result<Page<Review>, StoreError> {
        let table = self.table.read().map_err(poisoned)?;
        let mut matches: Vec<(usize, &Review)> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, review)| {
                filter
                    .owner_id
                    .as_ref()
                    .map_or(true, |owner| &review.owner_id == owner)
                    && filter
                        .walker_id
                        .as_ref()
                        .map_or(true, |walker| &review.walker_id == walker)
            })
            .collect();

        // Newest first; later inserts win ties on identical timestamps.
        matches.sort_by(|(left_pos, left), (right_pos, right)| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right_pos.cmp(left_pos))
        });

        let ordered = matches
            .into_iter()
            .map(|(_, review)| review.clone())
            .collect();
        Ok(page.slice(ordered))
    }

    fn walker_aggregate(&self, walker_id: &UserId) -> Result<RatingAggregate, StoreError> {
        let table = self.table.read().map_err(poisoned)?;
        let mut aggregate = RatingAggregate::default();
        for review in table.rows.iter().filter(|row| &row.walker_id == walker_id) {
            aggregate.record(review.rating.value());
        }
        Ok(aggregate)
    }

    fn reviewed_walks(&self, owner_id: &UserId) -> Result<HashSet<WalkRequestId>, StoreError> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table
            .rows
            .iter()
            .filter(|review| &review.owner_id == owner_id)
            .map(|review| review.walk_request_id.clone())
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<UserId, UserProfile>>,
    pets: RwLock<HashMap<PetId, PetProfile>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    pub fn upsert_user(&self, profile: UserProfile) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(poisoned)?;
        users.insert(profile.id.clone(), profile);
        Ok(())
    }

    pub fn upsert_pet(&self, profile: PetProfile) -> Result<(), StoreError> {
        let mut pets = self.pets.write().map_err(poisoned)?;
        pets.insert(profile.id.clone(), profile);
        Ok(())
    }
}

impl Directory for InMemoryDirectory {
    fn user(&self, id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(id).cloned())
    }

    fn pet(&self, id: &PetId) -> Result<Option<PetProfile>, StoreError> {
        let pets = self.pets.read().map_err(poisoned)?;
        Ok(pets.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walks::domain::{Rating, WalkStatus, WalkTransition};
    use chrono::{Duration, TimeZone, Utc};

    fn request(id: &str, minutes_from_epoch: i64) -> WalkRequest {
        let at = Utc.timestamp_opt(1_800_000_000, 0).single().expect("valid")
            + Duration::minutes(minutes_from_epoch);
        WalkRequest {
            id: WalkRequestId::new(id),
            owner_id: UserId::new("owner-1"),
            walker_id: UserId::new("walker-1"),
            pet_id: PetId::new("pet-1"),
            status: WalkStatus::Pending,
            scheduled_at: at,
            duration_min: 45,
            notes: None,
            walker_notes: None,
            completed_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn review(id: &str, walk: &str, rating: i64) -> Review {
        Review {
            id: ReviewId::new(id),
            walk_request_id: WalkRequestId::new(walk),
            owner_id: UserId::new("owner-1"),
            walker_id: UserId::new("walker-1"),
            rating: Rating::try_from(rating).expect("valid rating"),
            comment: None,
            created_at: Utc.timestamp_opt(1_800_000_000, 0).single().expect("valid"),
        }
    }

    #[test]
    fn transition_is_conditional_on_expected_status() {
        let store = InMemoryRequestStore::new();
        store.insert(request("walk-1", 0)).expect("insert");
        let now = Utc::now();

        let accepted = store
            .transition(
                &WalkRequestId::new("walk-1"),
                &StatusChange::new(WalkTransition::Accept, Some("see you".to_string()), now),
            )
            .expect("first transition applies");
        assert_eq!(accepted.status, WalkStatus::Accepted);
        assert_eq!(accepted.walker_notes.as_deref(), Some("see you"));

        let second = store.transition(
            &WalkRequestId::new("walk-1"),
            &StatusChange::new(WalkTransition::Reject, None, now),
        );
        assert_eq!(
            second,
            Err(StoreError::StatusMismatch {
                current: WalkStatus::Accepted
            })
        );

        let missing = store.transition(
            &WalkRequestId::new("walk-404"),
            &StatusChange::new(WalkTransition::Accept, None, now),
        );
        assert_eq!(missing, Err(StoreError::NotFound));
    }

    #[test]
    fn request_query_filters_and_orders_by_schedule() {
        let store = InMemoryRequestStore::new();
        store.insert(request("walk-b", 60)).expect("insert");
        store.insert(request("walk-a", 120)).expect("insert");
        let mut other = request("walk-c", 0);
        other.owner_id = UserId::new("owner-2");
        store.insert(other).expect("insert");

        let page = store
            .query(&RequestQuery {
                owner_id: Some(UserId::new("owner-1")),
                ..RequestQuery::default()
            })
            .expect("query");
        let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["walk-b", "walk-a"]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn review_insert_enforces_one_review_per_walk() {
        let store = InMemoryReviewStore::new();
        store.insert(review("rev-1", "walk-1", 5)).expect("first insert");

        assert_eq!(
            store.insert(review("rev-2", "walk-1", 3)),
            Err(StoreError::Conflict)
        );
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.insert(review("rev-1", "walk-2", 3)),
            Err(StoreError::Conflict)
        );
        assert!(store
            .reviewed_walks(&UserId::new("owner-1"))
            .expect("lookup")
            .contains(&WalkRequestId::new("walk-1")));
    }

    #[test]
    fn walker_aggregate_groups_by_rating() {
        let store = InMemoryReviewStore::new();
        for (index, rating) in [5, 5, 4, 3, 2].into_iter().enumerate() {
            store
                .insert(review(
                    &format!("rev-{index}"),
                    &format!("walk-{index}"),
                    rating,
                ))
                .expect("insert");
        }

        let aggregate = store
            .walker_aggregate(&UserId::new("walker-1"))
            .expect("aggregate");
        assert_eq!(aggregate.count, 5);
        assert_eq!(aggregate.sum, 19);
        assert_eq!(aggregate.by_rating.get(&5), Some(&2));
        assert_eq!(aggregate.by_rating.get(&1), None);
    }
}
