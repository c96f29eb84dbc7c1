//! Import of historical walks from a CSV export.
//!
//! Rows are validated against the same invariants the live services enforce, then
//! written through the store traits so review uniqueness is still decided by the review
//! store's insert.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::domain::{
    PetId, PetProfile, Rating, Review, ReviewId, Role, UserId, UserProfile, WalkRequest,
    WalkRequestId, WalkStatus,
};
use super::lifecycle::reserve_walk_request_id;
use super::store::{InMemoryDirectory, RequestStore, ReviewStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read walk export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid walk CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    Row { line: usize, reason: String },
    #[error("could not store seeded profile: {0}")]
    Directory(#[source] StoreError),
    #[error("could not store seeded walk {walk_request_id}: {source}")]
    Store {
        walk_request_id: WalkRequestId,
        source: StoreError,
    },
}

/// Everything one export describes, ready to be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedBatch {
    pub requests: Vec<WalkRequest>,
    pub reviews: Vec<Review>,
    users: BTreeMap<UserId, UserProfile>,
    pets: BTreeMap<PetId, PetProfile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub requests: usize,
    pub reviews: usize,
}

impl SeedBatch {
    pub fn users(&self) -> impl Iterator<Item = &UserProfile> {
        self.users.values()
    }

    pub fn pets(&self) -> impl Iterator<Item = &PetProfile> {
        self.pets.values()
    }

    /// Register every owner, walker and pet the export mentions.
    pub fn load_profiles(&self, directory: &InMemoryDirectory) -> Result<(), SeedError> {
        for user in self.users.values() {
            directory
                .upsert_user(user.clone())
                .map_err(SeedError::Directory)?;
        }
        for pet in self.pets.values() {
            directory
                .upsert_pet(pet.clone())
                .map_err(SeedError::Directory)?;
        }
        Ok(())
    }

    /// Insert every request, then every review. Stops at the first store failure.
    pub fn apply<R, V>(&self, requests: &R, reviews: &V) -> Result<SeedSummary, SeedError>
    where
        R: RequestStore + ?Sized,
        V: ReviewStore + ?Sized,
    {
        for request in &self.requests {
            requests
                .insert(request.clone())
                .map_err(|source| SeedError::Store {
                    walk_request_id: request.id.clone(),
                    source,
                })?;
            reserve_walk_request_id(&request.id);
        }
        for review in &self.reviews {
            reviews
                .insert(review.clone())
                .map_err(|source| SeedError::Store {
                    walk_request_id: review.walk_request_id.clone(),
                    source,
                })?;
        }

        let summary = SeedSummary {
            requests: self.requests.len(),
            reviews: self.reviews.len(),
        };
        info!(
            requests = summary.requests,
            reviews = summary.reviews,
            "seeded historical walks"
        );
        Ok(summary)
    }

    /// A profile holds one role, so a user seen as owner and as walker is refused.
    fn remember_user(&mut self, id: &UserId, name: Option<&str>, role: Role) -> Result<(), String> {
        let profile = self.users.entry(id.clone()).or_insert_with(|| UserProfile {
            id: id.clone(),
            name: name.unwrap_or(id.as_str()).to_string(),
            role,
            active: true,
            avatar_url: None,
        });
        if profile.role != role {
            return Err(format!(
                "user {id} appears as {role} but earlier rows list them as {}",
                profile.role
            ));
        }
        Ok(())
    }

    fn remember_pet(&mut self, id: &PetId, owner_id: &UserId, name: Option<&str>) {
        self.pets.entry(id.clone()).or_insert_with(|| PetProfile {
            id: id.clone(),
            owner_id: owner_id.clone(),
            name: name.unwrap_or(id.as_str()).to_string(),
            breed: None,
        });
    }
}

pub struct SeedImporter;

impl SeedImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<SeedBatch, SeedError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<SeedBatch, SeedError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut batch = SeedBatch::default();

        for (index, record) in csv_reader.deserialize::<SeedRow>().enumerate() {
            // Line 1 is the header.
            let line = index + 2;
            let row = record?;
            row.into_batch(line, &mut batch)
                .map_err(|reason| SeedError::Row { line, reason })?;
        }

        Ok(batch)
    }
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    #[serde(rename = "Walk ID", default, deserialize_with = "empty_string_as_none")]
    walk_id: Option<String>,
    #[serde(rename = "Owner ID")]
    owner_id: String,
    #[serde(rename = "Owner Name", default, deserialize_with = "empty_string_as_none")]
    owner_name: Option<String>,
    #[serde(rename = "Walker ID")]
    walker_id: String,
    #[serde(
        rename = "Walker Name",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    walker_name: Option<String>,
    #[serde(rename = "Pet ID")]
    pet_id: String,
    #[serde(rename = "Pet Name", default, deserialize_with = "empty_string_as_none")]
    pet_name: Option<String>,
    #[serde(rename = "Scheduled At")]
    scheduled_at: String,
    #[serde(rename = "Duration Min")]
    duration_min: i64,
    #[serde(rename = "Status")]
    status: String,
    #[serde(
        rename = "Completed At",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    completed_at: Option<String>,
    #[serde(
        rename = "Walker Notes",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    walker_notes: Option<String>,
    #[serde(rename = "Rating", default, deserialize_with = "empty_string_as_none")]
    rating: Option<String>,
    #[serde(rename = "Comment", default, deserialize_with = "empty_string_as_none")]
    comment: Option<String>,
}

impl SeedRow {
    fn into_batch(self, line: usize, batch: &mut SeedBatch) -> Result<(), String> {
        let owner_id = UserId::new(self.owner_id);
        let walker_id = UserId::new(self.walker_id);
        let pet_id = PetId::new(self.pet_id);
        if owner_id == walker_id {
            return Err(format!("owner {owner_id} cannot walk their own pet"));
        }

        let status: WalkStatus = self.status.parse()?;
        let scheduled_at = parse_datetime(&self.scheduled_at)
            .ok_or_else(|| format!("unreadable Scheduled At '{}'", self.scheduled_at))?;
        let duration_min = u32::try_from(self.duration_min)
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| format!("Duration Min must be positive (found {})", self.duration_min))?;

        let completed_at = match self.completed_at.as_deref() {
            Some(raw) => Some(
                parse_datetime(raw).ok_or_else(|| format!("unreadable Completed At '{raw}'"))?,
            ),
            None => None,
        };
        if completed_at.is_some() != (status == WalkStatus::Completed) {
            return Err(format!(
                "Completed At must be set exactly for COMPLETED walks (status {status})"
            ));
        }

        let rating = match self.rating.as_deref() {
            Some(raw) => {
                let value: i64 = raw
                    .parse()
                    .map_err(|_| format!("Rating '{raw}' is not an integer"))?;
                Some(Rating::try_from(value)?)
            }
            None => None,
        };
        if rating.is_some() && status != WalkStatus::Completed {
            return Err(format!("only COMPLETED walks can carry a rating (status {status})"));
        }

        let id = WalkRequestId::new(
            self.walk_id
                .unwrap_or_else(|| format!("seed-walk-{line:04}")),
        );
        let updated_at = completed_at.unwrap_or(scheduled_at);

        batch.remember_user(&owner_id, self.owner_name.as_deref(), Role::Owner)?;
        batch.remember_user(&walker_id, self.walker_name.as_deref(), Role::Walker)?;
        batch.remember_pet(&pet_id, &owner_id, self.pet_name.as_deref());

        if let Some(rating) = rating {
            batch.reviews.push(Review {
                id: ReviewId::new(format!("seed-rev-{id}")),
                walk_request_id: id.clone(),
                owner_id: owner_id.clone(),
                walker_id: walker_id.clone(),
                rating,
                comment: self.comment,
                created_at: updated_at,
            });
        }

        batch.requests.push(WalkRequest {
            id,
            owner_id,
            walker_id,
            pet_id,
            status,
            scheduled_at,
            duration_min,
            notes: None,
            walker_notes: self.walker_notes,
            completed_at,
            created_at: scheduled_at,
            updated_at,
        });

        Ok(())
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
