use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::authorization::{AuthorizationGate, Operation, Target};
use super::domain::{
    Actor, Clock, NewWalkRequest, Role, StatusChange, SystemClock, WalkRequest, WalkRequestId,
    WalkStatus, WalkTransition,
};
use super::error::WalkError;
use super::policy::WalkPolicy;
use super::store::projection::{Projector, WalkRequestView};
use super::store::{Directory, Pagination, RequestQuery, RequestStore, StoreError};

static WALK_REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
const WALK_ID_PREFIX: &str = "walk-";
/// Fresh ids drawn before an insert that keeps colliding is reported as unavailable.
const WALK_ID_ATTEMPTS: usize = 32;

fn walk_request_id(sequence: u64) -> WalkRequestId {
    WalkRequestId(format!("{WALK_ID_PREFIX}{sequence:06}"))
}

fn next_walk_request_id() -> WalkRequestId {
    walk_request_id(WALK_REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Move the generator past an id that was allocated elsewhere, such as an imported walk.
pub(crate) fn reserve_walk_request_id(id: &WalkRequestId) {
    let sequence = id
        .as_str()
        .strip_prefix(WALK_ID_PREFIX)
        .and_then(|digits| digits.parse::<u64>().ok());
    if let Some(sequence) = sequence {
        WALK_REQUEST_SEQUENCE.fetch_max(sequence.saturating_add(1), Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(super) fn upcoming_walk_request_ids(count: u64) -> Vec<WalkRequestId> {
    let next = WALK_REQUEST_SEQUENCE.load(Ordering::Relaxed);
    (next..next + count).map(walk_request_id).collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkRequestPage {
    pub walk_requests: Vec<WalkRequestView>,
    pub pagination: Pagination,
}

/// Owns the walk request state machine. Holds no per-request state; every status change
/// is delegated to the store as one conditional write.
pub struct LifecycleController<R, D> {
    requests: Arc<R>,
    directory: Arc<D>,
    gate: AuthorizationGate,
    clock: Arc<dyn Clock>,
    policy: WalkPolicy,
}

impl<R, D> LifecycleController<R, D>
where
    R: RequestStore + 'static,
    D: Directory + 'static,
{
    pub fn new(requests: Arc<R>, directory: Arc<D>, policy: WalkPolicy) -> Self {
        Self::with_clock(requests, directory, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        requests: Arc<R>,
        directory: Arc<D>,
        policy: WalkPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            directory,
            gate: AuthorizationGate::new(),
            clock,
            policy,
        }
    }

    /// Create a PENDING request on behalf of the owner.
    pub fn create(&self, actor: &Actor, draft: NewWalkRequest) -> Result<WalkRequest, WalkError> {
        let now = self.clock.now();
        if draft.duration_min <= 0 {
            return Err(WalkError::Validation(format!(
                "durationMin must be a positive number of minutes (found {})",
                draft.duration_min
            )));
        }
        let duration_min = u32::try_from(draft.duration_min).map_err(|_| {
            WalkError::Validation(format!("durationMin {} is too large", draft.duration_min))
        })?;
        if draft.scheduled_at < now {
            return Err(WalkError::Validation(
                "scheduledAt must not be in the past".to_string(),
            ));
        }
        let notes = self.policy.notes(draft.notes)?;

        self.gate
            .check(actor, Operation::CreateRequest, Target::None)?;

        if draft.walker_id == actor.id {
            return Err(WalkError::Validation(
                "owners cannot book walks with themselves".to_string(),
            ));
        }
        match self.directory.user(&draft.walker_id)? {
            Some(walker) if walker.is_active_walker() => {}
            _ => {
                return Err(WalkError::Validation(format!(
                    "walker {} is not available",
                    draft.walker_id
                )))
            }
        }
        match self.directory.pet(&draft.pet_id)? {
            Some(pet) if pet.owner_id == actor.id => {}
            _ => {
                return Err(WalkError::Validation(format!(
                    "pet {} does not belong to the requesting owner",
                    draft.pet_id
                )))
            }
        }

        let mut request = WalkRequest {
            id: next_walk_request_id(),
            owner_id: actor.id.clone(),
            walker_id: draft.walker_id,
            pet_id: draft.pet_id,
            status: WalkStatus::Pending,
            scheduled_at: draft.scheduled_at,
            duration_min,
            notes,
            walker_notes: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.insert_with_fresh_id(&mut request)?;
        info!(
            walk_request_id = %stored.id,
            owner_id = %stored.owner_id,
            walker_id = %stored.walker_id,
            "walk request created"
        );
        Ok(stored)
    }

    /// An id taken by a record created elsewhere is never the owner's fault: draw another.
    fn insert_with_fresh_id(&self, request: &mut WalkRequest) -> Result<WalkRequest, WalkError> {
        for _ in 0..WALK_ID_ATTEMPTS {
            match self.requests.insert(request.clone()) {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Conflict) => {
                    debug!(walk_request_id = %request.id, "walk request id taken, drawing another");
                    request.id = next_walk_request_id();
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(WalkError::Store(format!(
            "no free walk request id after {WALK_ID_ATTEMPTS} attempts"
        )))
    }

    pub fn accept(
        &self,
        request_id: &WalkRequestId,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<WalkRequest, WalkError> {
        let notes = self.policy.notes(notes)?;
        self.apply(request_id, actor, WalkTransition::Accept, notes)
    }

    pub fn reject(
        &self,
        request_id: &WalkRequestId,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<WalkRequest, WalkError> {
        let notes = self.policy.notes(notes)?;
        self.apply(request_id, actor, WalkTransition::Reject, notes)
    }

    /// Sets `completedAt`; supplied notes replace the walker's earlier notes.
    pub fn complete(
        &self,
        request_id: &WalkRequestId,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<WalkRequest, WalkError> {
        let notes = self.policy.notes(notes)?;
        self.apply(request_id, actor, WalkTransition::Complete, notes)
    }

    /// Either party may cancel an accepted walk.
    pub fn cancel(
        &self,
        request_id: &WalkRequestId,
        actor: &Actor,
    ) -> Result<WalkRequest, WalkError> {
        self.apply(request_id, actor, WalkTransition::Cancel, None)
    }

    pub fn get(
        &self,
        request_id: &WalkRequestId,
        actor: &Actor,
    ) -> Result<WalkRequestView, WalkError> {
        let request = self.load(request_id)?;
        self.gate
            .check(actor, Operation::ViewRequest, Target::Request(&request))?;
        Ok(self.projector().request(request)?)
    }

    /// Requests the actor takes part in: owned ones for owners, addressed ones for walkers,
    /// everything for admins.
    pub fn list(
        &self,
        actor: &Actor,
        status: Option<WalkStatus>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<WalkRequestPage, WalkError> {
        self.gate
            .check(actor, Operation::ListRequests, Target::None)?;
        let page = self.policy.page(page, limit);
        let mut query = RequestQuery {
            status,
            page: Some(page),
            ..RequestQuery::default()
        };
        match actor.role {
            Role::Owner => query.owner_id = Some(actor.id.clone()),
            Role::Walker => query.walker_id = Some(actor.id.clone()),
            Role::Admin => {}
        }

        let found = self.requests.query(&query)?;
        let projector = self.projector();
        let walk_requests = found
            .items
            .into_iter()
            .map(|request| projector.request(request))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WalkRequestPage {
            walk_requests,
            pagination: Pagination::new(page, found.total),
        })
    }

    fn projector(&self) -> Projector<'_, R, D> {
        Projector::new(self.requests.as_ref(), self.directory.as_ref())
    }

    fn load(&self, request_id: &WalkRequestId) -> Result<WalkRequest, WalkError> {
        self.requests
            .fetch(request_id)?
            .ok_or(WalkError::NotFound("walk request"))
    }

    /// Existence, then authorization, then the conditional write. The status check lives
    /// only in the store's precondition so concurrent callers cannot both win.
    fn apply(
        &self,
        request_id: &WalkRequestId,
        actor: &Actor,
        transition: WalkTransition,
        walker_notes: Option<String>,
    ) -> Result<WalkRequest, WalkError> {
        let request = self.load(request_id)?;
        let operation = Operation::from(transition);
        if let Err(denied) = self
            .gate
            .check(actor, operation, Target::Request(&request))
        {
            warn!(walk_request_id = %request_id, actor_id = %actor.id, %denied, "transition denied");
            return Err(denied.into());
        }

        let change = StatusChange::new(transition, walker_notes, self.clock.now());
        match self.requests.transition(request_id, &change) {
            Ok(updated) => {
                info!(
                    walk_request_id = %updated.id,
                    actor_id = %actor.id,
                    from = %transition.from_status(),
                    to = %updated.status,
                    "walk request transitioned"
                );
                Ok(updated)
            }
            Err(StoreError::StatusMismatch { current }) => {
                warn!(
                    walk_request_id = %request_id,
                    %current,
                    attempted = transition.verb(),
                    "transition precondition failed"
                );
                Err(WalkError::InvalidState(format!(
                    "cannot {} a walk request that is {current}; it must be {}",
                    transition.verb(),
                    transition.from_status()
                )))
            }
            Err(StoreError::NotFound) => Err(WalkError::NotFound("walk request")),
            Err(other) => Err(other.into()),
        }
    }
}
