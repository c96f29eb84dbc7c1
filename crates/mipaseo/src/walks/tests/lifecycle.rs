use super::common::*;
use chrono::Duration;
use std::sync::Arc;

use crate::walks::domain::{Actor, UserId, WalkRequestId, WalkStatus};
use crate::walks::lifecycle::upcoming_walk_request_ids;
use crate::walks::store::RequestStore;
use crate::walks::{AccessDenied, LifecycleController, SeedImporter, WalkError, WalkPolicy};

#[test]
fn create_starts_pending_and_records_the_owner() {
    let harness = build_harness();

    let walk = harness.pending_walk();

    assert_eq!(walk.status, WalkStatus::Pending);
    assert_eq!(walk.owner_id, UserId::new("owner-1"));
    assert_eq!(walk.notes.as_deref(), Some("Leash is by the door"));
    assert_eq!(walk.created_at, base_time());
    assert!(walk.completed_at.is_none());
    assert!(walk.id.as_str().starts_with("walk-"));
    assert_eq!(harness.requests.len(), 1);
}

#[test]
fn create_rejects_invalid_drafts() {
    let harness = build_harness();

    let mut past = draft("walker-1", "pet-1");
    past.scheduled_at = base_time() - Duration::minutes(5);
    let mut zero = draft("walker-1", "pet-1");
    zero.duration_min = 0;
    let mut negative = draft("walker-1", "pet-1");
    negative.duration_min = -30;

    for invalid in [
        past,
        zero,
        negative,
        draft("walker-retired", "pet-1"),
        draft("owner-2", "pet-1"),
        draft("walker-unknown", "pet-1"),
        draft("walker-1", "pet-2"),
        draft("owner-1", "pet-1"),
    ] {
        let result = harness.lifecycle.create(&owner(), invalid);
        assert!(
            matches!(result, Err(WalkError::Validation(_))),
            "unexpected {result:?}"
        );
    }
    assert!(harness.requests.is_empty());
}

#[test]
fn only_owners_create_walk_requests() {
    let harness = build_harness();

    let result = harness.lifecycle.create(&walker(), draft("walker-2", "pet-1"));

    assert!(matches!(
        result,
        Err(WalkError::Forbidden(AccessDenied::RoleNotPermitted { .. }))
    ));
}

#[test]
fn create_accepts_a_walk_scheduled_for_right_now() {
    let harness = build_harness();
    let mut now = draft("walker-1", "pet-1");
    now.scheduled_at = base_time();

    assert!(harness.lifecycle.create(&owner(), now).is_ok());
}

#[test]
fn walker_drives_the_happy_path() {
    let harness = build_harness();
    let walk = harness.pending_walk();
    harness.clock.advance(Duration::hours(2));

    let accepted = harness
        .lifecycle
        .accept(&walk.id, &walker(), Some("See you at 9".to_string()))
        .expect("accept");
    assert_eq!(accepted.status, WalkStatus::Accepted);
    assert_eq!(accepted.walker_notes.as_deref(), Some("See you at 9"));
    assert_eq!(accepted.updated_at, base_time() + Duration::hours(2));
    assert!(accepted.completed_at.is_none());

    harness.clock.advance(Duration::days(1));
    let completed = harness
        .lifecycle
        .complete(&walk.id, &walker(), None)
        .expect("complete");
    assert_eq!(completed.status, WalkStatus::Completed);
    assert_eq!(
        completed.completed_at,
        Some(base_time() + Duration::hours(26))
    );
    assert_eq!(completed.walker_notes.as_deref(), Some("See you at 9"));
    assert!(completed.completion_consistent());
}

#[test]
fn walker_can_reject_a_pending_request() {
    let harness = build_harness();
    let walk = harness.pending_walk();

    let rejected = harness
        .lifecycle
        .reject(&walk.id, &walker(), Some("Out of town".to_string()))
        .expect("reject");

    assert_eq!(rejected.status, WalkStatus::Rejected);
    assert!(rejected.completed_at.is_none());
}

#[test]
fn accepting_as_anyone_but_the_assigned_walker_is_forbidden_regardless_of_status() {
    let harness = build_harness();
    let pending = harness.pending_walk();
    let completed = harness.completed_walk();

    for walk in [&pending, &completed] {
        for actor in [
            Actor::walker("walker-2"),
            owner(),
            admin(),
            Actor::owner("walker-1"),
        ] {
            let result = harness.lifecycle.accept(&walk.id, &actor, None);
            assert!(
                matches!(result, Err(WalkError::Forbidden(_))),
                "{} accepting a {} walk: {result:?}",
                actor.id,
                walk.status
            );
        }
    }

    assert_eq!(harness.stored(&pending.id).status, WalkStatus::Pending);
}

#[test]
fn accepting_an_accepted_request_is_an_invalid_state() {
    let harness = build_harness();
    let walk = harness.accepted_walk();

    let result = harness.lifecycle.accept(&walk.id, &walker(), None);

    match result {
        Err(WalkError::InvalidState(message)) => {
            assert!(message.contains("ACCEPTED"), "{message}");
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn terminal_statuses_admit_no_transition() {
    let harness = build_harness();
    let rejected = harness.pending_walk();
    harness
        .lifecycle
        .reject(&rejected.id, &walker(), None)
        .expect("reject");
    let completed = harness.completed_walk();
    let cancelled = harness.accepted_walk();
    harness
        .lifecycle
        .cancel(&cancelled.id, &owner())
        .expect("cancel");

    for walk in [&rejected, &completed, &cancelled] {
        for result in [
            harness.lifecycle.accept(&walk.id, &walker(), None),
            harness.lifecycle.reject(&walk.id, &walker(), None),
            harness.lifecycle.complete(&walk.id, &walker(), None),
            harness.lifecycle.cancel(&walk.id, &walker()),
        ] {
            assert!(matches!(result, Err(WalkError::InvalidState(_))));
        }
    }
}

#[test]
fn completing_a_pending_request_is_an_invalid_state() {
    let harness = build_harness();
    let walk = harness.pending_walk();

    let result = harness.lifecycle.complete(&walk.id, &walker(), None);

    assert!(matches!(result, Err(WalkError::InvalidState(_))));
}

#[test]
fn either_party_cancels_an_accepted_walk_under_their_own_role() {
    let harness = build_harness();
    let by_owner = harness.accepted_walk();
    let by_walker = harness.accepted_walk();

    assert_eq!(
        harness
            .lifecycle
            .cancel(&by_owner.id, &owner())
            .expect("owner cancels")
            .status,
        WalkStatus::Cancelled
    );
    assert_eq!(
        harness
            .lifecycle
            .cancel(&by_walker.id, &walker())
            .expect("walker cancels")
            .status,
        WalkStatus::Cancelled
    );

    let other = harness.accepted_walk();
    assert!(matches!(
        harness.lifecycle.cancel(&other.id, &Actor::owner("owner-2")),
        Err(WalkError::Forbidden(_))
    ));
    assert!(matches!(
        harness.lifecycle.cancel(&other.id, &admin()),
        Err(WalkError::Forbidden(_))
    ));
}

#[test]
fn pending_requests_cannot_be_cancelled() {
    let harness = build_harness();
    let walk = harness.pending_walk();

    assert!(matches!(
        harness.lifecycle.cancel(&walk.id, &owner()),
        Err(WalkError::InvalidState(_))
    ));
}

#[test]
fn unknown_requests_are_not_found() {
    let harness = build_harness();
    let missing = WalkRequestId::new("walk-missing");

    assert_eq!(
        harness.lifecycle.accept(&missing, &walker(), None),
        Err(WalkError::NotFound("walk request"))
    );
    assert_eq!(
        harness.lifecycle.get(&missing, &owner()).map(|_| ()),
        Err(WalkError::NotFound("walk request"))
    );
}

#[test]
fn overlong_walker_notes_are_rejected_before_any_write() {
    let harness = build_harness();
    let walk = harness.pending_walk();

    let result = harness
        .lifecycle
        .accept(&walk.id, &walker(), Some("x".repeat(501)));

    assert!(matches!(result, Err(WalkError::Validation(_))));
    assert_eq!(
        harness.stored(&walk.id).status,
        WalkStatus::Pending
    );
}

#[test]
fn get_projects_parties_and_pet_for_participants_only() {
    let harness = build_harness();
    let walk = harness.pending_walk();

    let view = harness.lifecycle.get(&walk.id, &walker()).expect("walker view");
    assert_eq!(view.request.id, walk.id);
    assert_eq!(view.owner.map(|owner| owner.name), Some("Ana".to_string()));
    assert_eq!(view.pet.map(|pet| pet.name), Some("Toby".to_string()));

    assert!(matches!(
        harness.lifecycle.get(&walk.id, &Actor::walker("walker-2")),
        Err(WalkError::Forbidden(_))
    ));
}

#[test]
fn list_is_scoped_by_role_and_filtered_by_status() {
    let harness = build_harness();
    let first = harness.pending_walk();
    harness.accepted_walk();
    harness
        .lifecycle
        .create(&Actor::owner("owner-2"), draft("walker-2", "pet-2"))
        .expect("second owner books");

    let mine = harness
        .lifecycle
        .list(&owner(), None, None, None)
        .expect("owner list");
    assert_eq!(mine.pagination.total, 2);

    let pending = harness
        .lifecycle
        .list(&walker(), Some(WalkStatus::Pending), None, None)
        .expect("walker list");
    assert_eq!(pending.walk_requests.len(), 1);
    assert_eq!(pending.walk_requests[0].request.id, first.id);

    let everything = harness
        .lifecycle
        .list(&admin(), None, Some(1), Some(2))
        .expect("admin list");
    assert_eq!(everything.pagination.total, 3);
    assert_eq!(everything.pagination.pages, 2);
    assert_eq!(everything.walk_requests.len(), 2);
}

#[test]
fn storage_failures_surface_as_retryable_errors() {
    let harness = build_harness();
    let lifecycle = LifecycleController::new(
        Arc::new(UnavailableRequestStore),
        Arc::clone(&harness.directory),
        WalkPolicy::default(),
    );
    let mut future = draft("walker-1", "pet-1");
    future.scheduled_at = chrono::Utc::now() + Duration::days(1);

    let result = lifecycle.create(&owner(), future);

    assert!(matches!(result, Err(WalkError::Store(_))));
    assert_eq!(
        result.map(|_| ()).unwrap_err().status_code(),
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    );
}

#[test]
fn create_draws_a_fresh_id_when_the_next_one_is_taken() {
    let harness = build_harness();
    let template = harness.pending_walk();
    let taken = upcoming_walk_request_ids(4);
    for id in &taken {
        let mut occupant = template.clone();
        occupant.id = id.clone();
        harness.requests.insert(occupant).expect("occupy id");
    }

    let walk = harness
        .lifecycle
        .create(&owner(), draft("walker-1", "pet-1"))
        .expect("create despite taken ids");

    assert_eq!(walk.status, WalkStatus::Pending);
    assert!(!taken.contains(&walk.id));
    assert_eq!(harness.stored(&walk.id).owner_id, UserId::new("owner-1"));
}

#[test]
fn create_after_importing_generated_looking_ids_succeeds() {
    let harness = build_harness();
    let upcoming = upcoming_walk_request_ids(2);
    let history = format!(
        "Walk ID,Owner ID,Owner Name,Walker ID,Walker Name,Pet ID,Pet Name,Scheduled At,Duration Min,Status,Completed At,Walker Notes,Rating,Comment
walk-000001,owner-1,Ana,walker-1,Luis,pet-1,Toby,2024-05-01T09:00:00Z,30,COMPLETED,2024-05-01T09:35:00Z,,5,
{},owner-1,Ana,walker-1,Luis,pet-1,Toby,2024-05-02T09:00:00Z,30,REJECTED,,,,
{},owner-1,Ana,walker-1,Luis,pet-1,Toby,2024-05-03T09:00:00Z,30,REJECTED,,,,
",
        upcoming[0], upcoming[1]
    );
    let batch = SeedImporter::from_reader(std::io::Cursor::new(history)).expect("history parses");
    batch
        .apply(harness.requests.as_ref(), harness.reviews.as_ref())
        .expect("history applied");

    let walk = harness
        .lifecycle
        .create(&owner(), draft("walker-1", "pet-1"))
        .expect("create after import");

    assert_eq!(walk.status, WalkStatus::Pending);
    assert!(walk.id != WalkRequestId::new("walk-000001"));
    assert!(!upcoming.contains(&walk.id));
    assert_eq!(harness.requests.len(), 4);
}
