use crate::infra::{build_walk_stack, WalkStack};
use chrono::{Duration, Utc};
use clap::Args;
use mipaseo::config::ServiceConfig;
use mipaseo::error::AppError;
use mipaseo::walks::{
    Actor, NewReview, NewWalkRequest, PetId, PetProfile, Role, UserId, UserProfile, WalkError,
    WalkRequest,
};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Optional historical walks CSV loaded before the scripted booking runs.
    #[arg(long)]
    pub(crate) seed_csv: Option<PathBuf>,
}

const DEMO_OWNER: &str = "demo-owner";
const DEMO_WALKER: &str = "demo-walker";
const DEMO_PET: &str = "demo-pet";

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let stack = build_walk_stack(&ServiceConfig::default());

    println!("Walk booking demo");
    if let Some(path) = args.seed_csv.as_deref() {
        let summary = stack.seed_from(path)?;
        println!(
            "- Seeded {} walks and {} reviews from {}",
            summary.requests,
            summary.reviews,
            path.display()
        );
    }

    if let Err(err) = register_demo_profiles(&stack) {
        println!("  Directory unavailable: {}", err);
        return Ok(());
    }

    let owner = Actor::owner(DEMO_OWNER);
    let walker = Actor::walker(DEMO_WALKER);
    let lifecycle = &stack.api.lifecycle;
    let reviews = &stack.api.reviews;

    let draft = NewWalkRequest {
        walker_id: UserId::new(DEMO_WALKER),
        pet_id: PetId::new(DEMO_PET),
        scheduled_at: Utc::now() + Duration::days(1),
        duration_min: 45,
        notes: Some("Pulls on the leash near cats".to_string()),
    };
    let request = match lifecycle.create(&owner, draft) {
        Ok(request) => request,
        Err(err) => {
            println!("  Request rejected: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Owner {} booked walk {} for {} -> status {}",
        request.owner_id, request.id, request.scheduled_at, request.status
    );

    let accepted = lifecycle.accept(&request.id, &walker, Some("See you at the gate".to_string()));
    if !report_transition(&walker, "accepted", accepted) {
        return Ok(());
    }
    let completed = lifecycle.complete(
        &request.id,
        &walker,
        Some("Two laps, lots of sniffing".to_string()),
    );
    if !report_transition(&walker, "completed", completed) {
        return Ok(());
    }

    let submission = NewReview {
        walk_request_id: request.id.clone(),
        rating: 5,
        comment: Some("Came back tired and happy".to_string()),
    };
    match reviews.create_review(&owner, submission.clone()) {
        Ok(review) => println!(
            "- Owner reviewed walk {} with {} stars ({})",
            review.walk_request_id,
            review.rating.value(),
            review.id
        ),
        Err(err) => {
            println!("  Review rejected: {}", err);
            return Ok(());
        }
    }

    match reviews.create_review(&owner, submission) {
        Err(WalkError::Conflict(reason)) => {
            println!("- Second review for the same walk refused: {}", reason)
        }
        Err(err) => println!("  Second review failed unexpectedly: {}", err),
        Ok(review) => println!("  Second review was accepted as {}", review.id),
    }

    match reviews.walker_stats(&walker.id) {
        Ok(stats) => {
            println!(
                "- Walker {} average {:.1} across {} reviews",
                stats.walker_id, stats.average_rating, stats.total_reviews
            );
            for (rating, count) in &stats.rating_distribution {
                println!("    {} stars: {}", rating, count);
            }
        }
        Err(err) => println!("  Walker stats unavailable: {}", err),
    }

    match reviews.list_pending_reviews(&owner) {
        Ok(pending) if pending.pending_reviews.is_empty() => {
            println!("- Nothing left for {} to review", owner.id)
        }
        Ok(pending) => println!(
            "- {} walks still awaiting a review from {}",
            pending.pending_reviews.len(),
            owner.id
        ),
        Err(err) => println!("  Pending reviews unavailable: {}", err),
    }

    Ok(())
}

fn report_transition(walker: &Actor, label: &str, outcome: Result<WalkRequest, WalkError>) -> bool {
    match outcome {
        Ok(updated) => {
            println!(
                "- Walker {} {} walk {} -> status {}",
                walker.id, label, updated.id, updated.status
            );
            true
        }
        Err(err) => {
            println!("  Transition failed: {}", err);
            false
        }
    }
}

fn register_demo_profiles(stack: &WalkStack) -> Result<(), mipaseo::walks::StoreError> {
    stack.directory.upsert_user(UserProfile {
        id: UserId::new(DEMO_OWNER),
        name: "Carla".to_string(),
        role: Role::Owner,
        active: true,
        avatar_url: None,
    })?;
    stack.directory.upsert_user(UserProfile {
        id: UserId::new(DEMO_WALKER),
        name: "Diego".to_string(),
        role: Role::Walker,
        active: true,
        avatar_url: None,
    })?;
    stack.directory.upsert_pet(PetProfile {
        id: PetId::new(DEMO_PET),
        owner_id: UserId::new(DEMO_OWNER),
        name: "Canela".to_string(),
        breed: Some("Beagle".to_string()),
    })
}
