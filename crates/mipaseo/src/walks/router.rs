use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::domain::{
    Actor, NewReview, NewWalkRequest, ReviewId, Role, UnknownRole, UserId, WalkRequestId,
    WalkStatus,
};
use super::error::WalkError;
use super::lifecycle::LifecycleController;
use super::reviews::ReviewService;
use super::store::{Directory, RequestStore, ReviewStore};
use crate::cache::{cache_key, QueryCache};

/// Header carrying the authenticated user id, set by the upstream authentication layer.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the role the caller acts under.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

const WALKER_STATS: &str = "walker-stats";
const REVIEWS_MINE: &str = "reviews-mine";
const REVIEWS_PENDING: &str = "reviews-pending";

/// Shared state behind the walk and review routes.
pub struct WalkApiState<R, V, D> {
    pub lifecycle: Arc<LifecycleController<R, D>>,
    pub reviews: Arc<ReviewService<R, V, D>>,
    pub cache: Arc<QueryCache>,
}

impl<R, V, D> Clone for WalkApiState<R, V, D> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
            reviews: Arc::clone(&self.reviews),
            cache: Arc::clone(&self.cache),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActorRejection {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("{0} header is not valid text")]
    InvalidHeader(&'static str),
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
}

impl IntoResponse for ActorRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "kind": "unauthenticated",
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

fn header_value<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, ActorRejection> {
    let value = parts
        .headers
        .get(name)
        .ok_or(ActorRejection::MissingHeader(name))?
        .to_str()
        .map_err(|_| ActorRejection::InvalidHeader(name))?
        .trim();
    if value.is_empty() {
        return Err(ActorRejection::MissingHeader(name));
    }
    Ok(value)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ActorRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, ACTOR_ID_HEADER)?;
        let role: Role = header_value(parts, ACTOR_ROLE_HEADER)?.parse()?;
        Ok(Actor::new(id, role))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransitionBody {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Router builder exposing the walk request and review endpoints.
pub fn walk_router<R, V, D>(state: WalkApiState<R, V, D>) -> Router
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    Router::new()
        .route(
            "/api/v1/walk-requests",
            post(create_request_handler::<R, V, D>).get(list_requests_handler::<R, V, D>),
        )
        .route(
            "/api/v1/walk-requests/:request_id",
            get(get_request_handler::<R, V, D>),
        )
        .route(
            "/api/v1/walk-requests/:request_id/accept",
            post(accept_handler::<R, V, D>),
        )
        .route(
            "/api/v1/walk-requests/:request_id/reject",
            post(reject_handler::<R, V, D>),
        )
        .route(
            "/api/v1/walk-requests/:request_id/complete",
            post(complete_handler::<R, V, D>),
        )
        .route(
            "/api/v1/walk-requests/:request_id/cancel",
            post(cancel_handler::<R, V, D>),
        )
        .route("/api/v1/reviews", post(create_review_handler::<R, V, D>))
        .route("/api/v1/reviews/mine", get(my_reviews_handler::<R, V, D>))
        .route(
            "/api/v1/reviews/pending",
            get(pending_reviews_handler::<R, V, D>),
        )
        .route(
            "/api/v1/reviews/walker/:walker_id/stats",
            get(walker_stats_handler::<R, V, D>),
        )
        .route(
            "/api/v1/reviews/:review_id",
            get(get_review_handler::<R, V, D>),
        )
        .with_state(state)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WalkError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Store and service calls are synchronous and may block on locks or I/O, so they run on
/// the blocking pool and the handler future stays cancellable by the request deadline.
async fn run_blocking<T, F>(work: F) -> Result<T, WalkError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WalkError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| WalkError::Store(format!("walk worker failed: {err}")))?
}

fn to_json<T: Serialize>(value: T) -> Result<Value, WalkError> {
    serde_json::to_value(value).map_err(|err| WalkError::Store(err.to_string()))
}

fn body_or_validation<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, WalkError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| WalkError::Validation(rejection.body_text()))
}

fn page_segment(value: Option<u32>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

fn pending_key(owner_id: &UserId) -> String {
    cache_key(&[REVIEWS_PENDING, Role::Owner.label(), owner_id.as_str()])
}

pub(crate) async fn create_request_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    payload: Result<Json<NewWalkRequest>, JsonRejection>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let draft = match body_or_validation(payload) {
        Ok(draft) => draft,
        Err(error) => return error.into_response(),
    };
    let result = run_blocking(move || state.lifecycle.create(&actor, draft)).await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn list_requests_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Query(params): Query<ListParams>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let status = match params.status.as_deref().map(str::parse::<WalkStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(reason)) => return WalkError::Validation(reason).into_response(),
    };
    let result = run_blocking(move || {
        state
            .lifecycle
            .list(&actor, status, params.page, params.limit)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn get_request_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let request_id = WalkRequestId::new(request_id);
    let result = run_blocking(move || state.lifecycle.get(&request_id, &actor)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn accept_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Path(request_id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let notes = body.and_then(|Json(body)| body.notes);
    let request_id = WalkRequestId::new(request_id);
    let result = run_blocking(move || state.lifecycle.accept(&request_id, &actor, notes)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn reject_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Path(request_id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let notes = body.and_then(|Json(body)| body.notes);
    let request_id = WalkRequestId::new(request_id);
    let result = run_blocking(move || state.lifecycle.reject(&request_id, &actor, notes)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn complete_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Path(request_id): Path<String>,
    body: Option<Json<TransitionBody>>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let notes = body.and_then(|Json(body)| body.notes);
    let request_id = WalkRequestId::new(request_id);
    let result = run_blocking(move || {
        let completed = state.lifecycle.complete(&request_id, &actor, notes)?;
        // A completed walk joins the owner's pending-review list.
        state.cache.invalidate(&pending_key(&completed.owner_id));
        Ok(completed)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn cancel_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let request_id = WalkRequestId::new(request_id);
    let result = run_blocking(move || state.lifecycle.cancel(&request_id, &actor)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_review_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    payload: Result<Json<NewReview>, JsonRejection>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let submission = match body_or_validation(payload) {
        Ok(submission) => submission,
        Err(error) => return error.into_response(),
    };
    let result = run_blocking(move || {
        let review = state.reviews.create_review(&actor, submission)?;
        let dropped = state
            .cache
            .invalidate(&cache_key(&[WALKER_STATS, review.walker_id.as_str()]))
            + state.cache.invalidate(REVIEWS_MINE)
            + state.cache.invalidate(&pending_key(&review.owner_id));
        debug!(review_id = %review.id, dropped, "review caches invalidated");
        Ok(review)
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn my_reviews_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Query(params): Query<ListParams>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let key = cache_key(&[
        REVIEWS_MINE,
        actor.role.label(),
        actor.id.as_str(),
        &page_segment(params.page),
        &page_segment(params.limit),
    ]);
    let result = run_blocking(move || {
        state.cache.get_or_try_insert_with(&key, || {
            state
                .reviews
                .list_reviews(&actor, params.page, params.limit)
                .and_then(to_json)
        })
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn pending_reviews_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let key = cache_key(&[REVIEWS_PENDING, actor.role.label(), actor.id.as_str()]);
    let result = run_blocking(move || {
        state.cache.get_or_try_insert_with(&key, || {
            state
                .reviews
                .list_pending_reviews(&actor)
                .and_then(to_json)
        })
    })
    .await;
    respond(StatusCode::OK, result)
}

/// Public: no actor headers required.
pub(crate) async fn walker_stats_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    Path(walker_id): Path<String>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let walker_id = UserId::new(walker_id);
    let key = cache_key(&[WALKER_STATS, walker_id.as_str()]);
    let result = run_blocking(move || {
        state.cache.get_or_try_insert_with(&key, || {
            state.reviews.walker_stats(&walker_id).and_then(to_json)
        })
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn get_review_handler<R, V, D>(
    State(state): State<WalkApiState<R, V, D>>,
    actor: Actor,
    Path(review_id): Path<String>,
) -> Response
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    let review_id = ReviewId::new(review_id);
    let result = run_blocking(move || state.reviews.get_review(&actor, &review_id)).await;
    respond(StatusCode::OK, result)
}
