use metrics_exporter_prometheus::PrometheusHandle;
use mipaseo::cache::QueryCache;
use mipaseo::config::ServiceConfig;
use mipaseo::error::AppError;
use mipaseo::walks::{
    InMemoryDirectory, InMemoryRequestStore, InMemoryReviewStore, LifecycleController,
    ReviewService, SeedImporter, SeedSummary, WalkApiState, WalkPolicy,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type WalkState =
    WalkApiState<InMemoryRequestStore, InMemoryReviewStore, InMemoryDirectory>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stores plus the services and cache built over them. The cache lives exactly as long
/// as the stack that owns it.
pub(crate) struct WalkStack {
    pub(crate) requests: Arc<InMemoryRequestStore>,
    pub(crate) reviews: Arc<InMemoryReviewStore>,
    pub(crate) directory: Arc<InMemoryDirectory>,
    pub(crate) api: WalkState,
}

pub(crate) fn build_walk_stack(config: &ServiceConfig) -> WalkStack {
    let requests = Arc::new(InMemoryRequestStore::new());
    let reviews = Arc::new(InMemoryReviewStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let policy = WalkPolicy::from(config);

    let lifecycle = Arc::new(LifecycleController::new(
        Arc::clone(&requests),
        Arc::clone(&directory),
        policy.clone(),
    ));
    let review_service = Arc::new(ReviewService::new(
        Arc::clone(&requests),
        Arc::clone(&reviews),
        Arc::clone(&directory),
        policy,
    ));

    WalkStack {
        requests,
        reviews,
        directory,
        api: WalkApiState {
            lifecycle,
            reviews: review_service,
            cache: Arc::new(QueryCache::with_capacity(
                config.cache_ttl(),
                config.cache_max_entries,
            )),
        },
    }
}

impl WalkStack {
    /// Load a historical walks export: profiles into the directory, then walks and reviews
    /// through the stores.
    pub(crate) fn seed_from(&self, path: &Path) -> Result<SeedSummary, AppError> {
        let batch = SeedImporter::from_path(path)?;
        batch.load_profiles(&self.directory)?;
        let summary = batch.apply(self.requests.as_ref(), self.reviews.as_ref())?;
        // Anything cached before the import no longer reflects the stores.
        self.api.cache.clear();
        info!(
            path = %path.display(),
            requests = summary.requests,
            reviews = summary.reviews,
            "seed loaded"
        );
        Ok(summary)
    }
}
