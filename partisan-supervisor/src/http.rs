use axum::extract::State;
use axum::routing::get;
use axum::Router;
use health::HealthRegistry;
use common_metrics::setup_metrics_routes;
use sqlx::PgPool;

/// Shared state for the health/metrics surface, grounded on the source's
/// `AppContext` pattern.
#[derive(Clone)]
pub struct AppState {
    pub liveness: HealthRegistry,
    pub pool: PgPool,
}

pub fn router(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(liveness))
        .route("/_readiness", get(readiness))
        .with_state(state);

    setup_metrics_routes(router)
}

async fn index() -> &'static str {
    "partisan-supervisor"
}

async fn liveness(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    state.liveness.get_status()
}

/// Readiness additionally checks that the database pool can round-trip a
/// trivial query, distinguishing "process is up" from "can actually work".
async fn readiness(State(state): State<AppState>) -> axum::http::StatusCode {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => axum::http::StatusCode::OK,
        Err(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
    }
}
