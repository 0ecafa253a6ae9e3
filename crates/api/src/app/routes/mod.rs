use axum::{
    routing::{get, post},
    Router,
};

pub mod reference;
pub mod system;
pub mod wip;

/// Router for all operator-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/wip/:destination", get(wip::fetch).post(wip::write))
        .route("/wip/:destination/reset", post(wip::reset))
        .route("/wip/:destination/confirm-batch", post(wip::confirm_batch))
        .route("/wip/:destination/close", post(wip::close))
        .route(
            "/order-lines/:destination",
            get(reference::order_lines).put(reference::seed_order_lines),
        )
        .route(
            "/historical-allocations/:destination",
            get(reference::historical_allocations),
        )
        .route(
            "/article-lookup/:destination/:code",
            get(reference::lookup_article),
        )
}
