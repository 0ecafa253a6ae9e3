use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use collo_allocation::OrderLine;
use collo_infra::ReferenceData;

use crate::app::{
    errors::{json_error, parse_destination, store_error_to_response},
    services::AppServices,
};

pub async fn order_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Path(destination): Path<String>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.order_lines(destination) {
        Ok(lines) => Json(lines).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

/// Replace the order lines of a destination (dev/demo seeding).
pub async fn seed_order_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Path(destination): Path<String>,
    Json(lines): Json<Vec<OrderLine>>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    if let Err(e) = services.store.seed_order_lines(destination, lines) {
        return store_error_to_response(e);
    }
    match services.store.order_lines(destination) {
        Ok(lines) => Json(lines).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn historical_allocations(
    Extension(services): Extension<Arc<AppServices>>,
    Path(destination): Path<String>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.historical_allocations(destination) {
        Ok(history) => Json(history).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn lookup_article(
    Extension(services): Extension<Arc<AppServices>>,
    Path((destination, code)): Path<(String, String)>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.lookup_article(destination, &code) {
        Ok(Some(line)) => Json(line).into_response(),
        Ok(None) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no order line matches '{code}'"),
        ),
        Err(e) => store_error_to_response(e),
    }
}
