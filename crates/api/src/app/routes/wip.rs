use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    Json,
};

use collo_infra::{WipStore, WipWrite};

use crate::app::{
    errors::{parse_destination, store_error_to_response},
    services::AppServices,
};
use crate::context::OperatorContext;

pub async fn fetch(
    Extension(services): Extension<Arc<AppServices>>,
    Path(destination): Path<String>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.fetch(destination) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn write(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(destination): Path<String>,
    Json(body): Json<WipWrite>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.write(destination, body, operator.operator_id()) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn reset(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(destination): Path<String>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.reset(destination, operator.operator_id()) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn confirm_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(destination): Path<String>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.confirm_batch(destination, operator.operator_id()) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn close(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(destination): Path<String>,
) -> axum::response::Response {
    let destination = match parse_destination(&destination) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store.close(destination, operator.operator_id()) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => store_error_to_response(e),
    }
}
