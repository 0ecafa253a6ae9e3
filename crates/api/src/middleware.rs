use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use collo_core::OperatorId;

use crate::app::errors::json_error;
use crate::context::OperatorContext;

pub const OPERATOR_HEADER: &str = "x-operator-id";

pub async fn operator_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let operator_id = extract_operator(req.headers())
        .map_err(|message| json_error(StatusCode::BAD_REQUEST, "invalid_operator", message))?;

    req.extensions_mut().insert(OperatorContext::new(operator_id));
    Ok(next.run(req).await)
}

fn extract_operator(headers: &HeaderMap) -> Result<OperatorId, &'static str> {
    let header = headers
        .get(OPERATOR_HEADER)
        .ok_or("missing x-operator-id header")?;

    let header = header.to_str().map_err(|_| "x-operator-id is not valid text")?;

    header
        .trim()
        .parse::<OperatorId>()
        .map_err(|_| "x-operator-id must be a UUID")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn operator_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert!(extract_operator(&headers).is_err());

        headers.insert(OPERATOR_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(extract_operator(&headers).is_err());

        let operator = OperatorId::new();
        headers.insert(OPERATOR_HEADER, HeaderValue::from_str(&operator.to_string()).unwrap());
        assert_eq!(extract_operator(&headers), Ok(operator));
    }
}
