use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use crate::error::ApiError;

/// JSON response with the CORS header every route carries.
pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, ApiError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())?)
}

pub fn no_content() -> Result<Response<Body>, ApiError> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)?)
}

pub fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET,POST,PUT,PATCH,DELETE,OPTIONS",
        )
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type,Authorization,X-User-Id,X-User-Role,Stripe-Signature",
        )
        .body(Body::Empty)
        .map_err(Box::new)?)
}

/// Render an error as `{"error": kind, "message": ..}`. Server-side failures are
/// logged with their detail and returned with a generic message.
pub fn error(err: &ApiError) -> Result<Response<Body>, Error> {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!("{}: {}", err.kind(), err);
    } else {
        tracing::info!("Request rejected ({}): {}", err.kind(), err);
    }

    let mut body = serde_json::json!({
        "error": err.kind(),
        "message": err.public_message(),
    });
    if !err.fields().is_empty() {
        body["fields"] = serde_json::to_value(err.fields())?;
    }

    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string().into())
        .map_err(Box::new)?)
}

pub fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "NotFound", "message": "Not found"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "MethodNotAllowed", "message": "Method not allowed"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let resp = error(&ApiError::validation("price", "must be positive")).unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = serde_json::from_slice(&resp.body().to_vec()).unwrap();
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["fields"][0]["field"], "price");
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let resp = error(&ApiError::Internal("table fitplans throttled".into())).unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = serde_json::from_slice(&resp.body().to_vec()).unwrap();
        assert_eq!(body["message"], "Internal server error");
    }
}
