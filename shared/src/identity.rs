use lambda_http::{Request, RequestExt};
use std::str::FromStr;

use crate::error::ApiError;
use crate::types::{Actor, Role};

const ROLE_CLAIM: &str = "custom:role";

/// Read the caller identity supplied by the identity provider.
///
/// When the request went through the JWT authorizer, only the verified claims
/// `sub` / `custom:role` count. The `X-User-Id` / `X-User-Role` headers are a
/// local development fallback, read only when there is no JWT context.
/// Returns `Ok(None)` for anonymous requests.
pub fn actor_from_request(event: &Request) -> Result<Option<Actor>, ApiError> {
    let jwt = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref());

    let (user_id, role) = match jwt {
        Some(jwt) => {
            let claim = |name: &str| {
                jwt.claims
                    .get(name)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            (claim("sub"), claim(ROLE_CLAIM))
        }
        None => {
            let header = |name: &str| {
                event
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            (header("X-User-Id"), header("X-User-Role"))
        }
    };

    match (user_id, role) {
        (None, None) => Ok(None),
        (Some(user_id), Some(role)) => {
            let role = Role::from_str(&role).map_err(ApiError::Unauthorized)?;
            Ok(Some(Actor::new(user_id, role)))
        }
        _ => Err(ApiError::Unauthorized(
            "Incomplete identity: both user id and role are required".to_string(),
        )),
    }
}

/// Same as [`actor_from_request`] but anonymous callers are rejected.
pub fn require_actor(event: &Request) -> Result<Actor, ApiError> {
    actor_from_request(event)?
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
}
