use fitplans_shared::{
    checkout, feed, follows, identity, plans, response, subscriptions, users, AppState,
};
use fitplans_shared::error::ApiError;
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;

const SIGNATURE_HEADER: &str = "Stripe-Signature";
const ROUTE_ROOTS: &[&str] = &[
    "users",
    "plans",
    "follows",
    "subscriptions",
    "checkout",
    "webhooks",
    "feed",
];

/// Main Lambda handler - routes requests to the marketplace services
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return response::preflight();
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match dispatch(&event, &state, &parts).await {
        Ok(Some(resp)) => Ok(resp),
        Ok(None) => match parts.first() {
            Some(root) if ROUTE_ROOTS.contains(root) => response::method_not_allowed(),
            _ => response::not_found(),
        },
        Err(err) => response::error(&err),
    }
}

async fn dispatch(
    event: &Request,
    state: &AppState,
    parts: &[&str],
) -> Result<Option<Response<Body>>, ApiError> {
    let store = state.store.as_ref();
    let method = event.method();
    let body: &[u8] = event.body();

    let resp = match (method, parts) {
        // --- USERS ---
        (&Method::POST, ["users"]) => {
            let actor = identity::require_actor(event)?;
            let user = users::register_user(store, &actor, body).await?;
            response::json(StatusCode::CREATED, &user)?
        }
        (&Method::GET, ["users", "me"]) => {
            let actor = identity::require_actor(event)?;
            response::json(StatusCode::OK, &users::get_user(store, &actor).await?)?
        }

        // --- PLANS ---
        (&Method::GET, ["plans"]) => {
            let actor = identity::actor_from_request(event)?;
            let filter = plans::PlanFilter {
                trainer_id: query_param(event, "trainerId"),
            };
            let views = plans::list_plans(store, actor.as_ref(), &filter).await?;
            response::json(StatusCode::OK, &views)?
        }
        (&Method::POST, ["plans"]) => {
            let actor = identity::require_actor(event)?;
            let plan = plans::create_plan(store, &actor, body).await?;
            response::json(StatusCode::CREATED, &plan)?
        }
        (&Method::GET, ["plans", plan_id]) => {
            let actor = identity::actor_from_request(event)?;
            let view = plans::get_plan(store, actor.as_ref(), plan_id).await?;
            response::json(StatusCode::OK, &view)?
        }
        (&Method::PUT | &Method::PATCH, ["plans", plan_id]) => {
            let actor = identity::require_actor(event)?;
            let plan = plans::update_plan(store, &actor, plan_id, body).await?;
            response::json(StatusCode::OK, &plan)?
        }
        (&Method::DELETE, ["plans", plan_id]) => {
            let actor = identity::require_actor(event)?;
            let removed = plans::delete_plan(store, &actor, plan_id).await?;
            response::json(
                StatusCode::OK,
                &serde_json::json!({
                    "deleted": true,
                    "planId": plan_id,
                    "subscriptionsRemoved": removed,
                }),
            )?
        }

        // --- FOLLOWS ---
        (&Method::GET, ["follows"]) => {
            let actor = identity::require_actor(event)?;
            response::json(StatusCode::OK, &follows::list_follows(store, &actor).await?)?
        }
        (&Method::POST, ["follows"]) => {
            let actor = identity::require_actor(event)?;
            let trainer_id = follows::trainer_id_from_body(body)?;
            let follow = follows::follow_trainer(store, &actor, &trainer_id).await?;
            response::json(StatusCode::CREATED, &follow)?
        }
        (&Method::DELETE, ["follows"]) => {
            let actor = identity::require_actor(event)?;
            let trainer_id = query_param(event, "trainerId")
                .ok_or_else(|| ApiError::validation("trainerId", "is required"))?;
            follows::unfollow_trainer(store, &actor, &trainer_id).await?;
            response::no_content()?
        }
        (&Method::DELETE, ["follows", trainer_id]) => {
            let actor = identity::require_actor(event)?;
            follows::unfollow_trainer(store, &actor, trainer_id).await?;
            response::no_content()?
        }

        // --- SUBSCRIPTIONS ---
        (&Method::GET, ["subscriptions"]) => {
            let actor = identity::require_actor(event)?;
            let records = subscriptions::list_subscriptions(store, &actor).await?;
            response::json(StatusCode::OK, &records)?
        }
        // Forbidden unless DIRECT_SUBSCRIBE_ENABLED; checkout is the default path
        (&Method::POST, ["subscriptions"]) => {
            let actor = identity::require_actor(event)?;
            let subscription = subscriptions::subscribe(store, &state.config, &actor, body).await?;
            response::json(StatusCode::CREATED, &subscription)?
        }

        // --- CHECKOUT ---
        (&Method::POST, ["checkout"]) => {
            let actor = identity::require_actor(event)?;
            let plan_id = subscriptions::plan_id_from_body(body)?;
            let redirect = checkout::initiate(
                store,
                state.processor.as_ref(),
                &state.config,
                &actor,
                &plan_id,
            )
            .await?;
            response::json(StatusCode::OK, &redirect)?
        }
        (&Method::POST, ["webhooks", "checkout"]) => {
            let signature = event
                .headers()
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok());
            let now = chrono::Utc::now().timestamp();
            let outcome = checkout::reconcile(store, &state.config, body, signature, now).await?;
            response::json(
                StatusCode::OK,
                &serde_json::json!({"received": true, "outcome": outcome.as_str()}),
            )?
        }

        // --- FEED ---
        (&Method::GET, ["feed"]) => {
            let actor = identity::require_actor(event)?;
            response::json(StatusCode::OK, &feed::compose_feed(store, &actor).await?)?
        }

        _ => return Ok(None),
    };

    Ok(Some(resp))
}

fn query_param(event: &Request, name: &str) -> Option<String> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
