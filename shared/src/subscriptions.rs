use chrono::Utc;

use crate::access::{can_access, Action};
use crate::config::Config;
use crate::error::{parse_body, ApiError};
use crate::plans::load_plan;
use crate::store::Store;
use crate::types::{
    Actor, FitnessPlan, PlanSummary, Role, SubscribeRequest, Subscription, SubscriptionRecord,
    SubscriptionStatus,
};
use crate::users::user_summaries;

const ALREADY_SUBSCRIBED: &str = "Already subscribed to this plan";

/// Checks shared by every path into the ledger: the plan exists, the
/// subscriber is a registered USER, and no subscription exists yet.
pub async fn ensure_subscribable(
    store: &dyn Store,
    user_id: &str,
    plan_id: &str,
) -> Result<FitnessPlan, ApiError> {
    let plan = load_plan(store, plan_id).await?;

    match store.get_user(user_id).await? {
        Some(user) if user.role == Role::User => {}
        Some(_) => return Err(ApiError::Forbidden("Only users can subscribe to plans".to_string())),
        None => return Err(ApiError::NotFound("User not found".to_string())),
    }

    if store.get_subscription(user_id, plan_id).await?.is_some() {
        return Err(ApiError::Conflict(ALREADY_SUBSCRIBED.to_string()));
    }
    Ok(plan)
}

/// Insert a ledger row. The store's uniqueness constraint decides races, so two
/// concurrent calls for the same pair leave exactly one row.
pub async fn create_subscription(
    store: &dyn Store,
    user_id: &str,
    plan_id: &str,
    status: SubscriptionStatus,
) -> Result<Subscription, ApiError> {
    ensure_subscribable(store, user_id, plan_id).await?;

    let subscription = Subscription {
        user_id: user_id.to_string(),
        plan_id: plan_id.to_string(),
        status,
        created_at: Utc::now(),
    };
    store.put_subscription(&subscription).await?;

    tracing::info!(
        "[SUBSCRIBE] {} -> {} ({})",
        user_id,
        plan_id,
        status.as_str()
    );
    Ok(subscription)
}

/// Direct subscribe without payment. Off unless `DIRECT_SUBSCRIBE_ENABLED` is
/// set, so by default the only way into the ledger is a paid checkout.
pub async fn subscribe(
    store: &dyn Store,
    config: &Config,
    actor: &Actor,
    body: &[u8],
) -> Result<Subscription, ApiError> {
    if !config.direct_subscribe_enabled {
        return Err(ApiError::Forbidden(
            "Direct subscriptions are disabled; use checkout".to_string(),
        ));
    }
    can_access(Some(actor), Action::Subscribe).require()?;

    let plan_id = plan_id_from_body(body)?;
    create_subscription(store, &actor.user_id, &plan_id, SubscriptionStatus::Active).await
}

pub fn plan_id_from_body(body: &[u8]) -> Result<String, ApiError> {
    let req: SubscribeRequest = parse_body(body)?;
    req.plan_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("planId", "is required"))
}

/// A user sees their own subscriptions; a trainer sees every subscription to
/// plans they own, with the subscriber attached. Newest first.
pub async fn list_subscriptions(store: &dyn Store, actor: &Actor) -> Result<Vec<SubscriptionRecord>, ApiError> {
    let mut records = match actor.role {
        Role::User => list_for_user(store, &actor.user_id).await?,
        Role::Trainer => list_for_trainer(store, &actor.user_id).await?,
    };
    records.sort_by(|a, b| b.subscription.created_at.cmp(&a.subscription.created_at));
    Ok(records)
}

async fn list_for_user(store: &dyn Store, user_id: &str) -> Result<Vec<SubscriptionRecord>, ApiError> {
    let mut records = Vec::new();
    for subscription in store.list_user_subscriptions(user_id).await? {
        // Skip rows whose plan vanished mid-cascade
        let Some(plan) = store.get_plan(&subscription.plan_id).await? else {
            continue;
        };
        records.push(SubscriptionRecord {
            plan: PlanSummary::from(&plan),
            subscription,
            user: None,
        });
    }
    Ok(records)
}

async fn list_for_trainer(store: &dyn Store, trainer_id: &str) -> Result<Vec<SubscriptionRecord>, ApiError> {
    let mut rows = Vec::new();
    for plan in store.list_plans(Some(trainer_id)).await? {
        let summary = PlanSummary::from(&plan);
        for subscription in store.list_plan_subscriptions(&plan.plan_id).await? {
            rows.push((summary.clone(), subscription));
        }
    }

    let user_ids: Vec<String> = rows.iter().map(|(_, s)| s.user_id.clone()).collect();
    let users = user_summaries(store, user_ids).await?;
    Ok(rows
        .into_iter()
        .map(|(plan, subscription)| SubscriptionRecord {
            user: users.get(&subscription.user_id).cloned(),
            plan,
            subscription,
        })
        .collect())
}
