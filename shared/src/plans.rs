use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::access::{self, can_access, Access, Action};
use crate::error::{parse_body, ApiError, FieldError};
use crate::store::Store;
use crate::types::{
    Actor, CreatePlanRequest, FitnessPlan, PlanView, Role, Subscription, UpdatePlanRequest,
    UserSummary,
};
use crate::users::{require_registered, user_summaries};

/// Filter for [`list_plans`].
#[derive(Debug, Default, Clone)]
pub struct PlanFilter {
    pub trainer_id: Option<String>,
}

/// Create a new plan owned by the calling trainer
pub async fn create_plan(store: &dyn Store, actor: &Actor, body: &[u8]) -> Result<FitnessPlan, ApiError> {
    can_access(Some(actor), Action::CreatePlan).require()?;
    require_registered(store, actor, Role::Trainer, "Only trainers can create fitness plans").await?;

    let req: CreatePlanRequest = parse_body(body)?;
    let mut errors = Vec::new();

    let title = required_text("title", req.title, &mut errors);
    let description = required_text("description", req.description, &mut errors);
    let price = match req.price {
        Some(raw) => collect(coerce_price(&raw), &mut errors),
        None => {
            errors.push(FieldError::new("price", "is required"));
            None
        }
    };
    let duration = match req.duration {
        Some(raw) => collect(coerce_duration(&raw), &mut errors),
        None => {
            errors.push(FieldError::new("duration", "is required"));
            None
        }
    };

    let (Some(title), Some(description), Some(price), Some(duration)) =
        (title, description, price, duration)
    else {
        return Err(ApiError::invalid_fields(errors));
    };

    let plan = FitnessPlan {
        plan_id: uuid::Uuid::new_v4().to_string(),
        trainer_id: actor.user_id.clone(),
        title,
        description,
        price,
        duration,
        created_at: Utc::now(),
    };

    store.put_plan(&plan).await?;
    tracing::info!("[CREATE] Plan {} by trainer {}", plan.plan_id, plan.trainer_id);
    Ok(plan)
}

/// Get a plan as the caller may see it: full for the owner and active
/// subscribers, a preview for everyone else.
pub async fn get_plan(
    store: &dyn Store,
    actor: Option<&Actor>,
    plan_id: &str,
) -> Result<PlanView, ApiError> {
    let plan = load_plan(store, plan_id).await?;

    let subscription = match actor {
        Some(a) if a.role == Role::User => store.get_subscription(&a.user_id, plan_id).await?,
        _ => None,
    };
    let trainers = user_summaries(store, [plan.trainer_id.clone()]).await?;
    let trainer = trainers.get(&plan.trainer_id).cloned();

    Ok(view_plan(actor, plan, subscription, trainer))
}

/// Apply a partial update. Ownership is checked before the body is even parsed.
pub async fn update_plan(
    store: &dyn Store,
    actor: &Actor,
    plan_id: &str,
    body: &[u8],
) -> Result<FitnessPlan, ApiError> {
    let mut plan = load_plan(store, plan_id).await?;
    can_access(Some(actor), Action::UpdatePlan(&plan)).require()?;

    let req: UpdatePlanRequest = parse_body(body)?;
    let mut errors = Vec::new();

    if let Some(title) = req.title {
        if let Some(title) = required_text("title", Some(title), &mut errors) {
            plan.title = title;
        }
    }
    if let Some(description) = req.description {
        if let Some(description) = required_text("description", Some(description), &mut errors) {
            plan.description = description;
        }
    }
    if let Some(raw) = req.price {
        if let Some(price) = collect(coerce_price(&raw), &mut errors) {
            plan.price = price;
        }
    }
    if let Some(raw) = req.duration {
        if let Some(duration) = collect(coerce_duration(&raw), &mut errors) {
            plan.duration = duration;
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    store.update_plan(&plan).await?;
    tracing::info!("[UPDATE] Plan {}", plan_id);
    Ok(plan)
}

/// Delete a plan and every subscription to it. Returns the number of
/// subscriptions removed.
pub async fn delete_plan(store: &dyn Store, actor: &Actor, plan_id: &str) -> Result<usize, ApiError> {
    let plan = load_plan(store, plan_id).await?;
    can_access(Some(actor), Action::DeletePlan(&plan)).require()?;

    let removed = store.delete_plan(plan_id).await?;
    tracing::info!("[DELETE] Plan {} ({} subscriptions removed)", plan_id, removed);
    Ok(removed)
}

/// List plans newest first, each passed through the view policy for the caller.
pub async fn list_plans(
    store: &dyn Store,
    actor: Option<&Actor>,
    filter: &PlanFilter,
) -> Result<Vec<PlanView>, ApiError> {
    let mut plans = store.list_plans(filter.trainer_id.as_deref()).await?;
    sort_newest_first(&mut plans);

    let mut subscriptions: HashMap<String, Subscription> = HashMap::new();
    if let Some(a) = actor.filter(|a| a.role == Role::User) {
        for sub in store.list_user_subscriptions(&a.user_id).await? {
            subscriptions.insert(sub.plan_id.clone(), sub);
        }
    }
    let trainer_ids: Vec<String> = plans.iter().map(|p| p.trainer_id.clone()).collect();
    let trainers = user_summaries(store, trainer_ids).await?;

    Ok(plans
        .into_iter()
        .map(|plan| {
            let subscription = subscriptions.remove(&plan.plan_id);
            let trainer = trainers.get(&plan.trainer_id).cloned();
            view_plan(actor, plan, subscription, trainer)
        })
        .collect())
}

/// Build the caller's view of a plan, truncating the description unless the
/// policy grants full access.
pub fn view_plan(
    actor: Option<&Actor>,
    mut plan: FitnessPlan,
    subscription: Option<Subscription>,
    trainer: Option<UserSummary>,
) -> PlanView {
    let decision = can_access(actor, Action::ViewPlanFull(&plan, subscription.as_ref()));
    let unlocked = matches!(decision, Access::Granted);
    if !unlocked {
        plan.description = access::preview(&plan.description);
    }
    let subscribed = subscription.as_ref().map_or(false, |s| s.is_active());

    PlanView {
        plan,
        unlocked,
        subscribed,
        subscription,
        trainer,
    }
}

pub async fn load_plan(store: &dyn Store, plan_id: &str) -> Result<FitnessPlan, ApiError> {
    store
        .get_plan(plan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Plan not found".to_string()))
}

pub fn sort_newest_first(plans: &mut [FitnessPlan]) {
    plans.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.plan_id.cmp(&b.plan_id))
    });
}

/// Accepts a JSON number or a numeric string; must be strictly positive.
pub fn coerce_price(raw: &Value) -> Result<Decimal, FieldError> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(FieldError::new("price", "must be a number")),
    };
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| FieldError::new("price", format!("'{}' is not a valid price", text)))?;
    if price <= Decimal::ZERO {
        return Err(FieldError::new("price", "must be greater than zero"));
    }
    Ok(price.normalize())
}

/// Accepts a JSON integer or an integer string (days); must be strictly positive.
pub fn coerce_duration(raw: &Value) -> Result<u32, FieldError> {
    let value = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| FieldError::new("duration", "must be a whole number of days"))?;

    if value <= 0 {
        return Err(FieldError::new("duration", "must be greater than zero"));
    }
    u32::try_from(value).map_err(|_| FieldError::new("duration", "is too large"))
}

fn required_text(field: &str, value: Option<String>, errors: &mut Vec<FieldError>) -> Option<String> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => Some(v),
        None => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}

fn collect<T>(result: Result<T, FieldError>, errors: &mut Vec<FieldError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{SubscriptionStatus, User};
    use serde_json::json;

    fn trainer() -> Actor {
        Actor::new("t1", Role::Trainer)
    }

    async fn with_trainer() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, role) in [("t1", Role::Trainer), ("u1", Role::User)] {
            store
                .put_user(&User {
                    user_id: id.to_string(),
                    name: id.to_string(),
                    email: format!("{}@example.com", id),
                    role,
                    avatar: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store
    }

    async fn seeded_plan(store: &MemoryStore) -> FitnessPlan {
        create_plan(
            store,
            &trainer(),
            br#"{"title":"Hypertrophy","description":"Twelve weeks of volume","price":29.99,"duration":30}"#,
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_coerce_price() {
        assert_eq!(coerce_price(&json!(29.99)).unwrap(), Decimal::new(2999, 2));
        assert_eq!(coerce_price(&json!("19.50")).unwrap(), Decimal::new(195, 1));
        assert_eq!(coerce_price(&json!(10)).unwrap(), Decimal::new(10, 0));
        assert!(coerce_price(&json!(0)).is_err());
        assert!(coerce_price(&json!(-5)).is_err());
        assert!(coerce_price(&json!("free")).is_err());
        assert!(coerce_price(&json!(true)).is_err());
    }

    #[test]
    fn test_coerce_duration() {
        assert_eq!(coerce_duration(&json!(30)).unwrap(), 30);
        assert_eq!(coerce_duration(&json!(" 14 ")).unwrap(), 14);
        assert!(coerce_duration(&json!(0)).is_err());
        assert!(coerce_duration(&json!(2.5)).is_err());
        assert!(coerce_duration(&json!("a month")).is_err());
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_owner() {
        let store = with_trainer().await;
        let plan = seeded_plan(&store).await;
        assert!(!plan.plan_id.is_empty());
        assert_eq!(plan.trainer_id, "t1");
        assert_eq!(plan.price, Decimal::new(2999, 2));
        assert_eq!(plan.duration, 30);
        assert_eq!(store.get_plan(&plan.plan_id).await.unwrap(), Some(plan));
    }

    #[tokio::test]
    async fn test_create_reports_every_bad_field() {
        let store = with_trainer().await;
        let err = create_plan(&store, &trainer(), br#"{"title":"  ","price":-1}"#)
            .await
            .unwrap_err();
        let fields: Vec<_> = err.fields().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "description", "price", "duration"]);
    }

    #[tokio::test]
    async fn test_create_requires_trainer() {
        let store = with_trainer().await;
        let err = create_plan(&store, &Actor::new("u1", Role::User), b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_create_requires_registered_trainer() {
        let store = with_trainer().await;
        let body = br#"{"title":"T","description":"D","price":10,"duration":7}"#;

        let unknown = create_plan(&store, &Actor::new("nobody", Role::Trainer), body)
            .await
            .unwrap_err();
        assert!(matches!(unknown, ApiError::NotFound(_)));

        // Stored as a user, claiming to be a trainer
        let disguised = create_plan(&store, &Actor::new("u1", Role::Trainer), body)
            .await
            .unwrap_err();
        assert!(matches!(disguised, ApiError::Forbidden(_)));

        assert!(store.list_plans(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_owner_update_forbidden_regardless_of_payload() {
        let store = with_trainer().await;
        let plan = seeded_plan(&store).await;

        for actor in [Actor::new("u2", Role::User), Actor::new("t2", Role::Trainer)] {
            let valid = update_plan(&store, &actor, &plan.plan_id, br#"{"title":"Mine now"}"#)
                .await
                .unwrap_err();
            assert!(matches!(valid, ApiError::Forbidden(_)));

            let garbage = update_plan(&store, &actor, &plan.plan_id, b"{{{").await.unwrap_err();
            assert!(matches!(garbage, ApiError::Forbidden(_)));
        }

        let unchanged = store.get_plan(&plan.plan_id).await.unwrap().unwrap();
        assert_eq!(unchanged.title, "Hypertrophy");
    }

    #[tokio::test]
    async fn test_owner_patch_keeps_untouched_fields() {
        let store = with_trainer().await;
        let plan = seeded_plan(&store).await;

        let updated = update_plan(&store, &trainer(), &plan.plan_id, br#"{"price":"39.99"}"#)
            .await
            .unwrap();
        assert_eq!(updated.price, Decimal::new(3999, 2));
        assert_eq!(updated.title, plan.title);
        assert_eq!(updated.trainer_id, plan.trainer_id);

        let err = update_plan(&store, &trainer(), &plan.plan_id, br#"{"duration":0}"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn test_delete_cascades_and_checks_owner() {
        let store = with_trainer().await;
        let plan = seeded_plan(&store).await;
        store
            .put_subscription(&Subscription {
                user_id: "u1".to_string(),
                plan_id: plan.plan_id.clone(),
                status: SubscriptionStatus::Active,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let err = delete_plan(&store, &Actor::new("t2", Role::Trainer), &plan.plan_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        assert_eq!(delete_plan(&store, &trainer(), &plan.plan_id).await.unwrap(), 1);
        assert!(store.get_subscription("u1", &plan.plan_id).await.unwrap().is_none());
        assert!(matches!(
            get_plan(&store, None, &plan.plan_id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_view_truncates_for_non_subscribers() {
        let store = with_trainer().await;
        let long = "x".repeat(250);
        let body = json!({"title":"Long","description":long.clone(),"price":5,"duration":7}).to_string();
        let plan = create_plan(&store, &trainer(), body.as_bytes()).await.unwrap();

        let anonymous = get_plan(&store, None, &plan.plan_id).await.unwrap();
        assert!(!anonymous.unlocked);
        assert_eq!(anonymous.plan.description.len(), 103);

        let owner = get_plan(&store, Some(&trainer()), &plan.plan_id).await.unwrap();
        assert!(owner.unlocked);
        assert_eq!(owner.plan.description, long);

        let member = Actor::new("u1", Role::User);
        store
            .put_subscription(&Subscription {
                user_id: "u1".to_string(),
                plan_id: plan.plan_id.clone(),
                status: SubscriptionStatus::Active,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let subscribed = get_plan(&store, Some(&member), &plan.plan_id).await.unwrap();
        assert!(subscribed.unlocked && subscribed.subscribed);
        assert_eq!(subscribed.plan.description, long);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let store = with_trainer().await;
        let base = Utc::now();
        for (i, trainer_id) in ["t1", "t2", "t1"].iter().enumerate() {
            store
                .put_plan(&FitnessPlan {
                    plan_id: format!("p{}", i),
                    trainer_id: trainer_id.to_string(),
                    title: format!("Plan {}", i),
                    description: "d".to_string(),
                    price: Decimal::ONE,
                    duration: 1,
                    created_at: base + chrono::Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }

        let all = list_plans(&store, None, &PlanFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|v| v.plan.plan_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1", "p0"]);

        let filter = PlanFilter {
            trainer_id: Some("t1".to_string()),
        };
        let mine = list_plans(&store, None, &filter).await.unwrap();
        let ids: Vec<_> = mine.iter().map(|v| v.plan.plan_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p0"]);
    }
}
