use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::ApiError;
use crate::plans::{sort_newest_first, view_plan};
use crate::store::Store;
use crate::types::{Actor, FitnessPlan, PlanView, Role, Subscription, SubscriptionRecord, PlanSummary};
use crate::users::user_summaries;

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Feed {
    User {
        followed_plans: Vec<PlanView>,
        subscribed_plans: Vec<PlanView>,
    },
    Trainer {
        my_plans: Vec<TrainerPlan>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TrainerPlan {
    #[serde(flatten)]
    pub plan: FitnessPlan,
    pub subscriber_count: usize,
    pub subscriptions: Vec<SubscriptionRecord>,
}

/// Build the caller's feed. Read only.
pub async fn compose_feed(store: &dyn Store, actor: &Actor) -> Result<Feed, ApiError> {
    match actor.role {
        Role::User => user_feed(store, actor).await,
        Role::Trainer => trainer_feed(store, actor).await,
    }
}

async fn user_feed(store: &dyn Store, actor: &Actor) -> Result<Feed, ApiError> {
    let mut subscriptions = store.list_user_subscriptions(&actor.user_id).await?;
    subscriptions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.plan_id.cmp(&b.plan_id))
    });
    let by_plan: HashMap<String, Subscription> = subscriptions
        .iter()
        .map(|s| (s.plan_id.clone(), s.clone()))
        .collect();

    let mut followed = Vec::new();
    for follow in store.list_follows(&actor.user_id).await? {
        followed.extend(store.list_plans(Some(&follow.trainer_id)).await?);
    }
    sort_newest_first(&mut followed);

    // Most recently subscribed first
    let mut subscribed = Vec::with_capacity(subscriptions.len());
    for subscription in subscriptions {
        if let Some(plan) = store.get_plan(&subscription.plan_id).await? {
            subscribed.push((plan, subscription));
        }
    }

    let trainer_ids: HashSet<String> = followed
        .iter()
        .chain(subscribed.iter().map(|(plan, _)| plan))
        .map(|p| p.trainer_id.clone())
        .collect();
    let trainers = user_summaries(store, trainer_ids).await?;

    let view = |plan: FitnessPlan, subscription: Option<Subscription>| {
        let trainer = trainers.get(&plan.trainer_id).cloned();
        view_plan(Some(actor), plan, subscription, trainer)
    };

    let followed_plans = followed
        .into_iter()
        .map(|plan| {
            let subscription = by_plan.get(&plan.plan_id).cloned();
            view(plan, subscription)
        })
        .collect();
    let subscribed_plans = subscribed
        .into_iter()
        .map(|(plan, subscription)| view(plan, Some(subscription)))
        .collect();

    Ok(Feed::User {
        followed_plans,
        subscribed_plans,
    })
}

async fn trainer_feed(store: &dyn Store, actor: &Actor) -> Result<Feed, ApiError> {
    let mut plans = store.list_plans(Some(&actor.user_id)).await?;
    sort_newest_first(&mut plans);

    let mut my_plans = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut subscriptions = store.list_plan_subscriptions(&plan.plan_id).await?;
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let user_ids: Vec<String> = subscriptions.iter().map(|s| s.user_id.clone()).collect();
        let users = user_summaries(store, user_ids).await?;

        let summary = PlanSummary::from(&plan);
        let subscriptions: Vec<SubscriptionRecord> = subscriptions
            .into_iter()
            .map(|subscription| SubscriptionRecord {
                user: users.get(&subscription.user_id).cloned(),
                plan: summary.clone(),
                subscription,
            })
            .collect();

        my_plans.push(TrainerPlan {
            plan,
            subscriber_count: subscriptions.len(),
            subscriptions,
        });
    }

    Ok(Feed::Trainer { my_plans })
}
