//! DynamoDB single-table Store.
//!
//! Key layout:
//!
//! | PK               | SK               | item                         |
//! |------------------|------------------|------------------------------|
//! | `USER#{id}`      | `USER#{id}`      | user                         |
//! | `EMAIL#{email}`  | `EMAIL#{email}`  | email uniqueness guard       |
//! | `PLAN#{id}`      | `PLAN#{id}`      | plan (`entity_type = plan`)  |
//! | `USER#{trainer}` | `PLAN#{id}`      | trainer -> plan link         |
//! | `USER#{user}`    | `FOLLOW#{id}`    | follow edge                  |
//! | `PLAN#{plan}`    | `SUB#{user}`     | subscription                 |
//! | `USER#{user}`    | `SUB#{plan}`     | subscription mirror          |
//!
//! Uniqueness is enforced with `attribute_not_exists(PK)` conditions; items that
//! must exist together are written in one transaction.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::error::BuildError;
use aws_sdk_dynamodb::types::{
    AttributeValue, CancellationReason, ConditionCheck, DeleteRequest, KeysAndAttributes, Put,
    TransactWriteItem, WriteRequest,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use super::{Store, StoreError};
use crate::types::{FitnessPlan, Follow, Role, Subscription, SubscriptionStatus, User};

type Item = HashMap<String, AttributeValue>;

const MAX_BATCH_ATTEMPTS: u32 = 5;

pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", s(pk))
            .key("SK", s(sk))
            .consistent_read(true)
            .send()
            .await
            .map_err(backend)?;
        Ok(result.item().cloned())
    }

    async fn query_prefix(
        &self,
        pk: &str,
        sk_prefix: &str,
        consistent: bool,
    ) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", s(pk))
                .expression_attribute_values(":sk_prefix", s(sk_prefix))
                .consistent_read(consistent)
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(backend)?;

            items.extend(result.items().iter().cloned());

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn transact_put(&self, items: Vec<Item>, conflict: &str) -> Result<(), StoreError> {
        let puts = items
            .into_iter()
            .map(|item| put_new(&self.table_name, item))
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(puts))
            .send()
            .await
            .map_err(|e| transaction_error(e, conflict))?;
        Ok(())
    }

    async fn batch_get_plans(&self, plan_ids: &[String]) -> Result<Vec<FitnessPlan>, StoreError> {
        let mut plans = Vec::new();

        // BatchGetItem takes at most 100 keys per call
        for chunk in plan_ids.chunks(100) {
            let keys: Vec<Item> = chunk
                .iter()
                .map(|id| {
                    let pk = format!("PLAN#{}", id);
                    key(&pk, &pk)
                })
                .collect();

            let mut pending = Some(
                KeysAndAttributes::builder()
                    .set_keys(Some(keys))
                    .consistent_read(true)
                    .build()
                    .map_err(backend)?,
            );
            let mut attempts = 0;

            while let Some(request) = pending.take() {
                attempts += 1;
                if attempts > MAX_BATCH_ATTEMPTS {
                    return Err(StoreError::Backend(
                        "BatchGetItem left unprocessed keys".to_string(),
                    ));
                }

                let result = self
                    .client
                    .batch_get_item()
                    .request_items(&self.table_name, request)
                    .send()
                    .await
                    .map_err(backend)?;

                if let Some(items) = result.responses().and_then(|r| r.get(&self.table_name)) {
                    for item in items {
                        plans.push(plan_from_item(item)?);
                    }
                }

                pending = result
                    .unprocessed_keys()
                    .and_then(|u| u.get(&self.table_name))
                    .filter(|k| !k.keys().is_empty())
                    .cloned();

                if pending.is_some() {
                    tracing::warn!("Retrying unprocessed plan keys (attempt {})", attempts);
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts as u64))
                        .await;
                }
            }
        }

        Ok(plans)
    }

    async fn batch_delete(&self, keys: Vec<Item>) -> Result<(), StoreError> {
        // BatchWriteItem takes at most 25 requests per call
        for chunk in keys.chunks(25) {
            let requests = chunk
                .iter()
                .map(|key| {
                    DeleteRequest::builder()
                        .set_key(Some(key.clone()))
                        .build()
                        .map(|delete| WriteRequest::builder().delete_request(delete).build())
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(backend)?;

            let mut attempts = 0;
            let mut unprocessed = Some(requests);

            while let Some(requests) = unprocessed.take() {
                attempts += 1;
                if attempts > MAX_BATCH_ATTEMPTS {
                    return Err(StoreError::Backend(format!(
                        "{} delete requests left unprocessed",
                        requests.len()
                    )));
                }

                let result = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, requests)
                    .send()
                    .await
                    .map_err(backend)?;

                unprocessed = result
                    .unprocessed_items()
                    .and_then(|items| items.get(&self.table_name))
                    .filter(|items| !items.is_empty())
                    .cloned();

                if let Some(pending) = &unprocessed {
                    tracing::warn!(
                        "Retrying {} unprocessed deletes (attempt {})",
                        pending.len(),
                        attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts as u64))
                        .await;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for DynamoStore {
    async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let email_pk = format!("EMAIL#{}", user.email);
        let mut guard = key(&email_pk, &email_pk);
        guard.insert("user_id".to_string(), s(&user.user_id));
        guard.insert("entity_type".to_string(), s("email"));

        self.transact_put(vec![user_item(user), guard], "User or email already registered")
            .await?;
        tracing::info!("User saved: {} ({})", user.user_id, user.role);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let pk = format!("USER#{}", user_id);
        self.get_item(&pk, &pk)
            .await?
            .map(|item| user_from_item(&item))
            .transpose()
    }

    async fn put_plan(&self, plan: &FitnessPlan) -> Result<(), StoreError> {
        let plan_pk = format!("PLAN#{}", plan.plan_id);
        let mut link = key(&format!("USER#{}", plan.trainer_id), &plan_pk);
        link.insert("created_at".to_string(), s(plan.created_at.to_rfc3339()));

        self.transact_put(vec![plan_item(plan), link], "Plan already exists")
            .await
    }

    async fn update_plan(&self, plan: &FitnessPlan) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(plan_item(plan)))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                PutItemError::ConditionalCheckFailedException(_) => {
                    StoreError::NotFound("Plan not found".to_string())
                }
                other => backend(other),
            })?;
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<FitnessPlan>, StoreError> {
        let pk = format!("PLAN#{}", plan_id);
        self.get_item(&pk, &pk)
            .await?
            .map(|item| plan_from_item(&item))
            .transpose()
    }

    async fn list_plans(&self, trainer_id: Option<&str>) -> Result<Vec<FitnessPlan>, StoreError> {
        if let Some(trainer_id) = trainer_id {
            let links = self
                .query_prefix(&format!("USER#{}", trainer_id), "PLAN#", false)
                .await?;
            let plan_ids: Vec<String> = links
                .iter()
                .filter_map(|item| item.get("SK").and_then(|v| v.as_s().ok()))
                .filter_map(|sk| sk.strip_prefix("PLAN#"))
                .map(|id| id.to_string())
                .collect();

            if plan_ids.is_empty() {
                return Ok(Vec::new());
            }
            return self.batch_get_plans(&plan_ids).await;
        }

        let mut plans = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :type")
                .expression_attribute_values(":type", s("plan"))
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(backend)?;

            for item in result.items() {
                plans.push(plan_from_item(item)?);
            }

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start = Some(key.clone()),
                _ => break,
            }
        }
        Ok(plans)
    }

    async fn delete_plan(&self, plan_id: &str) -> Result<usize, StoreError> {
        let plan = self
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Plan not found".to_string()))?;

        // The plan goes first: once it is gone every put_subscription fails its
        // condition check, so the consistent query below sees the final set.
        let plan_pk = format!("PLAN#{}", plan_id);
        self.batch_delete(vec![
            key(&plan_pk, &plan_pk),
            key(&format!("USER#{}", plan.trainer_id), &plan_pk),
        ])
        .await?;

        let subscriptions: Vec<Subscription> = self
            .query_prefix(&plan_pk, "SUB#", true)
            .await?
            .iter()
            .map(subscription_from_item)
            .collect::<Result<_, _>>()?;

        let keys = subscription_keys(plan_id, &subscriptions);
        tracing::info!(
            "Deleted plan {}, removing {} subscriptions ({} records)",
            plan_id,
            subscriptions.len(),
            keys.len()
        );
        self.batch_delete(keys).await?;
        Ok(subscriptions.len())
    }

    async fn put_follow(&self, follow: &Follow) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(follow_item(follow)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                PutItemError::ConditionalCheckFailedException(_) => {
                    StoreError::Conflict("Already following this trainer".to_string())
                }
                other => backend(other),
            })?;
        Ok(())
    }

    async fn delete_follow(&self, follower_id: &str, trainer_id: &str) -> Result<bool, StoreError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", s(format!("USER#{}", follower_id)))
            .key("SK", s(format!("FOLLOW#{}", trainer_id)))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => match e.into_service_error() {
                DeleteItemError::ConditionalCheckFailedException(_) => Ok(false),
                other => Err(backend(other)),
            },
        }
    }

    async fn list_follows(&self, follower_id: &str) -> Result<Vec<Follow>, StoreError> {
        self.query_prefix(&format!("USER#{}", follower_id), "FOLLOW#", false)
            .await?
            .iter()
            .map(follow_from_item)
            .collect()
    }

    async fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let items = subscription_writes(&self.table_name, subscription).map_err(backend)?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                TransactWriteItemsError::TransactionCanceledException(e) => {
                    match subscription_cancelled(e.cancellation_reasons()) {
                        Some(err) => err,
                        None => backend(e),
                    }
                }
                other => backend(other),
            })?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.get_item(&format!("PLAN#{}", plan_id), &format!("SUB#{}", user_id))
            .await?
            .map(|item| subscription_from_item(&item))
            .transpose()
    }

    async fn list_user_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        self.query_prefix(&format!("USER#{}", user_id), "SUB#", false)
            .await?
            .iter()
            .map(subscription_from_item)
            .collect()
    }

    async fn list_plan_subscriptions(&self, plan_id: &str) -> Result<Vec<Subscription>, StoreError> {
        self.query_prefix(&format!("PLAN#{}", plan_id), "SUB#", false)
            .await?
            .iter()
            .map(subscription_from_item)
            .collect()
    }
}

fn backend<E: std::error::Error>(err: E) -> StoreError {
    StoreError::Backend(DisplayErrorContext(err).to_string())
}

// Only a failed condition means "already there"; other cancellations
// (e.g. TransactionConflict) are retryable backend failures.
fn transaction_error<R>(err: SdkError<TransactWriteItemsError, R>, conflict: &str) -> StoreError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(e) => {
            if e.cancellation_reasons().iter().any(failed_condition) {
                StoreError::Conflict(conflict.to_string())
            } else {
                backend(e)
            }
        }
        other => backend(other),
    }
}

fn failed_condition(reason: &CancellationReason) -> bool {
    reason.code() == Some("ConditionalCheckFailed")
}

/// Reasons come back in the order of `subscription_writes`: the plan check
/// first, then the two ledger rows.
fn subscription_cancelled(reasons: &[CancellationReason]) -> Option<StoreError> {
    match reasons.first() {
        Some(plan) if failed_condition(plan) => {
            Some(StoreError::NotFound("Plan not found".to_string()))
        }
        _ if reasons.iter().any(failed_condition) => Some(StoreError::Conflict(
            "Already subscribed to this plan".to_string(),
        )),
        _ => None,
    }
}

fn put_new(table_name: &str, item: Item) -> Result<TransactWriteItem, BuildError> {
    Put::builder()
        .table_name(table_name)
        .set_item(Some(item))
        .condition_expression("attribute_not_exists(PK)")
        .build()
        .map(|put| TransactWriteItem::builder().put(put).build())
}

/// Plan existence check plus both ledger rows, written as one transaction so a
/// subscription can never outlive a concurrent plan delete.
fn subscription_writes(
    table_name: &str,
    subscription: &Subscription,
) -> Result<Vec<TransactWriteItem>, BuildError> {
    let plan_pk = format!("PLAN#{}", subscription.plan_id);
    let check = ConditionCheck::builder()
        .table_name(table_name)
        .set_key(Some(key(&plan_pk, &plan_pk)))
        .condition_expression("attribute_exists(PK)")
        .build()?;

    let primary = subscription_item(subscription, &plan_pk, &format!("SUB#{}", subscription.user_id));
    let mirror = subscription_item(
        subscription,
        &format!("USER#{}", subscription.user_id),
        &format!("SUB#{}", subscription.plan_id),
    );

    Ok(vec![
        TransactWriteItem::builder().condition_check(check).build(),
        put_new(table_name, primary)?,
        put_new(table_name, mirror)?,
    ])
}

fn subscription_keys(plan_id: &str, subscriptions: &[Subscription]) -> Vec<Item> {
    let plan_pk = format!("PLAN#{}", plan_id);
    subscriptions
        .iter()
        .flat_map(|sub| {
            [
                key(&plan_pk, &format!("SUB#{}", sub.user_id)),
                key(&format!("USER#{}", sub.user_id), &format!("SUB#{}", plan_id)),
            ]
        })
        .collect()
}

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn key(pk: &str, sk: &str) -> Item {
    let mut key = HashMap::new();
    key.insert("PK".to_string(), s(pk));
    key.insert("SK".to_string(), s(sk));
    key
}

fn get_s(item: &Item, name: &str) -> Result<String, StoreError> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| StoreError::Backend(format!("Item is missing attribute {}", name)))
}

fn get_time(item: &Item, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = get_s(item, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("Invalid {} '{}': {}", name, raw, e)))
}

fn user_item(user: &User) -> Item {
    let pk = format!("USER#{}", user.user_id);
    let mut item = key(&pk, &pk);
    item.insert("entity_type".to_string(), s("user"));
    item.insert("user_id".to_string(), s(&user.user_id));
    item.insert("name".to_string(), s(&user.name));
    item.insert("email".to_string(), s(&user.email));
    item.insert("role".to_string(), s(user.role.as_str()));
    item.insert("created_at".to_string(), s(user.created_at.to_rfc3339()));
    if let Some(avatar) = &user.avatar {
        item.insert("avatar".to_string(), s(avatar));
    }
    item
}

fn user_from_item(item: &Item) -> Result<User, StoreError> {
    let role = get_s(item, "role")?;
    Ok(User {
        user_id: get_s(item, "user_id")?,
        name: get_s(item, "name")?,
        email: get_s(item, "email")?,
        role: Role::from_str(&role).map_err(StoreError::Backend)?,
        avatar: item.get("avatar").and_then(|v| v.as_s().ok()).cloned(),
        created_at: get_time(item, "created_at")?,
    })
}

fn plan_item(plan: &FitnessPlan) -> Item {
    let pk = format!("PLAN#{}", plan.plan_id);
    let mut item = key(&pk, &pk);
    item.insert("entity_type".to_string(), s("plan"));
    item.insert("plan_id".to_string(), s(&plan.plan_id));
    item.insert("trainer_id".to_string(), s(&plan.trainer_id));
    item.insert("title".to_string(), s(&plan.title));
    item.insert("description".to_string(), s(&plan.description));
    // Stored as a string so the decimal survives exactly
    item.insert("price".to_string(), s(plan.price.to_string()));
    item.insert("duration".to_string(), AttributeValue::N(plan.duration.to_string()));
    item.insert("created_at".to_string(), s(plan.created_at.to_rfc3339()));
    item
}

fn plan_from_item(item: &Item) -> Result<FitnessPlan, StoreError> {
    let price = get_s(item, "price")?;
    let duration = item
        .get("duration")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| StoreError::Backend("Item is missing attribute duration".to_string()))?;

    Ok(FitnessPlan {
        plan_id: get_s(item, "plan_id")?,
        trainer_id: get_s(item, "trainer_id")?,
        title: get_s(item, "title")?,
        description: get_s(item, "description")?,
        price: Decimal::from_str(&price)
            .map_err(|e| StoreError::Backend(format!("Invalid price '{}': {}", price, e)))?,
        duration,
        created_at: get_time(item, "created_at")?,
    })
}

fn follow_item(follow: &Follow) -> Item {
    let mut item = key(
        &format!("USER#{}", follow.follower_id),
        &format!("FOLLOW#{}", follow.trainer_id),
    );
    item.insert("entity_type".to_string(), s("follow"));
    item.insert("follower_id".to_string(), s(&follow.follower_id));
    item.insert("trainer_id".to_string(), s(&follow.trainer_id));
    item.insert("created_at".to_string(), s(follow.created_at.to_rfc3339()));
    item
}

fn follow_from_item(item: &Item) -> Result<Follow, StoreError> {
    Ok(Follow {
        follower_id: get_s(item, "follower_id")?,
        trainer_id: get_s(item, "trainer_id")?,
        created_at: get_time(item, "created_at")?,
    })
}

fn subscription_item(subscription: &Subscription, pk: &str, sk: &str) -> Item {
    let mut item = key(pk, sk);
    item.insert("entity_type".to_string(), s("subscription"));
    item.insert("user_id".to_string(), s(&subscription.user_id));
    item.insert("plan_id".to_string(), s(&subscription.plan_id));
    item.insert("status".to_string(), s(subscription.status.as_str()));
    item.insert("created_at".to_string(), s(subscription.created_at.to_rfc3339()));
    item
}

fn subscription_from_item(item: &Item) -> Result<Subscription, StoreError> {
    let status = get_s(item, "status")?;
    Ok(Subscription {
        user_id: get_s(item, "user_id")?,
        plan_id: get_s(item, "plan_id")?,
        status: SubscriptionStatus::from_str(&status).map_err(StoreError::Backend)?,
        created_at: get_time(item, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_item_keeps_exact_price() {
        let plan = FitnessPlan {
            plan_id: "p1".to_string(),
            trainer_id: "t1".to_string(),
            title: "Cut".to_string(),
            description: "Twelve weeks".to_string(),
            price: Decimal::from_str("29.99").unwrap(),
            duration: 84,
            created_at: Utc::now(),
        };
        let item = plan_item(&plan);
        assert_eq!(item.get("PK").and_then(|v| v.as_s().ok()).unwrap(), "PLAN#p1");
        assert_eq!(item.get("price").and_then(|v| v.as_s().ok()).unwrap(), "29.99");

        let back = plan_from_item(&item).unwrap();
        assert_eq!(back.price, plan.price);
        assert_eq!(back.duration, 84);
    }

    #[test]
    fn test_subscription_rows_share_attributes() {
        let sub = Subscription {
            user_id: "u1".to_string(),
            plan_id: "p1".to_string(),
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
        };
        let primary = subscription_item(&sub, "PLAN#p1", "SUB#u1");
        let mirror = subscription_item(&sub, "USER#u1", "SUB#p1");
        assert_eq!(subscription_from_item(&primary).unwrap(), subscription_from_item(&mirror).unwrap());
    }

    fn sample_subscription() -> Subscription {
        Subscription {
            user_id: "u1".to_string(),
            plan_id: "p1".to_string(),
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_subscription_write_checks_plan_first() {
        let items = subscription_writes("fitplans", &sample_subscription()).unwrap();
        assert_eq!(items.len(), 3);

        let check = items[0].condition_check().unwrap();
        assert_eq!(check.table_name(), "fitplans");
        assert_eq!(check.condition_expression(), "attribute_exists(PK)");
        assert_eq!(check.key().get("PK").and_then(|v| v.as_s().ok()).unwrap(), "PLAN#p1");
        assert_eq!(check.key().get("SK").and_then(|v| v.as_s().ok()).unwrap(), "PLAN#p1");

        let rows: Vec<_> = items[1..]
            .iter()
            .map(|item| {
                let put = item.put().unwrap();
                let pk = put.item().get("PK").and_then(|v| v.as_s().ok()).unwrap().clone();
                let sk = put.item().get("SK").and_then(|v| v.as_s().ok()).unwrap().clone();
                (pk, sk)
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                ("PLAN#p1".to_string(), "SUB#u1".to_string()),
                ("USER#u1".to_string(), "SUB#p1".to_string()),
            ]
        );
    }

    #[test]
    fn test_subscription_cancellation_reasons() {
        let reason = |code: &str| CancellationReason::builder().code(code).build();

        let plan_gone = [reason("ConditionalCheckFailed"), reason("None"), reason("None")];
        assert!(matches!(subscription_cancelled(&plan_gone), Some(StoreError::NotFound(_))));

        let duplicate = [reason("None"), reason("ConditionalCheckFailed"), reason("None")];
        assert!(matches!(subscription_cancelled(&duplicate), Some(StoreError::Conflict(_))));

        let contention = [reason("None"), reason("TransactionConflict"), reason("None")];
        assert!(subscription_cancelled(&contention).is_none());
    }

    #[test]
    fn test_subscription_keys_cover_both_rows() {
        let keys = subscription_keys("p1", &[sample_subscription()]);
        let pairs: Vec<_> = keys
            .iter()
            .map(|k| (get_s(k, "PK").unwrap(), get_s(k, "SK").unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("PLAN#p1".to_string(), "SUB#u1".to_string()),
                ("USER#u1".to_string(), "SUB#p1".to_string()),
            ]
        );
    }

    #[test]
    fn test_item_missing_attribute_is_backend_error() {
        let mut item = key("USER#u1", "USER#u1");
        item.insert("user_id".to_string(), s("u1"));
        assert!(matches!(user_from_item(&item), Err(StoreError::Backend(_))));
    }
}
