use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Store, StoreError};
use crate::types::{FitnessPlan, Follow, Subscription, User};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, User>,
    emails: HashSet<String>,
    plans: HashMap<String, FitnessPlan>,
    follows: BTreeMap<(String, String), Follow>,
    subscriptions: BTreeMap<(String, String), Subscription>,
}

/// In-memory Store for tests and local runs. One mutex serializes all writes,
/// which gives the same first-writer-wins behaviour as conditional writes.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().map(|inner| inner.subscriptions.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(&user.user_id) {
            return Err(StoreError::Conflict("User already exists".to_string()));
        }
        if !inner.emails.insert(user.email.clone()) {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }
        inner.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(user_id).cloned())
    }

    async fn put_plan(&self, plan: &FitnessPlan) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.plans.contains_key(&plan.plan_id) {
            return Err(StoreError::Conflict("Plan already exists".to_string()));
        }
        inner.plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    async fn update_plan(&self, plan: &FitnessPlan) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        match inner.plans.get_mut(&plan.plan_id) {
            Some(existing) => {
                *existing = plan.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("Plan not found".to_string())),
        }
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<FitnessPlan>, StoreError> {
        Ok(self.lock()?.plans.get(plan_id).cloned())
    }

    async fn list_plans(&self, trainer_id: Option<&str>) -> Result<Vec<FitnessPlan>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .plans
            .values()
            .filter(|p| trainer_id.map_or(true, |t| p.trainer_id == t))
            .cloned()
            .collect())
    }

    async fn delete_plan(&self, plan_id: &str) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        if inner.plans.remove(plan_id).is_none() {
            return Err(StoreError::NotFound("Plan not found".to_string()));
        }
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|(_, plan), _| plan != plan_id);
        Ok(before - inner.subscriptions.len())
    }

    async fn put_follow(&self, follow: &Follow) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let key = (follow.follower_id.clone(), follow.trainer_id.clone());
        if inner.follows.contains_key(&key) {
            return Err(StoreError::Conflict("Already following this trainer".to_string()));
        }
        inner.follows.insert(key, follow.clone());
        Ok(())
    }

    async fn delete_follow(&self, follower_id: &str, trainer_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        Ok(inner
            .follows
            .remove(&(follower_id.to_string(), trainer_id.to_string()))
            .is_some())
    }

    async fn list_follows(&self, follower_id: &str) -> Result<Vec<Follow>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .follows
            .values()
            .filter(|f| f.follower_id == follower_id)
            .cloned()
            .collect())
    }

    async fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.plans.contains_key(&subscription.plan_id) {
            return Err(StoreError::NotFound("Plan not found".to_string()));
        }
        let key = (subscription.user_id.clone(), subscription.plan_id.clone());
        if inner.subscriptions.contains_key(&key) {
            return Err(StoreError::Conflict("Already subscribed to this plan".to_string()));
        }
        inner.subscriptions.insert(key, subscription.clone());
        Ok(())
    }

    async fn get_subscription(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .subscriptions
            .get(&(user_id.to_string(), plan_id.to_string()))
            .cloned())
    }

    async fn list_user_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_plan_subscriptions(&self, plan_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.plan_id == plan_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, SubscriptionStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn user(id: &str, email: &str) -> User {
        User {
            user_id: id.to_string(),
            name: id.to_string(),
            email: email.to_string(),
            role: Role::User,
            avatar: None,
            created_at: Utc::now(),
        }
    }

    fn subscription(user_id: &str, plan_id: &str) -> Subscription {
        Subscription {
            user_id: user_id.to_string(),
            plan_id: plan_id.to_string(),
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_email_is_unique() {
        let store = MemoryStore::new();
        store.put_user(&user("u1", "a@example.com")).await.unwrap();
        let err = store.put_user(&user("u2", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_user("u2").await.unwrap().is_none());
    }

    fn plan(id: &str) -> FitnessPlan {
        FitnessPlan {
            plan_id: id.to_string(),
            trainer_id: "t1".to_string(),
            title: "Plan".to_string(),
            description: "Desc".to_string(),
            price: Decimal::new(1000, 2),
            duration: 7,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscription_pair_is_unique() {
        let store = MemoryStore::new();
        store.put_plan(&plan("p1")).await.unwrap();
        store.put_plan(&plan("p2")).await.unwrap();
        store.put_subscription(&subscription("u1", "p1")).await.unwrap();
        let err = store.put_subscription(&subscription("u1", "p1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        store.put_subscription(&subscription("u1", "p2")).await.unwrap();
        assert_eq!(store.subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_plan_cascades() {
        let store = MemoryStore::new();
        store.put_plan(&plan("p1")).await.unwrap();
        store.put_plan(&plan("other")).await.unwrap();
        store.put_subscription(&subscription("u1", "p1")).await.unwrap();
        store.put_subscription(&subscription("u2", "p1")).await.unwrap();
        store.put_subscription(&subscription("u1", "other")).await.unwrap();

        assert_eq!(store.delete_plan("p1").await.unwrap(), 2);
        assert_eq!(store.subscription_count(), 1);
        assert!(matches!(
            store.delete_plan("p1").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_subscription_requires_live_plan() {
        let store = MemoryStore::new();
        let err = store.put_subscription(&subscription("u1", "p1")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.put_plan(&plan("p1")).await.unwrap();
        store.delete_plan("p1").await.unwrap();
        let err = store.put_subscription(&subscription("u1", "p1")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.subscription_count(), 0);
    }
}
