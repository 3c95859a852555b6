pub mod dynamo;
pub mod memory;

use async_trait::async_trait;

use crate::types::{FitnessPlan, Follow, Subscription, User};

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// Persistence for users, plans, follow edges and the subscription ledger.
///
/// Implementations enforce the uniqueness constraints atomically: `put_user`
/// (id and email), `put_follow` (follower, trainer) and `put_subscription`
/// (user, plan) return `StoreError::Conflict` for the losing writer.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put_user(&self, user: &User) -> Result<(), StoreError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn put_plan(&self, plan: &FitnessPlan) -> Result<(), StoreError>;
    /// Replace an existing plan; `NotFound` if it is gone.
    async fn update_plan(&self, plan: &FitnessPlan) -> Result<(), StoreError>;
    async fn get_plan(&self, plan_id: &str) -> Result<Option<FitnessPlan>, StoreError>;
    /// Unordered; callers sort.
    async fn list_plans(&self, trainer_id: Option<&str>) -> Result<Vec<FitnessPlan>, StoreError>;
    /// Delete a plan together with its subscriptions. Returns how many
    /// subscriptions were removed.
    async fn delete_plan(&self, plan_id: &str) -> Result<usize, StoreError>;

    async fn put_follow(&self, follow: &Follow) -> Result<(), StoreError>;
    /// Returns false if there was no such edge.
    async fn delete_follow(&self, follower_id: &str, trainer_id: &str) -> Result<bool, StoreError>;
    async fn list_follows(&self, follower_id: &str) -> Result<Vec<Follow>, StoreError>;

    /// `NotFound` if the plan no longer exists, checked in the same atomic write.
    async fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;
    async fn get_subscription(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;
    async fn list_user_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError>;
    async fn list_plan_subscriptions(&self, plan_id: &str) -> Result<Vec<Subscription>, StoreError>;
}
