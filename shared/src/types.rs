use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========== ACTOR ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Trainer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Trainer => "TRAINER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "TRAINER" => Ok(Role::Trainer),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Caller identity as supplied by the identity provider. Trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public projection of a user, safe to embed in other resources.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

// ========== PLAN ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FitnessPlan {
    pub plan_id: String,
    pub trainer_id: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub duration: u32, // days
    pub created_at: DateTime<Utc>,
}

// Numeric fields stay as raw JSON so they can be coerced and validated server-side.
#[derive(Debug, Deserialize, Default)]
pub struct CreatePlanRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePlanRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PlanSummary {
    pub plan_id: String,
    pub trainer_id: String,
    pub title: String,
    pub price: Decimal,
    pub duration: u32,
}

impl From<&FitnessPlan> for PlanSummary {
    fn from(plan: &FitnessPlan) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            trainer_id: plan.trainer_id.clone(),
            title: plan.title.clone(),
            price: plan.price,
            duration: plan.duration,
        }
    }
}

/// A plan as a particular caller is allowed to see it.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: FitnessPlan,
    /// False when `description` has been cut down to a preview.
    pub unlocked: bool,
    /// Caller holds an active subscription to this plan.
    pub subscribed: bool,
    pub subscription: Option<Subscription>,
    pub trainer: Option<UserSummary>,
}

// ========== FOLLOW ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Follow {
    pub follower_id: String,
    pub trainer_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FollowRequest {
    #[serde(default, alias = "trainerId")]
    pub trainer_id: Option<String>,
}

// ========== SUBSCRIPTION ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(format!("Unknown subscription status: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SubscribeRequest {
    #[serde(default, alias = "planId")]
    pub plan_id: Option<String>,
}

/// Ledger row joined with what the caller needs to render it.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SubscriptionRecord {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan: PlanSummary,
    pub user: Option<UserSummary>,
}
