//! Hosted checkout: start a payment session for a plan, then turn the
//! processor's signed completion event into a ledger row.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::access::{can_access, Action};
use crate::config::{CheckoutConfig, Config};
use crate::error::{ApiError, FieldError};
use crate::signature::{verify_signature, SignatureError};
use crate::store::Store;
use crate::subscriptions::{create_subscription, ensure_subscribable};
use crate::types::{Actor, FitnessPlan, Subscription, SubscriptionStatus};

pub const COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("request to checkout processor failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("checkout processor returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("checkout processor response had no redirect url")]
    MissingUrl,
    #[error("checkout processor timed out")]
    Timeout,
}

/// Everything the processor needs to host a one-off payment for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub name: String,
    pub description: String,
    /// Price in the currency's minor unit (cents).
    pub unit_amount: i64,
    pub currency: String,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
    pub user_id: String,
    pub plan_id: String,
}

impl CheckoutSession {
    /// Form fields in the processor's bracketed encoding.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                self.name.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                self.unit_amount.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), self.quantity.to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("client_reference_id".to_string(), self.user_id.clone()),
            ("metadata[userId]".to_string(), self.user_id.clone()),
            ("metadata[planId]".to_string(), self.plan_id.clone()),
        ];
        if !self.description.is_empty() {
            fields.push((
                "line_items[0][price_data][product_data][description]".to_string(),
                self.description.clone(),
            ));
        }
        fields
    }
}

/// A payment processor that can host checkout sessions.
#[async_trait]
pub trait CheckoutProcessor: Send + Sync {
    /// Create a session and return the URL to redirect the buyer to.
    async fn create_checkout_session(&self, session: &CheckoutSession) -> Result<String, ProcessorError>;
}

/// Stripe-compatible processor over its REST API.
pub struct StripeCheckout {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SessionCreated {
    url: Option<String>,
}

impl StripeCheckout {
    pub fn new(config: &CheckoutConfig, timeout: Duration) -> Result<Self, ProcessorError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CheckoutProcessor for StripeCheckout {
    async fn create_checkout_session(&self, session: &CheckoutSession) -> Result<String, ProcessorError> {
        let response = self
            .http_client
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(&self.api_key)
            .form(&session.form_fields())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: SessionCreated = response.json().await?;
        created.url.filter(|u| !u.is_empty()).ok_or(ProcessorError::MissingUrl)
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CheckoutRedirect {
    pub url: String,
}

/// Price in minor units: `price * 100`, half away from zero, exact decimal.
pub fn to_minor_units(price: Decimal) -> Result<i64, ApiError> {
    price
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .filter(|cents| *cents > 0)
        .ok_or_else(|| ApiError::validation("price", format!("{} cannot be charged", price)))
}

fn session_for(plan: &FitnessPlan, user_id: &str, config: &Config) -> Result<CheckoutSession, ApiError> {
    Ok(CheckoutSession {
        name: plan.title.clone(),
        description: plan.description.clone(),
        unit_amount: to_minor_units(plan.price)?,
        currency: config.checkout.currency.clone(),
        quantity: 1,
        success_url: config.success_url(),
        cancel_url: config.cancel_url(),
        user_id: user_id.to_string(),
        plan_id: plan.plan_id.clone(),
    })
}

/// Start a hosted checkout for `plan_id`. Nothing is written to the ledger
/// here; that only happens once the completion webhook arrives.
pub async fn initiate(
    store: &dyn Store,
    processor: &dyn CheckoutProcessor,
    config: &Config,
    actor: &Actor,
    plan_id: &str,
) -> Result<CheckoutRedirect, ApiError> {
    can_access(Some(actor), Action::Subscribe).require()?;
    let plan = ensure_subscribable(store, &actor.user_id, plan_id).await?;
    let session = session_for(&plan, &actor.user_id, config)?;

    let created = tokio::time::timeout(
        config.external_timeout,
        processor.create_checkout_session(&session),
    )
    .await
    .unwrap_or(Err(ProcessorError::Timeout));

    match created {
        Ok(url) => {
            tracing::info!("Checkout session created for {} on plan {}", actor.user_id, plan_id);
            Ok(CheckoutRedirect { url })
        }
        Err(e) => Err(ApiError::PaymentInit(e.to_string())),
    }
}

#[derive(Debug, PartialEq)]
pub enum ReconcileOutcome {
    Recorded(Subscription),
    AlreadyRecorded,
    Ignored,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Recorded(_) => "recorded",
            ReconcileOutcome::AlreadyRecorded => "already_recorded",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Deserialize)]
struct EventData {
    object: SessionObject,
}

#[derive(Deserialize)]
struct SessionObject {
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl SessionObject {
    fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Verify and apply a processor webhook. Safe to call repeatedly with the same
/// event: a second delivery reports `AlreadyRecorded` and writes nothing.
pub async fn reconcile(
    store: &dyn Store,
    config: &Config,
    payload: &[u8],
    signature_header: Option<&str>,
    now: i64,
) -> Result<ReconcileOutcome, ApiError> {
    let header = signature_header.unwrap_or_default();
    verify_signature(
        &config.checkout.webhook_secret,
        header,
        payload,
        now,
        config.checkout.webhook_tolerance_secs,
    )
    .map_err(|e: SignatureError| {
        tracing::warn!("Rejected webhook: {}", e);
        ApiError::InvalidSignature(e.to_string())
    })?;

    let event: WebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| ApiError::validation("body", format!("Invalid event payload: {}", e)))?;

    if event.event_type != COMPLETED_EVENT {
        tracing::info!("Ignoring webhook event {}", event.event_type);
        return Ok(ReconcileOutcome::Ignored);
    }

    let session = event
        .data
        .map(|d| d.object)
        .ok_or_else(|| ApiError::validation("data.object", "is required"))?;

    let mut missing = Vec::new();
    let user_id = session.metadata_str("userId");
    let plan_id = session.metadata_str("planId");
    if user_id.is_none() {
        missing.push(FieldError::new("metadata.userId", "is required"));
    }
    if plan_id.is_none() {
        missing.push(FieldError::new("metadata.planId", "is required"));
    }
    let (Some(user_id), Some(plan_id)) = (user_id, plan_id) else {
        return Err(ApiError::invalid_fields(missing));
    };

    match create_subscription(store, &user_id, &plan_id, SubscriptionStatus::Active).await {
        Ok(subscription) => Ok(ReconcileOutcome::Recorded(subscription)),
        Err(ApiError::Conflict(_)) => {
            tracing::info!("Webhook redelivery for {} on plan {}; already recorded", user_id, plan_id);
            Ok(ReconcileOutcome::AlreadyRecorded)
        }
        Err(e) => Err(e),
    }
}
