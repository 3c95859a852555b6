//! Access policy for every plan, follow and subscription action.
//!
//! `can_access` is pure: it never touches storage. Callers load whatever the
//! action refers to (the plan, the follow target, the caller's subscription)
//! and hand it in through the [`Action`] variant.

use crate::error::ApiError;
use crate::types::{Actor, FitnessPlan, Role, Subscription, User};

/// Number of description characters shown to callers without access.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    CreatePlan,
    UpdatePlan(&'a FitnessPlan),
    DeletePlan(&'a FitnessPlan),
    /// Target as resolved by id; `None` if the id does not exist.
    Follow(Option<&'a User>),
    Unfollow(Option<&'a User>),
    Subscribe,
    ViewPlanFull(&'a FitnessPlan, Option<&'a Subscription>),
}

#[derive(Debug)]
pub enum Access {
    Granted,
    /// Only the truncated view may be returned.
    Preview,
    Denied(ApiError),
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted)
    }

    /// Turn the decision into a gate for mutations.
    pub fn require(self) -> Result<(), ApiError> {
        match self {
            Access::Granted => Ok(()),
            Access::Preview => Err(ApiError::Forbidden(
                "An active subscription is required".to_string(),
            )),
            Access::Denied(err) => Err(err),
        }
    }
}

pub fn can_access(actor: Option<&Actor>, action: Action<'_>) -> Access {
    let actor = match (actor, action) {
        (None, Action::ViewPlanFull(..)) => return Access::Preview,
        (None, _) => {
            return Access::Denied(ApiError::Unauthorized(
                "Authentication required".to_string(),
            ))
        }
        (Some(actor), _) => actor,
    };

    match action {
        Action::CreatePlan => match actor.role {
            Role::Trainer => Access::Granted,
            Role::User => forbidden("Only trainers can create fitness plans"),
        },
        Action::UpdatePlan(plan) => owner_only(actor, plan, "update"),
        Action::DeletePlan(plan) => owner_only(actor, plan, "delete"),
        Action::Follow(target) => follow_target(actor, target, "follow"),
        Action::Unfollow(target) => follow_target(actor, target, "unfollow"),
        Action::Subscribe => match actor.role {
            Role::User => Access::Granted,
            Role::Trainer => forbidden("Only users can subscribe to plans"),
        },
        Action::ViewPlanFull(plan, subscription) => {
            if plan.trainer_id == actor.user_id {
                return Access::Granted;
            }
            match subscription {
                Some(sub)
                    if sub.is_active()
                        && sub.user_id == actor.user_id
                        && sub.plan_id == plan.plan_id =>
                {
                    Access::Granted
                }
                _ => Access::Preview,
            }
        }
    }
}

fn owner_only(actor: &Actor, plan: &FitnessPlan, verb: &str) -> Access {
    match actor.role {
        Role::Trainer if plan.trainer_id == actor.user_id => Access::Granted,
        Role::Trainer => forbidden(&format!("You can only {} your own plans", verb)),
        Role::User => forbidden(&format!("Only trainers can {} fitness plans", verb)),
    }
}

fn follow_target(actor: &Actor, target: Option<&User>, verb: &str) -> Access {
    match actor.role {
        Role::Trainer => return forbidden(&format!("Only users can {} trainers", verb)),
        Role::User => {}
    }
    match target {
        None => Access::Denied(ApiError::NotFound("Trainer not found".to_string())),
        Some(user) => match user.role {
            Role::Trainer => Access::Granted,
            Role::User => forbidden("Target is not a trainer"),
        },
    }
}

fn forbidden(message: &str) -> Access {
    Access::Denied(ApiError::Forbidden(message.to_string()))
}

/// Cut a description down to the preview length, on a char boundary.
pub fn preview(description: &str) -> String {
    match description.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &description[..idx]),
        None => description.to_string(),
    }
}
