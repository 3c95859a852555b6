use chrono::Utc;
use std::collections::HashMap;

use crate::error::{parse_body, ApiError, FieldError};
use crate::store::Store;
use crate::types::{Actor, CreateUserRequest, Role, User, UserSummary};

/// Create the user record for an identity the provider has already issued.
/// Role comes from the identity, never the body, and cannot change afterwards.
pub async fn register_user(store: &dyn Store, actor: &Actor, body: &[u8]) -> Result<User, ApiError> {
    let req: CreateUserRequest = parse_body(body)?;

    let mut errors = Vec::new();
    let name = req.name.map(|n| n.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    let email = req
        .email
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if email.is_empty() {
        errors.push(FieldError::new("email", "is required"));
    } else if !is_plausible_email(&email) {
        errors.push(FieldError::new("email", "is not a valid email address"));
    }
    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    let user = User {
        user_id: actor.user_id.clone(),
        name,
        email,
        role: actor.role,
        avatar: req.avatar.filter(|a| !a.trim().is_empty()),
        created_at: Utc::now(),
    };

    store.put_user(&user).await?;
    tracing::info!("Registered {} {}", user.role, user.user_id);
    Ok(user)
}

/// Get the caller's own user record.
pub async fn get_user(store: &dyn Store, actor: &Actor) -> Result<User, ApiError> {
    store
        .get_user(&actor.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// The caller's stored record, which must carry `role`. An unregistered caller
/// gets `NotFound`; a stored role that differs gets `Forbidden`.
pub async fn require_registered(
    store: &dyn Store,
    actor: &Actor,
    role: Role,
    message: &str,
) -> Result<User, ApiError> {
    match store.get_user(&actor.user_id).await? {
        Some(user) if user.role == role => Ok(user),
        Some(_) => Err(ApiError::Forbidden(message.to_string())),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

/// Public summaries for a set of user ids. Ids that do not resolve are left out.
pub async fn user_summaries<I>(
    store: &dyn Store,
    user_ids: I,
) -> Result<HashMap<String, UserSummary>, ApiError>
where
    I: IntoIterator<Item = String>,
{
    let ids: Vec<String> = user_ids.into_iter().collect();
    let mut summaries = HashMap::new();
    for user_id in ids {
        if summaries.contains_key(&user_id) {
            continue;
        }
        if let Some(user) = store.get_user(&user_id).await? {
            summaries.insert(user_id, UserSummary::from(&user));
        }
    }
    Ok(summaries)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_register_and_get() {
        let store = MemoryStore::new();
        let actor = Actor::new("t1", Role::Trainer);
        let user = register_user(
            &store,
            &actor,
            br#"{"name":"Tess","email":" Tess@Example.com ","avatar":"tess.png"}"#,
        )
        .await
        .unwrap();

        assert_eq!(user.role, Role::Trainer);
        assert_eq!(user.email, "tess@example.com");
        assert_eq!(get_user(&store, &actor).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let store = MemoryStore::new();
        let body = br#"{"name":"Uma","email":"uma@example.com"}"#;
        register_user(&store, &Actor::new("u1", Role::User), body).await.unwrap();

        let same_id = register_user(&store, &Actor::new("u1", Role::User), br#"{"name":"Uma","email":"other@example.com"}"#)
            .await
            .unwrap_err();
        assert!(matches!(same_id, ApiError::Conflict(_)));

        let same_email = register_user(&store, &Actor::new("u2", Role::User), body).await.unwrap_err();
        assert!(matches!(same_email, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_validates_fields() {
        let store = MemoryStore::new();
        let err = register_user(&store, &Actor::new("u1", Role::User), br#"{"email":"nope"}"#)
            .await
            .unwrap_err();
        let fields: Vec<_> = err.fields().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "email"]);
    }

    #[tokio::test]
    async fn test_require_registered_checks_stored_role() {
        let store = MemoryStore::new();
        register_user(&store, &Actor::new("t2", Role::Trainer), br#"{"name":"T","email":"t2@example.com"}"#)
            .await
            .unwrap();

        let ok = require_registered(&store, &Actor::new("t2", Role::Trainer), Role::Trainer, "no").await;
        assert_eq!(ok.unwrap().user_id, "t2");

        let claimed_user = require_registered(&store, &Actor::new("t2", Role::User), Role::User, "no")
            .await
            .unwrap_err();
        assert!(matches!(claimed_user, ApiError::Forbidden(_)));

        let ghost = require_registered(&store, &Actor::new("ghost", Role::User), Role::User, "no")
            .await
            .unwrap_err();
        assert!(matches!(ghost, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let store = MemoryStore::new();
        let err = get_user(&store, &Actor::new("ghost", Role::User)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
