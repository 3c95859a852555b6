use chrono::Utc;

use crate::access::{can_access, Action};
use crate::error::{parse_body, ApiError};
use crate::store::Store;
use crate::types::{Actor, Follow, FollowRequest, Role};
use crate::users::require_registered;

/// Pull the trainer id out of a follow request body.
pub fn trainer_id_from_body(body: &[u8]) -> Result<String, ApiError> {
    let req: FollowRequest = parse_body(body)?;
    req.trainer_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("trainerId", "is required"))
}

pub async fn follow_trainer(store: &dyn Store, actor: &Actor, trainer_id: &str) -> Result<Follow, ApiError> {
    let target = store.get_user(trainer_id).await?;
    can_access(Some(actor), Action::Follow(target.as_ref())).require()?;
    require_registered(store, actor, Role::User, "Only users can follow trainers").await?;

    let follow = Follow {
        follower_id: actor.user_id.clone(),
        trainer_id: trainer_id.to_string(),
        created_at: Utc::now(),
    };
    store.put_follow(&follow).await?;

    tracing::info!("{} now follows {}", follow.follower_id, follow.trainer_id);
    Ok(follow)
}

pub async fn unfollow_trainer(store: &dyn Store, actor: &Actor, trainer_id: &str) -> Result<(), ApiError> {
    let target = store.get_user(trainer_id).await?;
    can_access(Some(actor), Action::Unfollow(target.as_ref())).require()?;

    if !store.delete_follow(&actor.user_id, trainer_id).await? {
        return Err(ApiError::NotFound("Not following this trainer".to_string()));
    }
    tracing::info!("{} unfollowed {}", actor.user_id, trainer_id);
    Ok(())
}

/// Follow edges of the caller, newest first.
pub async fn list_follows(store: &dyn Store, actor: &Actor) -> Result<Vec<Follow>, ApiError> {
    let mut follows = store.list_follows(&actor.user_id).await?;
    follows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(follows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::User;

    async fn with_trainer() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, role) in [("t1", Role::Trainer), ("t2", Role::Trainer), ("u1", Role::User), ("u2", Role::User)] {
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

    #[tokio::test]
    async fn test_follow_then_duplicate_conflicts() {
        let store = with_trainer().await;
        let member = Actor::new("u1", Role::User);

        follow_trainer(&store, &member, "t1").await.unwrap();
        let err = follow_trainer(&store, &member, "t1").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(list_follows(&store, &member).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_follow_targets() {
        let store = with_trainer().await;
        let member = Actor::new("u1", Role::User);

        let missing = follow_trainer(&store, &member, "nobody").await.unwrap_err();
        assert!(matches!(missing, ApiError::NotFound(_)));

        let not_trainer = follow_trainer(&store, &member, "u2").await.unwrap_err();
        assert!(matches!(not_trainer, ApiError::Forbidden(_)));

        let trainer_actor = follow_trainer(&store, &Actor::new("t9", Role::Trainer), "t1")
            .await
            .unwrap_err();
        assert!(matches!(trainer_actor, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_follower_must_be_registered_user() {
        let store = with_trainer().await;

        let ghost = follow_trainer(&store, &Actor::new("ghost", Role::User), "t1")
            .await
            .unwrap_err();
        assert!(matches!(ghost, ApiError::NotFound(_)));

        // Stored as a trainer, claiming to be a user
        let disguised = follow_trainer(&store, &Actor::new("t2", Role::User), "t1")
            .await
            .unwrap_err();
        assert!(matches!(disguised, ApiError::Forbidden(_)));

        assert!(store.list_follows("ghost").await.unwrap().is_empty());
        assert!(store.list_follows("t2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unfollow() {
        let store = with_trainer().await;
        let member = Actor::new("u1", Role::User);

        let err = unfollow_trainer(&store, &member, "t1").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        follow_trainer(&store, &member, "t1").await.unwrap();
        unfollow_trainer(&store, &member, "t1").await.unwrap();
        assert!(list_follows(&store, &member).await.unwrap().is_empty());
    }

    #[test]
    fn test_trainer_id_from_body() {
        assert_eq!(trainer_id_from_body(br#"{"trainerId":"t1"}"#).unwrap(), "t1");
        assert_eq!(trainer_id_from_body(br#"{"trainer_id":" t1 "}"#).unwrap(), "t1");
        assert_eq!(trainer_id_from_body(b"").unwrap_err().kind(), "ValidationError");
    }
}
