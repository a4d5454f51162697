//! Entity Cache (C7) integration with the command handlers: a grant or
//! revoke must invalidate any cached copy of the affected entity
//! (`spec.md` §4.7).

mod common;

use std::sync::Arc;

use acs_core::cache::{EntityCache, MokaEntityCache};
use acs_core::domain::command::Command;
use acs_core::domain::entity::{Effect, EntityKind, Permission, Verb};
use acs_core::handlers::handle_command;
use common::ADMIN;

fn perm() -> Permission {
    Permission {
        uri: "/api/projects".into(),
        verb: Verb::Get,
        effect: Effect::Grant,
        scheme: "ApiUriAuthorization".into(),
        expires_at: None,
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn grant_permission_invalidates_cached_entity() {
    let cache: Arc<dyn EntityCache> = Arc::new(MokaEntityCache::new());
    let mut ctx = common::context("tenant-cache");
    ctx = ctx.with_cache(cache.clone());

    handle_command(
        &ctx,
        Command::CreateEntity { id: 1, kind: EntityKind::User, name: "alice".into() },
        "c1",
        ADMIN,
    )
    .await
    .unwrap();

    let snapshot = acs_core::domain::entity::Entity::new(1, EntityKind::User, "alice".into(), chrono::Utc::now());
    cache.set_entity(snapshot).await;
    cache.set_entity_permissions(1, vec![]).await;
    assert!(cache.get_entity(EntityKind::User, 1).await.is_some());

    handle_command(&ctx, Command::GrantPermission { owner_id: 1, permission: perm() }, "c2", ADMIN)
        .await
        .unwrap();

    assert!(cache.get_entity(EntityKind::User, 1).await.is_none());
    assert!(cache.get_entity_permissions(1).await.is_none());
}
