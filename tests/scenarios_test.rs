//! End-to-end scenarios and the quantified invariants from `spec.md`
//! §8 ("TESTABLE PROPERTIES"), exercised through `handle_command` /
//! the query handlers directly over an in-memory store — the same
//! seam the tenant worker's command consumer and query path use.

mod common;

use acs_core::domain::command::Command;
use acs_core::domain::entity::{Effect, EntityId, EntityKind, Permission, Verb};
use acs_core::handlers::{handle_command, queries, HandlerError};
use chrono::Utc;
use common::ADMIN;

fn perm(uri: &str, verb: Verb, effect: Effect) -> Permission {
    Permission {
        uri: uri.to_owned(),
        verb,
        effect,
        scheme: "ApiUriAuthorization".to_owned(),
        expires_at: None,
        metadata: Default::default(),
    }
}

async fn create(ctx: &acs_core::handlers::HandlerContext, id: EntityId, kind: EntityKind, name: &str) {
    handle_command(
        ctx,
        Command::CreateEntity { id, kind, name: name.to_owned() },
        "setup",
        ADMIN,
    )
    .await
    .unwrap();
}

async fn add_edge(ctx: &acs_core::handlers::HandlerContext, parent_id: EntityId, child_id: EntityId) -> Result<(), HandlerError> {
    handle_command(ctx, Command::AddEdge { parent_id, child_id }, "setup", ADMIN)
        .await
        .map(|_| ())
}

async fn grant(ctx: &acs_core::handlers::HandlerContext, owner_id: EntityId, permission: Permission) {
    handle_command(ctx, Command::GrantPermission { owner_id, permission }, "setup", ADMIN)
        .await
        .unwrap();
}

/// S1 — inherited grant via group.
#[tokio::test]
async fn s1_inherited_grant_via_group() {
    let ctx = common::context("tenant-s1");
    create(&ctx, 1, EntityKind::User, "alice").await;
    create(&ctx, 10, EntityKind::Group, "devs").await;
    add_edge(&ctx, 10, 1).await.unwrap();
    grant(&ctx, 10, perm("/api/projects", Verb::Get, Effect::Grant)).await;

    let outcome = queries::check_permission(&ctx, 1, "/api/projects", Verb::Get, None).await.unwrap();
    assert!(outcome.allowed);
}

/// S2 — a direct Deny on the user overrides the inherited Grant.
#[tokio::test]
async fn s2_deny_override() {
    let ctx = common::context("tenant-s2");
    create(&ctx, 1, EntityKind::User, "alice").await;
    create(&ctx, 10, EntityKind::Group, "devs").await;
    add_edge(&ctx, 10, 1).await.unwrap();
    grant(&ctx, 10, perm("/api/projects", Verb::Get, Effect::Grant)).await;
    grant(&ctx, 1, perm("/api/projects", Verb::Get, Effect::Deny)).await;

    let outcome = queries::check_permission(&ctx, 1, "/api/projects", Verb::Get, None).await.unwrap();
    assert!(!outcome.allowed);
}

/// S3 — a second edge that would close a cycle is rejected and the
/// graph is left exactly as it was.
#[tokio::test]
async fn s3_cycle_rejection() {
    let ctx = common::context("tenant-s3");
    create(&ctx, 20, EntityKind::Group, "a").await;
    create(&ctx, 21, EntityKind::Group, "b").await;
    add_edge(&ctx, 20, 21).await.unwrap();

    let err = add_edge(&ctx, 21, 20).await.unwrap_err();
    assert!(matches!(
        err,
        HandlerError::Domain(acs_core::domain::error::DomainError::CycleError { .. })
    ));

    let graph = ctx.graph.read().await;
    assert!(graph.parents_of(20).is_empty());
    assert!(graph.children_of(20).contains(&21));
    assert!(graph.children_of(21).is_empty());
}

/// S4 — a more specific Deny wins over a wildcard Grant, but only for
/// the URI it actually matches.
#[tokio::test]
async fn s4_wildcard_specificity() {
    let ctx = common::context("tenant-s4");
    create(&ctx, 1, EntityKind::User, "alice").await;
    grant(&ctx, 1, perm("/api/*", Verb::Get, Effect::Grant)).await;
    grant(&ctx, 1, perm("/api/secret", Verb::Get, Effect::Deny)).await;

    assert!(!queries::check_permission(&ctx, 1, "/api/secret", Verb::Get, None).await.unwrap().allowed);
    assert!(queries::check_permission(&ctx, 1, "/api/public", Verb::Get, None).await.unwrap().allowed);
}

/// S5 — a bulk update with one op referencing a missing entity, run
/// transactionally, fails every op and leaves the graph untouched, with
/// exactly one aggregate audit row recorded.
#[tokio::test]
async fn s5_bulk_partial_failure_is_fully_rolled_back() {
    let (ctx, store) = common::context_with_store("tenant-s5");
    create(&ctx, 1, EntityKind::User, "alice").await;
    let rows_before = store.audit_len().await;

    let ops = vec![
        acs_core::domain::command::BulkOp::Grant {
            entity_id: 1,
            permission: perm("/api/projects", Verb::Get, Effect::Grant),
        },
        acs_core::domain::command::BulkOp::Grant {
            entity_id: 404,
            permission: perm("/api/projects", Verb::Get, Effect::Grant),
        },
    ];
    let outcome = handle_command(
        &ctx,
        Command::BulkPermissionUpdate {
            ops,
            validate_before_execution: false,
            stop_on_first_error: false,
            execute_in_transaction: true,
        },
        "bulk-1",
        ADMIN,
    )
    .await
    .unwrap();

    let acs_core::handlers::CommandOutcome::BulkUpdate(result) = outcome else {
        panic!("expected BulkUpdate outcome");
    };
    assert_eq!(result.successful, 0);
    assert_eq!(result.failed, 2);

    let graph = ctx.graph.read().await;
    assert!(graph.get(1).unwrap().permissions.is_empty());
    drop(graph);

    assert_eq!(store.audit_len().await, rows_before + 1);
}

/// S6 — backpressure: once the buffer is at capacity, further enqueues
/// fail fast with `BufferFull` while queries keep working.
#[tokio::test]
async fn s6_backpressure_rejects_enqueue_but_not_queries() {
    let (buffer, _consumer) = acs_core::buffer::CommandBuffer::new(1, 1.0, 0.5);
    let ctx = common::context("tenant-s6");
    create(&ctx, 1, EntityKind::User, "alice").await;

    let blocked = tokio::spawn({
        let buffer = buffer.clone();
        async move {
            buffer
                .enqueue(Command::CreateEntity { id: 2, kind: EntityKind::User, name: "bob".into() }, "c1".into())
                .await
        }
    });
    // Give the spawned enqueue a chance to win the race into the (capacity-1) channel.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = buffer
        .enqueue(Command::CreateEntity { id: 3, kind: EntityKind::User, name: "carol".into() }, "c2".into())
        .await;
    assert!(matches!(second, Err(HandlerError::Buffer(acs_core::buffer::BufferError::Full))));
    assert_eq!(buffer.stats().queue_depth, 1);

    // Queries still succeed while the buffer is saturated.
    let outcome = queries::check_permission(&ctx, 1, "/api/projects", Verb::Get, None).await.unwrap();
    assert!(!outcome.allowed);

    blocked.abort();
}

/// Property 1 — edge mutuality: parent/child views always agree.
#[tokio::test]
async fn property_edge_mutuality() {
    let ctx = common::context("tenant-p1");
    create(&ctx, 1, EntityKind::Group, "a").await;
    create(&ctx, 2, EntityKind::Group, "b").await;
    add_edge(&ctx, 1, 2).await.unwrap();

    let graph = ctx.graph.read().await;
    assert!(graph.parents_of(2).contains(&1));
    assert!(graph.children_of(1).contains(&2));
}

/// Property 3 — default deny with no matching permission.
#[tokio::test]
async fn property_default_deny() {
    let ctx = common::context("tenant-p3");
    create(&ctx, 1, EntityKind::User, "alice").await;
    let outcome = queries::check_permission(&ctx, 1, "/api/anything", Verb::Get, None).await.unwrap();
    assert!(!outcome.allowed);
}

/// Property 6 — atomicity: a failed `Store::apply` leaves the graph
/// exactly as it was and writes no audit row.
#[tokio::test]
async fn property_atomicity_on_store_failure() {
    let (ctx, store) = common::context_with_store("tenant-p6");
    create(&ctx, 1, EntityKind::User, "alice").await;
    let rows_before = store.audit_len().await;

    store.fail_next_apply();
    let err = handle_command(
        &ctx,
        Command::GrantPermission {
            owner_id: 1,
            permission: perm("/api/projects", Verb::Get, Effect::Grant),
        },
        "will-fail",
        ADMIN,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HandlerError::Persistence(_)));

    assert_eq!(store.audit_len().await, rows_before);
    let graph = ctx.graph.read().await;
    assert!(graph.get(1).unwrap().permissions.is_empty());
}

/// Property 9 — round-trip: `Load` followed by `Get` returns an entity
/// equal on the attributes `spec.md` §3 lists.
#[tokio::test]
async fn property_round_trip_through_load() {
    let (ctx, store) = common::context_with_store("tenant-p9");
    create(&ctx, 1, EntityKind::User, "alice").await;
    grant(&ctx, 1, perm("/api/projects", Verb::Get, Effect::Grant)).await;

    let snapshot = store.load("tenant-p9").await.unwrap();
    let mut graph = acs_core::graph::EntityGraph::new();
    graph.load(snapshot);

    let reloaded = graph.get(1).unwrap();
    assert_eq!(reloaded.id, 1);
    assert_eq!(reloaded.name, "alice");
    assert_eq!(reloaded.permissions.len(), 1);
    assert_eq!(reloaded.permissions[0].uri, "/api/projects");
}

/// Property 10 — audit append-only: `ValidateAuditIntegrity` over an
/// untampered range reports no issues.
#[tokio::test]
async fn property_audit_integrity_holds_when_untampered() {
    let ctx = common::context("tenant-p10");
    create(&ctx, 1, EntityKind::User, "alice").await;
    grant(&ctx, 1, perm("/api/projects", Verb::Get, Effect::Grant)).await;
    grant(&ctx, 1, perm("/api/secret", Verb::Get, Effect::Deny)).await;

    let report = queries::validate_audit_integrity(&ctx, None, None).await.unwrap();
    assert!(report.is_valid());
    assert_eq!(report.checked, 3);
}

#[tokio::test]
async fn audit_trail_reports_compliance_totals() {
    let ctx = common::context("tenant-compliance");
    create(&ctx, 1, EntityKind::User, "alice").await;
    handle_command(
        &ctx,
        Command::AccessViolation {
            user_id: 1,
            resource_id: 1,
            severity: acs_core::domain::command::ViolationSeverity::High,
            action: "GET /api/secret".into(),
        },
        "violation-1",
        ADMIN,
    )
    .await
    .unwrap();

    let since = Utc::now() - chrono::Duration::minutes(5);
    let until = Utc::now() + chrono::Duration::minutes(5);
    let report = queries::get_compliance_report(&ctx, since, until).await.unwrap();
    assert_eq!(report.violation_count, 1);
    assert_eq!(report.total_events, 2); // CreateEntity + AccessViolation
}
