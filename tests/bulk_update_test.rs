//! `BulkPermissionUpdate` edge cases beyond the literal S5 scenario
//! (`spec.md` §4.5.1): fail-fast pre-validation, `stopOnFirstError`,
//! and non-transactional partial success.

mod common;

use acs_core::domain::command::{BulkOp, Command};
use acs_core::domain::entity::{Effect, EntityKind, Permission, Verb};
use acs_core::handlers::{handle_command, CommandOutcome};
use acs_core::persistence::{ChangeType, Store};
use common::ADMIN;

fn perm(uri: &str) -> Permission {
    Permission {
        uri: uri.to_owned(),
        verb: Verb::Get,
        effect: Effect::Grant,
        scheme: "ApiUriAuthorization".into(),
        expires_at: None,
        metadata: Default::default(),
    }
}

async fn create_user(ctx: &acs_core::handlers::HandlerContext, id: u64, name: &str) {
    handle_command(ctx, Command::CreateEntity { id, kind: EntityKind::User, name: name.into() }, "setup", ADMIN)
        .await
        .unwrap();
}

/// `validateBeforeExecution=true` fails the whole batch up front and
/// never touches the store when any op is invalid.
#[tokio::test]
async fn validate_before_execution_short_circuits() {
    let (ctx, store) = common::context_with_store("tenant-bulk-validate");
    create_user(&ctx, 1, "alice").await;
    let rows_before = store.audit_len().await;

    let ops = vec![
        BulkOp::Grant { entity_id: 1, permission: perm("/api/ok") },
        BulkOp::Grant { entity_id: 404, permission: perm("/api/missing") },
    ];
    let outcome = handle_command(
        &ctx,
        Command::BulkPermissionUpdate {
            ops,
            validate_before_execution: true,
            stop_on_first_error: false,
            execute_in_transaction: true,
        },
        "bulk-validate",
        ADMIN,
    )
    .await
    .unwrap();

    let CommandOutcome::BulkUpdate(result) = outcome else { panic!("expected BulkUpdate") };
    assert_eq!(result.successful, 0);
    assert_eq!(result.failed, 2);
    assert!(result.aggregate_audit_id.is_none());
    // No store.apply ever ran, so there is no audit row at all for this batch.
    assert_eq!(store.audit_len().await, rows_before);
}

/// Without `executeInTransaction`, the ops that succeeded commit even
/// though later ops in the same batch failed.
#[tokio::test]
async fn non_transactional_partial_success_commits_the_good_ops() {
    let (ctx, store) = common::context_with_store("tenant-bulk-partial");
    create_user(&ctx, 1, "alice").await;
    let rows_before = store.audit_len().await;

    let ops = vec![
        BulkOp::Grant { entity_id: 1, permission: perm("/api/ok") },
        BulkOp::Grant { entity_id: 404, permission: perm("/api/missing") },
    ];
    let outcome = handle_command(
        &ctx,
        Command::BulkPermissionUpdate {
            ops,
            validate_before_execution: false,
            stop_on_first_error: false,
            execute_in_transaction: false,
        },
        "bulk-partial",
        ADMIN,
    )
    .await
    .unwrap();

    let CommandOutcome::BulkUpdate(result) = outcome else { panic!("expected BulkUpdate") };
    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 1);

    let graph = ctx.graph.read().await;
    assert_eq!(graph.get(1).unwrap().permissions.len(), 1);
    drop(graph);

    // One aggregate row plus one per-op row for the single op that applied.
    assert_eq!(store.audit_len().await, rows_before + 2);
    let trail = store.audit_trail("tenant-bulk-partial", None, None, None).await.unwrap();
    let per_op = trail
        .iter()
        .rev()
        .find(|r| r.change_type == ChangeType::GrantPermission && r.correlation_id == "bulk-partial");
    assert!(per_op.is_some(), "expected a per-op GrantPermission audit row for the bulk batch");
}

/// `stopOnFirstError=true` halts the execution pass at the first
/// failing op instead of continuing to evaluate the rest of the batch.
#[tokio::test]
async fn stop_on_first_error_skips_remaining_ops() {
    let ctx = common::context("tenant-bulk-stop");
    create_user(&ctx, 1, "alice").await;

    let ops = vec![
        BulkOp::Grant { entity_id: 404, permission: perm("/api/missing") },
        BulkOp::Grant { entity_id: 1, permission: perm("/api/never-reached") },
    ];
    let outcome = handle_command(
        &ctx,
        Command::BulkPermissionUpdate {
            ops,
            validate_before_execution: false,
            stop_on_first_error: true,
            execute_in_transaction: false,
        },
        "bulk-stop",
        ADMIN,
    )
    .await
    .unwrap();

    let CommandOutcome::BulkUpdate(result) = outcome else { panic!("expected BulkUpdate") };
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.successful, 0);

    let graph = ctx.graph.read().await;
    assert!(graph.get(1).unwrap().permissions.is_empty());
}
