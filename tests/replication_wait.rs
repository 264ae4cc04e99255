//! Post-create wait timing, using tokio's paused clock
//!
//! With a fixed one-second backoff and a five-second timeout, polls land at
//! t = 0, 1, 2, 3 and 4. A poll at t = 5 would start at the deadline, so it
//! never happens.

mod common;

use common::FakeBackend;
use dirrecon::models::{Entity, User};
use dirrecon::reconcile::{wait_for_replication, ReadOutcome, ReplicationPolicy};
use dirrecon::{ClientContext, Error, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn five_units() -> ReplicationPolicy {
    ReplicationPolicy {
        initial: Duration::from_secs(1),
        max: Duration::from_secs(1),
        multiplier: 2.0,
        timeout: Duration::from_secs(5),
    }
}

/// A read that is `NotFound` for its first `misses` calls.
fn read_after(misses: usize, calls: &AtomicUsize) -> impl FnMut() -> std::future::Ready<Result<&'static str>> + '_ {
    move || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(if call < misses {
            Err(Error::NotFound {
                what: "user".to_string(),
                id: "u1".to_string(),
            })
        } else {
            Ok("visible")
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_four_misses_then_visible() {
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let value = wait_for_replication(
        &five_units(),
        &CancellationToken::new(),
        "user",
        "u1",
        read_after(4, &calls),
    )
    .await
    .unwrap();

    assert_eq!(value, "visible");
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_six_misses_times_out() {
    let calls = AtomicUsize::new(0);

    let err = wait_for_replication(
        &five_units(),
        &CancellationToken::new(),
        "user",
        "u1",
        read_after(6, &calls),
    )
    .await
    .unwrap_err();

    match err {
        Error::ReplicationTimeout { timeout, .. } => assert_eq!(timeout, Duration::from_secs(5)),
        other => panic!("expected ReplicationTimeout, got {other:?}"),
    }
    // No poll at or after the deadline
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_not_found() {
    let calls = AtomicUsize::new(0);
    let err = wait_for_replication(
        &five_units(),
        &CancellationToken::new(),
        "user",
        "u1",
        read_after(usize::MAX, &calls),
    )
    .await
    .unwrap_err();

    assert!(!err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_backoff() {
    let calls = AtomicUsize::new(0);
    let cancel = CancellationToken::new();
    let policy = five_units();
    let start = Instant::now();

    let (result, _) = tokio::join!(
        wait_for_replication(&policy, &cancel, "user", "u1", read_after(usize::MAX, &calls)),
        async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        }
    );

    assert!(matches!(result, Err(Error::Cancelled { .. })));
    // Polls at t = 0, 1 and 2; the sleep towards t = 3 was interrupted
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() < Duration::from_secs(3));
}

/// A read still running at the deadline is abandoned there.
#[tokio::test(start_paused = true)]
async fn test_slow_read_is_cut_off_at_deadline() {
    let start = Instant::now();

    let err = wait_for_replication(
        &five_units(),
        &CancellationToken::new(),
        "user",
        "u1",
        || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("visible")
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ReplicationTimeout { .. }));
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_millis(5100));
}

#[tokio::test(start_paused = true)]
async fn test_slow_read_after_misses_is_cut_off() {
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let err = wait_for_replication(
        &five_units(),
        &CancellationToken::new(),
        "user",
        "u1",
        || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 3 {
                    return Err(Error::NotFound {
                        what: "user".to_string(),
                        id: "u1".to_string(),
                    });
                }
                // Starts at t = 3 and would finish at t = 7
                tokio::time::sleep(Duration::from_secs(4)).await;
                Ok("visible")
            }
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ReplicationTimeout { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_millis(5100));
}

#[tokio::test(start_paused = true)]
async fn test_user_create_waits_and_reads_back() {
    let backend = Arc::new(FakeBackend::new());
    // Reads 0..3 happen before the new user has replicated
    backend.hide_reads(0..3);
    let ctx = ClientContext::new(backend.clone(), five_units());

    let user = User::for_create("ada@contoso.com", "Ada", "P@ssw0rd!", true);
    let created = ctx
        .objects::<User>()
        .create(&user, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.mail_nickname.as_deref(), Some("ada"));
    assert!(created.id.is_some());
    assert_eq!(backend.gets.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_user_never_visible_reports_timeout() {
    let backend = Arc::new(FakeBackend::new());
    backend.hide_reads(0..usize::MAX);
    let ctx = ClientContext::new(backend, five_units());

    let user = User::for_create("ada@contoso.com", "Ada", "P@ssw0rd!", false);
    let diag = ctx
        .objects::<User>()
        .create(&user, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(diag.source, Error::ReplicationTimeout { .. }));
    assert_eq!(diag.attribute_path.as_deref(), Some("id"));
}

#[tokio::test]
async fn test_user_read_404_is_absent() {
    let backend = Arc::new(FakeBackend::new());
    backend.insert(Entity::Users, json!({"id": "u1", "userPrincipalName": "ada@contoso.com"}));
    let ctx = ClientContext::new(backend, five_units());
    let users = ctx.objects::<User>();
    let cancel = CancellationToken::new();

    let present = users.read("u1", &cancel).await.unwrap();
    assert_eq!(
        present.present().and_then(|u| u.user_principal_name),
        Some("ada@contoso.com".to_string())
    );

    let absent = users.read("u2", &cancel).await.unwrap();
    assert_eq!(absent, ReadOutcome::Absent);
}

#[tokio::test]
async fn test_user_update_and_idempotent_delete() {
    let backend = Arc::new(FakeBackend::new());
    backend.insert(Entity::Users, json!({"id": "u1", "displayName": "Ada"}));
    let ctx = ClientContext::new(backend.clone(), five_units());
    let users = ctx.objects::<User>();
    let cancel = CancellationToken::new();

    let delta = User {
        display_name: Some("Ada Lovelace".to_string()),
        ..Default::default()
    };
    let updated = users.update("u1", &delta, &cancel).await.unwrap();
    assert_eq!(updated.display_name.as_deref(), Some("Ada Lovelace"));

    tokio_test::assert_ok!(users.delete("u1", &cancel).await);
    assert!(backend.object(Entity::Users, "u1").is_none());
    // Second delete finds nothing and still succeeds
    tokio_test::assert_ok!(users.delete("u1", &cancel).await);
}
