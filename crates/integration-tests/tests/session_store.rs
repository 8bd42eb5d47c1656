//! File-backed sessions shared between independent holders.
//!
//! Each holder gets its own `FileSessionStore` over a shared directory, the
//! way separate processes would.

use std::sync::Arc;
use std::time::Duration;

use redseam_client::{CartPhase, CartSync, FileSessionStore, SessionHolder, SessionStore};
use redseam_integration_tests::FakeRedseam;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(20);

fn holder_in(dir: &TempDir) -> SessionHolder {
    SessionHolder::new(Arc::new(FileSessionStore::new(dir.path())))
}

async fn wait_until_authenticated(holder: &SessionHolder, authenticated: bool) {
    let mut rx = holder.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.is_some() == authenticated),
    )
    .await
    .expect("timed out waiting for session change")
    .expect("holder dropped");
}

#[tokio::test]
async fn test_session_survives_restart() {
    let fake = FakeRedseam::spawn().await;
    fake.add_user("lela", "lela@redseam.ge", "secret1");
    let dir = TempDir::new().expect("tempdir");

    let auth = fake
        .client()
        .login("lela@redseam.ge", "secret1")
        .await
        .expect("login");
    holder_in(&dir).establish(auth).expect("persist");

    let restarted = holder_in(&dir);
    let session = restarted.current().expect("session restored");
    assert_eq!(session.user.username, "lela");
    assert!(restarted.is_authenticated());

    restarted.clear_session().expect("logout");
    assert!(holder_in(&dir).current().is_none());
    assert!(!dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_corrupt_file_reads_as_logged_out() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("session.json"), "{ not json").expect("write");

    let holder = holder_in(&dir);
    assert!(holder.current().is_none());

    let store = FileSessionStore::new(dir.path());
    assert!(store.load().is_err());
}

#[tokio::test]
async fn test_watcher_follows_login_and_logout_elsewhere() {
    let fake = FakeRedseam::spawn().await;
    fake.add_user("zura", "zura@redseam.ge", "secret1");
    let dir = TempDir::new().expect("tempdir");

    let here = holder_in(&dir);
    let _watcher = here.spawn_store_watcher(POLL);
    assert!(!here.is_authenticated());

    let elsewhere = holder_in(&dir);
    let auth = fake
        .client()
        .login("zura@redseam.ge", "secret1")
        .await
        .expect("login");
    elsewhere.establish(auth).expect("persist");

    wait_until_authenticated(&here, true).await;
    assert_eq!(
        here.current().map(|s| s.user.username),
        Some("zura".to_string())
    );

    elsewhere.clear_session().expect("logout");
    wait_until_authenticated(&here, false).await;
}

#[tokio::test]
async fn test_notifications_follow_logout_without_polling() {
    let fake = FakeRedseam::spawn().await;
    fake.add_user("nata", "nata@redseam.ge", "secret1");
    let dir = TempDir::new().expect("tempdir");

    let writer = holder_in(&dir);
    let reader = holder_in(&dir);
    let _notifier = reader.spawn_store_notifier().expect("directory watch");
    let cart = CartSync::new(fake.client(), reader.clone());
    let _listener = cart.spawn_session_listener();

    let auth = fake
        .client()
        .login("nata@redseam.ge", "secret1")
        .await
        .expect("login");
    writer.establish(auth).expect("persist");
    wait_until_authenticated(&reader, true).await;

    // The listener refreshes the cart for the new login.
    let mut rx = cart.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.phase == CartPhase::Ready))
        .await
        .expect("timed out waiting for cart refresh")
        .expect("cart dropped");

    writer.clear_session().expect("logout");
    wait_until_authenticated(&reader, false).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.phase == CartPhase::Unauthenticated),
    )
    .await
    .expect("timed out waiting for cart reset")
    .expect("cart dropped");
}

#[tokio::test]
async fn test_cart_resets_when_another_process_logs_out() {
    let fake = FakeRedseam::spawn().await;
    fake.add_user("tiko", "tiko@redseam.ge", "secret1");
    let dir = TempDir::new().expect("tempdir");

    let writer = holder_in(&dir);
    let auth = fake
        .client()
        .login("tiko@redseam.ge", "secret1")
        .await
        .expect("login");
    writer.establish(auth).expect("persist");

    let reader = holder_in(&dir);
    let _watcher = reader.spawn_store_watcher(POLL);
    let cart = CartSync::new(fake.client(), reader);
    let _listener = cart.spawn_session_listener();
    cart.refresh().await.expect("refresh");
    assert_eq!(cart.phase(), CartPhase::Ready);

    writer.clear_session().expect("logout");

    let mut rx = cart.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.phase == CartPhase::Unauthenticated),
    )
    .await
    .expect("timed out waiting for cart reset")
    .expect("cart dropped");
    assert!(cart.snapshot().is_empty());
}
