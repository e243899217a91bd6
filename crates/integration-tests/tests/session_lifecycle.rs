//! Session lifecycle against a mock backend with file-backed persistence.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use httpmock::prelude::*;
use matricula_console::session::{LoginOutcome, SessionError, SessionState};
use matricula_console::storage::{FileStorage, SessionStorage, TOKEN_KEY, USER_KEY};
use matricula_console::testing::{FixedCodeVerifier, SENTINEL_CODE, ScriptedProvider};
use matricula_integration_tests::{TestContext, login_body};
use secrecy::SecretString;
use serde_json::json;

fn secret() -> SecretString {
    SecretString::from("secret")
}

#[tokio::test]
async fn test_login_then_restore_in_new_process() {
    let ctx = TestContext::new().await;
    ctx.mock_password_login("ana", "jwt-ana", &["OPERADOR", "ESTUDIANTE"])
        .await;

    let first = ctx.session_store();
    first.login_with_password("ana", &secret()).await.unwrap();
    let persisted = first.identity().unwrap();
    drop(first);

    let second = ctx.session_store();
    assert_eq!(second.state(), SessionState::Loading);
    assert!(second.restore_session().await.unwrap());

    assert!(second.is_authenticated());
    assert_eq!(second.identity().unwrap(), persisted);
    assert_eq!(second.credential().unwrap().expose(), "jwt-ana");
    assert!(second.has_role("ESTUDIANTE"));
}

#[tokio::test]
async fn test_restore_makes_no_network_call() {
    let ctx = TestContext::new().await;
    let login = ctx
        .server
        .mock_async(|when, then| {
            when.path("/api/auth/login");
            then.status(500);
        })
        .await;
    let roles = ctx
        .server
        .mock_async(|when, then| {
            when.path("/api/auth/roles");
            then.status(500);
        })
        .await;

    let storage = FileStorage::new(ctx.session_dir.path());
    storage
        .set(
            USER_KEY,
            r#"{"id":"ana@uni.edu","email":"ana@uni.edu","displayName":"Ana","roles":["OPERADOR"]}"#,
        )
        .await
        .unwrap();
    storage.set(TOKEN_KEY, "jwt").await.unwrap();

    let store = ctx.session_store();
    assert!(store.restore_session().await.unwrap());

    login.assert_hits_async(0).await;
    roles.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_restore_requires_both_entries() {
    let ctx = TestContext::new().await;
    let storage = FileStorage::new(ctx.session_dir.path());
    storage.set(TOKEN_KEY, "orphan-token").await.unwrap();

    let store = ctx.session_store();
    assert!(!store.restore_session().await.unwrap());

    assert_eq!(store.state(), SessionState::Unauthenticated);
    assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_federated_login() {
    let ctx = TestContext::new().await;
    ctx.server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/google/login")
                .json_body(json!({"idToken": "google-id-token"}));
            then.status(200)
                .json_body(login_body("ana", "jwt-google", &["ADMIN_MATRICULA"]));
        })
        .await;

    let store = ctx
        .session_store()
        .with_provider(Arc::new(ScriptedProvider::signed_in(
            "google-id-token",
            Some("Ana Pérez"),
            None,
        )));

    let outcome = store.login_with_federated_identity().await.unwrap();

    let LoginOutcome::Authenticated(identity) = outcome else {
        panic!("expected authenticated outcome");
    };
    assert_eq!(identity.display_name, "Ana Pérez");
    assert!(store.has_role("ADMIN_MATRICULA"));
}

#[tokio::test]
async fn test_rejected_exchange_keeps_signed_out() {
    let ctx = TestContext::new().await;
    ctx.server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/google/login");
            then.status(403).body("account disabled");
        })
        .await;

    let store = ctx
        .session_store()
        .with_provider(Arc::new(ScriptedProvider::signed_in("id", None, None)));
    store.restore_session().await.unwrap();

    let err = store.login_with_federated_identity().await.unwrap_err();

    assert!(matches!(err, SessionError::Authentication(_)));
    assert_eq!(store.state(), SessionState::Unauthenticated);
    assert!(store.identity().is_none());
}

#[tokio::test]
async fn test_sentinel_second_factor() {
    let ctx = TestContext::new().await;
    ctx.mock_password_login("ana", "jwt-ana", &["OPERADOR"]).await;

    let store = ctx
        .session_store()
        .with_verifier(Arc::new(FixedCodeVerifier::sentinel()))
        .require_second_factor(true);

    let outcome = store.login_with_password("ana", &secret()).await.unwrap();
    assert_eq!(outcome, LoginOutcome::SecondFactorRequired);

    assert!(!store.verify_second_factor("000000").await.unwrap());
    assert!(!store.verify_second_factor("1234567").await.unwrap());
    assert!(!store.is_authenticated());

    assert!(store.verify_second_factor(SENTINEL_CODE).await.unwrap());
    assert!(store.is_authenticated());

    // Finalized exactly like a direct login: persisted and restorable
    let restored = ctx.session_store();
    assert!(restored.restore_session().await.unwrap());
    assert_eq!(restored.identity(), store.identity());
}

#[tokio::test]
async fn test_logout_clears_session_and_storage() {
    let ctx = TestContext::new().await;
    ctx.mock_password_login("ana", "jwt-ana", &["OPERADOR"]).await;

    let provider = Arc::new(ScriptedProvider::failing_sign_out());
    let store = ctx.session_store().with_provider(provider.clone());
    store.login_with_password("ana", &secret()).await.unwrap();

    store.logout().await;

    assert_eq!(provider.sign_out_calls(), 1);
    assert!(store.identity().is_none());
    assert!(store.credential().is_none());

    let storage = FileStorage::new(ctx.session_dir.path());
    assert_eq!(storage.get(USER_KEY).await.unwrap(), None);
    assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);

    let restored = ctx.session_store();
    assert!(!restored.restore_session().await.unwrap());
}
