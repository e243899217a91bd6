//! Permission resolution and refresh ordering.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use matricula_console::permissions::{PermissionResolver, RefreshOutcome};
use matricula_core::{Operation, Resource};
use matricula_integration_tests::{TestContext, session};
use secrecy::SecretString;
use serde_json::json;

#[tokio::test]
async fn test_backend_role_is_not_merged_with_fallback() {
    let ctx = TestContext::new().await;
    ctx.mock_roles(
        "op",
        json!([{"id": 2, "nombre": "OPERADOR", "permisos": ["cursos:READ"]}]),
        Duration::ZERO,
    )
    .await;
    let resolver = PermissionResolver::new(ctx.api());

    resolver
        .refresh(Some(&session("op", &["OPERADOR"])))
        .await
        .unwrap();

    assert!(resolver.has_permission(Resource::Cursos, Operation::Read));
    // Granted to OPERADOR by the fallback table only
    assert!(!resolver.has_permission(Resource::Matriculas, Operation::Create));
    assert!(!resolver.has_permission(Resource::Estudiantes, Operation::Update));
}

#[tokio::test]
async fn test_roles_unknown_to_backend_use_fallback() {
    let ctx = TestContext::new().await;
    ctx.mock_roles(
        "mixed",
        json!([{"id": 9, "nombre": "AUDITOR", "permisos": ["usuarios:READ"]}]),
        Duration::ZERO,
    )
    .await;
    let resolver = PermissionResolver::new(ctx.api());

    resolver
        .refresh(Some(&session("mixed", &["AUDITOR", "ESTUDIANTE"])))
        .await
        .unwrap();

    assert!(resolver.has_permission(Resource::Usuarios, Operation::Read));
    assert!(resolver.has_permission(Resource::Matriculas, Operation::Read));
    assert!(!resolver.has_permission(Resource::Matriculas, Operation::Delete));
}

#[tokio::test]
async fn test_malformed_permission_names_are_ignored() {
    let ctx = TestContext::new().await;
    ctx.mock_roles(
        "op",
        json!([{
            "id": 2,
            "nombre": "OPERADOR",
            "permisos": ["cursos", "cursos:READ:extra", "cursos:READ"]
        }]),
        Duration::ZERO,
    )
    .await;
    let resolver = PermissionResolver::new(ctx.api());

    let outcome = resolver
        .refresh(Some(&session("op", &["OPERADOR"])))
        .await
        .unwrap();

    assert_eq!(outcome, RefreshOutcome::Applied);
    assert!(resolver.has_permission(Resource::Cursos, Operation::Read));
    assert_eq!(
        resolver
            .backend_map()
            .operations("OPERADOR", Resource::Cursos)
            .collect::<Vec<_>>(),
        vec![Operation::Read]
    );
}

#[tokio::test]
async fn test_empty_roles_deny_everything() {
    let ctx = TestContext::new().await;
    ctx.mock_roles(
        "nobody",
        json!([{"id": 1, "nombre": "ADMIN_MATRICULA", "permisos": ["cursos:READ"]}]),
        Duration::ZERO,
    )
    .await;
    let resolver = PermissionResolver::new(ctx.api());

    resolver.refresh(Some(&session("nobody", &[]))).await.unwrap();

    for resource in Resource::ALL {
        for operation in Operation::ALL {
            assert!(!resolver.has_permission(resource, operation));
        }
    }
}

#[tokio::test]
async fn test_late_response_for_earlier_identity_is_discarded() {
    let ctx = TestContext::new().await;
    ctx.mock_roles(
        "a",
        json!([{"id": 1, "nombre": "SHARED", "permisos": ["usuarios:DELETE"]}]),
        Duration::from_millis(400),
    )
    .await;
    ctx.mock_roles(
        "b",
        json!([{"id": 1, "nombre": "SHARED", "permisos": ["cursos:READ"]}]),
        Duration::ZERO,
    )
    .await;
    let resolver = Arc::new(PermissionResolver::new(ctx.api()));
    let a = session("a", &["SHARED"]);
    let b = session("b", &["SHARED"]);

    let (first, second) = tokio::join!(resolver.refresh(Some(&a)), resolver.refresh(Some(&b)));

    assert_eq!(first.unwrap(), RefreshOutcome::Superseded);
    assert_eq!(second.unwrap(), RefreshOutcome::Applied);
    assert!(resolver.has_permission(Resource::Cursos, Operation::Read));
    assert!(!resolver.has_permission(Resource::Usuarios, Operation::Delete));
}

#[tokio::test]
async fn test_refresh_none_always_clears() {
    let ctx = TestContext::new().await;
    let resolver = PermissionResolver::new(ctx.api());

    assert_eq!(resolver.refresh(None).await.unwrap(), RefreshOutcome::Cleared);
    assert!(resolver.backend_map().is_empty());

    ctx.mock_roles(
        "op",
        json!([{"id": 2, "nombre": "OPERADOR", "permisos": ["cursos:READ"]}]),
        Duration::ZERO,
    )
    .await;
    resolver
        .refresh(Some(&session("op", &["OPERADOR"])))
        .await
        .unwrap();
    assert!(!resolver.backend_map().is_empty());

    assert_eq!(resolver.refresh(None).await.unwrap(), RefreshOutcome::Cleared);
    assert!(resolver.backend_map().is_empty());
    assert!(!resolver.has_permission(Resource::Cursos, Operation::Read));
}

#[tokio::test]
async fn test_follow_tracks_session_store() {
    let ctx = TestContext::new().await;
    ctx.mock_password_login("ana", "jwt-ana", &["OPERADOR"]).await;
    ctx.mock_roles(
        "jwt-ana",
        json!([{"id": 2, "nombre": "OPERADOR", "permisos": ["profesores:DELETE"]}]),
        Duration::ZERO,
    )
    .await;

    let store = ctx.session_store();
    let resolver = Arc::new(PermissionResolver::new(ctx.api()));
    let _follower = Arc::clone(&resolver).follow(store.subscribe());

    store
        .login_with_password("ana", &SecretString::from("secret"))
        .await
        .unwrap();
    wait_for(|| resolver.has_permission(Resource::Profesores, Operation::Delete)).await;

    store.logout().await;
    wait_for(|| resolver.roles().is_empty()).await;
    assert!(!resolver.has_permission(Resource::Profesores, Operation::Delete));
    assert!(resolver.backend_map().is_empty());
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
