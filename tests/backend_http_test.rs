//! Integration tests for registration and reporting against an HTTP backend.
//!
//! A wiremock server stands in for the push backend so the full path from
//! `PushManager` through `ApiClient` to the wire format is exercised.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pushline::{
    DeviceMetadata, FileIdentityStore, IdentityStore, MemoryIdentityStore, PushError, PushManager,
    RegistrationState, StaticPlatform, StatusEvent,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICES_PATH: &str = "/api/v1/apps/app1/devices";
const REPORT_PATH: &str = "/api/v1/apps/app1/usage/report";

fn base_url(server: &MockServer) -> String {
    format!("{}/api/v1", server.uri())
}

/// Build a configured manager talking to `server`.
fn manager(server: &MockServer, platform: StaticPlatform, store: Arc<dyn IdentityStore>) -> PushManager {
    let manager = PushManager::builder()
        .platform(platform)
        .identity_store(store)
        .metadata(DeviceMetadata::detect("com.example.app"))
        .build()
        .unwrap();
    manager.configure("app1", "key1", &base_url(server)).unwrap();
    manager
}

fn registered_response(id: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 200,
        "message": "ok",
        "data": {"device": {"id": id, "token": "tok-1"}}
    }))
}

#[tokio::test]
async fn test_register_success_sends_token_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .and(header("X-API-Key", "key1"))
        .and(body_partial_json(json!({
            "token": "tok-1",
            "bundle_id": "com.example.app",
            "platform": std::env::consts::OS,
        })))
        .respond_with(registered_response(json!("d-42")))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let identity = manager.register().await.unwrap();

    assert_eq!(manager.state(), RegistrationState::Registered);
    assert_eq!(identity.device_id(), Some("d-42"));
    assert_eq!(manager.identity().unwrap().device_token(), "tok-1");
}

#[tokio::test]
async fn test_register_accepts_bare_numeric_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"device": {"id": 42}})))
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let identity = manager.register().await.unwrap();

    assert_eq!(identity.device_id(), Some("42"));
}

#[tokio::test]
async fn test_register_unauthorized_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"code": 401, "message": "invalid API key"})),
        )
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let err = manager.register().await.unwrap_err();

    match &err {
        PushError::Registration { retryable, reason } => {
            assert!(!retryable);
            assert!(reason.contains("401"), "reason: {reason}");
            assert!(reason.contains("invalid API key"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.state(), RegistrationState::Failed(err.clone()));
    assert!(manager.identity().is_none());
}

#[tokio::test]
async fn test_register_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let err = manager.register().await.unwrap_err();

    assert!(matches!(err, PushError::Registration { retryable: true, .. }));
}

#[tokio::test]
async fn test_register_undecodable_body_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let err = manager.register().await.unwrap_err();

    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_permission_denied_never_contacts_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(registered_response(json!("d-42")))
        .expect(0)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::denied(), Arc::new(MemoryIdentityStore::new()));

    assert_eq!(manager.register().await.unwrap_err(), PushError::PermissionDenied);
    assert_eq!(
        manager.state(),
        RegistrationState::Failed(PushError::PermissionDenied)
    );
}

#[tokio::test]
async fn test_concurrent_register_single_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(registered_response(json!("d-42")).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let (first, second) = tokio::join!(manager.register(), manager.register());

    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), PushError::AlreadyInProgress);
    assert_eq!(manager.statistics().registration_attempts, 1);
}

#[tokio::test]
async fn test_update_device_info_puts_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(registered_response(json!("d-42")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{DEVICES_PATH}/tok-1")))
        .and(header("X-API-Key", "key1"))
        .and(body_partial_json(json!({"bundle_id": "com.example.app"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    manager.register().await.unwrap();
    manager.update_device_info().await.unwrap();

    assert_eq!(manager.state(), RegistrationState::Registered);
    assert!(manager.last_error().is_none());
}

#[tokio::test]
async fn test_update_device_info_escapes_token_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(registered_response(json!("d-42")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{DEVICES_PATH}/ab%2Fcd%3Fx")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("ab/cd?x"), Arc::new(MemoryIdentityStore::new()));
    manager.register().await.unwrap();

    manager.update_device_info().await.unwrap();
}

#[tokio::test]
async fn test_auto_register_reuses_persisted_identity() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .and(body_partial_json(json!({"token": "tok-1"})))
        .respond_with(registered_response(json!("d-42")))
        .expect(2)
        .mount(&server)
        .await;

    // First launch registers and persists.
    let first = manager(
        &server,
        StaticPlatform::granted("tok-1"),
        Arc::new(FileIdentityStore::new(temp_dir.path())),
    );
    first.register().await.unwrap();
    drop(first);

    // Second launch must not prompt: a denied platform proves it.
    let second = manager(
        &server,
        StaticPlatform::denied(),
        Arc::new(FileIdentityStore::new(temp_dir.path())),
    );
    assert!(second.check_auto_register().await.unwrap());
    assert_eq!(second.state(), RegistrationState::Registered);
    assert_eq!(second.identity().unwrap().device_id(), Some("d-42"));
}

#[tokio::test]
async fn test_concurrent_reports_make_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .and(header("X-API-Key", "key1"))
        .and(body_partial_json(json!({
            "device_token": null,
            "statistics": {
                "registration_attempts": 0,
                "notifications_received": 1,
                "duplicates_suppressed": 0
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 200, "message": "ok"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    manager.receive(json!({"title": "hello"})).unwrap();

    let (a, b) = tokio::join!(manager.report_statistics(), manager.report_statistics());

    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a.notifications_received, 1);
}

#[tokio::test]
async fn test_failed_report_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REPORT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server, StaticPlatform::granted("tok-1"), Arc::new(MemoryIdentityStore::new()));
    let dropped = Arc::new(Mutex::new(0));
    {
        let dropped = Arc::clone(&dropped);
        manager.subscribe(move |event| {
            if let StatusEvent::StatisticsDropped { .. } = event {
                *dropped.lock().unwrap() += 1;
            }
            Ok(())
        });
    }
    manager.receive(json!({"title": "hello"})).unwrap();

    assert!(matches!(
        manager.report_statistics().await,
        Err(PushError::Statistics(_))
    ));
    assert_eq!(*dropped.lock().unwrap(), 1);
    assert_eq!(manager.statistics().notifications_received, 1);
}
