//! Session-scoped connection reuse and lifecycle.

use tests::{crm_def, mock_runtime, MockCall, MockScript};

use quarry::{ExecuteOptions, Request};

use std::sync::Arc;

fn request(session: &str) -> Request {
    Request::new(session).param("id", 42)
}

#[tokio::test]
async fn same_session_reuses_the_cached_connection() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());
    let ds = runtime.datasource("crm").unwrap();
    let mapper = ds.mapper("find_user", "get").unwrap();

    let req = request("s-1");
    let first = ds.connection(&req, &mapper, false).await.unwrap().unwrap();
    let second = ds.connection(&req, &mapper, false).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(log.created(), 1);
}

#[tokio::test]
async fn distinct_sessions_get_distinct_connections() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());
    let ds = runtime.datasource("crm").unwrap();
    let mapper = ds.mapper("find_user", "get").unwrap();

    let a = ds
        .connection(&request("s-1"), &mapper, false)
        .await
        .unwrap()
        .unwrap();
    let b = ds
        .connection(&request("s-2"), &mapper, false)
        .await
        .unwrap()
        .unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(log.created(), 2);
}

#[tokio::test]
async fn force_replaces_the_cached_connection() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());
    let ds = runtime.datasource("crm").unwrap();
    let mapper = ds.mapper("find_user", "get").unwrap();
    let req = request("s-1");

    let original = ds.connection(&req, &mapper, false).await.unwrap().unwrap();
    let forced = ds.connection(&req, &mapper, true).await.unwrap().unwrap();
    let cached = ds.connection(&req, &mapper, false).await.unwrap().unwrap();

    assert!(!Arc::ptr_eq(&original, &forced));
    assert!(Arc::ptr_eq(&forced, &cached));
    assert_eq!(log.created(), 2);
    // The displaced connection was closed, the live one was not.
    assert_eq!(log.count(|c| matches!(c, MockCall::Close)), 1);
}

#[tokio::test]
async fn close_session_closes_connections_and_forgets_the_session() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());
    let ds = runtime.datasource("crm").unwrap();

    runtime
        .execute("crm", "find_user", &request("s-1"), &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(ds.sessions().session_count().await, 1);

    runtime.close_session("crm", "s-1").await.unwrap();
    assert_eq!(ds.sessions().session_count().await, 0);
    assert_eq!(log.count(|c| matches!(c, MockCall::Close)), 1);

    // A new request on the old session id opens a fresh connection.
    runtime
        .execute("crm", "find_user", &request("s-1"), &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(log.created(), 2);
}

#[tokio::test]
async fn denied_request_gets_no_connection() {
    let log = std::sync::Arc::new(tests::MockLog::default());
    let runtime = quarry::Runtime::builder()
        .driver(tests::MockFactory {
            log: log.clone(),
            script: MockScript::default(),
        })
        .policy(|resource: &str, _request: &Request| resource != "crm")
        .define(crm_def(false))
        .build()
        .unwrap();

    let ds = runtime.datasource("crm").unwrap();
    let mapper = ds.mapper("find_user", "get").unwrap();
    let denied = ds.connection(&request("s-1"), &mapper, false).await.unwrap();
    assert!(denied.is_none());
    assert_eq!(log.created(), 0);

    // Through the execute path the denial surfaces as an error.
    let err = runtime
        .execute("crm", "find_user", &request("s-1"), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_connection_denied());
}

#[tokio::test]
async fn concurrent_first_use_creates_exactly_one_connection() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());
    let ds = runtime.datasource("crm").unwrap();
    let mapper = ds.mapper("find_user", "get").unwrap();
    let req = request("s-1");

    let (a, b) = tokio::join!(
        ds.connection(&req, &mapper, false),
        ds.connection(&req, &mapper, false),
    );

    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(log.created(), 1);
}
