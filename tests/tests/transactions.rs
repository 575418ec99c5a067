//! Transactional bracketing around mapper execution.

use tests::{crm_def, mock_runtime, MockCall, MockScript};

use quarry::{ExecuteOptions, Request};

use std::time::Duration;

fn request() -> Request {
    Request::new("s-1").param("id", 42)
}

#[tokio::test]
async fn execution_error_rolls_back_once_with_the_query_token() {
    let (runtime, log) = mock_runtime(crm_def(true), MockScript::failing());

    let err = runtime
        .execute("crm", "find_user", &request(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_execution());

    let rollbacks = log.count(|c| matches!(c, MockCall::Rollback(token) if token == "find_user"));
    let commits = log.count(|c| matches!(c, MockCall::Commit(_)));
    assert_eq!(rollbacks, 1);
    assert_eq!(commits, 0);
}

#[tokio::test]
async fn timed_out_execution_rolls_back_like_a_failure() {
    let (runtime, log) = mock_runtime(crm_def(true), MockScript::stalling());

    let err = runtime
        .execute(
            "crm",
            "find_user",
            &request(),
            &ExecuteOptions::timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(err.to_string().contains("timed out"));

    let rollbacks = log.count(|c| matches!(c, MockCall::Rollback(token) if token == "find_user"));
    assert_eq!(rollbacks, 1);
    assert_eq!(log.count(|c| matches!(c, MockCall::Commit(_))), 0);
}

#[tokio::test]
async fn timed_out_non_transactional_query_surfaces_without_rollback() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::stalling());

    let err = runtime
        .execute(
            "crm",
            "find_user",
            &request(),
            &ExecuteOptions::timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert_eq!(log.count(|c| matches!(c, MockCall::Rollback(_))), 0);
}

#[tokio::test]
async fn successful_execution_brackets_with_begin_and_commit() {
    let (runtime, log) = mock_runtime(crm_def(true), MockScript::default());

    runtime
        .execute("crm", "find_user", &request(), &ExecuteOptions::default())
        .await
        .unwrap();

    let calls = log.calls();
    let begin = calls
        .iter()
        .position(|c| matches!(c, MockCall::Begin(token) if token == "find_user"))
        .expect("begin fired");
    let execute = calls
        .iter()
        .position(|c| matches!(c, MockCall::Execute(..)))
        .expect("query dispatched");
    let commit = calls
        .iter()
        .position(|c| matches!(c, MockCall::Commit(token) if token == "find_user"))
        .expect("commit fired");

    assert!(begin < execute && execute < commit);
    assert_eq!(log.count(|c| matches!(c, MockCall::Rollback(_))), 0);
}

#[tokio::test]
async fn non_transactional_mapper_never_brackets() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());

    runtime
        .execute("crm", "find_user", &request(), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(
        log.count(|c| matches!(c, MockCall::Begin(_) | MockCall::Commit(_) | MockCall::Rollback(_))),
        0
    );
}

#[tokio::test]
async fn failed_non_transactional_mapper_does_not_roll_back() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::failing());

    let err = runtime
        .execute("crm", "find_user", &request(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert_eq!(log.count(|c| matches!(c, MockCall::Rollback(_))), 0);
}
