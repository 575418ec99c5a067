//! The mapper execution pipeline: validation gate, parameter ordering,
//! result mapping, diagnostics, and hooks.

use tests::{crm_def, mock_runtime, mock_settings, MockCall, MockFactory, MockLog, MockScript};

use quarry::{
    map_result_fn, on_completed_fn, on_issued_fn, Cause, DatasourceDef, Environment,
    ExecuteOptions, MapperDef, MapperHooks, QueryDef, Request, Runtime,
};

use serde_json::json;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn validation_failure_reports_causes_and_never_issues_the_query() {
    let (runtime, log) = mock_runtime(crm_def(false), MockScript::default());

    // `id` is required and missing.
    let err = runtime
        .execute(
            "crm",
            "find_user",
            &Request::new("s-1"),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(err.is_validation());
    let fields = err.field_errors().unwrap();
    assert_eq!(fields["id"], vec![Cause::Required]);

    let details = err.validation_details().unwrap();
    assert_eq!(details.datasource.as_deref(), Some("crm"));
    assert_eq!(details.query.as_deref(), Some("find_user"));
    assert_eq!(details.mapper.as_deref(), Some("find_user[0]"));

    assert_eq!(log.count(|c| matches!(c, MockCall::Execute(..))), 0);
}

#[tokio::test]
async fn positional_params_follow_descriptor_declaration_order() {
    let mapper: MapperDef = serde_json::from_value(json!({
        "parameters": {
            "name": {"type": "text"},
            "age": {"type": "number"}
        }
    }))
    .unwrap();
    let def = DatasourceDef::new("crm")
        .environment(Environment::Test)
        .connection(mock_settings("main"))
        .query(QueryDef::sql("add_user", "INSERT INTO users VALUES (?1, ?2)").mapper(mapper));
    let (runtime, log) = mock_runtime(def, MockScript::default());

    runtime
        .execute(
            "crm",
            "add_user",
            &Request::new("s-1").param("age", 36).param("name", "ada"),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    let calls = log.calls();
    match &calls[0] {
        MockCall::Execute(_, params) => {
            assert_eq!(params, &vec![json!("ada"), json!(36.0)]);
        }
        other => panic!("expected execute, got {other:?}"),
    }
}

#[tokio::test]
async fn map_result_applies_per_row_with_indexes() {
    let rows = vec![json!({"id": 1}), json!({"id": 2})];
    let log = Arc::new(MockLog::default());
    let runtime = Runtime::builder()
        .driver(MockFactory {
            log: log.clone(),
            script: MockScript::rows(rows),
        })
        .define(crm_def(false))
        .hooks(
            "crm",
            "find_user[0]",
            MapperHooks::new().map_result(map_result_fn(|mut row, index| {
                row["position"] = json!(index.unwrap());
                row
            })),
        )
        .build()
        .unwrap();

    let response = runtime
        .execute(
            "crm",
            "find_user",
            &Request::new("s-1").param("id", 1),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.rows.into_values(),
        vec![
            json!({"id": 1, "position": 0}),
            json!({"id": 2, "position": 1})
        ]
    );
}

#[tokio::test]
async fn diagnostics_echo_query_and_params_outside_production_only() {
    // Test environment: diagnostics attached.
    let (runtime, _) = mock_runtime(crm_def(false), MockScript::default());
    let response = runtime
        .execute(
            "crm",
            "find_user",
            &Request::new("s-1").param("id", 42),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    let diagnostics = response.diagnostics.expect("diagnostics outside production");
    assert!(diagnostics.query.contains("SELECT"));
    assert_eq!(diagnostics.params, vec![json!(42.0)]);

    // Production: never echoed.
    let mapper: MapperDef = serde_json::from_value(json!({
        "parameters": {"id": {"type": "number", "required": true}}
    }))
    .unwrap();
    let def = DatasourceDef::new("crm")
        .environment(Environment::Production)
        .connection(mock_settings("main"))
        .query(QueryDef::sql("find_user", "SELECT 1").mapper(mapper));
    let (runtime, _) = mock_runtime(def, MockScript::default());
    let response = runtime
        .execute(
            "crm",
            "find_user",
            &Request::new("s-1").param("id", 42),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert!(response.diagnostics.is_none());
}

#[tokio::test]
async fn issued_and_completed_hooks_both_fire_once() {
    let issued = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let log = Arc::new(MockLog::default());
    let runtime = Runtime::builder()
        .driver(MockFactory {
            log,
            script: MockScript::failing(),
        })
        .define(crm_def(false))
        .hooks(
            "crm",
            "find_user[0]",
            MapperHooks::new()
                .on_issued(on_issued_fn({
                    let issued = issued.clone();
                    move |_, _| {
                        issued.fetch_add(1, Ordering::SeqCst);
                    }
                }))
                .on_completed(on_completed_fn({
                    let completed = completed.clone();
                    move |_, _, outcome| {
                        assert!(outcome.is_err());
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                })),
        )
        .build()
        .unwrap();

    let _ = runtime
        .execute(
            "crm",
            "find_user",
            &Request::new("s-1").param("id", 1),
            &ExecuteOptions::default(),
        )
        .await;

    assert_eq!(issued.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_names_are_configuration_errors() {
    let (runtime, _) = mock_runtime(crm_def(false), MockScript::default());
    let request = Request::new("s-1").param("id", 1);

    let err = runtime
        .execute("nope", "find_user", &request, &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_configuration());

    let err = runtime
        .execute("crm", "nope", &request, &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn execute_blocking_resolves_on_the_async_path() {
    let (runtime, _) = mock_runtime(crm_def(false), MockScript::rows(vec![json!({"id": 1})]));

    let response = runtime
        .execute_blocking(
            "crm",
            "find_user",
            &Request::new("s-1").param("id", 1),
            &ExecuteOptions::default(),
        )
        .unwrap();
    assert_eq!(response.rows.into_values(), vec![json!({"id": 1})]);
}
