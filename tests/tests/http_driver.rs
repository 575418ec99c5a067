//! Wiring the HTTP driver into a runtime. No server is involved; the point
//! is that a remote-backed query setting routes through the driver and a
//! failed call surfaces as an execution error.

use quarry::{
    ConnectionSettings, DatasourceDef, Environment, ExecuteOptions, MapperDef, QueryDef, Request,
    Runtime,
};
use quarry_driver_http::HttpFactory;

use serde_json::{json, Map};

fn remote_def() -> DatasourceDef {
    let mapper: MapperDef = serde_json::from_value(json!({
        "parameters": {"id": {"type": "number", "required": true}}
    }))
    .unwrap();

    // Nothing listens on the discard port; sends fail fast.
    DatasourceDef::new("remote")
        .environment(Environment::Test)
        .connection(ConnectionSettings {
            name: "api".to_string(),
            driver: "http".to_string(),
            url: "http://127.0.0.1:9/".to_string(),
            username: None,
            password: None,
            options: Map::new(),
        })
        .query(QueryDef::http("item", "get /items/{id}").unwrap().mapper(mapper))
}

#[tokio::test]
async fn unreachable_remote_surfaces_as_execution_error() {
    let runtime = Runtime::builder()
        .driver(HttpFactory::new())
        .define(remote_def())
        .build()
        .unwrap();

    let err = runtime
        .execute(
            "remote",
            "item",
            &Request::new("s-1").param("id", 7),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_execution());
}

#[tokio::test]
async fn validation_still_gates_remote_queries() {
    let runtime = Runtime::builder()
        .driver(HttpFactory::new())
        .define(remote_def())
        .build()
        .unwrap();

    let err = runtime
        .execute(
            "remote",
            "item",
            &Request::new("s-1"),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}
