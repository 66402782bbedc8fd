mod common;

use common::*;
use insight_pilot::athena::service::TableDescription;
use insight_pilot::tools::ToolRegistry;
use insight_pilot::PilotError;
use serde_json::{json, Value};
use std::sync::Arc;

fn registry() -> (Arc<FakeFactory>, ToolRegistry) {
    let query = FakeQuery::succeeding(
        &["category", "profit"],
        vec![vec![
            vec!["category", "profit"],
            vec!["Technology", "145454.95"],
            vec!["Office Supplies", "122490.80"],
            vec!["Furniture", "18451.27"],
        ]],
    );
    let catalog = FakeCatalog {
        table_pages: vec![strings(&["super_store_data"])],
        description: TableDescription {
            columns: vec![("category".to_string(), "string".to_string())],
            partition_keys: Vec::new(),
        },
    };
    let factory = FakeFactory::new(query, catalog);
    let registry = ToolRegistry::new(Arc::new(client_for(&factory)));
    (factory, registry)
}

#[test]
fn test_every_tool_is_advertised() {
    let (_, registry) = registry();
    let names: Vec<&str> = registry.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "letter_counter",
            "current_time",
            "calculator",
            "list_athena_tables",
            "get_athena_table_schema",
            "run_athena_query",
            "plot_vegalite_from_query",
        ]
    );

    let definitions = registry.function_definitions();
    let run = &definitions[5]["function"];
    assert_eq!(run["name"], json!("run_athena_query"));
    assert_eq!(run["parameters"]["required"], json!(["sql"]));
    assert_eq!(run["parameters"]["properties"]["max_rows"]["type"], json!("integer"));
}

#[tokio::test]
async fn test_run_athena_query_tool() {
    let (factory, registry) = registry();

    let output = registry
        .execute(
            "run_athena_query",
            json!({"sql": "SELECT category, SUM(profit) AS profit FROM super_store_data GROUP BY 1", "max_rows": 2, "workgroup": "analysts"}),
        )
        .await
        .unwrap();

    assert_eq!(output["columns"], json!(["category", "profit"]));
    assert_eq!(
        output["rows"],
        json!([["Technology", "145454.95"], ["Office Supplies", "122490.80"]])
    );
    assert_eq!(output["query_execution_id"], json!("q-1"));
    let request = factory.query.last_request().unwrap();
    assert_eq!(request.workgroup.as_deref(), Some("analysts"));
}

#[tokio::test]
async fn test_plot_tool_returns_vega_lite_block() {
    let (_, registry) = registry();

    let output = registry
        .execute(
            "plot_vegalite_from_query",
            json!({"sql": "SELECT category, profit FROM t", "x": "Category", "y": "profit", "title": "Profit by category"}),
        )
        .await
        .unwrap();

    let block = output.as_str().unwrap();
    assert!(block.starts_with("```vega-lite\n"));
    assert!(block.ends_with("\n```"));

    let body = block
        .trim_start_matches("```vega-lite\n")
        .trim_end_matches("\n```");
    let spec: Value = serde_json::from_str(body).unwrap();
    assert_eq!(spec["mark"], json!("bar"));
    assert_eq!(spec["title"], json!("Profit by category"));
    assert_eq!(spec["encoding"]["x"]["field"], json!("Category"));
    assert_eq!(spec["data"]["values"][0]["Category"], json!("Technology"));
    assert_eq!(spec["encoding"]["y"]["type"], json!("quantitative"));
    assert_eq!(spec["data"]["values"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_catalog_tools() {
    let (_, registry) = registry();

    let tables = registry.execute("list_athena_tables", json!({})).await.unwrap();
    assert_eq!(tables, json!(["super_store_data"]));

    let schema = registry
        .execute("get_athena_table_schema", json!({"table": "super_store_data"}))
        .await
        .unwrap();
    assert_eq!(schema, json!({"category": "string"}));
}

#[tokio::test]
async fn test_local_tools() {
    let (_, registry) = registry();

    let count = registry
        .execute("letter_counter", json!({"word": "Strawberry", "letter": "r"}))
        .await
        .unwrap();
    assert_eq!(count, json!(3));

    let count = registry
        .execute("letter_counter", json!({"word": 42, "letter": "r"}))
        .await
        .unwrap();
    assert_eq!(count, json!(0));

    let err = registry
        .execute("letter_counter", json!({"word": "apple", "letter": "pp"}))
        .await
        .unwrap_err();
    assert!(matches!(err, PilotError::Validation(_)));

    let sum = registry
        .execute("calculator", json!({"expression": "(2 + 3) * 4"}))
        .await
        .unwrap();
    assert_eq!(sum.as_f64(), Some(20.0));

    let now = registry.execute("current_time", Value::Null).await.unwrap();
    assert!(now.as_str().unwrap().ends_with("+00:00"));
}

#[tokio::test]
async fn test_calculator_rejects_runaway_nesting() {
    let (_, registry) = registry();
    let expression = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));

    let err = registry
        .execute("calculator", json!({ "expression": expression }))
        .await
        .unwrap_err();
    assert!(matches!(err, PilotError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_tool_is_rejected() {
    let (_, registry) = registry();
    let err = registry.execute("drop_table", json!({})).await.unwrap_err();
    assert!(matches!(err, PilotError::Validation(_)));
}
