//! Tools exposed to the LLM agent
//!
//! Each tool is described to the model as a JSON-schema function and executed
//! here when the model calls it. The Athena tools are thin pass-throughs to the
//! shared [`QueryClient`].

pub mod calculator;

use crate::athena::{QueryClient, QueryOptions};
use crate::chart::{plot_from_result, PlotRequest};
use crate::error::{PilotError, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub parameter_type: ParameterType,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    Integer,
    Number,
}

impl ParameterType {
    fn json_type(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
        }
    }
}

impl Tool {
    /// Function definition in the chat-completions `tools` format.
    pub fn to_function_definition(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                json!({"type": p.parameter_type.json_type(), "description": p.description}),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

fn param(name: &str, description: &str, parameter_type: ParameterType, required: bool) -> ToolParameter {
    ToolParameter {
        name: name.to_string(),
        description: description.to_string(),
        parameter_type,
        required,
    }
}

/// Parameters shared by every tool that runs a query.
fn routing_params() -> Vec<ToolParameter> {
    vec![
        param("database", "Athena database (defaults to the configured one)", ParameterType::String, false),
        param("workgroup", "Athena workgroup", ParameterType::String, false),
        param("output_location", "S3 location for query results", ParameterType::String, false),
        param("region_name", "AWS region", ParameterType::String, false),
    ]
}

#[derive(Debug, Deserialize)]
struct LetterCounterArgs {
    #[serde(default)]
    word: Value,
    #[serde(default)]
    letter: Value,
}

#[derive(Debug, Deserialize)]
struct CurrentTimeArgs {
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    expression: String,
}

#[derive(Debug, Deserialize)]
struct ListTablesArgs {
    database: Option<String>,
    catalog: Option<String>,
    region_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchemaArgs {
    table: String,
    database: Option<String>,
    catalog: Option<String>,
    region_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryArgs {
    sql: String,
    database: Option<String>,
    workgroup: Option<String>,
    output_location: Option<String>,
    region_name: Option<String>,
    #[serde(default = "default_query_rows")]
    max_rows: usize,
}

#[derive(Debug, Deserialize)]
struct PlotArgs {
    sql: String,
    x: String,
    y: String,
    #[serde(default = "default_mark")]
    mark: String,
    color: Option<String>,
    title: Option<String>,
    database: Option<String>,
    workgroup: Option<String>,
    output_location: Option<String>,
    region_name: Option<String>,
    #[serde(default = "default_plot_rows")]
    max_rows: usize,
}

fn default_query_rows() -> usize {
    100
}

fn default_plot_rows() -> usize {
    500
}

fn default_mark() -> String {
    "bar".to_string()
}

/// Count case-insensitive occurrences of a single-character `letter` in `word`.
pub fn letter_counter(word: &str, letter: &str) -> Result<usize> {
    if letter.chars().count() != 1 {
        return Err(PilotError::Validation(
            "The 'letter' parameter must be a single character".to_string(),
        ));
    }
    Ok(word.to_lowercase().matches(&letter.to_lowercase()).count())
}

/// `now` rendered as RFC 3339 in the named IANA zone.
pub fn current_time_at(now: DateTime<Utc>, timezone: &str) -> Result<String> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| PilotError::Validation(format!("Unknown timezone '{}'", timezone)))?;
    Ok(now.with_timezone(&tz).to_rfc3339())
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    // Models sometimes send `null` instead of `{}` for tools without arguments.
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments)
        .map_err(|e| PilotError::Validation(format!("Invalid arguments for {}: {}", tool, e)))
}

pub struct ToolRegistry {
    client: Arc<QueryClient>,
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new(client: Arc<QueryClient>) -> Self {
        let mut registry = Self {
            client,
            tools: Vec::new(),
        };
        registry.register_tools();
        registry
    }

    fn register_tools(&mut self) {
        self.tools.push(Tool {
            name: "letter_counter".to_string(),
            description: "Count occurrences of a specific letter in a word.".to_string(),
            parameters: vec![
                param("word", "The input word to search in", ParameterType::String, true),
                param("letter", "The single letter to count", ParameterType::String, true),
            ],
        });

        self.tools.push(Tool {
            name: "current_time".to_string(),
            description: "Get the current time in ISO 8601 format for a timezone.".to_string(),
            parameters: vec![param(
                "timezone",
                "IANA timezone name, e.g. 'UTC' or 'America/New_York' (default UTC)",
                ParameterType::String,
                false,
            )],
        });

        self.tools.push(Tool {
            name: "calculator".to_string(),
            description: "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, pi, e and \
                          sqrt, abs, ln, log, exp, sin, cos, tan, floor, ceil, round, min, max."
                .to_string(),
            parameters: vec![param("expression", "The expression to evaluate", ParameterType::String, true)],
        });

        self.tools.push(Tool {
            name: "list_athena_tables".to_string(),
            description: "List the tables of an Athena database.".to_string(),
            parameters: vec![
                param("database", "Athena database (defaults to the configured one)", ParameterType::String, false),
                param("catalog", "Data catalog name", ParameterType::String, false),
                param("region_name", "AWS region", ParameterType::String, false),
            ],
        });

        self.tools.push(Tool {
            name: "get_athena_table_schema".to_string(),
            description: "Return a mapping of column name to type for an Athena table, partition keys included."
                .to_string(),
            parameters: vec![
                param("table", "Table name", ParameterType::String, true),
                param("database", "Athena database (defaults to the configured one)", ParameterType::String, false),
                param("catalog", "Data catalog name", ParameterType::String, false),
                param("region_name", "AWS region", ParameterType::String, false),
            ],
        });

        let mut run_params = vec![param("sql", "The SQL statement to run", ParameterType::String, true)];
        run_params.extend(routing_params());
        run_params.push(param("max_rows", "Maximum rows to return (default 100)", ParameterType::Integer, false));
        self.tools.push(Tool {
            name: "run_athena_query".to_string(),
            description: "Run SQL on Athena and return {columns, rows, query_execution_id}.".to_string(),
            parameters: run_params,
        });

        let mut plot_params = vec![
            param("sql", "The SQL statement producing the chart data", ParameterType::String, true),
            param("x", "Column for the x axis", ParameterType::String, true),
            param("y", "Column for the y axis", ParameterType::String, true),
            param("mark", "Vega-Lite mark type (default bar)", ParameterType::String, false),
            param("color", "Optional column for color encoding", ParameterType::String, false),
            param("title", "Optional chart title", ParameterType::String, false),
        ];
        plot_params.extend(routing_params());
        plot_params.push(param("max_rows", "Maximum rows to plot (default 500)", ParameterType::Integer, false));
        self.tools.push(Tool {
            name: "plot_vegalite_from_query".to_string(),
            description: "Run SQL on Athena and return a Vega-Lite chart as a ```vega-lite fenced block.".to_string(),
            parameters: plot_params,
        });
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn function_definitions(&self) -> Vec<Value> {
        self.tools.iter().map(Tool::to_function_definition).collect()
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        info!("Executing tool {}", name);
        debug!("Tool arguments: {}", arguments);

        match name {
            "letter_counter" => {
                let args: LetterCounterArgs = parse_args(name, arguments)?;
                match (args.word.as_str(), args.letter.as_str()) {
                    (Some(word), Some(letter)) => Ok(json!(letter_counter(word, letter)?)),
                    _ => Ok(json!(0)),
                }
            }
            "current_time" => {
                let args: CurrentTimeArgs = parse_args(name, arguments)?;
                let timezone = args.timezone.as_deref().unwrap_or("UTC");
                Ok(json!(current_time_at(Utc::now(), timezone)?))
            }
            "calculator" => {
                let args: CalculatorArgs = parse_args(name, arguments)?;
                Ok(number_value(calculator::evaluate(&args.expression)?))
            }
            "list_athena_tables" => {
                let args: ListTablesArgs = parse_args(name, arguments)?;
                let tables = self
                    .client
                    .list_tables(
                        args.database.as_deref(),
                        args.catalog.as_deref(),
                        args.region_name.as_deref(),
                    )
                    .await?;
                Ok(json!(tables))
            }
            "get_athena_table_schema" => {
                let args: TableSchemaArgs = parse_args(name, arguments)?;
                let schema = self
                    .client
                    .get_table_schema(
                        &args.table,
                        args.database.as_deref(),
                        args.catalog.as_deref(),
                        args.region_name.as_deref(),
                    )
                    .await?;
                Ok(Value::Object(schema))
            }
            "run_athena_query" => {
                let args: RunQueryArgs = parse_args(name, arguments)?;
                let options = QueryOptions {
                    database: args.database,
                    workgroup: args.workgroup,
                    output_location: args.output_location,
                    region: args.region_name,
                    max_rows: args.max_rows,
                };
                let result = self.client.run_query(&args.sql, &options).await?;
                Ok(serde_json::to_value(result)?)
            }
            "plot_vegalite_from_query" => {
                let args: PlotArgs = parse_args(name, arguments)?;
                let options = QueryOptions {
                    database: args.database,
                    workgroup: args.workgroup,
                    output_location: args.output_location,
                    region: args.region_name,
                    max_rows: args.max_rows,
                };
                let result = self.client.run_query(&args.sql, &options).await?;
                let chart = plot_from_result(
                    &result,
                    &PlotRequest {
                        x: args.x,
                        y: args.y,
                        mark: args.mark,
                        color: args.color,
                        title: args.title,
                    },
                );
                Ok(json!(chart.to_fenced_block()?))
            }
            other => Err(PilotError::Validation(format!("Unknown tool: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_letter_counter_is_case_insensitive() {
        assert_eq!(letter_counter("Strawberry", "R").unwrap(), 3);
        assert_eq!(letter_counter("", "a").unwrap(), 0);
        assert!(matches!(
            letter_counter("word", "ab"),
            Err(PilotError::Validation(_))
        ));
        assert!(letter_counter("word", "").is_err());
    }

    #[test]
    fn test_current_time_in_zone() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(current_time_at(now, "UTC").unwrap(), "2024-01-15T12:00:00+00:00");
        assert_eq!(
            current_time_at(now, "Asia/Kolkata").unwrap(),
            "2024-01-15T17:30:00+05:30"
        );
        assert!(current_time_at(now, "Mars/Olympus").is_err());
    }

    #[test]
    fn test_number_value_prefers_integers() {
        assert_eq!(number_value(4.0), json!(4));
        assert_eq!(number_value(0.5), json!(0.5));
    }

    #[test]
    fn test_function_definition_shape() {
        let tool = Tool {
            name: "letter_counter".to_string(),
            description: "Count letters".to_string(),
            parameters: vec![
                param("word", "w", ParameterType::String, true),
                param("limit", "l", ParameterType::Integer, false),
            ],
        };
        let def = tool.to_function_definition();
        assert_eq!(def["type"], json!("function"));
        assert_eq!(def["function"]["name"], json!("letter_counter"));
        assert_eq!(def["function"]["parameters"]["required"], json!(["word"]));
        assert_eq!(
            def["function"]["parameters"]["properties"]["limit"]["type"],
            json!("integer")
        );
    }
}
