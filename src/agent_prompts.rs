//! Agent Prompts - instructions sent to the LLM agent
//!
//! The dataset description is static: the assistant answers questions about a
//! single retail table, so the schema is embedded in every SQL instruction
//! instead of being discovered at runtime.

use crate::athena::QueryResult;

pub const DATASET_URL: &str = "https://www.kaggle.com/datasets/vivek468/superstore-dataset-final";

/// System prompt attached to every agent call.
pub const AGENT_SYSTEM_PROMPT: &str = "You are a helpful data assistant. You can call tools to inspect Amazon Athena \
tables, run SQL, count letters, read the current time and evaluate arithmetic. Follow the user's output format \
instructions exactly.";

pub const DEFAULT_EXAMPLES: &str = "### Example questions

- fetch total orders across years
- fetch top 5 states with most number of sales
- show total sales and profit for the furniture category
";

/// Table described by `DEFAULT_SCHEMA`.
pub const DEFAULT_TABLE: &str = "super_store_data";

pub const DEFAULT_SCHEMA: &str = "#### Dataset: sample.super_store_data

A retail dataset of orders, customers, products, and sales metrics.

| column        | type   | description                          |
|---------------|--------|--------------------------------------|
| row id        | bigint | unique row identifier                 |
| order id      | string | unique order identifier               |
| order date    | string | order date (YYYY-MM-DD)               |
| ship date     | string | shipment date (YYYY-MM-DD)            |
| ship mode     | string | shipment method                       |
| customer id   | string | unique customer identifier            |
| customer name | string | customer full name                    |
| segment       | string | customer segment                      |
| country       | string | country                               |
| city          | string | city                                  |
| state         | string | state/province                        |
| postal code   | bigint | postal/zip code                       |
| region        | string | sales region                          |
| product id    | string | unique product identifier             |
| category      | string | product category                      |
| sub-category  | string | product sub-category                  |
| product name  | string | product display name                  |
| sales         | double | sales amount                          |
| quantity      | bigint | quantity sold                         |
| discount      | double | discount applied (0-1)                |
| profit        | double | profit amount                         |
";

/// Rows included in the explanation prompt.
const EXPLANATION_SAMPLE_ROWS: usize = 20;

/// Instruction asking the agent for a single fenced SQL statement.
pub fn build_sql_instruction(question: &str, max_rows: usize, fast_mode: bool) -> String {
    let discovery_rule = if fast_mode {
        "Do NOT use schema discovery tools (list_athena_tables, get_athena_table_schema); use only the provided schema."
    } else {
        "Prefer the provided schema; use discovery tools only if necessary."
    };

    format!(
        "You are a precise data assistant for Amazon Athena. {discovery_rule}\n\n\
Task: Produce ONLY the final SQL to answer the user's question. \
Use lowercase SQL keywords, but preserve the original casing of string literals (e.g., names like 'Sean Miller'). \
When filtering on user-provided names, use case-insensitive comparison (e.g., ILIKE or lower(column)=lower('value')). \
Do not execute tools. Output strictly as a fenced code block:\n\n```sql\n...\n```\n\n\
Provided schema and examples (for reference):\n{DEFAULT_SCHEMA}\n{DEFAULT_EXAMPLES}\n\n\
Max rows to return: {max_rows}. If not specified by the user, include an appropriate LIMIT.\n\
Date handling: do not cast raw strings directly to DATE. Use date(coalesce(try(date_parse(column, '%Y-%m-%d')), \
try(date_parse(column, '%m/%d/%Y')))) when converting string columns to dates. When comparing against a specific date, \
compare to date literals (e.g., date '2016-11-08') or parse the strings first.\n\
User question: {question}"
    )
}

/// Instruction asking the agent to summarise a finished query in prose.
pub fn build_explanation_instruction(question: &str, sql: &str, result: &QueryResult) -> String {
    let sample: Vec<_> = result
        .records()
        .into_iter()
        .take(EXPLANATION_SAMPLE_ROWS)
        .collect();
    let sample_json = serde_json::to_string(&sample).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Answer the user's question in 2-3 short sentences using only the query result below. \
Do not repeat the SQL and do not call tools.\n\n\
User question: {question}\n\
SQL executed:\n{sql}\n\
Result ({shown} of {total} rows, JSON records):\n{sample_json}",
        shown = sample.len(),
        total = result.rows.len(),
    )
}
