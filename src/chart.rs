//! Vega-Lite chart construction from tabular results
//!
//! Chart data is built from result records with its own numeric coercion of
//! the measure column. Table records are left untouched: the table shows raw
//! cell strings, the chart sees numbers.

use crate::athena::{QueryResult, Record};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

const CHART_KEYWORDS: [&str; 10] = [
    "chart",
    "plot",
    "graph",
    "visualize",
    "visualisation",
    "visualization",
    "bar",
    "line",
    "scatter",
    "histogram",
];

/// Measure columns preferred for the y axis, in priority order.
const PREFERRED_Y_FIELDS: [&str; 8] = [
    "sales",
    "amount",
    "revenue",
    "profit",
    "count",
    "order count",
    "quantity",
    "total",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingType {
    Nominal,
    Quantitative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEncoding {
    pub field: String,
    #[serde(rename = "type")]
    pub encoding_type: EncodingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub x: FieldEncoding,
    pub y: FieldEncoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<FieldEncoding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub values: Vec<Record>,
}

/// A data-embedded Vega-Lite specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub data: ChartData,
    pub mark: String,
    pub encoding: Encoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChartSpec {
    /// Render as a fenced ```` ```vega-lite ```` block.
    pub fn to_fenced_block(&self) -> Result<String> {
        Ok(format!("```vega-lite\n{}\n```", serde_json::to_string(self)?))
    }
}

/// Explicit chart request for [`plot_from_result`].
#[derive(Debug, Clone)]
pub struct PlotRequest {
    pub x: String,
    pub y: String,
    pub mark: String,
    pub color: Option<String>,
    pub title: Option<String>,
}

/// True when the prompt mentions any charting keyword.
pub fn wants_chart(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    CHART_KEYWORDS.iter().any(|word| lowered.contains(word))
}

/// Chart-path conversion of a cell: strings with a `.` become floats, other
/// numeric strings integers, anything unparseable stays as it was.
pub fn coerce_chart_value(value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let raw = raw.trim();
    let coerced = if raw.contains('.') {
        raw.parse::<f64>().ok().and_then(Number::from_f64)
    } else if is_integer_literal(raw) {
        // Integers past i64 keep their magnitude as floats.
        raw.parse::<i64>()
            .ok()
            .map(Number::from)
            .or_else(|| raw.parse::<f64>().ok().and_then(Number::from_f64))
    } else {
        None
    };
    coerced.map(Value::Number).unwrap_or_else(|| value.clone())
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn looks_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) | Value::Bool(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// Pick axes heuristically and build a bar chart, or `None` when the records
/// do not offer both a category and a measure.
pub fn build_chart(records: &[Record]) -> Option<ChartSpec> {
    let sample = records.first()?;

    let y_field = PREFERRED_Y_FIELDS
        .iter()
        .find_map(|candidate| sample.keys().find(|key| key.to_lowercase() == *candidate))
        .or_else(|| {
            sample
                .iter()
                .find(|(_, value)| looks_numeric(value))
                .map(|(key, _)| key)
        })?
        .clone();
    let x_field = sample.keys().find(|key| **key != y_field)?.clone();

    let values = records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            if let Some(cell) = record.get_mut(&y_field) {
                *cell = coerce_chart_value(cell);
            }
            record
        })
        .collect();

    Some(ChartSpec {
        schema: VEGA_LITE_SCHEMA.to_string(),
        data: ChartData { values },
        mark: "bar".to_string(),
        encoding: Encoding {
            x: FieldEncoding {
                field: x_field,
                encoding_type: EncodingType::Nominal,
                sort: Some("-y".to_string()),
            },
            y: FieldEncoding {
                field: y_field,
                encoding_type: EncodingType::Quantitative,
                sort: None,
            },
            color: None,
        },
        title: None,
    })
}

/// Build a chart for explicitly named columns of a query result.
pub fn plot_from_result(result: &QueryResult, request: &PlotRequest) -> ChartSpec {
    let column_index = |name: &str| -> Option<usize> {
        result
            .columns
            .iter()
            .position(|c| c == name)
            .or_else(|| {
                let lowered = name.to_lowercase();
                result.columns.iter().position(|c| c.to_lowercase() == lowered)
            })
    };
    let ix = column_index(&request.x).unwrap_or(0);
    let iy = column_index(&request.y).unwrap_or(0);
    let color = request.color.as_ref().map(|name| {
        let idx = column_index(name);
        if idx.is_none() {
            warn!("Color column '{}' not in result, encoding it without data", name);
        }
        (name.clone(), idx)
    });

    let cell = |row: &Vec<String>, idx: usize| {
        row.get(idx)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null)
    };

    let values: Vec<Record> = result
        .rows
        .iter()
        .map(|row| {
            let mut record = Record::new();
            record.insert(request.x.clone(), cell(row, ix));
            record.insert(request.y.clone(), coerce_chart_value(&cell(row, iy)));
            if let Some((name, Some(idx))) = &color {
                record.insert(name.clone(), cell(row, *idx));
            }
            record
        })
        .collect();

    let y_type = match values.first().and_then(|r| r.get(&request.y)) {
        Some(first) if !looks_numeric(first) => EncodingType::Nominal,
        _ => EncodingType::Quantitative,
    };

    ChartSpec {
        schema: VEGA_LITE_SCHEMA.to_string(),
        data: ChartData { values },
        mark: request.mark.clone(),
        encoding: Encoding {
            x: FieldEncoding {
                field: request.x.clone(),
                encoding_type: EncodingType::Nominal,
                sort: Some("-y".to_string()),
            },
            y: FieldEncoding {
                field: request.y.clone(),
                encoding_type: y_type,
                sort: None,
            },
            color: color.map(|(name, _)| FieldEncoding {
                field: name,
                encoding_type: EncodingType::Nominal,
                sort: None,
            }),
        },
        title: request.title.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::athena::records_from_table;
    use serde_json::json;

    fn table(columns: &[&str], rows: &[&[&str]]) -> (Vec<String>, Vec<Vec<String>>) {
        (
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_wants_chart_keywords() {
        assert!(wants_chart("Plot sales by region"));
        assert!(wants_chart("show a BAR of profit"));
        assert!(!wants_chart("total orders across years"));
    }

    #[test]
    fn test_table_keeps_strings_chart_coerces() {
        let (columns, rows) = table(&["region", "sales"], &[&["West", "120.50"], &["East", "98"]]);
        let records = records_from_table(&columns, &rows);
        assert_eq!(records[0]["sales"], json!("120.50"));

        let chart = build_chart(&records).unwrap();
        assert_eq!(chart.encoding.x.field, "region");
        assert_eq!(chart.encoding.y.field, "sales");
        assert_eq!(chart.data.values[0]["sales"], json!(120.5));
        assert_eq!(chart.data.values[1]["sales"], json!(98));
        assert!(chart.data.values[1]["sales"].is_i64());
        // source records untouched
        assert_eq!(records[1]["sales"], json!("98"));
    }

    #[test]
    fn test_preferred_name_beats_earlier_numeric_column() {
        let (columns, rows) = table(&["year", "state", "Sales"], &[&["2016", "Texas", "10"]]);
        let chart = build_chart(&records_from_table(&columns, &rows)).unwrap();
        assert_eq!(chart.encoding.y.field, "Sales");
        assert_eq!(chart.encoding.x.field, "year");
    }

    #[test]
    fn test_numeric_fallback_and_missing_axes() {
        let (columns, rows) = table(&["segment", "n"], &[&["Consumer", "5"]]);
        let chart = build_chart(&records_from_table(&columns, &rows)).unwrap();
        assert_eq!(chart.encoding.y.field, "n");

        let (columns, rows) = table(&["segment", "city"], &[&["Consumer", "Austin"]]);
        assert!(build_chart(&records_from_table(&columns, &rows)).is_none());

        let (columns, rows) = table(&["sales"], &[&["5"]]);
        assert!(build_chart(&records_from_table(&columns, &rows)).is_none());
        assert!(build_chart(&[]).is_none());
    }

    #[test]
    fn test_spec_serialization_shape() {
        let (columns, rows) = table(&["region", "sales"], &[&["West", "1"]]);
        let chart = build_chart(&records_from_table(&columns, &rows)).unwrap();
        let value = serde_json::to_value(&chart).unwrap();
        assert_eq!(value["$schema"], json!(VEGA_LITE_SCHEMA));
        assert_eq!(value["mark"], json!("bar"));
        assert_eq!(value["encoding"]["x"], json!({"field": "region", "type": "nominal", "sort": "-y"}));
        assert_eq!(value["encoding"]["y"], json!({"field": "sales", "type": "quantitative"}));
        assert!(value.get("title").is_none());
    }

    #[test]
    fn test_plot_from_result_with_color_and_title() {
        let (columns, rows) = table(
            &["State", "Category", "Profit"],
            &[&["Texas", "Furniture", "12.5"], &["Ohio", "Technology", "-3"]],
        );
        let result = QueryResult {
            columns,
            rows,
            query_execution_id: "q-1".to_string(),
        };
        let chart = plot_from_result(
            &result,
            &PlotRequest {
                x: "state".to_string(),
                y: "profit".to_string(),
                mark: "bar".to_string(),
                color: Some("category".to_string()),
                title: Some("Profit by state".to_string()),
            },
        );

        assert_eq!(chart.data.values[0]["state"], json!("Texas"));
        assert_eq!(chart.data.values[0]["profit"], json!(12.5));
        assert_eq!(chart.data.values[1]["profit"], json!(-3));
        assert_eq!(chart.data.values[1]["category"], json!("Technology"));
        assert_eq!(chart.encoding.y.encoding_type, EncodingType::Quantitative);
        assert_eq!(chart.title.as_deref(), Some("Profit by state"));

        let block = chart.to_fenced_block().unwrap();
        assert!(block.starts_with("```vega-lite\n{"));
        assert!(block.ends_with("}\n```"));
    }

    #[test]
    fn test_plot_keeps_color_encoding_for_unknown_column() {
        let (columns, rows) = table(&["state", "profit"], &[&["Texas", "12.5"]]);
        let result = QueryResult {
            columns,
            rows,
            query_execution_id: "q-3".to_string(),
        };
        let chart = plot_from_result(
            &result,
            &PlotRequest {
                x: "state".to_string(),
                y: "profit".to_string(),
                mark: "bar".to_string(),
                color: Some("segment".to_string()),
                title: None,
            },
        );

        let color = chart.encoding.color.as_ref().unwrap();
        assert_eq!(color.field, "segment");
        assert_eq!(color.encoding_type, EncodingType::Nominal);
        assert!(chart.data.values[0].get("segment").is_none());
    }

    #[test]
    fn test_coercion_trims_and_widens_integers() {
        assert_eq!(coerce_chart_value(&json!(" 42 ")), json!(42));
        assert_eq!(coerce_chart_value(&json!(" 3.5")), json!(3.5));
        assert_eq!(
            coerce_chart_value(&json!("123456789012345678901234")),
            json!(123456789012345678901234.0)
        );
        assert_eq!(coerce_chart_value(&json!("1e5")), json!("1e5"));
        assert_eq!(coerce_chart_value(&json!("n/a")), json!("n/a"));
        assert_eq!(coerce_chart_value(&json!("-")), json!("-"));
    }

    #[test]
    fn test_plot_marks_non_numeric_measure_nominal() {
        let result = QueryResult {
            columns: vec!["segment".to_string(), "label".to_string()],
            rows: vec![vec!["Consumer".to_string(), "high".to_string()]],
            query_execution_id: "q-2".to_string(),
        };
        let chart = plot_from_result(
            &result,
            &PlotRequest {
                x: "segment".to_string(),
                y: "label".to_string(),
                mark: "line".to_string(),
                color: None,
                title: None,
            },
        );
        assert_eq!(chart.encoding.y.encoding_type, EncodingType::Nominal);
        assert_eq!(chart.mark, "line");
        assert!(chart.encoding.color.is_none());
    }
}
