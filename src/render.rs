//! Terminal rendering of results and chat messages.

use crate::conversation::{ChatMessage, Role};
use crate::error::{PilotError, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.to_vec());
    for row in rows {
        table.add_row(row.clone());
    }
    table.to_string()
}

pub fn render_csv(columns: &[String], rows: &[Vec<String>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let write_err = |e: csv::Error| PilotError::Io(std::io::Error::new(std::io::ErrorKind::Other, e));
    writer.write_record(columns).map_err(write_err)?;
    for row in rows {
        writer.write_record(row).map_err(write_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PilotError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Everything an assistant message carries, in display order: table, chart,
/// text, cost caption.
pub fn render_message(message: &ChatMessage) -> String {
    let mut sections: Vec<String> = Vec::new();

    if message.role == Role::Assistant {
        if let Some(table) = &message.table {
            if !table.rows.is_empty() {
                sections.push(render_table(&table.columns, &table.rows));
            }
        }
        if let Some(chart) = &message.vega_spec {
            if let Ok(block) = chart.to_fenced_block() {
                sections.push(block);
            }
        }
    }

    if !message.content.is_empty() {
        sections.push(message.content.clone());
    }

    if let Some(cost) = &message.llm_cost {
        sections.push(cost.caption());
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::TableData;
    use crate::cost::LlmCost;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_table_contains_cells() {
        let rendered = render_table(&strings(&["region", "sales"]), &[strings(&["West", "120.50"])]);
        assert!(rendered.contains("region"));
        assert!(rendered.contains("120.50"));
    }

    #[test]
    fn test_csv_quotes_when_needed() {
        let csv = render_csv(&strings(&["city", "n"]), &[strings(&["Austin, TX", "3"])]).unwrap();
        assert_eq!(csv, "city,n\n\"Austin, TX\",3\n");
    }

    #[test]
    fn test_error_message_renders_content_only() {
        let rendered = render_message(&ChatMessage::assistant("Error: boom"));
        assert_eq!(rendered, "Error: boom");
    }

    #[test]
    fn test_assistant_message_sections() {
        let mut message = ChatMessage::assistant("Results shown above.");
        message.table = Some(TableData {
            columns: strings(&["n"]),
            rows: vec![strings(&["1"])],
        });
        message.llm_cost = Some(LlmCost::from_tokens(100, 10));

        let rendered = render_message(&message);
        let table_at = rendered.find('1').unwrap();
        let text_at = rendered.find("Results shown above.").unwrap();
        let cost_at = rendered.find("Estimated LLM cost").unwrap();
        assert!(table_at < text_at && text_at < cost_at);
    }
}
