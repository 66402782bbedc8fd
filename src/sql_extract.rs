//! Pull the statement to execute out of free-form model output.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_SQL: Regex = Regex::new(r"(?i)```sql\s*([\s\S]*?)\s*```").unwrap();
    static ref BARE_SELECT: Regex = Regex::new(r"(?i)\bselect\b[\s\S]+").unwrap();
}

/// Returns the SQL found in `raw_text`, or an empty string when there is none.
///
/// A fenced ```` ```sql ```` block wins; otherwise everything from the first
/// standalone `select` keyword to the end of the text is taken.
pub fn extract_sql(raw_text: &str) -> String {
    if let Some(inner) = FENCED_SQL.captures(raw_text).and_then(|c| c.get(1)) {
        return inner.as_str().trim().to_string();
    }
    BARE_SELECT
        .find(raw_text)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}
