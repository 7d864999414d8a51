//! Table Output Formatting

use colored::Colorize;
use litegate_client::{Row, Value};
use tabled::{builder::Builder, settings::Style};

/// Renders one value as a table cell
fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".dimmed().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Bytes(b) => format!("x'{}'", hex::encode_upper(b)),
        Value::Sequence(_) | Value::Map(_) => super::json::value_to_json(value).to_string(),
    }
}

/// Format result rows as a table
///
/// Columns follow the first row; any column that only appears in later
/// rows is appended after them.
pub fn format_rows_table(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "No rows returned".to_string();
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }

    let mut builder = Builder::default();

    // Add header
    builder.push_record(columns.iter().map(|c| c.bold().to_string()));

    // Add rows
    for row in rows {
        builder.push_record(columns.iter().map(|c| match row.get(c) {
            Some(value) => format_cell(value),
            None => String::new(),
        }));
    }

    let mut output = builder.build().with(Style::modern()).to_string();
    output.push_str(&format!(
        "\n{} row{}",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" }
    ));
    output
}

/// Format stored key digests as a table
pub fn format_digests_table(digests: &[String]) -> String {
    if digests.is_empty() {
        return "No access keys stored (server admits any client)"
            .yellow()
            .to_string();
    }

    let mut builder = Builder::default();

    // Add header
    builder.push_record(vec!["#", "SHA-256 Digest"]);

    // Add rows with index
    for (idx, digest) in digests.iter().enumerate() {
        builder.push_record(vec![(idx + 1).to_string(), digest.clone()]);
    }

    builder.build().with(Style::modern()).to_string()
}
