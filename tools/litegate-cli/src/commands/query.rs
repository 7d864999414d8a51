//! Query Command
//!
//! Runs one statement against a running server through the client library.

use crate::error::{CliError, CliResult};
use crate::output::{json, table, OutputFormat};
use clap::Args;
use litegate_client::{GateClient, Map, Value};
use litegate_core::config::{socket_addr, DEFAULT_PORT};

/// Execute a statement on a running server
#[derive(Debug, Args)]
pub struct QueryCommand {
    /// SQL statement
    pub statement: String,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Access key printed by `litegate keygen`
    #[arg(short, long)]
    pub key: Option<String>,

    /// Positional argument as JSON (repeatable, in order)
    #[arg(long = "arg", value_name = "JSON")]
    pub args: Vec<String>,

    /// Named argument as NAME=JSON (repeatable)
    #[arg(long = "param", value_name = "NAME=JSON")]
    pub params: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl QueryCommand {
    pub async fn execute(self) -> CliResult<()> {
        let positional = self
            .args
            .iter()
            .map(|raw| parse_json_value(raw))
            .collect::<CliResult<Vec<_>>>()?;

        let mut keyword = Map::new();
        for raw in &self.params {
            let (name, value) = parse_param(raw)?;
            keyword.insert(name, value);
        }

        let addr = socket_addr(&self.host, self.port);
        let mut client = GateClient::connect(addr, self.key.as_deref()).await?;
        let rows = client
            .execute(&self.statement, positional, keyword)
            .await?;
        client.close().await?;

        let output = match self.format {
            OutputFormat::Table => table::format_rows_table(&rows),
            OutputFormat::Json => json::format_rows_json(&rows, true)?,
            OutputFormat::JsonCompact => json::format_rows_json(&rows, false)?,
        };

        println!("{}", output);
        Ok(())
    }
}

/// Parses `NAME=JSON`
fn parse_param(raw: &str) -> CliResult<(String, Value)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => {
            let name = name.trim_start_matches([':', '@', '$']);
            Ok((name.to_string(), parse_json_value(value)?))
        }
        _ => Err(CliError::InvalidParam {
            input: raw.to_string(),
        }),
    }
}

/// Parses a JSON literal into a bindable value
pub fn parse_json_value(raw: &str) -> CliResult<Value> {
    let json: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| CliError::invalid_json(raw, e))?;
    from_json(json).map_err(|e| CliError::invalid_json(raw, e))
}

fn from_json(json: serde_json::Value) -> Result<Value, String> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64().filter(|_| !n.is_u64()) {
                Value::Float(f)
            } else {
                return Err(format!("{n} does not fit in a 64-bit signed integer"));
            }
        }
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => Value::Sequence(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_json::Value::Object(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k, from_json(v)?);
            }
            Value::Map(map)
        }
    })
}
