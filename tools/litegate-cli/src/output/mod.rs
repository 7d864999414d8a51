//! Output Formatting
//!
//! This module provides the output formats for query results and key listings.

pub mod json;
pub mod table;

/// Output format selection
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact JSON (one line)
    JsonCompact,
}
