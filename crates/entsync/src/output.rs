//! Output formatting: table and JSON.
//!
//! Entities are schemaless JSON objects, so the table view derives its
//! columns from the union of keys in first-seen order.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stderr().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// A one-line summary written to stderr, so stdout stays parseable.
pub fn print_summary(message: &str, color: bool, quiet: bool) {
    if quiet {
        return;
    }
    let mut stderr = io::stderr().lock();
    if color {
        let _ = writeln!(stderr, "{}", message.dimmed());
    } else {
        let _ = writeln!(stderr, "{message}");
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of entities in the chosen format.
pub fn render_entities(format: &OutputFormat, entities: &[Value]) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(render_table(entities)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(entities)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(entities)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn columns(entities: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in entities.iter().filter_map(Value::as_object).flat_map(|o| o.keys()) {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.clone());
        }
    }
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render_table(entities: &[Value]) -> String {
    let columns = columns(entities);
    if columns.is_empty() {
        return String::new();
    }
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.to_uppercase()));
    for entity in entities {
        builder.push_record(columns.iter().map(|c| cell(entity.get(c))));
    }
    builder.build().with(Style::rounded()).to_string()
}
