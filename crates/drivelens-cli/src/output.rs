//! Output formatting for CLI commands
//!
//! Human output writes plain lines; JSON output serializes the result
//! value so scripts can consume it.

use serde::Serialize;

/// How command results are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Prints a result value in the selected format
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, human: impl FnOnce(&T)) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("could not serialize output: {err}"),
        },
        OutputFormat::Human => human(value),
    }
}
