use anyhow::Result;
use clap::ValueEnum;
use comfy_table::Table;
use serde::{Deserialize, Serialize};

use crate::theme::{self, Tone};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table or a compact line
pub trait TableDisplay {
    fn to_table(&self, output: &OutputManager) -> Table;
    fn to_compact(&self) -> String;
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        if options.no_color {
            colored::control::set_override(false);
        }
        Self { options }
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(self);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    /// True when human-oriented messages should be printed alongside data
    pub fn is_decorated(&self) -> bool {
        !self.options.quiet && self.options.output_format == OutputFormat::Table
    }

    pub fn success(&self, message: &str) {
        if self.is_decorated() {
            println!("{}", Tone::Success.line(message, self.options.no_color));
        }
    }

    /// Errors are printed regardless of `--quiet`
    pub fn error(&self, message: &str) {
        eprintln!("{}", Tone::Failure.line(message, self.options.no_color));
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            eprintln!("{}", Tone::Warning.line(message, self.options.no_color));
        }
    }

    /// Only shown with `--verbose`
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{}", Tone::Detail.line(message, self.options.no_color));
        }
    }

    pub fn info(&self, message: &str) {
        if self.is_decorated() {
            println!("{}", Tone::Info.line(message, self.options.no_color));
        }
    }

    pub fn heading(&self, text: &str) {
        if self.is_decorated() {
            if self.options.no_color {
                println!("\n{text}\n{}", "=".repeat(text.chars().count()));
            } else {
                println!("\n{}", theme::title(text, false));
            }
        }
    }

    pub fn create_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(if self.options.no_color {
            comfy_table::presets::ASCII_FULL
        } else {
            comfy_table::presets::UTF8_FULL_CONDENSED
        });
        table
    }

    pub fn add_table_header(&self, table: &mut Table, headers: &[&str]) {
        table.set_header(
            headers
                .iter()
                .map(|header| theme::header_cell(header, self.options.no_color))
                .collect::<Vec<_>>(),
        );
    }
}

/// Text form of a serde-renamed enum (`many_to_one`, `date_time`, ...).
pub fn serde_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(label)) => label,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

/// `-` for missing values in table cells.
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfy_table::Cell;
    use declaro::types::{DataType, RelationKind};

    #[derive(Serialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    impl TableDisplay for TestData {
        fn to_table(&self, output: &OutputManager) -> Table {
            let mut table = output.create_table();
            output.add_table_header(&mut table, &["Name", "Value"]);
            table.add_row(vec![Cell::new(&self.name), Cell::new(self.value.to_string())]);
            table
        }

        fn to_compact(&self) -> String {
            format!("{}={}", self.name, self.value)
        }
    }

    fn data() -> TestData {
        TestData {
            name: "test".to_string(),
            value: 42,
        }
    }

    #[test]
    fn test_output_manager_json() {
        let manager = OutputManager::new(GlobalOptions {
            output_format: OutputFormat::Json,
            ..Default::default()
        });
        assert!(manager.display(&data()).is_ok());
        assert!(!manager.is_decorated());
    }

    #[test]
    fn test_output_manager_quiet() {
        let manager = OutputManager::new(GlobalOptions {
            quiet: true,
            ..Default::default()
        });
        assert!(manager.display(&data()).is_ok());
        assert!(!manager.is_decorated());
    }

    #[test]
    fn test_table_rendering_contains_values() {
        let manager = OutputManager::new(GlobalOptions {
            no_color: true,
            ..Default::default()
        });
        let rendered = data().to_table(&manager).to_string();
        assert!(rendered.contains("Name"));
        assert!(rendered.contains("42"));
        assert_eq!(data().to_compact(), "test=42");
    }

    #[test]
    fn test_serde_label() {
        assert_eq!(serde_label(&RelationKind::ManyToOne), "many_to_one");
        assert_eq!(serde_label(&DataType::DateTime), "date_time");
        assert_eq!(or_dash(None), "-");
        assert_eq!(or_dash(Some("ID")), "ID");
    }
}
