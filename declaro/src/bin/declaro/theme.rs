//! Colors and markers for everything the CLI prints.

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use colored::{Color, Colorize};
use comfy_table::{Attribute, Cell, Color as CellColor};

/// Separates a result property from the entity field it reads.
pub const BINDING_ARROW: &str = "<-";

const HEADING: Color = Color::Cyan;
const TITLE: Color = Color::BrightBlue;
const COMMAND: Color = Color::Magenta;
const MUTED: Color = Color::BrightBlack;

/// Kind of a status line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Success,
    Failure,
    Warning,
    Info,
    Detail,
}

impl Tone {
    pub fn marker(self) -> &'static str {
        match self {
            Tone::Success => "✓",
            Tone::Failure => "✗",
            Tone::Warning => "⚠",
            Tone::Info => "ℹ",
            Tone::Detail => "→",
        }
    }

    fn color(self) -> Color {
        match self {
            Tone::Success => Color::Green,
            Tone::Failure => Color::Red,
            Tone::Warning => Color::Yellow,
            Tone::Info => Color::Blue,
            Tone::Detail => MUTED,
        }
    }

    /// `marker message`, colored unless `plain`.
    pub fn line(self, message: &str, plain: bool) -> String {
        if plain {
            format!("{} {message}", self.marker())
        } else {
            let color = self.color();
            format!("{} {}", self.marker().color(color), message.color(color))
        }
    }
}

/// Outcome of compiling one manifest in a `check` report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestStatus {
    Compiled,
    Failed,
}

impl ManifestStatus {
    pub fn label(self) -> &'static str {
        match self {
            ManifestStatus::Compiled => "ok",
            ManifestStatus::Failed => "failed",
        }
    }

    pub fn cell(self, plain: bool) -> Cell {
        let cell = Cell::new(self.label());
        match (self, plain) {
            (_, true) => cell,
            (ManifestStatus::Compiled, false) => cell.fg(CellColor::Green),
            (ManifestStatus::Failed, false) => cell.fg(CellColor::Red).add_attribute(Attribute::Bold),
        }
    }
}

/// How a field takes part in its entity's mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRole {
    Identity,
    Version,
    Relation,
    Column,
}

impl FieldRole {
    pub fn cell(self, name: &str, plain: bool) -> Cell {
        let cell = Cell::new(name);
        match (self, plain) {
            (FieldRole::Column, _) | (_, true) => cell,
            (FieldRole::Identity, false) => cell.fg(CellColor::Yellow).add_attribute(Attribute::Bold),
            (FieldRole::Version, false) => cell.fg(CellColor::Magenta),
            (FieldRole::Relation, false) => cell.fg(CellColor::Cyan),
        }
    }
}

pub fn header_cell(text: &str, plain: bool) -> Cell {
    let cell = Cell::new(text).add_attribute(Attribute::Bold);
    if plain { cell } else { cell.fg(CellColor::Cyan) }
}

fn paint(text: &str, color: Color, bold: bool, plain: bool) -> String {
    match (plain, bold) {
        (true, _) => text.to_string(),
        (false, true) => text.color(color).bold().to_string(),
        (false, false) => text.color(color).to_string(),
    }
}

/// Section heading in help appendices and table output.
pub fn heading(text: &str, plain: bool) -> String {
    paint(text, HEADING, true, plain)
}

pub fn title(text: &str, plain: bool) -> String {
    paint(text, TITLE, true, plain)
}

/// A command line as typed by the user.
pub fn command(text: &str, plain: bool) -> String {
    paint(text, COMMAND, false, plain)
}

pub fn muted(text: &str, plain: bool) -> String {
    paint(text, MUTED, false, plain)
}

/// clap help colors, matching the appendix colors above.
pub fn help_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default().bold())
        .usage(AnsiColor::BrightBlue.on_default().bold())
        .literal(AnsiColor::Magenta.on_default())
        .placeholder(AnsiColor::BrightBlack.on_default())
        .error(AnsiColor::Red.on_default().bold())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_keep_markers() {
        assert_eq!(Tone::Success.line("3 manifests compiled", true), "✓ 3 manifests compiled");
        assert_eq!(Tone::Detail.line("compiling app.toml", true), "→ compiling app.toml");
    }

    #[test]
    fn test_plain_text_is_unstyled() {
        assert_eq!(heading("Examples:", true), "Examples:");
        assert_eq!(command("declaro check", true), "declaro check");
    }

    #[test]
    fn test_manifest_status_labels() {
        assert_eq!(ManifestStatus::Compiled.label(), "ok");
        assert_eq!(ManifestStatus::Failed.cell(true).content(), "failed");
        assert_eq!(FieldRole::Identity.cell("id", true).content(), "id");
    }
}
