mod commands;
mod context;
mod examples;
mod output;
mod theme;

use anyhow::Result;
use clap::{ColorChoice, Command, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::control::ShouldColorize;
use std::fmt::Write;

use commands::{
    check::{CheckArgs, handle_check},
    entities::{EntitiesArgs, handle_entities},
    schema::{SchemaArgs, handle_schema},
    search::{SearchArgs, handle_search},
};
use context::ProjectContext;
use examples::{ExampleGroup, command_examples};
use output::{GlobalOptions, OutputFormat, OutputManager};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[("RUST_LOG", "Log filter for compile tracing (e.g. declaro=debug)")];

#[derive(Parser)]
#[command(name = "declaro")]
#[command(version)]
#[command(
    about = "Inspect and validate declaro metadata manifests",
    long_about = r#"Metadata compiler CLI for declaro manifests that provides:

• Entity metadata as registered (tables, columns, identity and version fields)
• Query-method return shapes with their field bindings and ordering
• Search descriptor evaluation into request bodies for the search backend
• Bulk validation of every manifest in a directory

Commands:
  entities  List compiled entity metadata
  schema    List compiled query-method schemas
  search    Evaluate a search descriptor against a JSON instance
  check     Compile every manifest under a directory
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format (defaults to `default_output` in declaro.toml, then table)
    #[arg(long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parses arguments with themed help and per-command example appendices.
    fn parse_themed() -> Self {
        let matches = build_cli_command().get_matches();
        Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
    }
}

fn build_cli_command() -> Command {
    let plain = !ShouldColorize::from_env().should_colorize();
    let mut command = Cli::command()
        .styles(theme::help_styles())
        .color(if plain { ColorChoice::Never } else { ColorChoice::Auto })
        .after_long_help(render_top_level_appendix(plain));

    for example in command_examples() {
        command = command.mut_subcommand(example.name, |subcommand| {
            subcommand.after_long_help(render_examples(example.groups, plain))
        });
    }
    command
}

fn render_examples(groups: &[ExampleGroup], plain: bool) -> String {
    let mut buffer = String::new();
    let _ = writeln!(buffer, "{}", theme::heading("Examples:", plain));

    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(buffer, "  {}", theme::title(group.title, plain));
        for line in group.commands {
            let _ = writeln!(buffer, "    {}", theme::command(line, plain));
        }
        if index + 1 < groups.len() {
            buffer.push('\n');
        }
    }

    buffer
}

fn render_top_level_appendix(plain: bool) -> String {
    let mut buffer = String::new();

    let _ = writeln!(buffer, "{}", theme::heading("Environment Variables:", plain));
    for (key, description) in ENVIRONMENT_VARIABLES {
        let _ = writeln!(buffer, "  {}  {description}", theme::title(key, plain));
    }

    let _ = writeln!(
        buffer,
        "\n{} {}",
        theme::heading("Tip:", plain),
        theme::muted("Use 'declaro <command> --help' to view examples for each command.", plain)
    );

    buffer
}

#[derive(Subcommand)]
enum Commands {
    /// List compiled entity metadata
    Entities(EntitiesArgs),

    /// List compiled query-method schemas
    Schema(SchemaArgs),

    /// Evaluate a search descriptor against a JSON instance
    Search(SearchArgs),

    /// Compile every manifest under a directory
    Check(CheckArgs),
}

fn main() {
    env_logger::init();

    let cli = Cli::parse_themed();
    let no_color = cli.no_color;

    if let Err(err) = execute(cli) {
        let output = OutputManager::new(GlobalOptions {
            no_color,
            ..Default::default()
        });
        output.error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<()> {
    let ctx = ProjectContext::find()?;

    let global_options = GlobalOptions {
        output_format: cli.output.or_else(|| ctx.default_output()).unwrap_or_default(),
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    };
    let output = OutputManager::new(global_options);

    if ctx.config.is_some() {
        output.verbose(&format!("using project config in {}", ctx.project_root.display()));
    }

    match cli.command {
        Commands::Entities(args) => handle_entities(args, &ctx, &output)?,
        Commands::Schema(args) => handle_schema(args, &ctx, &output)?,
        Commands::Search(args) => handle_search(args, &ctx, &output)?,
        Commands::Check(args) => handle_check(args, &ctx, &output)?,
    }

    Ok(())
}
