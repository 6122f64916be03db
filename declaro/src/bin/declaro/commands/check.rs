use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};
use declaro::Manifest;
use serde::Serialize;
use walkdir::WalkDir;

use crate::context::{CONFIG_FILE, ProjectContext};
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay, or_dash};
use crate::theme::ManifestStatus;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Manifest Validation",
    commands: &[
        "declaro check                 # Every manifest under the configured manifests directory",
        "declaro check schema/         # Every *.toml under schema/",
        "declaro --quiet check         # Exit status only",
    ],
}];

#[derive(Args)]
pub struct CheckArgs {
    /// Directory to scan (defaults to the configured manifests directory)
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub path: String,
    pub entities: usize,
    pub schemas: usize,
    pub search_queries: usize,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
}

impl CheckResult {
    pub fn status(&self) -> ManifestStatus {
        match self.error {
            None => ManifestStatus::Compiled,
            Some(_) => ManifestStatus::Failed,
        }
    }
}

impl CheckReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|result| result.error.is_some()).count()
    }
}

impl TableDisplay for CheckReport {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["Manifest", "Status", "Entities", "Schemas", "Searches", "Error"]);

        for result in &self.results {
            table.add_row(vec![
                Cell::new(&result.path),
                result.status().cell(output.options.no_color),
                Cell::new(result.entities),
                Cell::new(result.schemas),
                Cell::new(result.search_queries),
                Cell::new(or_dash(result.error.as_deref())),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        format!("checked: {} failed: {}", self.results.len(), self.failures())
    }
}

/// Every `*.toml` file under `dir` except project config, in path order.
pub fn discover_manifests(dir: &Path) -> Vec<PathBuf> {
    let mut manifests: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter(|path| path.file_name().is_none_or(|name| name != CONFIG_FILE))
        .collect();
    manifests.sort();
    manifests
}

pub fn check_manifest(path: &Path, root: &Path) -> CheckResult {
    let display = path.strip_prefix(root).unwrap_or(path).display().to_string();
    let compiled = Manifest::load(path).and_then(|manifest| manifest.compile());

    match compiled {
        Ok(compiled) => CheckResult {
            path: display,
            entities: compiled.entities.len(),
            schemas: compiled.schemas.len(),
            search_queries: compiled.search_queries.len(),
            error: None,
        },
        Err(err) => CheckResult {
            path: display,
            entities: 0,
            schemas: 0,
            search_queries: 0,
            error: Some(err.to_string()),
        },
    }
}

pub fn handle_check(args: CheckArgs, ctx: &ProjectContext, output: &OutputManager) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| ctx.manifests_dir.clone());
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    output.info(&format!("Scanning {}", dir.display()));
    let manifests = discover_manifests(&dir);
    if manifests.is_empty() {
        output.warning(&format!("No manifests found under {}", dir.display()));
        return Ok(());
    }

    output.heading("Manifest Check");
    let report = CheckReport {
        results: manifests
            .iter()
            .map(|path| {
                output.verbose(&format!("compiling {}", path.display()));
                check_manifest(path, &dir)
            })
            .collect(),
    };
    output.display(&report)?;

    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{failures} of {} manifests failed to compile", report.results.len());
    }
    output.success(&format!("{} manifests compiled", report.results.len()));
    Ok(())
}
