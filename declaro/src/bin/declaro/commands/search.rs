use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Table};
use declaro::QueryClause;
use serde::Serialize;
use serde_json::Value;

use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};

use super::load_compiled;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Search Queries",
    commands: &[
        "declaro search app.toml --descriptor EmployeeQuery --instance query.json",
        "declaro --output json search app.toml --descriptor EmployeeQuery --instance query.json",
    ],
}];

#[derive(Args)]
pub struct SearchArgs {
    /// Manifest file (resolved against the manifests directory when relative)
    pub manifest: PathBuf,

    /// Search descriptor to evaluate
    #[arg(long)]
    pub descriptor: String,

    /// JSON file holding the descriptor instance
    #[arg(long)]
    pub instance: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct SearchRequest {
    pub descriptor: String,
    pub index: String,
    pub ignore_score: bool,
    pub body: Value,
}

impl TableDisplay for SearchRequest {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["Descriptor", "Index", "Request Body"]);
        table.add_row(vec![
            Cell::new(&self.descriptor),
            Cell::new(&self.index),
            Cell::new(serde_json::to_string_pretty(&self.body).unwrap_or_default()),
        ]);
        table
    }

    fn to_compact(&self) -> String {
        self.body.to_string()
    }
}

pub fn handle_search(args: SearchArgs, ctx: &ProjectContext, output: &OutputManager) -> Result<()> {
    let compiled = load_compiled(ctx, &args.manifest, output)?;

    let content = std::fs::read_to_string(&args.instance)
        .with_context(|| format!("Failed to read instance {}", args.instance.display()))?;
    let instance: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse instance {}", args.instance.display()))?;

    let clause = compiled
        .build_search(&args.descriptor, &instance)
        .with_context(|| format!("Failed to build query for {}", args.descriptor))?;
    let query = compiled
        .search_query(&args.descriptor)
        .ok_or_else(|| anyhow::anyhow!("Search descriptor {} is not declared", args.descriptor))?;

    let matches_all = match &clause {
        QueryClause::ConstantScore(inner) => inner.is_empty_bool(),
        other => other.is_empty_bool(),
    };
    if matches_all {
        output.warning("Instance sets no searchable property, the query matches every document");
    }

    output.heading("Search Query");
    output.display(&SearchRequest {
        descriptor: args.descriptor.clone(),
        index: query.index_type().to_string(),
        ignore_score: query.ignore_score(),
        body: clause.to_request_body(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compact_prints_body() {
        let request = SearchRequest {
            descriptor: "EmployeeQuery".to_string(),
            index: "Employee".to_string(),
            ignore_score: false,
            body: json!({ "query": { "bool": {} } }),
        };
        assert_eq!(request.to_compact(), r#"{"query":{"bool":{}}}"#);
    }
}
