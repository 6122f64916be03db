use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};
use declaro::QuerySchema;
use declaro::query::CollectionStrategy;
use serde::Serialize;

use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay, or_dash};
use crate::theme::BINDING_ARROW;

use super::load_compiled;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Query Schemas",
    commands: &[
        "declaro schema app.toml                                         # Every query method",
        "declaro schema app.toml --repository EmployeeRepository        # One repository",
        "declaro schema app.toml --repository EmployeeRepository --method findAll",
    ],
}];

#[derive(Args)]
pub struct SchemaArgs {
    /// Manifest file (resolved against the manifests directory when relative)
    pub manifest: PathBuf,

    /// Only show methods of this repository
    #[arg(long)]
    pub repository: Option<String>,

    /// Only show this method (requires --repository)
    #[arg(long, requires = "repository")]
    pub method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SchemaListing<'a> {
    pub schemas: Vec<&'a QuerySchema>,
}

fn collection_label(schema: &QuerySchema) -> String {
    match schema.collection() {
        None => "-".to_string(),
        Some(CollectionStrategy::Vec) => "Vec".to_string(),
        Some(CollectionStrategy::HashSet) => "HashSet".to_string(),
        Some(CollectionStrategy::Custom(name)) => name.clone(),
    }
}

fn bindings_label(schema: &QuerySchema) -> String {
    schema
        .result_fields()
        .iter()
        .map(|binding| match &binding.property {
            Some(property) => format!("{property} {BINDING_ARROW} {}", binding.entity_field),
            None => binding.entity_field.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn order_label(schema: &QuerySchema) -> String {
    schema
        .order_by()
        .iter()
        .map(|order| format!("{} {}", order.field, order.order.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl TableDisplay for SchemaListing<'_> {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(
            &mut table,
            &["Method", "Returns", "Collection", "Bindings", "Order By", "Ext. Param"],
        );

        for schema in &self.schemas {
            let order = order_label(schema);
            table.add_row(vec![
                Cell::new(schema.method()),
                Cell::new(schema.return_type().name()),
                Cell::new(collection_label(schema)),
                Cell::new(bindings_label(schema)),
                Cell::new(or_dash(Some(order.as_str()).filter(|order| !order.is_empty()))),
                Cell::new(or_dash(
                    schema.extended_field_param().map(|index| index.to_string()).as_deref(),
                )),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        self.schemas
            .iter()
            .map(|schema| format!("{}:{}", schema.method(), schema.result_fields().len()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn handle_schema(args: SchemaArgs, ctx: &ProjectContext, output: &OutputManager) -> Result<()> {
    let compiled = load_compiled(ctx, &args.manifest, output)?;

    let schemas: Vec<&QuerySchema> = match (&args.repository, &args.method) {
        (Some(repository), Some(method)) => {
            let schema = compiled
                .schema(repository, method)
                .ok_or_else(|| anyhow::anyhow!("No query method {repository}.{method} in the manifest"))?;
            vec![schema]
        }
        (Some(repository), None) => {
            let prefix = format!("{repository}.");
            let schemas: Vec<&QuerySchema> = compiled
                .schemas
                .iter()
                .map(Arc::as_ref)
                .filter(|schema: &&QuerySchema| schema.method().starts_with(&prefix))
                .collect();
            if schemas.is_empty() {
                anyhow::bail!("Repository {repository} declares no query methods in the manifest");
            }
            schemas
        }
        _ => compiled.schemas.iter().map(Arc::as_ref).collect(),
    };

    output.heading("Query Schemas");
    output.display(&SchemaListing { schemas })?;
    Ok(())
}
