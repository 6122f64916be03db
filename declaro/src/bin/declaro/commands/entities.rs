use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};
use declaro::EntityDetails;
use declaro::types::FieldDetails;
use serde::Serialize;

use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay, or_dash, serde_label};
use crate::theme::FieldRole;

use super::load_compiled;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Entity Metadata",
    commands: &[
        "declaro entities app.toml                    # All entities in the manifest",
        "declaro entities app.toml --entity Employee  # One entity",
        "declaro --output json entities app.toml      # Machine-readable",
    ],
}];

#[derive(Args)]
pub struct EntitiesArgs {
    /// Manifest file (resolved against the manifests directory when relative)
    pub manifest: PathBuf,

    /// Only show this entity
    #[arg(long)]
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntityListing {
    pub entities: Vec<EntityRow>,
}

#[derive(Debug, Serialize)]
pub struct EntityRow {
    pub entity: String,
    pub table: String,
    pub extension_table: Option<String>,
    pub id_field: Option<String>,
    pub version_field: Option<String>,
    pub fields: Vec<FieldRow>,
}

#[derive(Debug, Serialize)]
pub struct FieldRow {
    pub name: String,
    pub column: String,
    pub value_type: String,
    pub data_type: String,
    pub nullable: bool,
    pub updateable: bool,
    pub generation: Option<String>,
    pub relation: Option<String>,
}

impl From<&FieldDetails> for FieldRow {
    fn from(field: &FieldDetails) -> Self {
        Self {
            name: field.name().to_string(),
            column: field.effective_column().to_string(),
            value_type: field.value_type().to_string(),
            data_type: serde_label(&field.data_type()),
            nullable: field.is_nullable(),
            updateable: field.is_updateable(),
            generation: field.generation_type().map(|generation| serde_label(&generation)),
            relation: field
                .relation()
                .map(|relation| format!("{} {}", serde_label(&relation.kind), relation.target)),
        }
    }
}

impl From<&EntityDetails> for EntityRow {
    fn from(entity: &EntityDetails) -> Self {
        Self {
            entity: entity.entity_type().to_string(),
            table: entity.table_name().to_string(),
            extension_table: entity.extended_table().map(|extended| extended.table.clone()),
            id_field: entity.id_field().map(|field| field.name().to_string()),
            version_field: entity.version_field().map(|field| field.name().to_string()),
            fields: entity.fields().iter().map(FieldRow::from).collect(),
        }
    }
}

impl EntityRow {
    pub fn role_of(&self, field: &FieldRow) -> FieldRole {
        if self.id_field.as_deref() == Some(field.name.as_str()) {
            FieldRole::Identity
        } else if self.version_field.as_deref() == Some(field.name.as_str()) {
            FieldRole::Version
        } else if field.relation.is_some() {
            FieldRole::Relation
        } else {
            FieldRole::Column
        }
    }
}

impl TableDisplay for EntityListing {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(
            &mut table,
            &["Entity", "Field", "Column", "Type", "Data Type", "Flags", "Relation"],
        );

        for entity in &self.entities {
            for field in &entity.fields {
                let mut flags = Vec::new();
                if entity.id_field.as_deref() == Some(field.name.as_str()) {
                    flags.push("id".to_string());
                }
                if entity.version_field.as_deref() == Some(field.name.as_str()) {
                    flags.push("version".to_string());
                }
                if let Some(generation) = &field.generation {
                    flags.push(generation.clone());
                }
                if field.nullable {
                    flags.push("nullable".to_string());
                }
                if !field.updateable {
                    flags.push("insert-only".to_string());
                }

                table.add_row(vec![
                    Cell::new(format!("{} ({})", entity.entity, entity.table)),
                    entity.role_of(field).cell(&field.name, output.options.no_color),
                    Cell::new(&field.column),
                    Cell::new(&field.value_type),
                    Cell::new(&field.data_type),
                    Cell::new(flags.join(", ")),
                    Cell::new(or_dash(field.relation.as_deref())),
                ]);
            }
        }

        table
    }

    fn to_compact(&self) -> String {
        self.entities
            .iter()
            .map(|entity| format!("{}({}):{}", entity.entity, entity.table, entity.fields.len()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn handle_entities(args: EntitiesArgs, ctx: &ProjectContext, output: &OutputManager) -> Result<()> {
    let compiled = load_compiled(ctx, &args.manifest, output)?;

    let entities: Vec<EntityRow> = match &args.entity {
        Some(name) => {
            let entity = compiled
                .entity(name)
                .ok_or_else(|| anyhow::anyhow!("Entity {name} is not declared in {}", args.manifest.display()))?;
            vec![EntityRow::from(entity)]
        }
        None => compiled.entities.iter().map(|entity| EntityRow::from(entity.as_ref())).collect(),
    };

    output.heading("Entities");
    output.display(&EntityListing { entities })?;

    for entity in compiled.entities.iter().filter(|entity| entity.extended_table().is_some()) {
        output.verbose(&format!(
            "{} keeps extension fields in {}",
            entity.entity_type(),
            or_dash(entity.extended_table().map(|extended| extended.table.as_str()))
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use declaro::Manifest;

    #[test]
    fn test_entity_rows_from_manifest() {
        let manifest = Manifest::from_toml_str(
            r#"
            [[entities]]
            name = "Employee"
            table = "EMPLOYEE"
            fields = [
                { name = "id", type = "i64", id = true },
                { name = "name", type = "String", column = "EMP_NAME" },
                { name = "version", type = "i32", version = true },
            ]
            "#,
        )
        .unwrap();
        let compiled = manifest.compile().unwrap();
        let row = EntityRow::from(compiled.entity("Employee").unwrap());

        assert_eq!(row.table, "EMPLOYEE");
        assert_eq!(row.id_field.as_deref(), Some("id"));
        assert_eq!(row.version_field.as_deref(), Some("version"));
        assert_eq!(row.fields[1].column, "EMP_NAME");
        assert_eq!(row.fields[1].value_type, "String");
        assert_eq!(row.role_of(&row.fields[0]), FieldRole::Identity);
        assert_eq!(row.role_of(&row.fields[1]), FieldRole::Column);
        assert_eq!(row.role_of(&row.fields[2]), FieldRole::Version);

        let listing = EntityListing { entities: vec![row] };
        assert_eq!(listing.to_compact(), "Employee(EMPLOYEE):3");
    }
}
