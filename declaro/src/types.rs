//! Field-level metadata shared by entity registration, return-shape resolution and the
//! manifest loader.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{MetadataError, MetadataResult};

/// Flag bit marking an identity field.
pub const FLAG_ID: u8 = 1;

/// Flag bit marking a field fetched together with its owner.
pub const FLAG_AUTO_FETCH: u8 = 4;

/// Runtime type of a declared field, bean property or parameter.
///
/// Textual form follows Rust syntax (`i32`, `Option<i64>`, `Vec<String>`, `Employee`) and is
/// what manifests use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    DateTime,
    Bytes,
    Json,
    Optional(Box<ValueType>),
    List(Box<ValueType>),
    Named(String),
}

impl ValueType {
    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    pub fn list(inner: ValueType) -> Self {
        ValueType::List(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        ValueType::Named(name.into())
    }

    /// Strips any number of optional wrappers.
    pub fn base(&self) -> &ValueType {
        match self {
            ValueType::Optional(inner) => inner.base(),
            other => other,
        }
    }

    /// True for the types accepted on an optimistic-locking version field.
    pub fn is_version_compatible(&self) -> bool {
        match self {
            ValueType::Int32 | ValueType::Int64 => true,
            ValueType::Optional(inner) => matches!(**inner, ValueType::Int32 | ValueType::Int64),
            _ => false,
        }
    }

    /// Whether a value of type `source` can be stored in a slot of this type.
    ///
    /// Optional wrappers on either side are transparent and `Json` slots accept anything.
    pub fn is_assignable_from(&self, source: &ValueType) -> bool {
        match (self.base(), source.base()) {
            (ValueType::Json, _) => true,
            (ValueType::List(target), ValueType::List(source)) => target.is_assignable_from(source),
            (target, source) => target == source,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int32 => f.write_str("i32"),
            ValueType::Int64 => f.write_str("i64"),
            ValueType::Float32 => f.write_str("f32"),
            ValueType::Float64 => f.write_str("f64"),
            ValueType::Text => f.write_str("String"),
            ValueType::DateTime => f.write_str("DateTime"),
            ValueType::Bytes => f.write_str("Bytes"),
            ValueType::Json => f.write_str("Json"),
            ValueType::Optional(inner) => write!(f, "Option<{inner}>"),
            ValueType::List(inner) => write!(f, "Vec<{inner}>"),
            ValueType::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for ValueType {
    type Err = MetadataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if let Some(inner) = strip_generic(trimmed, "Option") {
            return Ok(ValueType::optional(inner.parse()?));
        }
        if let Some(inner) = strip_generic(trimmed, "Vec") {
            return Ok(ValueType::list(inner.parse()?));
        }

        let parsed = match trimmed {
            "bool" => ValueType::Bool,
            "i32" => ValueType::Int32,
            "i64" => ValueType::Int64,
            "f32" => ValueType::Float32,
            "f64" => ValueType::Float64,
            "String" | "str" => ValueType::Text,
            "DateTime" => ValueType::DateTime,
            "Bytes" => ValueType::Bytes,
            "Json" | "Value" => ValueType::Json,
            "" => return Err(MetadataError::configuration("empty type name")),
            other if other.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ':') => {
                ValueType::Named(other.to_string())
            }
            other => {
                return Err(MetadataError::configuration(format!("unrecognised type `{other}`")));
            }
        };
        Ok(parsed)
    }
}

fn strip_generic<'a>(raw: &'a str, wrapper: &str) -> Option<&'a str> {
    raw.strip_prefix(wrapper)?.trim_start().strip_prefix('<')?.strip_suffix('>')
}

impl TryFrom<String> for ValueType {
    type Error = MetadataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.to_string()
    }
}

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Date,
    DateTime,
    Clob,
    Blob,
    #[default]
    Unknown,
}

impl DataType {
    /// Column type used when a declaration does not name one.
    pub fn infer(value_type: &ValueType) -> DataType {
        match value_type.base() {
            ValueType::Bool => DataType::Boolean,
            ValueType::Int32 => DataType::Int,
            ValueType::Int64 => DataType::Long,
            ValueType::Float32 => DataType::Float,
            ValueType::Float64 => DataType::Double,
            ValueType::Text => DataType::String,
            ValueType::DateTime => DataType::DateTime,
            ValueType::Bytes => DataType::Blob,
            ValueType::Json => DataType::Clob,
            _ => DataType::Unknown,
        }
    }
}

impl FromStr for DataType {
    type Err = MetadataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parsed = match raw.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => DataType::Boolean,
            "int" | "integer" => DataType::Int,
            "long" | "bigint" => DataType::Long,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "string" | "varchar" => DataType::String,
            "date" => DataType::Date,
            "date_time" | "datetime" | "timestamp" => DataType::DateTime,
            "clob" => DataType::Clob,
            "blob" => DataType::Blob,
            "unknown" => DataType::Unknown,
            other => return Err(MetadataError::configuration(format!("unknown data type `{other}`"))),
        };
        Ok(parsed)
    }
}

/// Strategy used to produce identity values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    Auto,
    Identity,
    Sequence,
    Table,
}

impl FromStr for GenerationType {
    type Err = MetadataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(GenerationType::Auto),
            "identity" => Ok(GenerationType::Identity),
            "sequence" => Ok(GenerationType::Sequence),
            "table" => Ok(GenerationType::Table),
            other => Err(MetadataError::configuration(format!("unknown generation type `{other}`"))),
        }
    }
}

/// Identity of a declared field: the owning type plus the field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle {
    owner: String,
    name: String,
}

impl FieldHandle {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    #[default]
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl FromStr for RelationKind {
    type Err = MetadataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "one_to_one" => Ok(RelationKind::OneToOne),
            "many_to_one" | "belongs_to" => Ok(RelationKind::ManyToOne),
            "one_to_many" | "has_many" => Ok(RelationKind::OneToMany),
            "many_to_many" => Ok(RelationKind::ManyToMany),
            other => Err(MetadataError::configuration(format!("unknown relation kind `{other}`"))),
        }
    }
}

/// Which side of a relation holds the foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOwnership {
    /// The foreign key (or join table) is maintained by this side.
    Owned,
    /// Inverse side; the named field on the target owns the relation.
    MappedBy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTableDetails {
    pub table: String,
    #[serde(default)]
    pub join_column: Option<String>,
    #[serde(default)]
    pub inverse_join_column: Option<String>,
}

impl JoinTableDetails {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join_column: None,
            inverse_join_column: None,
        }
    }
}

/// Foreign reference carried by a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub target: String,
    pub kind: RelationKind,
    pub ownership: RelationOwnership,
    pub join_table: Option<JoinTableDetails>,
}

impl RelationDescriptor {
    pub fn owned(target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            target: target.into(),
            kind,
            ownership: RelationOwnership::Owned,
            join_table: None,
        }
    }

    pub fn mapped_by(target: impl Into<String>, kind: RelationKind, field: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind,
            ownership: RelationOwnership::MappedBy(field.into()),
            join_table: None,
        }
    }

    pub fn with_join_table(mut self, join_table: JoinTableDetails) -> Self {
        self.join_table = Some(join_table);
        self
    }

    #[inline]
    pub fn is_mapped_relation(&self) -> bool {
        matches!(self.ownership, RelationOwnership::MappedBy(_))
    }

    #[inline]
    pub fn join_table(&self) -> Option<&JoinTableDetails> {
        self.join_table.as_ref()
    }
}

/// Immutable description of one persistent field.
///
/// Equality and hashing only consider the [`FieldHandle`], so two descriptors for the same
/// declared field are interchangeable.
#[derive(Debug, Clone)]
pub struct FieldDetails {
    handle: FieldHandle,
    column: String,
    data_type: DataType,
    value_type: ValueType,
    flags: u8,
    generation_type: Option<GenerationType>,
    sequence_name: Option<String>,
    overridden_column: Option<String>,
    version_field: bool,
    nullable: bool,
    updateable: bool,
    relation: Option<RelationDescriptor>,
}

impl FieldDetails {
    /// Builds a plain (non-identity) field.
    pub fn new(
        handle: FieldHandle,
        column: impl Into<String>,
        data_type: DataType,
        value_type: ValueType,
        version_field: bool,
        nullable: bool,
        updateable: bool,
    ) -> MetadataResult<Self> {
        if handle.name().trim().is_empty() {
            return Err(MetadataError::configuration(format!(
                "field of `{}` has no name",
                handle.owner()
            )));
        }

        if version_field && !value_type.is_version_compatible() {
            return Err(MetadataError::configuration(format!(
                "field '{}' with unsupported data type '{}' is marked as version field",
                handle, value_type
            )));
        }

        Ok(Self {
            handle,
            column: column.into(),
            data_type,
            value_type,
            flags: 0,
            generation_type: None,
            sequence_name: None,
            overridden_column: None,
            version_field,
            nullable,
            updateable,
            relation: None,
        })
    }

    /// Builds an identity field.
    #[allow(clippy::too_many_arguments)]
    pub fn id(
        handle: FieldHandle,
        column: impl Into<String>,
        data_type: DataType,
        value_type: ValueType,
        generation_type: Option<GenerationType>,
        auto_fetch: bool,
        sequence_name: Option<String>,
        nullable: bool,
    ) -> MetadataResult<Self> {
        let mut details = Self::new(handle, column, data_type, value_type, false, nullable, true)?;

        let sequence_name = sequence_name.filter(|name| !name.trim().is_empty());
        if generation_type == Some(GenerationType::Sequence) && sequence_name.is_none() {
            return Err(MetadataError::configuration(format!(
                "sequence name is mandatory for sequence generation on id field '{}'",
                details.handle
            )));
        }

        details.flags |= FLAG_ID;
        if auto_fetch {
            details.flags |= FLAG_AUTO_FETCH;
        }
        details.generation_type = generation_type;
        details.sequence_name = sequence_name;
        Ok(details)
    }

    /// Attaches the relation this field carries.
    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relation = Some(relation);
        self
    }

    pub(crate) fn set_overridden_column(&mut self, column: String) {
        self.overridden_column = Some(column);
    }

    /// Shallow copy used when snapshotting field shape for audit tables.
    ///
    /// Only identity-independent attributes survive; everything else is reset to defaults.
    pub fn clone_for_audit(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            column: self.column.clone(),
            data_type: self.data_type,
            value_type: self.value_type.clone(),
            flags: 0,
            generation_type: None,
            sequence_name: None,
            overridden_column: self.overridden_column.clone(),
            version_field: false,
            nullable: false,
            updateable: true,
            relation: None,
        }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> &FieldHandle {
        &self.handle
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn overridden_column(&self) -> Option<&str> {
        self.overridden_column.as_deref()
    }

    /// Column used in generated statements.
    pub fn effective_column(&self) -> &str {
        self.overridden_column.as_deref().unwrap_or(&self.column)
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    #[inline]
    pub fn is_id_field(&self) -> bool {
        self.flags & FLAG_ID == FLAG_ID
    }

    #[inline]
    pub fn is_auto_fetch(&self) -> bool {
        self.flags & FLAG_AUTO_FETCH == FLAG_AUTO_FETCH
    }

    pub fn generation_type(&self) -> Option<GenerationType> {
        self.generation_type
    }

    pub fn sequence_name(&self) -> Option<&str> {
        self.sequence_name.as_deref()
    }

    pub fn is_version_field(&self) -> bool {
        self.version_field
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_updateable(&self) -> bool {
        self.updateable
    }

    pub fn relation(&self) -> Option<&RelationDescriptor> {
        self.relation.as_ref()
    }

    /// True if this field references another entity.
    pub fn is_relation_field(&self) -> bool {
        self.relation.is_some()
    }

    /// True if this field is a relation owned by the other side.
    pub fn is_mapped_relation_field(&self) -> bool {
        self.relation.as_ref().is_some_and(RelationDescriptor::is_mapped_relation)
    }

    /// True if the relation goes through a join table.
    pub fn is_table_joined(&self) -> bool {
        self.relation.as_ref().is_some_and(|relation| relation.join_table.is_some())
    }

    /// True if this field's column lives in the entity's own table: a plain column, or an owned
    /// relation without a join table.
    pub fn is_table_owned(&self) -> bool {
        match &self.relation {
            None => true,
            Some(relation) => !relation.is_mapped_relation() && relation.join_table.is_none(),
        }
    }
}

impl PartialEq for FieldDetails {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for FieldDetails {}

impl Hash for FieldDetails {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl fmt::Display for FieldDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Field: {}, Column: {}, ID Field: {}]",
            self.handle,
            self.effective_column(),
            self.is_id_field()
        )
    }
}
