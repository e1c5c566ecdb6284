//! Core type definitions for the schema model
//!
//! Includes object identities, column types, column/index/key definitions,
//! privileges, distribution classification and raw statements.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Object identity
// ============================================================================

/// Kind of a schema object. Part of the object identity and of the key
/// recorded in the version ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    Table,
    Index,
    Procedure,
    Function,
    Sequence,
    Type,
    View,
    Variable,
    Tablespace,
    Permission,
    Group,
    #[serde(rename = "NOOP")]
    NoOp,
    /// Ledger entry for the distribution of a table
    Distribution,
    /// Ledger entry for a foreign key added after distribution
    #[serde(rename = "FOREIGN_KEY")]
    ForeignKey,
}

impl ObjectType {
    /// Name stored in the version ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Table => "TABLE",
            ObjectType::Index => "INDEX",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Function => "FUNCTION",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::Type => "TYPE",
            ObjectType::View => "VIEW",
            ObjectType::Variable => "VARIABLE",
            ObjectType::Tablespace => "TABLESPACE",
            ObjectType::Permission => "PERMISSION",
            ObjectType::Group => "GROUP",
            ObjectType::NoOp => "NOOP",
            ObjectType::Distribution => "DISTRIBUTION",
            ObjectType::ForeignKey => "FOREIGN_KEY",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a schema object: (kind, schema, name).
///
/// Two objects with the same key are the same object regardless of how
/// they were built. Dependencies are expressed as keys, never as references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_type: ObjectType,
    pub schema: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(object_type: ObjectType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_type,
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a table key
    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ObjectType::Table, schema, name)
    }

    /// `schema.name`, or just `name` for schema-less objects such as tablespaces
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.qualified_name())
    }
}

// ============================================================================
// Columns
// ============================================================================

/// Column type with its PostgreSQL mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    /// 16-bit integer (SMALLINT)
    SmallInt,

    /// 32-bit integer (INT)
    Int,

    /// 64-bit integer (BIGINT)
    BigInt,

    /// Double precision float
    Double,

    /// Exact numeric with precision and scale (NUMERIC)
    Decimal { precision: u8, scale: u8 },

    /// Variable length string with a maximum size
    Varchar { size: u32 },

    /// Fixed length string
    Char { size: u32 },

    /// Timestamp with optional fractional second precision
    Timestamp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        precision: Option<u8>,
    },

    /// Unbounded character data (TEXT)
    Clob,

    /// Binary data. `inline_size` is a storage hint some dialects use.
    Blob {
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inline_size: Option<u32>,
    },

    /// Boolean
    Boolean,

    /// Binary JSON (JSONB)
    Json,
}

impl ColumnType {
    pub fn varchar(size: u32) -> Self {
        ColumnType::Varchar { size }
    }

    pub fn char(size: u32) -> Self {
        ColumnType::Char { size }
    }

    pub fn decimal(precision: u8, scale: u8) -> Self {
        ColumnType::Decimal { precision, scale }
    }

    pub fn timestamp() -> Self {
        ColumnType::Timestamp { precision: None }
    }

    pub fn blob(size: u64) -> Self {
        ColumnType::Blob {
            size,
            inline_size: None,
        }
    }

    /// Convert column type to PostgreSQL type string
    pub fn to_sql_type(&self) -> String {
        match self {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Int => "INT".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            ColumnType::Varchar { size } => format!("VARCHAR({})", size),
            ColumnType::Char { size } => format!("CHAR({})", size),
            ColumnType::Timestamp { precision } => match precision {
                Some(p) => format!("TIMESTAMP({})", p),
                None => "TIMESTAMP".to_string(),
            },
            ColumnType::Clob => "TEXT".to_string(),
            ColumnType::Blob { .. } => "BYTEA".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Json => "JSONB".to_string(),
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// Column definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(flatten)]
    pub column_type: ColumnType,

    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Default value (SQL expression, e.g. "0", "'X'", "CURRENT_TIMESTAMP")
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "default")]
    pub default_value: Option<String>,
}

impl ColumnDef {
    /// Create a new nullable column definition
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default_value: None,
        }
    }

    /// Set the column as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the nullability explicitly
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a default value
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// How an identity column generates its values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generated {
    Always,
    ByDefault,
}

/// Identity (auto-increment) column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDef {
    pub column: String,
    pub generated: Generated,
}

// ============================================================================
// Keys, indexes and constraints
// ============================================================================

/// Primary key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDef {
    pub constraint_name: String,
    pub columns: Vec<String>,
}

/// Sort direction of an index column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Column reference within an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedColumn {
    pub name: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl OrderedColumn {
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Index definition owned by a table or by a standalone index object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name
    pub name: String,

    /// Indexed columns, in order
    pub columns: Vec<OrderedColumn>,

    /// Non-key columns carried in the index leaf pages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_columns: Vec<String>,

    /// Whether this is a UNIQUE index (default: false)
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// Create a new index definition over ascending columns
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(OrderedColumn::asc).collect(),
            include_columns: Vec::new(),
            unique: false,
        }
    }

    /// Set the index as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Add INCLUDE columns
    pub fn include<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Names of the key columns
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Table-level UNIQUE constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub constraint_name: String,
    pub columns: Vec<String>,
}

/// Table-level CHECK constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub constraint_name: String,
    pub expression: String,
}

// ============================================================================
// Distribution and privileges
// ============================================================================

/// How a table's rows are spread across the nodes of a distributed database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistributionType {
    /// Local to the coordinator
    #[default]
    None,
    /// Replicated to every node
    Reference,
    /// Sharded by the distribution column
    Distributed,
}

impl DistributionType {
    /// Whether a foreign key from a table of this classification to a table
    /// of `target` classification can be enforced in a distributed database.
    pub fn can_reference(&self, target: DistributionType) -> bool {
        match self {
            DistributionType::Distributed => matches!(
                target,
                DistributionType::Reference | DistributionType::Distributed
            ),
            DistributionType::Reference => target == DistributionType::Reference,
            DistributionType::None => target == DistributionType::Reference,
        }
    }
}

/// Grantable privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    References,
    Alter,
    Execute,
    Usage,
}

impl Privilege {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::References => "REFERENCES",
            Privilege::Alter => "ALTER",
            Privilege::Execute => "EXECUTE",
            Privilege::Usage => "USAGE",
        }
    }
}

// ============================================================================
// Raw statements
// ============================================================================

/// Bind parameter for a [`Statement`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

/// A parameterized statement run verbatim through the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a bind parameter
    pub fn bind(mut self, param: SqlParam) -> Self {
        self.params.push(param);
        self
    }
}
