//! Standalone indexes
//!
//! Indexes declared on a [`Table`](super::Table) are created with the
//! table. A standalone [`Index`] is versioned on its own, which lets an
//! index be added or rebuilt without touching the table version.

use crate::adapter::SchemaAdapter;
use crate::error::{Result, SchemaError};
use crate::object::{DatabaseObject, ObjectKind, ObjectMeta, impl_meta_builder};
use crate::sql::sanitize::validate_identifier;
use crate::types::{IndexDef, ObjectKey, ObjectType, OrderedColumn};

/// Index created as a separate schema object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub table_name: String,
    pub index: IndexDef,
    pub tenant_column: Option<String>,
}

impl Index {
    /// Create a builder for index `name` on `schema.table_name`. The index
    /// depends on its table.
    pub fn builder(
        schema: impl Into<String>,
        name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> IndexBuilder {
        let schema = schema.into();
        let name = name.into();
        let table_name = table_name.into();
        let mut meta = ObjectMeta::new(ObjectType::Index, schema.clone(), name.clone());
        meta.add_dependency(ObjectKey::table(schema, table_name.clone()));
        IndexBuilder {
            meta,
            index: Index {
                table_name,
                index: IndexDef::new(name, Vec::<String>::new()),
                tenant_column: None,
            },
        }
    }

    pub(crate) async fn apply(&self, schema: &str, adapter: &dyn SchemaAdapter) -> Result<()> {
        adapter
            .create_index(schema, &self.table_name, &self.index, self.tenant_column.as_deref())
            .await
    }
}

/// Builder for [`Index`] objects
#[derive(Debug)]
pub struct IndexBuilder {
    meta: ObjectMeta,
    index: Index,
}

impl_meta_builder!(IndexBuilder);

impl IndexBuilder {
    pub fn add_column(mut self, column: impl Into<String>) -> Self {
        self.index.index.columns.push(OrderedColumn::asc(column));
        self
    }

    pub fn add_column_desc(mut self, column: impl Into<String>) -> Self {
        self.index.index.columns.push(OrderedColumn::desc(column));
        self
    }

    pub fn unique(mut self) -> Self {
        self.index.index.unique = true;
        self
    }

    pub fn include<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index.index.include_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Lead the index with the tenant discriminator
    pub fn tenant_column(mut self, column: impl Into<String>) -> Self {
        self.index.tenant_column = Some(column.into());
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        if self.index.index.columns.is_empty() {
            return Err(SchemaError::validation(format!(
                "index {} has no columns",
                self.meta.key()
            )));
        }
        validate_identifier(&self.index.table_name).map_err(SchemaError::validation)?;
        for column in self.index.index.column_names() {
            validate_identifier(column).map_err(SchemaError::validation)?;
        }
        DatabaseObject::new(self.meta, ObjectKind::Index(self.index))
    }
}
