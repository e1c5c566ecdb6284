//! Composite row types and arrays of them

use std::collections::HashSet;

use crate::error::{Result, SchemaError};
use crate::object::{DatabaseObject, ObjectKind, ObjectMeta, impl_meta_builder};
use crate::sql::sanitize::validate_identifier;
use crate::types::{ColumnDef, ObjectKey, ObjectType};

/// Composite type
#[derive(Debug, Clone, PartialEq)]
pub struct RowType {
    pub columns: Vec<ColumnDef>,
}

impl RowType {
    pub fn builder(schema: impl Into<String>, name: impl Into<String>) -> RowTypeBuilder {
        RowTypeBuilder {
            meta: ObjectMeta::new(ObjectType::Type, schema, name),
            columns: Vec::new(),
        }
    }
}

/// Builder for [`RowType`] objects
#[derive(Debug)]
pub struct RowTypeBuilder {
    meta: ObjectMeta,
    columns: Vec<ColumnDef>,
}

impl_meta_builder!(RowTypeBuilder);

impl RowTypeBuilder {
    pub fn add_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        if self.columns.is_empty() {
            return Err(SchemaError::validation(format!("{} has no columns", self.meta.key())));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name).map_err(SchemaError::validation)?;
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::duplicate(format!(
                    "column {} defined twice on {}",
                    column.name,
                    self.meta.key()
                )));
            }
        }
        DatabaseObject::new(self.meta, ObjectKind::RowType(RowType { columns: self.columns }))
    }
}

/// Bounded array of a row type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowArrayType {
    /// Name of the element row type, in the same schema
    pub element_type: String,
    pub size: u32,
}

impl RowArrayType {
    /// Create a builder. The array depends on its element type.
    pub fn builder(
        schema: impl Into<String>,
        name: impl Into<String>,
        element_type: impl Into<String>,
        size: u32,
    ) -> RowArrayTypeBuilder {
        let schema = schema.into();
        let element_type = element_type.into();
        let mut meta = ObjectMeta::new(ObjectType::Type, schema.clone(), name);
        meta.add_dependency(ObjectKey::new(ObjectType::Type, schema, element_type.clone()));
        RowArrayTypeBuilder {
            meta,
            array: RowArrayType { element_type, size },
        }
    }
}

/// Builder for [`RowArrayType`] objects
#[derive(Debug)]
pub struct RowArrayTypeBuilder {
    meta: ObjectMeta,
    array: RowArrayType,
}

impl_meta_builder!(RowArrayTypeBuilder);

impl RowArrayTypeBuilder {
    pub fn build(self) -> Result<DatabaseObject> {
        if self.array.size == 0 {
            return Err(SchemaError::validation(format!("{} has size 0", self.meta.key())));
        }
        DatabaseObject::new(self.meta, ObjectKind::RowArrayType(self.array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    #[test]
    fn test_row_type_rejects_duplicate_columns() {
        let err = RowType::builder("S", "T_STR_VALUES")
            .add_column(ColumnDef::new("PARAMETER_NAME_ID", ColumnType::Int))
            .add_column(ColumnDef::new("PARAMETER_NAME_ID", ColumnType::Int))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateDefinition(_)));
    }

    #[test]
    fn test_array_depends_on_element() {
        let arr = RowArrayType::builder("S", "T_STR_VALUES_ARR", "T_STR_VALUES", 256)
            .build()
            .unwrap();
        assert!(
            arr.dependencies()
                .contains(&ObjectKey::new(ObjectType::Type, "S", "T_STR_VALUES"))
        );
    }
}
