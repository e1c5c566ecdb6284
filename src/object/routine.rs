//! Views, stored procedures and functions
//!
//! These kinds have no migration path of their own: a newer version is
//! applied by dropping and recreating the object.

use crate::error::{Result, SchemaError};
use crate::object::{DatabaseObject, ObjectKind, ObjectMeta, impl_meta_builder};
use crate::types::ObjectType;

/// View definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    /// The query after `AS`
    pub definition: String,
}

impl View {
    pub fn builder(schema: impl Into<String>, name: impl Into<String>) -> ViewBuilder {
        ViewBuilder {
            meta: ObjectMeta::new(ObjectType::View, schema, name),
            definition: String::new(),
        }
    }
}

/// Builder for [`View`] objects
#[derive(Debug)]
pub struct ViewBuilder {
    meta: ObjectMeta,
    definition: String,
}

impl_meta_builder!(ViewBuilder);

impl ViewBuilder {
    pub fn definition(mut self, query: impl Into<String>) -> Self {
        self.definition = query.into();
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        if self.definition.trim().is_empty() {
            return Err(SchemaError::validation(format!(
                "{} has no definition",
                self.meta.key()
            )));
        }
        DatabaseObject::new(
            self.meta,
            ObjectKind::View(View {
                definition: self.definition,
            }),
        )
    }
}

/// Procedure or function. `body` is the complete `CREATE` statement
/// text after the object name, e.g. `(p_id BIGINT) LANGUAGE plpgsql AS $$ ... $$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    pub body: String,
}

impl Routine {
    pub fn procedure(schema: impl Into<String>, name: impl Into<String>) -> RoutineBuilder {
        RoutineBuilder {
            meta: ObjectMeta::new(ObjectType::Procedure, schema, name),
            body: String::new(),
        }
    }

    pub fn function(schema: impl Into<String>, name: impl Into<String>) -> RoutineBuilder {
        RoutineBuilder {
            meta: ObjectMeta::new(ObjectType::Function, schema, name),
            body: String::new(),
        }
    }
}

/// Builder for procedure and function objects
#[derive(Debug)]
pub struct RoutineBuilder {
    meta: ObjectMeta,
    body: String,
}

impl_meta_builder!(RoutineBuilder);

impl RoutineBuilder {
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        if self.body.trim().is_empty() {
            return Err(SchemaError::validation(format!("{} has no body", self.meta.key())));
        }
        let routine = Routine { body: self.body };
        let kind = match self.meta.key().object_type {
            ObjectType::Function => ObjectKind::Function(routine),
            _ => ObjectKind::Procedure(routine),
        };
        DatabaseObject::new(self.meta, kind)
    }
}
