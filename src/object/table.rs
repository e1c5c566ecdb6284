//! Tables, foreign keys, migrations and appended columns

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::SchemaAdapter;
use crate::error::{Result, SchemaError};
use crate::model::PhysicalDataModel;
use crate::object::{DatabaseObject, ObjectKind, ObjectMeta, SchemaApplyContext, impl_meta_builder};
use crate::sql::sanitize::validate_identifier;
use crate::types::{
    CheckConstraint, ColumnDef, ColumnType, DistributionType, Generated, IdentityDef, IndexDef,
    ObjectKey, ObjectType, PrimaryKeyDef, Statement, UniqueConstraint,
};

// ============================================================================
// Foreign keys
// ============================================================================

/// Foreign key constraint owned by a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    pub constraint_name: String,
    pub target_schema: String,
    pub target_table: String,
    /// Referencing columns on the owning table
    pub columns: Vec<String>,
    /// Referenced columns; empty means the target's primary key
    pub target_columns: Vec<String>,
    /// Whether the database enforces the constraint (default: true)
    pub enforced: bool,
    self_referencing: bool,
    target_distribution: DistributionType,
    tenant_columns: Option<(String, String)>,
}

impl ForeignKeyConstraint {
    pub fn new<I, S>(
        constraint_name: impl Into<String>,
        target_schema: impl Into<String>,
        target_table: impl Into<String>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraint_name: constraint_name.into(),
            target_schema: target_schema.into(),
            target_table: target_table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            target_columns: Vec::new(),
            enforced: true,
            self_referencing: false,
            target_distribution: DistributionType::None,
            tenant_columns: None,
        }
    }

    /// Reference columns other than the target's primary key
    pub fn target_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the constraint without enforcing it
    pub fn not_enforced(mut self) -> Self {
        self.enforced = false;
        self
    }

    /// True if the constraint points back at its own table
    pub fn is_self_referencing(&self) -> bool {
        self.self_referencing
    }

    /// Distribution of the referenced table, resolved at build time
    pub fn target_distribution(&self) -> DistributionType {
        self.target_distribution
    }

    /// Tenant columns (referencing, referenced) that lead both sides of the
    /// key. Set at build time when both tables are tenant tables and the
    /// referenced key does not already name the tenant column.
    pub fn tenant_columns(&self) -> Option<(&str, &str)> {
        self.tenant_columns
            .as_ref()
            .map(|(source, target)| (source.as_str(), target.as_str()))
    }

    /// Whether the constraint can be created on a table with distribution
    /// `source`. Every constraint is enabled in a non-distributed database.
    pub fn is_enabled(&self, source: DistributionType, distributed: bool) -> bool {
        !distributed || source.can_reference(self.target_distribution)
    }
}

// ============================================================================
// Migrations
// ============================================================================

/// One change applied when a table moves to a newer version
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    AddColumn(ColumnDef),
    DropColumn(String),
    CreateIndex(IndexDef),
    DropIndex(String),
    Statement(Statement),
}

type MigrationFn = dyn Fn(i32) -> Vec<MigrationStep> + Send + Sync;

/// Produces the steps that bring a table up from a prior version
#[derive(Clone)]
pub struct Migration(Arc<MigrationFn>);

impl Migration {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(i32) -> Vec<MigrationStep> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Steps for a table currently at `prior_version`
    pub fn steps(&self, prior_version: i32) -> Vec<MigrationStep> {
        (self.0)(prior_version)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Migration(..)")
    }
}

// ============================================================================
// Table
// ============================================================================

/// Row-level access control bound to a session variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControl {
    pub permission_name: String,
    pub variable: String,
}

/// Table definition
#[derive(Debug, Clone)]
pub struct Table {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<PrimaryKeyDef>,
    pub identity: Option<IdentityDef>,
    pub indexes: Vec<IndexDef>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub check_constraints: Vec<CheckConstraint>,
    pub tenant_column: Option<String>,
    pub distribution: DistributionType,
    pub distribution_column: Option<String>,
    pub tablespace: Option<String>,
    pub with_options: Vec<(String, String)>,
    pub access_control: Option<AccessControl>,
    foreign_keys: Vec<ForeignKeyConstraint>,
    migrations: Vec<Migration>,
}

impl Table {
    /// Create a new table builder
    pub fn builder(schema: impl Into<String>, name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(schema, name)
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyConstraint] {
        &self.foreign_keys
    }

    /// Constraints that can be created for the given deployment
    pub fn enabled_foreign_keys(&self, distributed: bool) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.is_enabled(self.distribution, distributed))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column used to shard the table. Falls back to the tenant column.
    pub fn effective_distribution_column(&self) -> Option<&str> {
        self.distribution_column
            .as_deref()
            .or(self.tenant_column.as_deref())
    }

    pub(crate) async fn apply(
        &self,
        schema: &str,
        name: &str,
        adapter: &dyn SchemaAdapter,
        ctx: SchemaApplyContext,
    ) -> Result<()> {
        adapter.create_table(schema, name, self).await?;

        let tenant = self.tenant_column.as_deref();
        for index in &self.indexes {
            adapter.create_index(schema, name, index, tenant).await?;
        }

        if ctx.include_foreign_keys {
            for fk in self.enabled_foreign_keys(ctx.distributed) {
                adapter.create_foreign_key(schema, name, fk, tenant).await?;
            }
        }

        if let (Some(access), Some(tenant)) = (&self.access_control, tenant) {
            adapter
                .create_permission(schema, &access.permission_name, name, &access.variable, tenant)
                .await?;
            adapter.activate_row_access_control(schema, name).await?;
        }
        Ok(())
    }

    pub(crate) async fn migrate(
        &self,
        schema: &str,
        name: &str,
        prior_version: i32,
        version: i32,
        adapter: &dyn SchemaAdapter,
    ) -> Result<()> {
        if self.migrations.is_empty() {
            return Err(SchemaError::unsupported_migration(format!(
                "{}.{} moves from version {} to {} but has no migration",
                schema, name, prior_version, version
            )));
        }

        let tenant = self.tenant_column.as_deref();
        for migration in &self.migrations {
            for step in migration.steps(prior_version) {
                debug!(table = %format!("{}.{}", schema, name), ?step, "Migration step");
                match step {
                    MigrationStep::AddColumn(column) => adapter.add_column(schema, name, &column).await?,
                    MigrationStep::DropColumn(column) => adapter.drop_column(schema, name, &column).await?,
                    MigrationStep::CreateIndex(index) => {
                        adapter.create_index(schema, name, &index, tenant).await?
                    }
                    MigrationStep::DropIndex(index) => adapter.drop_index(schema, &index).await?,
                    MigrationStep::Statement(statement) => adapter.run_statement(&statement).await?,
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn drop(&self, schema: &str, name: &str, adapter: &dyn SchemaAdapter) -> Result<()> {
        if let Some(access) = &self.access_control {
            adapter.deactivate_row_access_control(schema, name).await?;
            adapter
                .drop_permission(schema, &access.permission_name, name)
                .await?;
        }
        adapter.drop_table(schema, name).await
    }
}

/// Builder for [`Table`] objects
#[derive(Debug)]
pub struct TableBuilder {
    meta: ObjectMeta,
    table: Table,
}

impl_meta_builder!(TableBuilder);

impl TableBuilder {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::new(ObjectType::Table, schema, name),
            table: Table {
                columns: Vec::new(),
                primary_key: None,
                identity: None,
                indexes: Vec::new(),
                unique_constraints: Vec::new(),
                check_constraints: Vec::new(),
                tenant_column: None,
                distribution: DistributionType::None,
                distribution_column: None,
                tablespace: None,
                with_options: Vec::new(),
                access_control: None,
                foreign_keys: Vec::new(),
                migrations: Vec::new(),
            },
        }
    }

    // ========================================================================
    // Columns
    // ========================================================================

    pub fn add_column(mut self, column: ColumnDef) -> Self {
        self.table.columns.push(column);
        self
    }

    pub fn add_int_column(self, name: impl Into<String>, nullable: bool) -> Self {
        self.add_column(ColumnDef::new(name, ColumnType::Int).nullable(nullable))
    }

    pub fn add_bigint_column(self, name: impl Into<String>, nullable: bool) -> Self {
        self.add_column(ColumnDef::new(name, ColumnType::BigInt).nullable(nullable))
    }

    pub fn add_varchar_column(self, name: impl Into<String>, size: u32, nullable: bool) -> Self {
        self.add_column(ColumnDef::new(name, ColumnType::varchar(size)).nullable(nullable))
    }

    pub fn add_char_column(
        self,
        name: impl Into<String>,
        size: u32,
        nullable: bool,
        default_value: Option<&str>,
    ) -> Self {
        let mut column = ColumnDef::new(name, ColumnType::char(size)).nullable(nullable);
        if let Some(value) = default_value {
            column = column.default(value);
        }
        self.add_column(column)
    }

    pub fn add_timestamp_column(self, name: impl Into<String>, nullable: bool) -> Self {
        self.add_column(ColumnDef::new(name, ColumnType::timestamp()).nullable(nullable))
    }

    pub fn add_blob_column(
        self,
        name: impl Into<String>,
        size: u64,
        inline_size: Option<u32>,
        nullable: bool,
    ) -> Self {
        let column_type = ColumnType::Blob { size, inline_size };
        self.add_column(ColumnDef::new(name, column_type).nullable(nullable))
    }

    // ========================================================================
    // Keys and constraints
    // ========================================================================

    pub fn primary_key<I, S>(mut self, constraint_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.primary_key = Some(PrimaryKeyDef {
            constraint_name: constraint_name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn identity(mut self, column: impl Into<String>, generated: Generated) -> Self {
        self.table.identity = Some(IdentityDef {
            column: column.into(),
            generated,
        });
        self
    }

    pub fn add_index(mut self, index: IndexDef) -> Self {
        self.table.indexes.push(index);
        self
    }

    /// Add a unique index with optional INCLUDE columns
    pub fn add_unique_index<I, S, J, T>(self, name: impl Into<String>, columns: I, include: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.add_index(IndexDef::new(name, columns).unique().include(include))
    }

    /// Add a foreign key. A constraint whose target is this table is
    /// treated as self-referencing and adds no dependency.
    pub fn add_foreign_key(mut self, constraint: ForeignKeyConstraint) -> Self {
        self.table.foreign_keys.push(constraint);
        self
    }

    pub fn add_unique_constraint<I, S>(mut self, constraint_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.unique_constraints.push(UniqueConstraint {
            constraint_name: constraint_name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn add_check_constraint(
        mut self,
        constraint_name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.table.check_constraints.push(CheckConstraint {
            constraint_name: constraint_name.into(),
            expression: expression.into(),
        });
        self
    }

    // ========================================================================
    // Multi-tenancy, distribution and storage
    // ========================================================================

    /// Partition the table by tenant using `column` as discriminator
    pub fn tenant_column(mut self, column: impl Into<String>) -> Self {
        self.table.tenant_column = Some(column.into());
        self
    }

    pub fn distribution(mut self, distribution: DistributionType) -> Self {
        self.table.distribution = distribution;
        self
    }

    pub fn distribution_column(mut self, column: impl Into<String>) -> Self {
        self.table.distribution_column = Some(column.into());
        self
    }

    pub fn tablespace(mut self, name: impl Into<String>) -> Self {
        self.table.tablespace = Some(name.into());
        self
    }

    /// Storage parameter for the `WITH (...)` clause
    pub fn add_with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.table.with_options.push((key.into(), value.into()));
        self
    }

    /// Enable row access control: rows are visible only when the tenant
    /// column matches `variable`
    pub fn access_control(mut self, permission_name: impl Into<String>, variable: impl Into<String>) -> Self {
        self.table.access_control = Some(AccessControl {
            permission_name: permission_name.into(),
            variable: variable.into(),
        });
        self
    }

    /// Steps run when the table is applied over an older version. The
    /// closure receives the version currently in the ledger.
    pub fn add_migration<F>(mut self, migration: F) -> Self
    where
        F: Fn(i32) -> Vec<MigrationStep> + Send + Sync + 'static,
    {
        self.table.migrations.push(Migration::new(migration));
        self
    }

    /// Validate the table against itself and `model`, and finalize it
    pub fn build(mut self, model: &PhysicalDataModel) -> Result<DatabaseObject> {
        let key = self.meta.key().clone();
        let table = &mut self.table;

        if table.columns.is_empty() {
            return Err(SchemaError::validation(format!("{} has no columns", key)));
        }

        let mut seen = HashSet::new();
        for column in &table.columns {
            validate_identifier(&column.name).map_err(SchemaError::validation)?;
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::duplicate(format!(
                    "column {} defined twice on {}",
                    column.name, key
                )));
            }
        }

        let has = |name: &str| seen.contains(name);
        let require = |what: &str, column: &str| -> Result<()> {
            if has(column) {
                Ok(())
            } else {
                Err(SchemaError::validation(format!(
                    "{} references unknown column {} on {}",
                    what, column, key
                )))
            }
        };

        if let Some(pk) = &table.primary_key {
            validate_identifier(&pk.constraint_name).map_err(SchemaError::validation)?;
            if pk.columns.is_empty() {
                return Err(SchemaError::validation(format!("primary key of {} has no columns", key)));
            }
            for column in &pk.columns {
                require("primary key", column)?;
            }
        }
        if let Some(identity) = &table.identity {
            require("identity", &identity.column)?;
        }
        if let Some(tenant) = &table.tenant_column {
            require("tenant column", tenant)?;
        }
        if let Some(column) = &table.distribution_column {
            require("distribution column", column)?;
        }
        if table.distribution == DistributionType::Distributed
            && table.effective_distribution_column().is_none()
        {
            return Err(SchemaError::validation(format!(
                "{} is distributed but has no distribution column",
                key
            )));
        }
        if table.access_control.is_some() && table.tenant_column.is_none() {
            return Err(SchemaError::validation(format!(
                "{} has row access control but no tenant column",
                key
            )));
        }

        let mut index_names = HashSet::new();
        for index in &table.indexes {
            validate_identifier(&index.name).map_err(SchemaError::validation)?;
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaError::duplicate(format!("index {} defined twice on {}", index.name, key)));
            }
            if index.columns.is_empty() {
                return Err(SchemaError::validation(format!("index {} has no columns", index.name)));
            }
            for column in index.column_names().chain(index.include_columns.iter().map(String::as_str)) {
                require("index", column)?;
            }
        }
        for unique in &table.unique_constraints {
            for column in &unique.columns {
                require("unique constraint", column)?;
            }
        }

        let mut dependencies = Vec::new();
        for fk in &mut table.foreign_keys {
            validate_identifier(&fk.constraint_name).map_err(SchemaError::validation)?;
            if fk.columns.is_empty() {
                return Err(SchemaError::validation(format!(
                    "foreign key {} on {} has no columns",
                    fk.constraint_name, key
                )));
            }
            for column in &fk.columns {
                if !seen.contains(column.as_str()) {
                    return Err(SchemaError::validation(format!(
                        "foreign key {} references unknown column {} on {}",
                        fk.constraint_name, column, key
                    )));
                }
            }

            fk.self_referencing = fk.target_schema == key.schema && fk.target_table == key.name;
            let (target_columns, target_pk, target_distribution, target_tenant) = if fk.self_referencing {
                (
                    table.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                    table.primary_key.as_ref().map(|pk| pk.columns.clone()),
                    table.distribution,
                    table.tenant_column.clone(),
                )
            } else {
                let target = model.find_table(&fk.target_schema, &fk.target_table).ok_or_else(|| {
                    SchemaError::invalid_dependency(format!(
                        "foreign key {} on {} references {}.{}, which is not in the model",
                        fk.constraint_name, key, fk.target_schema, fk.target_table
                    ))
                })?;
                (
                    target.columns.iter().map(|c| c.name.clone()).collect(),
                    target.primary_key.as_ref().map(|pk| pk.columns.clone()),
                    target.distribution,
                    target.tenant_column.clone(),
                )
            };

            let referenced = if fk.target_columns.is_empty() {
                target_pk.ok_or_else(|| {
                    SchemaError::invalid_dependency(format!(
                        "foreign key {} on {} references {}.{}, which has no primary key",
                        fk.constraint_name, key, fk.target_schema, fk.target_table
                    ))
                })?
            } else {
                fk.target_columns.clone()
            };
            for column in &referenced {
                if !target_columns.contains(column) {
                    return Err(SchemaError::invalid_dependency(format!(
                        "foreign key {} references unknown column {} on {}.{}",
                        fk.constraint_name, column, fk.target_schema, fk.target_table
                    )));
                }
            }
            if referenced.len() != fk.columns.len() {
                return Err(SchemaError::invalid_dependency(format!(
                    "foreign key {} has {} columns but references {}",
                    fk.constraint_name,
                    fk.columns.len(),
                    referenced.len()
                )));
            }

            // Keys of tenant tables lead with the tenant column
            fk.tenant_columns = match (&table.tenant_column, target_tenant) {
                (_, Some(target_tenant)) if referenced.contains(&target_tenant) => None,
                (Some(source_tenant), Some(target_tenant)) => {
                    if fk.columns.contains(source_tenant) {
                        return Err(SchemaError::invalid_dependency(format!(
                            "foreign key {} on {} lists tenant column {} but the referenced key does not",
                            fk.constraint_name, key, source_tenant
                        )));
                    }
                    Some((source_tenant.clone(), target_tenant))
                }
                (None, Some(target_tenant)) => {
                    return Err(SchemaError::invalid_dependency(format!(
                        "foreign key {} on {} references tenant table {}.{}, keyed by {}, from a table without a tenant column",
                        fk.constraint_name, key, fk.target_schema, fk.target_table, target_tenant
                    )));
                }
                (_, None) => None,
            };
            fk.target_distribution = target_distribution;
            if !fk.self_referencing {
                dependencies.push(ObjectKey::table(fk.target_schema.clone(), fk.target_table.clone()));
            }
        }

        for dependency in dependencies {
            self.meta.add_dependency(dependency);
        }
        DatabaseObject::new(self.meta, ObjectKind::Table(self.table))
    }
}

// ============================================================================
// Appended columns
// ============================================================================

/// A column added to an existing table as its own versioned object
#[derive(Debug, Clone, PartialEq)]
pub struct AddColumn {
    pub table_name: String,
    pub column: ColumnDef,
}

impl AddColumn {
    /// Create a builder. The object is named `TABLE.COLUMN` and depends on
    /// the table.
    pub fn builder(schema: impl Into<String>, table_name: impl Into<String>, column: ColumnDef) -> AddColumnBuilder {
        let schema = schema.into();
        let table_name = table_name.into();
        let mut meta = ObjectMeta::new(
            ObjectType::Table,
            schema.clone(),
            format!("{}.{}", table_name, column.name),
        );
        meta.add_dependency(ObjectKey::table(schema, table_name.clone()));
        AddColumnBuilder {
            meta,
            add: AddColumn { table_name, column },
        }
    }

    pub(crate) async fn apply(&self, schema: &str, adapter: &dyn SchemaAdapter) -> Result<()> {
        adapter.add_column(schema, &self.table_name, &self.column).await
    }
}

/// Builder for [`AddColumn`] objects
#[derive(Debug)]
pub struct AddColumnBuilder {
    meta: ObjectMeta,
    add: AddColumn,
}

impl_meta_builder!(AddColumnBuilder);

impl AddColumnBuilder {
    pub fn build(self) -> Result<DatabaseObject> {
        DatabaseObject::new(self.meta, ObjectKind::AddColumn(self.add))
    }
}
