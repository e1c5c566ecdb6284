//! Schema object model
//!
//! Every schema object is a [`DatabaseObject`]: common metadata
//! ([`ObjectMeta`]: identity, version, dependencies, tags, privileges) plus
//! one variant of the closed [`ObjectKind`] set. The operations all kinds
//! share (apply, versioned apply, drop, grant, visit, ledger-gated apply and
//! the retrying transactional apply) dispatch on the variant.
//!
//! Objects are produced by builders that validate their input and are
//! read-only afterwards.

pub mod group;
pub mod index;
pub mod routine;
pub mod row_type;
pub mod sequence;
pub mod table;

use std::collections::{BTreeMap, BTreeSet};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::adapter::{SchemaAdapter, TransactionProvider};
use crate::error::{Result, SchemaError};
use crate::ledger::{TransactionalLedger, VersionLedger};
use crate::retry::RetryPolicy;
use crate::sql::sanitize::validate_identifier;
use crate::types::{ColumnType, ObjectKey, ObjectType, Privilege};
use crate::visitor::{DataModelVisitor, Visited};

pub use group::{ObjectGroup, ObjectGroupBuilder};
pub use index::{Index, IndexBuilder};
pub use routine::{Routine, RoutineBuilder, View, ViewBuilder};
pub use row_type::{RowArrayType, RowArrayTypeBuilder, RowType, RowTypeBuilder};
pub use sequence::{AlterSequenceStart, AlterSequenceStartBuilder, Sequence, SequenceBuilder};
pub use table::{
    AccessControl, AddColumn, AddColumnBuilder, ForeignKeyConstraint, Migration, MigrationStep,
    Table, TableBuilder,
};

// ============================================================================
// Apply context
// ============================================================================

/// Options that influence how objects are applied to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaApplyContext {
    /// Create foreign key constraints together with their tables. Turned off
    /// for distributed deployments, where constraints are added after the
    /// distribution rules have been applied.
    pub include_foreign_keys: bool,
    /// Target is a distributed (sharded) database
    pub distributed: bool,
}

impl Default for SchemaApplyContext {
    fn default() -> Self {
        Self {
            include_foreign_keys: true,
            distributed: false,
        }
    }
}

impl SchemaApplyContext {
    /// Context for a distributed target: tables first, constraints later
    pub fn distributed() -> Self {
        Self {
            include_foreign_keys: false,
            distributed: true,
        }
    }

    pub fn with_foreign_keys(mut self, include: bool) -> Self {
        self.include_foreign_keys = include;
        self
    }
}

// ============================================================================
// Common metadata
// ============================================================================

/// Metadata shared by every kind of schema object
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    key: ObjectKey,
    version: i32,
    version_tracking_name: Option<String>,
    dependencies: BTreeSet<ObjectKey>,
    tags: BTreeMap<String, String>,
    privileges: BTreeMap<String, BTreeSet<Privilege>>,
}

impl ObjectMeta {
    pub(crate) fn new(object_type: ObjectType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ObjectKey::new(object_type, schema, name),
            version: 1,
            version_tracking_name: None,
            dependencies: BTreeSet::new(),
            tags: BTreeMap::new(),
            privileges: BTreeMap::new(),
        }
    }

    pub(crate) fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    pub(crate) fn set_version_tracking_name(&mut self, name: String) {
        self.version_tracking_name = Some(name);
    }

    pub(crate) fn add_dependency(&mut self, key: ObjectKey) {
        self.dependencies.insert(key);
    }

    pub(crate) fn add_tag(&mut self, group: String, value: String) {
        self.tags.insert(group, value);
    }

    pub(crate) fn add_privileges(&mut self, group: String, privileges: impl IntoIterator<Item = Privilege>) {
        self.privileges.entry(group).or_default().extend(privileges);
    }

    /// Check the parts every builder shares: names and version
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.key.schema.is_empty() {
            validate_identifier(&self.key.schema).map_err(SchemaError::validation)?;
        }
        // Compound names such as `TABLE.COLUMN` are checked part by part
        for part in self.key.name.split('.') {
            validate_identifier(part).map_err(SchemaError::validation)?;
        }
        if self.version < 1 {
            return Err(SchemaError::validation(format!(
                "{} has version {}; versions start at 1",
                self.key, self.version
            )));
        }
        if self.dependencies.contains(&self.key) {
            return Err(SchemaError::invalid_dependency(format!(
                "{} cannot depend on itself",
                self.key
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Name used for version ledger lookups
    pub fn tracking_name(&self) -> &str {
        self.version_tracking_name
            .as_deref()
            .unwrap_or(&self.key.name)
    }

    pub fn dependencies(&self) -> &BTreeSet<ObjectKey> {
        &self.dependencies
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn privileges(&self) -> &BTreeMap<String, BTreeSet<Privilege>> {
        &self.privileges
    }
}

/// Generates the fluent setters every object builder shares
macro_rules! impl_meta_builder {
    ($builder:ty) => {
        impl $builder {
            /// Set the object version (default: 1)
            pub fn version(mut self, version: i32) -> Self {
                self.meta.set_version(version);
                self
            }

            /// Record versions in the ledger under a different name
            pub fn version_tracking_name(mut self, name: impl Into<String>) -> Self {
                self.meta.set_version_tracking_name(name.into());
                self
            }

            /// Declare an object that must exist before this one
            pub fn add_dependency(mut self, key: $crate::types::ObjectKey) -> Self {
                self.meta.add_dependency(key);
                self
            }

            /// Declare several dependencies at once
            pub fn add_dependencies<I>(mut self, keys: I) -> Self
            where
                I: IntoIterator<Item = $crate::types::ObjectKey>,
            {
                for key in keys {
                    self.meta.add_dependency(key);
                }
                self
            }

            /// Tag the object for selective operations
            pub fn add_tag(mut self, group: impl Into<String>, value: impl Into<String>) -> Self {
                self.meta.add_tag(group.into(), value.into());
                self
            }

            /// Privileges granted to `group` by [`DatabaseObject::grant`]
            pub fn add_privileges<I>(mut self, group: impl Into<String>, privileges: I) -> Self
            where
                I: IntoIterator<Item = $crate::types::Privilege>,
            {
                self.meta.add_privileges(group.into(), privileges);
                self
            }
        }
    };
}

pub(crate) use impl_meta_builder;

// ============================================================================
// Object kinds
// ============================================================================

/// Tablespace (schema-less)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tablespace {
    pub extent_size_kb: u32,
}

/// Session/global variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub data_type: ColumnType,
}

/// The closed set of schema object kinds
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Table(Table),
    AddColumn(AddColumn),
    Index(Index),
    Sequence(Sequence),
    AlterSequenceStart(AlterSequenceStart),
    View(View),
    Procedure(Routine),
    Function(Routine),
    RowType(RowType),
    RowArrayType(RowArrayType),
    Tablespace(Tablespace),
    Variable(Variable),
    Group(ObjectGroup),
    /// Anchor used to hang dependencies on; applies nothing
    NoOp,
}

/// A named, versioned, typed unit of database structure
#[derive(Debug, Clone)]
pub struct DatabaseObject {
    meta: ObjectMeta,
    kind: ObjectKind,
}

impl PartialEq for DatabaseObject {
    fn eq(&self, other: &Self) -> bool {
        self.meta.key == other.meta.key
    }
}

impl Eq for DatabaseObject {}

impl DatabaseObject {
    pub(crate) fn new(meta: ObjectMeta, kind: ObjectKind) -> Result<Self> {
        meta.validate()?;
        Ok(Self { meta, kind })
    }

    /// Create a tablespace object
    pub fn tablespace(name: impl Into<String>, extent_size_kb: u32) -> TablespaceBuilder {
        TablespaceBuilder {
            meta: ObjectMeta::new(ObjectType::Tablespace, "", name),
            extent_size_kb,
        }
    }

    /// Create a variable object
    pub fn variable(schema: impl Into<String>, name: impl Into<String>, data_type: ColumnType) -> VariableBuilder {
        VariableBuilder {
            meta: ObjectMeta::new(ObjectType::Variable, schema, name),
            data_type,
        }
    }

    /// Create a no-op anchor object
    pub fn no_op(schema: impl Into<String>, name: impl Into<String>) -> NoOpBuilder {
        NoOpBuilder {
            meta: ObjectMeta::new(ObjectType::NoOp, schema, name),
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn key(&self) -> &ObjectKey {
        &self.meta.key
    }

    pub fn object_type(&self) -> ObjectType {
        self.meta.key.object_type
    }

    pub fn schema(&self) -> &str {
        &self.meta.key.schema
    }

    pub fn name(&self) -> &str {
        &self.meta.key.name
    }

    pub fn version(&self) -> i32 {
        self.meta.version
    }

    pub fn dependencies(&self) -> &BTreeSet<ObjectKey> {
        &self.meta.dependencies
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.meta.tags
    }

    /// True if the object carries `group = value`
    pub fn has_tag(&self, group: &str, value: &str) -> bool {
        self.meta.tags.get(group).is_some_and(|v| v == value)
    }

    pub fn as_table(&self) -> Option<&Table> {
        match &self.kind {
            ObjectKind::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&ObjectGroup> {
        match &self.kind {
            ObjectKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Keys this object answers to: its own, plus every member key for groups
    pub fn identities(&self) -> Vec<&ObjectKey> {
        let mut keys = vec![self.key()];
        if let ObjectKind::Group(group) = &self.kind {
            for member in group.members() {
                keys.extend(member.identities());
            }
        }
        keys
    }

    // ========================================================================
    // Shared contract
    // ========================================================================

    /// Unconditional create
    pub fn apply<'a>(
        &'a self,
        adapter: &'a dyn SchemaAdapter,
        ctx: SchemaApplyContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let schema = self.schema();
            let name = self.name();
            match &self.kind {
                ObjectKind::Table(table) => table.apply(schema, name, adapter, ctx).await,
                ObjectKind::AddColumn(add) => add.apply(schema, adapter).await,
                ObjectKind::Index(index) => index.apply(schema, adapter).await,
                ObjectKind::Sequence(seq) => adapter.create_sequence(schema, name, seq).await,
                ObjectKind::AlterSequenceStart(alter) => alter.apply(schema, adapter).await,
                ObjectKind::View(view) => adapter.create_view(schema, name, &view.definition).await,
                ObjectKind::Procedure(proc) => adapter.create_procedure(schema, name, &proc.body).await,
                ObjectKind::Function(func) => adapter.create_function(schema, name, &func.body).await,
                ObjectKind::RowType(row) => adapter.create_row_type(schema, name, &row.columns).await,
                ObjectKind::RowArrayType(arr) => {
                    adapter
                        .create_row_array_type(schema, name, &arr.element_type, arr.size)
                        .await
                }
                ObjectKind::Tablespace(ts) => adapter.create_tablespace(name, ts.extent_size_kb).await,
                ObjectKind::Variable(var) => adapter.create_variable(schema, name, &var.data_type).await,
                ObjectKind::Group(group) => group.apply(adapter, ctx).await,
                ObjectKind::NoOp => Ok(()),
            }
        })
    }

    /// Versioned create/alter. `prior_version` is what the ledger holds for
    /// this object (0 when never applied).
    pub fn apply_versioned<'a>(
        &'a self,
        prior_version: i32,
        adapter: &'a dyn SchemaAdapter,
        ctx: SchemaApplyContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if prior_version <= 0 {
                return self.apply(adapter, ctx).await;
            }
            if self.version() <= prior_version {
                debug!(object = %self.key(), prior_version, "Nothing to migrate");
                return Ok(());
            }

            let schema = self.schema();
            let name = self.name();
            match &self.kind {
                ObjectKind::Table(table) => {
                    table
                        .migrate(schema, name, prior_version, self.version(), adapter)
                        .await
                }
                ObjectKind::Index(_)
                | ObjectKind::View(_)
                | ObjectKind::Procedure(_)
                | ObjectKind::Function(_)
                | ObjectKind::Variable(_) => {
                    info!(
                        object = %self.key(),
                        from = prior_version,
                        to = self.version(),
                        "Replacing object"
                    );
                    self.drop(adapter).await?;
                    self.apply(adapter, ctx).await
                }
                ObjectKind::AlterSequenceStart(alter) => alter.apply(schema, adapter).await,
                ObjectKind::Group(group) => group.apply_versioned(prior_version, adapter, ctx).await,
                ObjectKind::NoOp => Ok(()),
                ObjectKind::Sequence(_)
                | ObjectKind::RowType(_)
                | ObjectKind::RowArrayType(_)
                | ObjectKind::AddColumn(_)
                | ObjectKind::Tablespace(_) => Err(SchemaError::unsupported_migration(format!(
                    "{} cannot be altered from version {} to {}; define a new object instead",
                    self.key(),
                    prior_version,
                    self.version()
                ))),
            }
        })
    }

    /// Reverse of [`apply`](Self::apply)
    pub fn drop<'a>(&'a self, adapter: &'a dyn SchemaAdapter) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let schema = self.schema();
            let name = self.name();
            match &self.kind {
                ObjectKind::Table(table) => table.drop(schema, name, adapter).await,
                ObjectKind::AddColumn(add) => {
                    adapter
                        .drop_column(schema, &add.table_name, &add.column.name)
                        .await
                }
                ObjectKind::Index(index) => adapter.drop_index(schema, &index.index.name).await,
                ObjectKind::Sequence(_) => adapter.drop_sequence(schema, name).await,
                // The restart is dropped along with its sequence
                ObjectKind::AlterSequenceStart(_) => Ok(()),
                ObjectKind::View(_) => adapter.drop_view(schema, name).await,
                ObjectKind::Procedure(_) => adapter.drop_procedure(schema, name).await,
                ObjectKind::Function(_) => adapter.drop_function(schema, name).await,
                ObjectKind::RowType(_) | ObjectKind::RowArrayType(_) => {
                    adapter.drop_type(schema, name).await
                }
                ObjectKind::Tablespace(_) => adapter.drop_tablespace(name).await,
                ObjectKind::Variable(_) => adapter.drop_variable(schema, name).await,
                ObjectKind::Group(group) => group.drop(adapter).await,
                ObjectKind::NoOp => Ok(()),
            }
        })
    }

    /// Grant the privileges configured for `group_name` to `user`
    pub fn grant<'a>(
        &'a self,
        adapter: &'a dyn SchemaAdapter,
        group_name: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let ObjectKind::Group(group) = &self.kind {
                return group.grant(adapter, group_name, user).await;
            }

            let Some(privileges) = self.meta.privileges.get(group_name) else {
                return Ok(());
            };

            let schema = self.schema();
            let name = self.name();
            match &self.kind {
                ObjectKind::Table(_) | ObjectKind::View(_) => {
                    adapter
                        .grant_object_privileges(schema, name, privileges, user)
                        .await
                }
                ObjectKind::Procedure(_) => {
                    adapter
                        .grant_procedure_privileges(schema, name, privileges, user)
                        .await
                }
                ObjectKind::Function(_) => {
                    adapter
                        .grant_function_privileges(schema, name, privileges, user)
                        .await
                }
                ObjectKind::Sequence(_) => {
                    adapter
                        .grant_sequence_privileges(schema, name, privileges, user)
                        .await
                }
                ObjectKind::Variable(_) => {
                    adapter
                        .grant_variable_privileges(schema, name, privileges, user)
                        .await
                }
                _ => {
                    warn!(object = %self.key(), "Privileges are not grantable on this kind of object");
                    Ok(())
                }
            }
        })
    }

    /// Visit this object (and its sub-parts) in creation order
    pub fn visit(&self, visitor: &mut dyn DataModelVisitor) {
        match &self.kind {
            ObjectKind::Group(group) => group.visit(visitor),
            ObjectKind::Table(table) => {
                visitor.visited(Visited::Object(self));
                for constraint in table.foreign_keys() {
                    visitor.visited(Visited::ForeignKey {
                        object: self,
                        table,
                        constraint,
                    });
                }
            }
            _ => visitor.visited(Visited::Object(self)),
        }
    }

    /// Visit this object (and its sub-parts) in drop order
    pub fn visit_reverse(&self, visitor: &mut dyn DataModelVisitor) {
        match &self.kind {
            ObjectKind::Group(group) => group.visit_reverse(visitor),
            ObjectKind::Table(table) => {
                for constraint in table.foreign_keys().iter().rev() {
                    visitor.visited(Visited::ForeignKey {
                        object: self,
                        table,
                        constraint,
                    });
                }
                visitor.visited(Visited::Object(self));
            }
            _ => visitor.visited(Visited::Object(self)),
        }
    }

    /// Apply the object if the ledger says its version is newer than what
    /// the target holds, then record the new version.
    pub fn apply_version<'a>(
        &'a self,
        adapter: &'a dyn SchemaAdapter,
        ctx: SchemaApplyContext,
        ledger: &'a dyn VersionLedger,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &self.kind {
                ObjectKind::Group(group) => return group.apply_version(adapter, ctx, ledger).await,
                ObjectKind::NoOp => return Ok(()),
                _ => {}
            }

            let schema = self.schema();
            let object_type = self.object_type();
            let name = self.meta.tracking_name();
            let version = self.version();

            if !ledger.applies(schema, object_type, name, version).await? {
                debug!(object = %self.key(), version, "Already applied");
                return Ok(());
            }

            let prior_version = ledger.get_version(schema, object_type, name).await?;
            info!(
                object = %self.key(),
                from = prior_version,
                to = version,
                "Applying schema object"
            );
            self.apply_versioned(prior_version, adapter, ctx).await?;
            ledger.add_version(schema, object_type, name, version).await
        })
    }

    /// [`apply_version`](Self::apply_version) in a transaction of its own,
    /// retried on deadlock / lock timeout.
    ///
    /// The ledger row is written inside the same transaction and reaches
    /// `ledger` only after the commit succeeded.
    ///
    /// A lock conflict rolls the transaction back and, after the transaction
    /// has closed, sleeps a jittered interval before the next attempt. Any
    /// other error rolls back and is returned immediately. Once the attempt
    /// budget is spent the conflict becomes [`SchemaError::RetriesExhausted`].
    pub async fn apply_tx(
        &self,
        ctx: SchemaApplyContext,
        transactions: &dyn TransactionProvider,
        ledger: &dyn VersionLedger,
        retry: &RetryPolicy,
    ) -> Result<()> {
        let mut remaining = retry.max_attempts.max(1);

        loop {
            let mut tx = transactions.begin().await?;
            let tx_ledger = TransactionalLedger::new(ledger, tx.adapter());
            let outcome = self.apply_version(tx.adapter(), ctx, &tx_ledger).await;
            let staged = tx_ledger.into_staged();

            match outcome {
                Ok(()) => {
                    tx.close().await?;
                    return staged.confirm(ledger).await;
                }
                Err(err) if err.is_lock_conflict() => {
                    tx.set_rollback_only();
                    remaining -= 1;
                    if let Err(close_err) = tx.close().await {
                        warn!(object = %self.key(), error = %close_err, "Rollback failed");
                    }

                    if remaining == 0 {
                        warn!(
                            object = %self.key(),
                            attempts = retry.max_attempts,
                            error = %err,
                            "Lock conflict retries exhausted"
                        );
                        return Err(SchemaError::RetriesExhausted {
                            attempts: retry.max_attempts.max(1),
                            message: err.to_string(),
                        });
                    }

                    let delay = retry.next_delay();
                    warn!(
                        object = %self.key(),
                        remaining,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Lock conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tx.set_rollback_only();
                    if let Err(close_err) = tx.close().await {
                        warn!(object = %self.key(), error = %close_err, "Rollback failed");
                    }
                    return Err(err);
                }
            }
        }
    }
}

// ============================================================================
// Builders for the small kinds
// ============================================================================

/// Builder for [`Tablespace`] objects
#[derive(Debug)]
pub struct TablespaceBuilder {
    meta: ObjectMeta,
    extent_size_kb: u32,
}

impl_meta_builder!(TablespaceBuilder);

impl TablespaceBuilder {
    pub fn build(self) -> Result<DatabaseObject> {
        DatabaseObject::new(
            self.meta,
            ObjectKind::Tablespace(Tablespace {
                extent_size_kb: self.extent_size_kb,
            }),
        )
    }
}

/// Builder for [`Variable`] objects
#[derive(Debug)]
pub struct VariableBuilder {
    meta: ObjectMeta,
    data_type: ColumnType,
}

impl_meta_builder!(VariableBuilder);

impl VariableBuilder {
    pub fn build(self) -> Result<DatabaseObject> {
        DatabaseObject::new(
            self.meta,
            ObjectKind::Variable(Variable {
                data_type: self.data_type,
            }),
        )
    }
}

/// Builder for no-op anchor objects
#[derive(Debug)]
pub struct NoOpBuilder {
    meta: ObjectMeta,
}

impl_meta_builder!(NoOpBuilder);

impl NoOpBuilder {
    pub fn build(self) -> Result<DatabaseObject> {
        DatabaseObject::new(self.meta, ObjectKind::NoOp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tablespace_is_schema_less() {
        let ts = DatabaseObject::tablespace("FHIR_TS", 128).build().unwrap();
        assert_eq!(ts.object_type(), ObjectType::Tablespace);
        assert_eq!(ts.schema(), "");
        assert_eq!(ts.key().to_string(), "TABLESPACE:FHIR_TS");
    }

    #[test]
    fn test_version_must_be_positive() {
        let err = DatabaseObject::no_op("S", "ANCHOR").version(0).build().unwrap_err();
        assert!(matches!(err, SchemaError::Validation(_)));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = DatabaseObject::no_op("S", "ANCHOR")
            .add_dependency(ObjectKey::new(ObjectType::NoOp, "S", "ANCHOR"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDependency(_)));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = DatabaseObject::variable("S", "bad-name", ColumnType::Int)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Validation(_)));
    }

    #[test]
    fn test_tags_and_tracking_name() {
        let obj = DatabaseObject::variable("S", "SV_TENANT_ID", ColumnType::Int)
            .add_tag("SCHEMA_GROUP", "FHIRDATA")
            .version_tracking_name("TENANT_VAR")
            .version(3)
            .build()
            .unwrap();

        assert!(obj.has_tag("SCHEMA_GROUP", "FHIRDATA"));
        assert!(!obj.has_tag("SCHEMA_GROUP", "ADMIN"));
        assert_eq!(obj.meta().tracking_name(), "TENANT_VAR");
        assert_eq!(obj.version(), 3);
    }

    #[test]
    fn test_equality_is_by_identity() {
        let a = DatabaseObject::no_op("S", "X").version(1).build().unwrap();
        let b = DatabaseObject::no_op("S", "X")
            .version(7)
            .add_tag("g", "v")
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_apply_context_defaults() {
        let ctx = SchemaApplyContext::default();
        assert!(ctx.include_foreign_keys);
        assert!(!ctx.distributed);

        let ctx = SchemaApplyContext::distributed();
        assert!(!ctx.include_foreign_keys);
        assert!(ctx.distributed);
    }
}
