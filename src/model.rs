//! Physical data model
//!
//! The model owns every schema object, indexes them by identity, table name
//! and tag, and derives the creation order from their dependencies. All
//! model-wide operations (apply, drop, distribution, tenant partitions,
//! grants) walk that order, or its reverse for teardown.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use tracing::{debug, info, instrument};

use crate::adapter::{SchemaAdapter, Transaction, TransactionProvider};
use crate::error::{Result, SchemaError};
use crate::ledger::{TransactionalLedger, VersionLedger};
use crate::object::{DatabaseObject, ObjectKind, SchemaApplyContext, Table};
use crate::retry::RetryPolicy;
use crate::task::{Runnable, TaskCollector, TaskHandle};
use crate::types::{DistributionType, ObjectKey, ObjectType};
use crate::visitor::{DataModelVisitor, ForeignKeyCollector, ForeignKeyWork, Visited};

/// Position of a top-level object in the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ObjectId(usize);

/// Tag selector: objects whose tag `group` has value `value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRef<'a> {
    pub group: &'a str,
    pub value: &'a str,
}

impl<'a> TagRef<'a> {
    pub fn new(group: &'a str, value: &'a str) -> Self {
        Self { group, value }
    }

    fn matches(&self, object: &DatabaseObject) -> bool {
        object.has_tag(self.group, self.value)
    }
}

/// The complete set of schema objects of one data model
#[derive(Debug, Default)]
pub struct PhysicalDataModel {
    objects: Vec<DatabaseObject>,
    by_key: HashMap<ObjectKey, ObjectId>,
    tables: HashMap<(String, String), ObjectId>,
    tags: HashMap<(String, String), Vec<ObjectId>>,
    federated: Vec<Arc<PhysicalDataModel>>,
    order: OnceLock<Vec<ObjectId>>,
}

impl PhysicalDataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model whose tables may reference tables of `federated`
    /// models. Those are consulted by [`find_table`](Self::find_table) and
    /// count as already present when ordering.
    pub fn with_federated(federated: Vec<Arc<PhysicalDataModel>>) -> Self {
        Self {
            federated,
            ..Self::default()
        }
    }

    pub fn add_federated_model(&mut self, model: Arc<PhysicalDataModel>) {
        self.federated.push(model);
        self.order = OnceLock::new();
    }

    // ========================================================================
    // Building
    // ========================================================================

    /// Add a table object
    pub fn add_table(&mut self, table: DatabaseObject) -> Result<()> {
        if table.as_table().is_none() {
            return Err(SchemaError::validation(format!("{} is not a table", table.key())));
        }
        self.add_object(table)
    }

    /// Add any schema object. Fails if the object, or any group member,
    /// shares an identity with an object already in the model.
    pub fn add_object(&mut self, object: DatabaseObject) -> Result<()> {
        for key in object.identities() {
            if self.by_key.contains_key(key) {
                return Err(SchemaError::duplicate(format!("{} is already in the model", key)));
            }
        }

        let id = ObjectId(self.objects.len());
        for key in object.identities() {
            self.by_key.insert(key.clone(), id);
        }

        let mut leaves = Vec::new();
        collect_leaves(&object, &mut leaves);
        for leaf in leaves {
            if leaf.as_table().is_some() {
                self.tables
                    .insert((leaf.schema().to_string(), leaf.name().to_string()), id);
            }
        }

        for (group, value) in object.tags() {
            self.tags
                .entry((group.clone(), value.clone()))
                .or_default()
                .push(id);
        }

        debug!(object = %object.key(), "Added object to model");
        self.objects.push(object);
        self.order = OnceLock::new();
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Top-level objects in insertion order
    pub fn objects(&self) -> impl Iterator<Item = &DatabaseObject> {
        self.objects.iter()
    }

    /// True if this model, or a federated one, holds `key`
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.by_key.contains_key(key) || self.is_external(key)
    }

    /// The object with `key`, looking inside groups
    pub fn get(&self, key: &ObjectKey) -> Option<&DatabaseObject> {
        let id = self.by_key.get(key)?;
        find_by_key(&self.objects[id.0], key)
    }

    /// Table `schema.name` from this model or, failing that, a federated one
    pub fn find_table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables
            .get(&(schema.to_string(), name.to_string()))
            .and_then(|id| {
                let key = ObjectKey::table(schema, name);
                find_by_key(&self.objects[id.0], &key)
            })
            .and_then(DatabaseObject::as_table)
            .or_else(|| {
                self.federated
                    .iter()
                    .find_map(|model| model.find_table(schema, name))
            })
    }

    /// Top-level objects in creation order: every object after all of its
    /// dependencies, ties broken by insertion order
    pub fn creation_order(&self) -> Result<Vec<&DatabaseObject>> {
        Ok(self.order()?.iter().map(|id| &self.objects[id.0]).collect())
    }

    /// Every table, including group members, in creation order
    pub fn tables(&self) -> Result<Vec<(&DatabaseObject, &Table)>> {
        let mut tables = Vec::new();
        for object in self.creation_order()? {
            let mut leaves = Vec::new();
            collect_leaves(object, &mut leaves);
            tables.extend(leaves.into_iter().filter_map(|l| l.as_table().map(|t| (l, t))));
        }
        Ok(tables)
    }

    // ========================================================================
    // Tags
    // ========================================================================

    /// Objects tagged `group = value`, in insertion order
    pub fn search_by_tag(&self, group: &str, value: &str) -> Vec<&DatabaseObject> {
        self.tags
            .get(&(group.to_string(), value.to_string()))
            .map(|ids| ids.iter().map(|id| &self.objects[id.0]).collect())
            .unwrap_or_default()
    }

    /// Call `f` for every object tagged `group = value`
    pub fn process_objects_with_tag<F>(&self, group: &str, value: &str, mut f: F)
    where
        F: FnMut(&DatabaseObject),
    {
        for object in self.search_by_tag(group, value) {
            f(object);
        }
    }

    /// Visit the objects tagged `group = value` in creation order
    pub fn visit_tagged(&self, visitor: &mut dyn DataModelVisitor, group: &str, value: &str) -> Result<()> {
        let tag = TagRef::new(group, value);
        for object in self.creation_order()? {
            if tag.matches(object) {
                object.visit(visitor);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Visiting
    // ========================================================================

    pub fn visit(&self, visitor: &mut dyn DataModelVisitor) -> Result<()> {
        for object in self.creation_order()? {
            object.visit(visitor);
        }
        Ok(())
    }

    pub fn visit_reverse(&self, visitor: &mut dyn DataModelVisitor) -> Result<()> {
        for object in self.creation_order()?.into_iter().rev() {
            object.visit_reverse(visitor);
        }
        Ok(())
    }

    // ========================================================================
    // Apply and drop
    // ========================================================================

    /// Create every object, unconditionally, in creation order
    #[instrument(skip_all, fields(objects = self.objects.len()))]
    pub async fn apply(&self, adapter: &dyn SchemaAdapter, ctx: SchemaApplyContext) -> Result<()> {
        for object in self.creation_order()? {
            object.apply(adapter, ctx).await?;
        }
        Ok(())
    }

    /// Apply every object whose version is newer than the ledger's, in
    /// creation order
    #[instrument(skip_all, fields(objects = self.objects.len()))]
    pub async fn apply_with_history(
        &self,
        adapter: &dyn SchemaAdapter,
        ctx: SchemaApplyContext,
        ledger: &dyn VersionLedger,
    ) -> Result<()> {
        for object in self.creation_order()? {
            object.apply_version(adapter, ctx, ledger).await?;
        }
        Ok(())
    }

    /// Drop the selected objects (all when `tag` is `None`). Foreign keys
    /// are dropped first so that tables can go in any order, then objects
    /// in reverse creation order.
    #[instrument(skip_all)]
    pub async fn drop(
        &self,
        adapter: &dyn SchemaAdapter,
        ctx: SchemaApplyContext,
        tag: Option<TagRef<'_>>,
    ) -> Result<()> {
        let selected = self.selected_reverse(tag)?;

        for work in self.foreign_keys_of(&selected, ctx) {
            adapter
                .drop_foreign_key(&work.schema, &work.table, &work.constraint.constraint_name)
                .await?;
        }

        for object in selected {
            info!(object = %object.key(), "Dropping object");
            object.drop(adapter).await?;
        }
        Ok(())
    }

    /// Like [`drop`](Self::drop) but each step commits on its own, which
    /// keeps lock footprints small on large schemas
    #[instrument(skip_all)]
    pub async fn drop_split_transaction(
        &self,
        transactions: &dyn TransactionProvider,
        ctx: SchemaApplyContext,
        tag: Option<TagRef<'_>>,
    ) -> Result<()> {
        let selected = self.selected_reverse(tag)?;

        let foreign_keys = self.foreign_keys_of(&selected, ctx);
        if !foreign_keys.is_empty() {
            let tx = transactions.begin().await?;
            let mut outcome = Ok(());
            for work in &foreign_keys {
                outcome = tx
                    .adapter()
                    .drop_foreign_key(&work.schema, &work.table, &work.constraint.constraint_name)
                    .await;
                if outcome.is_err() {
                    break;
                }
            }
            finish(tx, outcome).await?;
        }

        for object in selected {
            info!(object = %object.key(), "Dropping object");
            let tx = transactions.begin().await?;
            let outcome = object.drop(tx.adapter()).await;
            finish(tx, outcome).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Concurrent apply
    // ========================================================================

    /// Register one task per object with `collector`. Each task runs the
    /// object's transactional versioned apply and has the tasks of the
    /// object's dependencies as children. Returns the handles in creation
    /// order.
    pub fn collect(
        self: &Arc<Self>,
        collector: &mut dyn TaskCollector,
        transactions: Arc<dyn TransactionProvider>,
        ledger: Arc<dyn VersionLedger>,
        ctx: SchemaApplyContext,
        retry: RetryPolicy,
    ) -> Result<Vec<TaskHandle>> {
        let order = self.order()?;
        let mut handles: HashMap<ObjectId, TaskHandle> = HashMap::with_capacity(order.len());
        let mut collected = Vec::with_capacity(order.len());

        for &id in order {
            let object = &self.objects[id.0];
            let children: Vec<TaskHandle> = self
                .local_dependencies(id)?
                .into_iter()
                .filter_map(|dep| handles.get(&dep).copied())
                .collect();

            let model = Arc::clone(self);
            let transactions = Arc::clone(&transactions);
            let ledger = Arc::clone(&ledger);
            let retry = retry.clone();
            let runnable: Runnable = Box::new(move || {
                async move {
                    model.objects[id.0]
                        .apply_tx(ctx, transactions.as_ref(), ledger.as_ref(), &retry)
                        .await
                }
                .boxed()
            });

            let handle = collector.make_task_group(object.key().to_string(), runnable, &children);
            handles.insert(id, handle);
            collected.push(handle);
        }

        debug!(tasks = collected.len(), "Collected model");
        Ok(collected)
    }

    // ========================================================================
    // Distribution
    // ========================================================================

    /// Distribute tables: reference tables first, then distributed tables
    /// (which may be co-located with reference tables)
    #[instrument(skip_all)]
    pub async fn apply_distribution_rules(&self, adapter: &dyn SchemaAdapter) -> Result<()> {
        for (object, table, pass) in self.distribution_order()? {
            debug!(table = %object.key(), distribution = ?pass, "Distributing table");
            adapter
                .apply_distribution_rules(object.schema(), object.name(), pass, table.effective_distribution_column())
                .await?;
        }
        Ok(())
    }

    /// Create every enabled foreign key. Used after distribution when the
    /// tables were created without constraints.
    #[instrument(skip_all)]
    pub async fn apply_foreign_key_constraints(
        &self,
        adapter: &dyn SchemaAdapter,
        ctx: SchemaApplyContext,
    ) -> Result<()> {
        let mut collector = ForeignKeyCollector::new(ctx.distributed);
        self.visit(&mut collector)?;
        for work in collector.into_work() {
            adapter
                .create_foreign_key(&work.schema, &work.table, &work.constraint, work.tenant_column.as_deref())
                .await?;
        }
        Ok(())
    }

    /// Distribute the tables, then add the enabled foreign keys, skipping
    /// every step `ledger` already records
    ///
    /// Each table distribution and each constraint runs in a transaction of
    /// its own and is recorded there under [`ObjectType::Distribution`] or
    /// [`ObjectType::ForeignKey`], so a run that stops part way is finished
    /// by the next one.
    #[instrument(skip_all)]
    pub async fn apply_distribution_with_history(
        &self,
        transactions: &dyn TransactionProvider,
        ledger: &dyn VersionLedger,
    ) -> Result<()> {
        let mut applied = 0usize;

        for (object, table, pass) in self.distribution_order()? {
            let step = SetupStep::Distribute {
                schema: object.schema(),
                table: object.name(),
                distribution: pass,
                column: table.effective_distribution_column(),
            };
            if step
                .apply_once(object.schema(), object.meta().tracking_name(), transactions, ledger)
                .await?
            {
                applied += 1;
            }
        }

        let mut collector = ForeignKeyCollector::new(true);
        self.visit(&mut collector)?;
        for work in collector.into_work() {
            let tracking_name = format!("{}.{}", work.table, work.constraint.constraint_name);
            if SetupStep::ForeignKey(&work)
                .apply_once(&work.schema, &tracking_name, transactions, ledger)
                .await?
            {
                applied += 1;
            }
        }

        info!(applied, "Distribution steps applied");
        Ok(())
    }

    // ========================================================================
    // Tenant partitions
    // ========================================================================

    /// Create `tenant_id`'s partition on every tenant table
    #[instrument(skip(self, adapter))]
    pub async fn add_tenant_partitions(
        &self,
        adapter: &dyn SchemaAdapter,
        tenant_id: i32,
        extent_size_kb: u32,
    ) -> Result<()> {
        for (object, _, tenant_column) in self.tenant_tables()? {
            adapter
                .create_tenant_partition(
                    object.schema(),
                    object.name(),
                    tenant_column,
                    tenant_id,
                    extent_size_kb,
                )
                .await?;
        }
        Ok(())
    }

    /// Create `tenant_id`'s partition on tenant tables that do not have one
    /// yet, e.g. tables added by a schema update
    #[instrument(skip(self, adapter))]
    pub async fn add_new_tenant_partitions(
        &self,
        adapter: &dyn SchemaAdapter,
        tenant_id: i32,
        extent_size_kb: u32,
    ) -> Result<()> {
        for (object, _, tenant_column) in self.tenant_tables()? {
            adapter
                .add_new_tenant_partition(
                    object.schema(),
                    object.name(),
                    tenant_column,
                    tenant_id,
                    extent_size_kb,
                )
                .await?;
        }
        Ok(())
    }

    /// Detach `tenant_id`'s partitions, in reverse creation order
    #[instrument(skip(self, adapter))]
    pub async fn detach_tenant_partitions(&self, adapter: &dyn SchemaAdapter, tenant_id: i32) -> Result<()> {
        for (object, _, _) in self.tenant_tables()?.into_iter().rev() {
            adapter
                .detach_tenant_partition(object.schema(), object.name(), tenant_id)
                .await?;
        }
        Ok(())
    }

    /// Drop `tenant_id`'s detached partitions, in reverse creation order
    #[instrument(skip(self, adapter))]
    pub async fn drop_detached_partitions(&self, adapter: &dyn SchemaAdapter, tenant_id: i32) -> Result<()> {
        for (object, _, _) in self.tenant_tables()?.into_iter().rev() {
            adapter
                .drop_detached_partition(object.schema(), object.name(), tenant_id)
                .await?;
        }
        Ok(())
    }

    // ========================================================================
    // Grants and routines
    // ========================================================================

    /// Grant every object's privileges for `group` to `user`
    #[instrument(skip(self, adapter))]
    pub async fn apply_grants(&self, adapter: &dyn SchemaAdapter, group: &str, user: &str) -> Result<()> {
        for object in self.creation_order()? {
            object.grant(adapter, group, user).await?;
        }
        Ok(())
    }

    /// (Re)create every stored procedure
    pub async fn apply_procedures(&self, adapter: &dyn SchemaAdapter, ctx: SchemaApplyContext) -> Result<()> {
        for object in self.leaves_of_type(ObjectType::Procedure)? {
            object.apply(adapter, ctx).await?;
        }
        Ok(())
    }

    /// (Re)create every function
    pub async fn apply_functions(&self, adapter: &dyn SchemaAdapter, ctx: SchemaApplyContext) -> Result<()> {
        for object in self.leaves_of_type(ObjectType::Function)? {
            object.apply(adapter, ctx).await?;
        }
        Ok(())
    }

    /// Drop every procedure, then every function, in reverse creation order
    pub async fn drop_procedures_and_functions(&self, adapter: &dyn SchemaAdapter) -> Result<()> {
        for object_type in [ObjectType::Procedure, ObjectType::Function] {
            for object in self.leaves_of_type(object_type)?.into_iter().rev() {
                object.drop(adapter).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Ordering internals
    // ========================================================================

    fn order(&self) -> Result<&[ObjectId]> {
        if let Some(order) = self.order.get() {
            return Ok(order);
        }
        let order = self.compute_order()?;
        Ok(self.order.get_or_init(|| order))
    }

    /// Ids of the local objects `id` depends on. Dependencies held by a
    /// federated model are already present and ignored.
    fn local_dependencies(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let object = &self.objects[id.0];
        let mut deps = BTreeSet::new();
        for key in object.dependencies() {
            match self.by_key.get(key) {
                Some(&dep) if dep == id => {}
                Some(&dep) => {
                    deps.insert(dep);
                }
                None if self.is_external(key) => {}
                None => {
                    return Err(SchemaError::invalid_dependency(format!(
                        "{} depends on {}, which is not in the model",
                        object.key(),
                        key
                    )));
                }
            }
        }
        Ok(deps.into_iter().collect())
    }

    fn compute_order(&self) -> Result<Vec<ObjectId>> {
        let count = self.objects.len();
        let mut pending = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for index in 0..count {
            for dep in self.local_dependencies(ObjectId(index))? {
                pending[index] += 1;
                dependents[dep.0].push(index);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
            .filter(|&i| pending[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(Reverse(index)) = ready.pop() {
            order.push(ObjectId(index));
            for &dependent in &dependents[index] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < count {
            let cycle: Vec<String> = (0..count)
                .filter(|&i| pending[i] > 0)
                .map(|i| self.objects[i].key().to_string())
                .collect();
            return Err(SchemaError::invalid_dependency(format!(
                "dependency cycle among {}",
                cycle.join(", ")
            )));
        }
        Ok(order)
    }

    fn is_external(&self, key: &ObjectKey) -> bool {
        self.federated.iter().any(|model| model.contains(key))
    }

    fn selected_reverse(&self, tag: Option<TagRef<'_>>) -> Result<Vec<&DatabaseObject>> {
        Ok(self
            .creation_order()?
            .into_iter()
            .rev()
            .filter(|object| tag.is_none_or(|t| t.matches(object)))
            .collect())
    }

    fn foreign_keys_of(
        &self,
        objects: &[&DatabaseObject],
        ctx: SchemaApplyContext,
    ) -> Vec<ForeignKeyWork> {
        let mut collector = ForeignKeyCollector::new(ctx.distributed);
        for object in objects {
            object.visit_reverse(&mut collector);
        }
        collector.into_work()
    }

    /// Reference tables, then distributed tables, each in creation order
    fn distribution_order(&self) -> Result<Vec<(&DatabaseObject, &Table, DistributionType)>> {
        let tables = self.tables()?;
        let mut ordered = Vec::new();
        for pass in [DistributionType::Reference, DistributionType::Distributed] {
            ordered.extend(
                tables
                    .iter()
                    .filter(|(_, table)| table.distribution == pass)
                    .map(|(object, table)| (*object, *table, pass)),
            );
        }
        Ok(ordered)
    }

    fn tenant_tables(&self) -> Result<Vec<(&DatabaseObject, &Table, &str)>> {
        Ok(self
            .tables()?
            .into_iter()
            .filter_map(|(object, table)| {
                table
                    .tenant_column
                    .as_deref()
                    .map(|column| (object, table, column))
            })
            .collect())
    }

    fn leaves_of_type(&self, object_type: ObjectType) -> Result<Vec<&DatabaseObject>> {
        let mut found = Vec::new();
        self.visit(&mut |item: Visited<'_>| {
            if let Visited::Object(object) = item {
                if object.object_type() == object_type {
                    found.push(object.key().clone());
                }
            }
        })?;
        Ok(found.iter().filter_map(|key| self.get(key)).collect())
    }
}

/// One step of the post-creation setup of a distributed database
enum SetupStep<'a> {
    Distribute {
        schema: &'a str,
        table: &'a str,
        distribution: DistributionType,
        column: Option<&'a str>,
    },
    ForeignKey(&'a ForeignKeyWork),
}

impl SetupStep<'_> {
    fn object_type(&self) -> ObjectType {
        match self {
            SetupStep::Distribute { .. } => ObjectType::Distribution,
            SetupStep::ForeignKey(_) => ObjectType::ForeignKey,
        }
    }

    async fn run(&self, adapter: &dyn SchemaAdapter) -> Result<()> {
        match self {
            SetupStep::Distribute {
                schema,
                table,
                distribution,
                column,
            } => {
                adapter
                    .apply_distribution_rules(schema, table, *distribution, *column)
                    .await
            }
            SetupStep::ForeignKey(work) => {
                adapter
                    .create_foreign_key(&work.schema, &work.table, &work.constraint, work.tenant_column.as_deref())
                    .await
            }
        }
    }

    /// Run the step unless `ledger` has it, recording it in the same
    /// transaction. Returns whether the step ran.
    async fn apply_once(
        &self,
        schema: &str,
        tracking_name: &str,
        transactions: &dyn TransactionProvider,
        ledger: &dyn VersionLedger,
    ) -> Result<bool> {
        let object_type = self.object_type();
        if !ledger.applies(schema, object_type, tracking_name, 1).await? {
            debug!(step = %format!("{}:{}.{}", object_type, schema, tracking_name), "Already applied");
            return Ok(false);
        }

        let tx = transactions.begin().await?;
        let tx_ledger = TransactionalLedger::new(ledger, tx.adapter());
        let outcome = async {
            self.run(tx.adapter()).await?;
            tx_ledger.add_version(schema, object_type, tracking_name, 1).await
        }
        .await;
        let staged = tx_ledger.into_staged();
        finish(tx, outcome).await?;
        staged.confirm(ledger).await?;
        Ok(true)
    }
}

/// Commit on success, roll back on error, and hand back the outcome
async fn finish(mut tx: Box<dyn Transaction>, outcome: Result<()>) -> Result<()> {
    if outcome.is_err() {
        tx.set_rollback_only();
    }
    let closed = tx.close().await;
    outcome.and(closed)
}

fn collect_leaves<'a>(object: &'a DatabaseObject, out: &mut Vec<&'a DatabaseObject>) {
    match object.kind() {
        ObjectKind::Group(group) => {
            for member in group.members() {
                collect_leaves(member, out);
            }
        }
        _ => out.push(object),
    }
}

fn find_by_key<'a>(object: &'a DatabaseObject, key: &ObjectKey) -> Option<&'a DatabaseObject> {
    if object.key() == key {
        return Some(object);
    }
    object
        .as_group()
        .and_then(|group| group.members().iter().find_map(|m| find_by_key(m, key)))
}
