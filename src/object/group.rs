//! Object groups
//!
//! A group bundles objects that must be applied together in one
//! transaction, for example a table together with its indexes. Members are
//! created in the order they were added and dropped in reverse. The group
//! depends on whatever its members depend on outside the group.

use std::collections::BTreeSet;

use tracing::debug;

use crate::adapter::SchemaAdapter;
use crate::error::{Result, SchemaError};
use crate::ledger::VersionLedger;
use crate::object::{DatabaseObject, ObjectKind, ObjectMeta, SchemaApplyContext, impl_meta_builder};
use crate::types::{ObjectKey, ObjectType};
use crate::visitor::DataModelVisitor;

/// Ordered members applied as a unit
#[derive(Debug, Clone)]
pub struct ObjectGroup {
    members: Vec<DatabaseObject>,
}

impl ObjectGroup {
    pub fn builder(schema: impl Into<String>, name: impl Into<String>) -> ObjectGroupBuilder {
        ObjectGroupBuilder {
            meta: ObjectMeta::new(ObjectType::Group, schema, name),
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[DatabaseObject] {
        &self.members
    }

    pub(crate) async fn apply(&self, adapter: &dyn SchemaAdapter, ctx: SchemaApplyContext) -> Result<()> {
        for member in &self.members {
            member.apply(adapter, ctx).await?;
        }
        Ok(())
    }

    pub(crate) async fn apply_versioned(
        &self,
        prior_version: i32,
        adapter: &dyn SchemaAdapter,
        ctx: SchemaApplyContext,
    ) -> Result<()> {
        for member in &self.members {
            member.apply_versioned(prior_version, adapter, ctx).await?;
        }
        Ok(())
    }

    /// Each member is gated by its own ledger entry
    pub(crate) async fn apply_version(
        &self,
        adapter: &dyn SchemaAdapter,
        ctx: SchemaApplyContext,
        ledger: &dyn VersionLedger,
    ) -> Result<()> {
        for member in &self.members {
            member.apply_version(adapter, ctx, ledger).await?;
        }
        Ok(())
    }

    pub(crate) async fn drop(&self, adapter: &dyn SchemaAdapter) -> Result<()> {
        for member in self.members.iter().rev() {
            debug!(object = %member.key(), "Dropping group member");
            member.drop(adapter).await?;
        }
        Ok(())
    }

    pub(crate) async fn grant(&self, adapter: &dyn SchemaAdapter, group_name: &str, user: &str) -> Result<()> {
        for member in &self.members {
            member.grant(adapter, group_name, user).await?;
        }
        Ok(())
    }

    pub(crate) fn visit(&self, visitor: &mut dyn DataModelVisitor) {
        for member in &self.members {
            member.visit(visitor);
        }
    }

    pub(crate) fn visit_reverse(&self, visitor: &mut dyn DataModelVisitor) {
        for member in self.members.iter().rev() {
            member.visit_reverse(visitor);
        }
    }
}

/// Builder for [`ObjectGroup`] objects
#[derive(Debug)]
pub struct ObjectGroupBuilder {
    meta: ObjectMeta,
    members: Vec<DatabaseObject>,
}

impl_meta_builder!(ObjectGroupBuilder);

impl ObjectGroupBuilder {
    pub fn add_member(mut self, member: DatabaseObject) -> Self {
        self.members.push(member);
        self
    }

    pub fn build(mut self) -> Result<DatabaseObject> {
        if self.members.is_empty() {
            return Err(SchemaError::validation(format!("{} has no members", self.meta.key())));
        }

        let mut inside: BTreeSet<ObjectKey> = BTreeSet::new();
        inside.insert(self.meta.key().clone());
        for member in &self.members {
            for key in member.identities() {
                if !inside.insert(key.clone()) {
                    return Err(SchemaError::duplicate(format!(
                        "{} appears twice in group {}",
                        key,
                        self.meta.key()
                    )));
                }
            }
        }

        // Dependencies between members are satisfied by member order
        let external: Vec<ObjectKey> = self
            .members
            .iter()
            .flat_map(|m| m.dependencies().iter())
            .filter(|dep| !inside.contains(*dep))
            .cloned()
            .collect();
        for dependency in external {
            self.meta.add_dependency(dependency);
        }

        DatabaseObject::new(self.meta, ObjectKind::Group(ObjectGroup { members: self.members }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Index;

    fn anchor(name: &str) -> DatabaseObject {
        DatabaseObject::no_op("S", name).build().unwrap()
    }

    #[test]
    fn test_group_inherits_external_dependencies() {
        let index = Index::builder("S", "IDX_A", "OUTSIDE")
            .add_column("A")
            .add_dependency(ObjectKey::new(ObjectType::NoOp, "S", "FIRST"))
            .build()
            .unwrap();

        let group = ObjectGroup::builder("S", "G")
            .add_member(anchor("FIRST"))
            .add_member(index)
            .build()
            .unwrap();

        let deps: Vec<_> = group.dependencies().iter().cloned().collect();
        assert_eq!(deps, vec![ObjectKey::table("S", "OUTSIDE")]);
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let err = ObjectGroup::builder("S", "G")
            .add_member(anchor("A"))
            .add_member(anchor("A"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateDefinition(_)));
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(ObjectGroup::builder("S", "G").build().is_err());
    }

    #[test]
    fn test_identities_include_members() {
        let group = ObjectGroup::builder("S", "G")
            .add_member(anchor("A"))
            .add_member(anchor("B"))
            .build()
            .unwrap();
        let names: Vec<_> = group.identities().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["G", "A", "B"]);
    }
}
