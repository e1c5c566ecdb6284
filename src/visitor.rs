//! Visitors over the data model
//!
//! Objects are walked in creation order with [`PhysicalDataModel::visit`]
//! or in drop order with [`PhysicalDataModel::visit_reverse`]. Tables also
//! report each of their foreign keys so constraint work can be collected
//! separately from table work.
//!
//! [`PhysicalDataModel::visit`]: crate::model::PhysicalDataModel::visit
//! [`PhysicalDataModel::visit_reverse`]: crate::model::PhysicalDataModel::visit_reverse

use crate::object::{DatabaseObject, ForeignKeyConstraint, Table};

/// What a visitor is shown
#[derive(Debug, Clone, Copy)]
pub enum Visited<'a> {
    /// Any schema object (group members are reported individually)
    Object(&'a DatabaseObject),
    /// A foreign key of a table
    ForeignKey {
        object: &'a DatabaseObject,
        table: &'a Table,
        constraint: &'a ForeignKeyConstraint,
    },
}

/// Receives objects during a model walk
pub trait DataModelVisitor {
    fn visited(&mut self, item: Visited<'_>);
}

impl<F> DataModelVisitor for F
where
    F: FnMut(Visited<'_>),
{
    fn visited(&mut self, item: Visited<'_>) {
        self(item)
    }
}

/// A foreign key to create or drop, with the context the adapter needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyWork {
    pub schema: String,
    pub table: String,
    pub tenant_column: Option<String>,
    pub constraint: ForeignKeyConstraint,
}

/// Collects the foreign keys that are enabled for a deployment
#[derive(Debug, Default)]
pub struct ForeignKeyCollector {
    distributed: bool,
    collected: Vec<ForeignKeyWork>,
}

impl ForeignKeyCollector {
    pub fn new(distributed: bool) -> Self {
        Self {
            distributed,
            collected: Vec::new(),
        }
    }

    pub fn into_work(self) -> Vec<ForeignKeyWork> {
        self.collected
    }
}

impl DataModelVisitor for ForeignKeyCollector {
    fn visited(&mut self, item: Visited<'_>) {
        if let Visited::ForeignKey {
            object,
            table,
            constraint,
        } = item
        {
            if constraint.is_enabled(table.distribution, self.distributed) {
                self.collected.push(ForeignKeyWork {
                    schema: object.schema().to_string(),
                    table: object.name().to_string(),
                    tenant_column: table.tenant_column.clone(),
                    constraint: constraint.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhysicalDataModel;
    use crate::types::DistributionType;

    fn node_table(distribution: DistributionType) -> DatabaseObject {
        Table::builder("S", "NODE")
            .add_bigint_column("ID", false)
            .add_bigint_column("PARENT_ID", true)
            .primary_key("PK_NODE", ["ID"])
            .distribution(distribution)
            .distribution_column("ID")
            .add_foreign_key(ForeignKeyConstraint::new("FK_NODE", "S", "NODE", ["PARENT_ID"]))
            .build(&PhysicalDataModel::new())
            .unwrap()
    }

    #[test]
    fn test_forward_visit_reports_table_before_constraints() {
        let table = node_table(DistributionType::None);
        let mut seen = Vec::new();
        table.visit(&mut |item: Visited<'_>| match item {
            Visited::Object(obj) => seen.push(format!("object:{}", obj.name())),
            Visited::ForeignKey { constraint, .. } => {
                seen.push(format!("fk:{}", constraint.constraint_name))
            }
        });
        assert_eq!(seen, vec!["object:NODE", "fk:FK_NODE"]);
    }

    #[test]
    fn test_reverse_visit_reports_constraints_first() {
        let table = node_table(DistributionType::None);
        let mut seen = Vec::new();
        table.visit_reverse(&mut |item: Visited<'_>| match item {
            Visited::Object(obj) => seen.push(format!("object:{}", obj.name())),
            Visited::ForeignKey { constraint, .. } => {
                seen.push(format!("fk:{}", constraint.constraint_name))
            }
        });
        assert_eq!(seen, vec!["fk:FK_NODE", "object:NODE"]);
    }

    #[test]
    fn test_collector_honours_distribution() {
        let local = node_table(DistributionType::None);

        let mut collector = ForeignKeyCollector::new(false);
        local.visit(&mut collector);
        assert_eq!(collector.into_work().len(), 1);

        let mut collector = ForeignKeyCollector::new(true);
        local.visit(&mut collector);
        assert!(collector.into_work().is_empty());

        let sharded = node_table(DistributionType::Distributed);
        let mut collector = ForeignKeyCollector::new(true);
        sharded.visit(&mut collector);
        let work = collector.into_work();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].table, "NODE");
    }
}
