//! DDL Generation for PostgreSQL
//!
//! Generates the PostgreSQL statements behind every schema adapter
//! operation. Tenant tables are list-partitioned by their tenant column,
//! row access control maps to row-level security policies, and distribution
//! uses the Citus table functions.

use std::collections::BTreeSet;

use crate::object::{ForeignKeyConstraint, Sequence, Table};
use crate::sql::sanitize::{qualified_name, quote_identifier, quote_literal};
use crate::types::{
    ColumnDef, DistributionType, Generated, IndexDef, Privilege, SortOrder, SqlParam, Statement,
};

/// DDL generator for the PostgreSQL dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct DdlGenerator;

impl DdlGenerator {
    pub fn new() -> Self {
        Self
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    pub fn generate_create_schema(&self, schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema))
    }

    // ========================================================================
    // Tables and columns
    // ========================================================================

    /// Generate CREATE TABLE statement
    ///
    /// Tables with a tenant column are created as `PARTITION BY LIST` parents,
    /// and the tenant column is prepended to their primary key and unique
    /// constraints as PostgreSQL requires for partitioned tables.
    pub fn generate_create_table(&self, schema: &str, name: &str, table: &Table) -> String {
        let tenant = table.tenant_column.as_deref();
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|col| {
                let identity = table
                    .identity
                    .as_ref()
                    .filter(|id| id.column == col.name)
                    .map(|id| id.generated);
                Self::format_column_definition(col, identity)
            })
            .collect();

        if let Some(pk) = &table.primary_key {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote_identifier(&pk.constraint_name),
                Self::column_list(tenant, &pk.columns)
            ));
        }
        for unique in &table.unique_constraints {
            parts.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                quote_identifier(&unique.constraint_name),
                Self::column_list(tenant, &unique.columns)
            ));
        }
        for check in &table.check_constraints {
            parts.push(format!(
                "CONSTRAINT {} CHECK ({})",
                quote_identifier(&check.constraint_name),
                check.expression
            ));
        }

        let mut ddl = format!("CREATE TABLE {} ({})", qualified_name(schema, name), parts.join(", "));
        match tenant {
            Some(column) => {
                ddl.push_str(&format!(" PARTITION BY LIST ({})", quote_identifier(column)));
            }
            None if !table.with_options.is_empty() => {
                let options: Vec<String> = table
                    .with_options
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                ddl.push_str(&format!(" WITH ({})", options.join(", ")));
            }
            None => {}
        }
        ddl
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, schema: &str, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", qualified_name(schema, name))
    }

    pub fn generate_add_column(&self, schema: &str, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
            qualified_name(schema, table),
            Self::format_column_definition(column, None)
        )
    }

    pub fn generate_drop_column(&self, schema: &str, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            qualified_name(schema, table),
            quote_identifier(column)
        )
    }

    /// Format a single column definition for CREATE TABLE or ALTER TABLE ADD COLUMN
    pub fn format_column_definition(col: &ColumnDef, identity: Option<Generated>) -> String {
        let mut parts = vec![quote_identifier(&col.name), col.column_type.to_sql_type()];

        match identity {
            Some(Generated::Always) => parts.push("GENERATED ALWAYS AS IDENTITY".to_string()),
            Some(Generated::ByDefault) => parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string()),
            None => {}
        }

        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &col.default_value {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }

    // ========================================================================
    // Indexes and constraints
    // ========================================================================

    /// Generate CREATE INDEX statement
    pub fn generate_create_index(
        &self,
        schema: &str,
        table: &str,
        index: &IndexDef,
        tenant_column: Option<&str>,
    ) -> String {
        let mut columns: Vec<String> = Vec::new();
        if let Some(tenant) = tenant_column {
            if !index.column_names().any(|c| c == tenant) {
                columns.push(quote_identifier(tenant));
            }
        }
        columns.extend(index.columns.iter().map(|col| match col.order {
            SortOrder::Asc => quote_identifier(&col.name),
            SortOrder::Desc => format!("{} DESC", quote_identifier(&col.name)),
        }));

        let unique_clause = if index.unique { "UNIQUE " } else { "" };
        let mut ddl = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            unique_clause,
            quote_identifier(&index.name),
            qualified_name(schema, table),
            columns.join(", ")
        );
        if !index.include_columns.is_empty() {
            let include: Vec<String> = index.include_columns.iter().map(|c| quote_identifier(c)).collect();
            ddl.push_str(&format!(" INCLUDE ({})", include.join(", ")));
        }
        ddl
    }

    pub fn generate_drop_index(&self, schema: &str, index_name: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", qualified_name(schema, index_name))
    }

    /// Generate ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY
    ///
    /// Returns `None` for constraints declared as not enforced, which
    /// PostgreSQL cannot represent. Between two tenant tables both sides
    /// lead with the tenant column, matching the tenant-prefixed keys of
    /// the referenced table.
    pub fn generate_create_foreign_key(&self, schema: &str, table: &str, fk: &ForeignKeyConstraint) -> Option<String> {
        if !fk.enforced {
            return None;
        }

        let (source_tenant, target_tenant) = match fk.tenant_columns() {
            Some((source, target)) => (Some(source), Some(target)),
            None => (None, None),
        };
        let columns = Self::column_list(source_tenant, &fk.columns);
        let target = qualified_name(&fk.target_schema, &fk.target_table);
        let references = if fk.target_columns.is_empty() {
            target
        } else {
            format!("{} ({})", target, Self::column_list(target_tenant, &fk.target_columns))
        };

        Some(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
            qualified_name(schema, table),
            quote_identifier(&fk.constraint_name),
            columns,
            references
        ))
    }

    pub fn generate_drop_foreign_key(&self, schema: &str, table: &str, constraint_name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            qualified_name(schema, table),
            quote_identifier(constraint_name)
        )
    }

    // ========================================================================
    // Sequences, views, routines and types
    // ========================================================================

    pub fn generate_create_sequence(&self, schema: &str, name: &str, sequence: &Sequence) -> String {
        format!(
            "CREATE SEQUENCE IF NOT EXISTS {} AS BIGINT START WITH {} INCREMENT BY {} CACHE {}",
            qualified_name(schema, name),
            sequence.start_with,
            sequence.increment_by,
            sequence.cache.max(1)
        )
    }

    pub fn generate_alter_sequence_restart(
        &self,
        schema: &str,
        name: &str,
        restart_with: i64,
        cache: u32,
        increment_by: i64,
    ) -> String {
        format!(
            "ALTER SEQUENCE {} RESTART WITH {} INCREMENT BY {} CACHE {}",
            qualified_name(schema, name),
            restart_with,
            increment_by,
            cache.max(1)
        )
    }

    pub fn generate_drop_sequence(&self, schema: &str, name: &str) -> String {
        format!("DROP SEQUENCE IF EXISTS {}", qualified_name(schema, name))
    }

    pub fn generate_create_view(&self, schema: &str, name: &str, definition: &str) -> String {
        format!("CREATE OR REPLACE VIEW {} AS {}", qualified_name(schema, name), definition)
    }

    pub fn generate_drop_view(&self, schema: &str, name: &str) -> String {
        format!("DROP VIEW IF EXISTS {}", qualified_name(schema, name))
    }

    pub fn generate_create_procedure(&self, schema: &str, name: &str, body: &str) -> String {
        format!("CREATE OR REPLACE PROCEDURE {} {}", qualified_name(schema, name), body)
    }

    pub fn generate_drop_procedure(&self, schema: &str, name: &str) -> String {
        format!("DROP PROCEDURE IF EXISTS {}", qualified_name(schema, name))
    }

    pub fn generate_create_function(&self, schema: &str, name: &str, body: &str) -> String {
        format!("CREATE OR REPLACE FUNCTION {} {}", qualified_name(schema, name), body)
    }

    pub fn generate_drop_function(&self, schema: &str, name: &str) -> String {
        format!("DROP FUNCTION IF EXISTS {}", qualified_name(schema, name))
    }

    pub fn generate_create_row_type(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> String {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.to_sql_type()))
            .collect();
        format!("CREATE TYPE {} AS ({})", qualified_name(schema, name), fields.join(", "))
    }

    pub fn generate_drop_type(&self, schema: &str, name: &str) -> String {
        format!("DROP TYPE IF EXISTS {}", qualified_name(schema, name))
    }

    // ========================================================================
    // Row-level security
    // ========================================================================

    /// Policy restricting rows to the tenant named by a session setting
    pub fn generate_create_policy(
        &self,
        schema: &str,
        policy_name: &str,
        table: &str,
        variable: &str,
        tenant_column: &str,
    ) -> String {
        format!(
            "CREATE POLICY {} ON {} USING ({} = current_setting({})::INT)",
            quote_identifier(policy_name),
            qualified_name(schema, table),
            quote_identifier(tenant_column),
            quote_literal(variable)
        )
    }

    pub fn generate_drop_policy(&self, schema: &str, policy_name: &str, table: &str) -> String {
        format!(
            "DROP POLICY IF EXISTS {} ON {}",
            quote_identifier(policy_name),
            qualified_name(schema, table)
        )
    }

    pub fn generate_row_security(&self, schema: &str, table: &str, enable: bool) -> String {
        format!(
            "ALTER TABLE {} {} ROW LEVEL SECURITY",
            qualified_name(schema, table),
            if enable { "ENABLE" } else { "DISABLE" }
        )
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Generate GRANT. `object_class` is the keyword before the name, e.g.
    /// `TABLE`, `SEQUENCE`, `PROCEDURE` or `FUNCTION`.
    pub fn generate_grant(
        &self,
        object_class: &str,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Option<String> {
        if privileges.is_empty() {
            return None;
        }
        let list: Vec<&str> = privileges.iter().map(Privilege::as_sql).collect();
        Some(format!(
            "GRANT {} ON {} {} TO {}",
            list.join(", "),
            object_class,
            qualified_name(schema, name),
            quote_identifier(user)
        ))
    }

    // ========================================================================
    // Tenant partitions
    // ========================================================================

    /// Name of the partition holding `tenant_id`'s rows of `table`
    pub fn partition_name(table: &str, tenant_id: i32) -> String {
        format!("{}_P{}", table, tenant_id)
    }

    pub fn generate_create_partition(
        &self,
        schema: &str,
        table: &str,
        tenant_id: i32,
        if_not_exists: bool,
    ) -> String {
        format!(
            "CREATE TABLE {}{} PARTITION OF {} FOR VALUES IN ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            qualified_name(schema, &Self::partition_name(table, tenant_id)),
            qualified_name(schema, table),
            tenant_id
        )
    }

    pub fn generate_detach_partition(&self, schema: &str, table: &str, tenant_id: i32) -> String {
        format!(
            "ALTER TABLE {} DETACH PARTITION {}",
            qualified_name(schema, table),
            qualified_name(schema, &Self::partition_name(table, tenant_id))
        )
    }

    pub fn generate_drop_partition(&self, schema: &str, table: &str, tenant_id: i32) -> String {
        format!(
            "DROP TABLE IF EXISTS {}",
            qualified_name(schema, &Self::partition_name(table, tenant_id))
        )
    }

    // ========================================================================
    // Distribution
    // ========================================================================

    /// Citus call that distributes a table; `None` for local tables
    pub fn generate_distribution(
        &self,
        schema: &str,
        table: &str,
        distribution: DistributionType,
        column: Option<&str>,
    ) -> Option<Statement> {
        let relation = SqlParam::Text(qualified_name(schema, table));
        match (distribution, column) {
            (DistributionType::Reference, _) => {
                Some(Statement::new("SELECT create_reference_table($1)").bind(relation))
            }
            (DistributionType::Distributed, Some(column)) => Some(
                Statement::new("SELECT create_distributed_table($1, $2)")
                    .bind(relation)
                    .bind(SqlParam::Text(column.to_string())),
            ),
            _ => None,
        }
    }

    // ========================================================================
    // Version ledger
    // ========================================================================

    pub fn generate_create_ledger_table(&self, admin_schema: &str, ledger_table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             schema_name VARCHAR(63) NOT NULL, \
             object_type VARCHAR(16) NOT NULL, \
             object_name VARCHAR(128) NOT NULL, \
             version INT NOT NULL, \
             applied TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
             PRIMARY KEY (schema_name, object_type, object_name, version))",
            qualified_name(admin_schema, ledger_table)
        )
    }

    /// Latest version per object
    pub fn generate_select_ledger(&self, admin_schema: &str, ledger_table: &str) -> String {
        format!(
            "SELECT schema_name, object_type, object_name, MAX(version) AS version FROM {} \
             GROUP BY schema_name, object_type, object_name",
            qualified_name(admin_schema, ledger_table)
        )
    }

    /// Every recorded row, oldest first
    pub fn generate_select_ledger_history(&self, admin_schema: &str, ledger_table: &str) -> String {
        format!(
            "SELECT schema_name, object_type, object_name, version, applied FROM {} \
             ORDER BY applied, schema_name, object_name, version",
            qualified_name(admin_schema, ledger_table)
        )
    }

    pub fn generate_insert_ledger(&self, admin_schema: &str, ledger_table: &str) -> String {
        format!(
            "INSERT INTO {} (schema_name, object_type, object_name, version) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            qualified_name(admin_schema, ledger_table)
        )
    }

    /// Key columns, with the tenant column in front when it is not already
    /// part of them
    fn column_list(tenant_column: Option<&str>, columns: &[String]) -> String {
        let mut quoted = Vec::with_capacity(columns.len() + 1);
        if let Some(tenant) = tenant_column {
            if !columns.iter().any(|c| c == tenant) {
                quoted.push(quote_identifier(tenant));
            }
        }
        quoted.extend(columns.iter().map(|c| quote_identifier(c)));
        quoted.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhysicalDataModel;
    use crate::types::{ColumnType, IndexDef};

    fn generator() -> DdlGenerator {
        DdlGenerator::new()
    }

    fn resources_table() -> Table {
        let obj = Table::builder("FHIRDATA", "RESOURCES")
            .add_int_column("MT_ID", false)
            .add_bigint_column("RESOURCE_ID", false)
            .add_varchar_column("LOGICAL_ID", 255, false)
            .add_char_column("IS_DELETED", 1, false, Some("'X'"))
            .primary_key("PK_RESOURCES", ["RESOURCE_ID"])
            .add_unique_constraint("UQ_RESOURCES_LID", ["LOGICAL_ID"])
            .add_check_constraint("CK_DELETED", "IS_DELETED IN ('X', 'Y')")
            .identity("RESOURCE_ID", Generated::ByDefault)
            .tenant_column("MT_ID")
            .build(&PhysicalDataModel::new())
            .unwrap();
        obj.as_table().unwrap().clone()
    }

    // ==================== CREATE TABLE Tests ====================

    #[test]
    fn test_generate_create_table_plain() {
        let obj = Table::builder("S", "PARAMETER_NAMES")
            .add_int_column("PARAMETER_NAME_ID", false)
            .add_varchar_column("PARAMETER_NAME", 255, false)
            .primary_key("PK_PARAMETER_NAMES", ["PARAMETER_NAME_ID"])
            .add_with("fillfactor", "90")
            .build(&PhysicalDataModel::new())
            .unwrap();

        let ddl = generator().generate_create_table("S", "PARAMETER_NAMES", obj.as_table().unwrap());

        assert_eq!(
            ddl,
            "CREATE TABLE \"S\".\"PARAMETER_NAMES\" (\"PARAMETER_NAME_ID\" INT NOT NULL, \
             \"PARAMETER_NAME\" VARCHAR(255) NOT NULL, \
             CONSTRAINT \"PK_PARAMETER_NAMES\" PRIMARY KEY (\"PARAMETER_NAME_ID\")) WITH (fillfactor=90)"
        );
    }

    #[test]
    fn test_generate_create_table_partitioned_by_tenant() {
        let table = resources_table();
        let ddl = generator().generate_create_table("FHIRDATA", "RESOURCES", &table);

        assert!(ddl.contains("\"RESOURCE_ID\" BIGINT GENERATED BY DEFAULT AS IDENTITY NOT NULL"));
        assert!(ddl.contains("\"IS_DELETED\" CHAR(1) NOT NULL DEFAULT 'X'"));
        assert!(ddl.contains("PRIMARY KEY (\"MT_ID\", \"RESOURCE_ID\")"));
        assert!(ddl.contains("UNIQUE (\"MT_ID\", \"LOGICAL_ID\")"));
        assert!(ddl.contains("CHECK (IS_DELETED IN ('X', 'Y'))"));
        assert!(ddl.ends_with("PARTITION BY LIST (\"MT_ID\")"));
    }

    #[test]
    fn test_generate_drop_table() {
        assert_eq!(
            generator().generate_drop_table("S", "T"),
            "DROP TABLE IF EXISTS \"S\".\"T\""
        );
    }

    #[test]
    fn test_generate_add_and_drop_column() {
        let column = ColumnDef::new("VERSION_ID", ColumnType::Int).not_null().default("1");
        assert_eq!(
            generator().generate_add_column("S", "T", &column),
            "ALTER TABLE \"S\".\"T\" ADD COLUMN IF NOT EXISTS \"VERSION_ID\" INT NOT NULL DEFAULT 1"
        );
        assert_eq!(
            generator().generate_drop_column("S", "T", "OLD"),
            "ALTER TABLE \"S\".\"T\" DROP COLUMN IF EXISTS \"OLD\""
        );
    }

    // ==================== CREATE INDEX Tests ====================

    #[test]
    fn test_generate_create_index_with_tenant() {
        let index = IndexDef::new("IDX_LOGICAL_ID", ["LOGICAL_ID"]).unique().include(["RESOURCE_ID"]);
        let ddl = generator().generate_create_index("S", "RESOURCES", &index, Some("MT_ID"));

        assert_eq!(
            ddl,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"IDX_LOGICAL_ID\" ON \"S\".\"RESOURCES\" \
             (\"MT_ID\", \"LOGICAL_ID\") INCLUDE (\"RESOURCE_ID\")"
        );
    }

    #[test]
    fn test_generate_create_index_desc() {
        let mut index = IndexDef::new("IDX_TS", ["A"]);
        index.columns.push(crate::types::OrderedColumn::desc("LAST_UPDATED"));
        let ddl = generator().generate_create_index("S", "T", &index, None);
        assert!(ddl.contains("(\"A\", \"LAST_UPDATED\" DESC)"));
        assert!(ddl.starts_with("CREATE INDEX IF NOT EXISTS"));
    }

    // ==================== Foreign Key Tests ====================

    #[test]
    fn test_generate_foreign_key_to_primary_key() {
        let fk = ForeignKeyConstraint::new("FK_CHILD", "S", "PARENT", ["PARENT_ID"]);
        let ddl = generator()
            .generate_create_foreign_key("S", "CHILD", &fk)
            .unwrap();
        assert_eq!(
            ddl,
            "ALTER TABLE \"S\".\"CHILD\" ADD CONSTRAINT \"FK_CHILD\" FOREIGN KEY (\"PARENT_ID\") \
             REFERENCES \"S\".\"PARENT\""
        );
    }

    #[test]
    fn test_generate_foreign_key_with_target_columns() {
        let fk = ForeignKeyConstraint::new("FK_CODE", "S", "CODES", ["CODE"]).target_columns(["CODE_VALUE"]);
        let ddl = generator().generate_create_foreign_key("S", "T", &fk).unwrap();
        assert!(ddl.ends_with("REFERENCES \"S\".\"CODES\" (\"CODE_VALUE\")"));

        let unenforced = fk.not_enforced();
        assert!(generator().generate_create_foreign_key("S", "T", &unenforced).is_none());
    }

    #[test]
    fn test_generate_foreign_key_between_tenant_tables() {
        let mut model = PhysicalDataModel::new();
        let parent = Table::builder("S", "PARENT")
            .add_int_column("MT_ID", false)
            .add_bigint_column("ID", false)
            .add_varchar_column("CODE", 32, false)
            .primary_key("PK_PARENT", ["ID"])
            .add_unique_constraint("UQ_PARENT_CODE", ["CODE"])
            .tenant_column("MT_ID")
            .build(&model)
            .unwrap();
        model.add_table(parent).unwrap();

        let child = Table::builder("S", "CHILD")
            .add_int_column("MT_ID", false)
            .add_bigint_column("PARENT_ID", false)
            .add_varchar_column("PARENT_CODE", 32, false)
            .tenant_column("MT_ID")
            .add_foreign_key(ForeignKeyConstraint::new("FK_CHILD_ID", "S", "PARENT", ["PARENT_ID"]))
            .add_foreign_key(
                ForeignKeyConstraint::new("FK_CHILD_CODE", "S", "PARENT", ["PARENT_CODE"]).target_columns(["CODE"]),
            )
            .build(&model)
            .unwrap();
        let fks = child.as_table().unwrap().foreign_keys();

        let by_pk = generator().generate_create_foreign_key("S", "CHILD", &fks[0]).unwrap();
        assert!(by_pk.ends_with("FOREIGN KEY (\"MT_ID\", \"PARENT_ID\") REFERENCES \"S\".\"PARENT\""));

        let by_code = generator().generate_create_foreign_key("S", "CHILD", &fks[1]).unwrap();
        assert!(by_code.ends_with(
            "FOREIGN KEY (\"MT_ID\", \"PARENT_CODE\") REFERENCES \"S\".\"PARENT\" (\"MT_ID\", \"CODE\")"
        ));

        // The referenced primary key carries the same leading column
        let pk = generator().generate_create_table("S", "PARENT", model.find_table("S", "PARENT").unwrap());
        assert!(pk.contains("PRIMARY KEY (\"MT_ID\", \"ID\")"));
    }

    // ==================== Routine and Type Tests ====================

    #[test]
    fn test_generate_routines() {
        let g = generator();
        assert_eq!(
            g.generate_create_procedure("S", "ADD_ANY_RESOURCE", "() LANGUAGE sql AS $$ SELECT 1 $$"),
            "CREATE OR REPLACE PROCEDURE \"S\".\"ADD_ANY_RESOURCE\" () LANGUAGE sql AS $$ SELECT 1 $$"
        );
        assert_eq!(
            g.generate_drop_function("S", "F"),
            "DROP FUNCTION IF EXISTS \"S\".\"F\""
        );
        assert_eq!(
            g.generate_create_view("S", "V", "SELECT 1"),
            "CREATE OR REPLACE VIEW \"S\".\"V\" AS SELECT 1"
        );
    }

    #[test]
    fn test_generate_sequences() {
        let g = generator();
        let seq = Sequence {
            start_with: 1000,
            increment_by: 1,
            cache: 20,
        };
        assert_eq!(
            g.generate_create_sequence("S", "SEQ", &seq),
            "CREATE SEQUENCE IF NOT EXISTS \"S\".\"SEQ\" AS BIGINT START WITH 1000 INCREMENT BY 1 CACHE 20"
        );
        assert_eq!(
            g.generate_alter_sequence_restart("S", "SEQ", 5000, 0, 1),
            "ALTER SEQUENCE \"S\".\"SEQ\" RESTART WITH 5000 INCREMENT BY 1 CACHE 1"
        );
    }

    #[test]
    fn test_generate_row_type() {
        let ddl = generator().generate_create_row_type(
            "S",
            "T_STR",
            &[
                ColumnDef::new("NAME_ID", ColumnType::Int),
                ColumnDef::new("VALUE", ColumnType::varchar(1024)),
            ],
        );
        assert_eq!(
            ddl,
            "CREATE TYPE \"S\".\"T_STR\" AS (\"NAME_ID\" INT, \"VALUE\" VARCHAR(1024))"
        );
    }

    // ==================== Security Tests ====================

    #[test]
    fn test_generate_policy() {
        let ddl = generator().generate_create_policy("S", "RESOURCES_TENANT", "RESOURCES", "fhir.tenant_id", "MT_ID");
        assert_eq!(
            ddl,
            "CREATE POLICY \"RESOURCES_TENANT\" ON \"S\".\"RESOURCES\" USING (\"MT_ID\" = current_setting('fhir.tenant_id')::INT)"
        );
        assert_eq!(
            generator().generate_row_security("S", "RESOURCES", false),
            "ALTER TABLE \"S\".\"RESOURCES\" DISABLE ROW LEVEL SECURITY"
        );
    }

    #[test]
    fn test_generate_grant() {
        let privileges: BTreeSet<Privilege> = [Privilege::Select, Privilege::Insert].into_iter().collect();
        assert_eq!(
            generator().generate_grant("TABLE", "S", "T", &privileges, "fhirserver").unwrap(),
            "GRANT SELECT, INSERT ON TABLE \"S\".\"T\" TO \"fhirserver\""
        );
        assert!(generator().generate_grant("TABLE", "S", "T", &BTreeSet::new(), "u").is_none());
    }

    // ==================== Partition Tests ====================

    #[test]
    fn test_generate_partitions() {
        let g = generator();
        assert_eq!(
            g.generate_create_partition("S", "RESOURCES", 7, false),
            "CREATE TABLE \"S\".\"RESOURCES_P7\" PARTITION OF \"S\".\"RESOURCES\" FOR VALUES IN (7)"
        );
        assert!(g.generate_create_partition("S", "RESOURCES", 7, true).starts_with("CREATE TABLE IF NOT EXISTS"));
        assert_eq!(
            g.generate_detach_partition("S", "RESOURCES", 7),
            "ALTER TABLE \"S\".\"RESOURCES\" DETACH PARTITION \"S\".\"RESOURCES_P7\""
        );
        assert_eq!(
            g.generate_drop_partition("S", "RESOURCES", 7),
            "DROP TABLE IF EXISTS \"S\".\"RESOURCES_P7\""
        );
    }

    // ==================== Distribution Tests ====================

    #[test]
    fn test_generate_distribution() {
        let g = generator();
        let reference = g
            .generate_distribution("S", "CODES", DistributionType::Reference, None)
            .unwrap();
        assert_eq!(reference.sql, "SELECT create_reference_table($1)");
        assert_eq!(reference.params, vec![SqlParam::Text("\"S\".\"CODES\"".into())]);

        let sharded = g
            .generate_distribution("S", "RESOURCES", DistributionType::Distributed, Some("MT_ID"))
            .unwrap();
        assert_eq!(sharded.params.len(), 2);

        assert!(g.generate_distribution("S", "T", DistributionType::None, None).is_none());
    }

    // ==================== Ledger Tests ====================

    #[test]
    fn test_generate_ledger_statements() {
        let g = generator();
        let ddl = g.generate_create_ledger_table("ADMIN", "schema_versions");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"ADMIN\".\"schema_versions\" ("));
        assert!(ddl.contains("PRIMARY KEY (schema_name, object_type, object_name, version)"));

        assert!(g.generate_insert_ledger("ADMIN", "schema_versions").contains("VALUES ($1, $2, $3, $4)"));
        assert!(g.generate_select_ledger("ADMIN", "schema_versions").contains("MAX(version)"));
        assert!(g
            .generate_select_ledger_history("ADMIN", "schema_versions")
            .ends_with("ORDER BY applied, schema_name, object_name, version"));
    }
}
