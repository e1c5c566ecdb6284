//! Sequences and sequence restarts

use crate::adapter::SchemaAdapter;
use crate::error::{Result, SchemaError};
use crate::object::{DatabaseObject, ObjectKind, ObjectMeta, impl_meta_builder};
use crate::types::{ObjectKey, ObjectType};

/// Sequence definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub start_with: i64,
    pub increment_by: i64,
    /// Values preallocated per session (default: 20)
    pub cache: u32,
}

impl Sequence {
    pub fn builder(schema: impl Into<String>, name: impl Into<String>) -> SequenceBuilder {
        SequenceBuilder {
            meta: ObjectMeta::new(ObjectType::Sequence, schema, name),
            sequence: Sequence {
                start_with: 1,
                increment_by: 1,
                cache: 20,
            },
        }
    }
}

/// Builder for [`Sequence`] objects
#[derive(Debug)]
pub struct SequenceBuilder {
    meta: ObjectMeta,
    sequence: Sequence,
}

impl_meta_builder!(SequenceBuilder);

impl SequenceBuilder {
    pub fn start_with(mut self, value: i64) -> Self {
        self.sequence.start_with = value;
        self
    }

    pub fn increment_by(mut self, value: i64) -> Self {
        self.sequence.increment_by = value;
        self
    }

    pub fn cache(mut self, size: u32) -> Self {
        self.sequence.cache = size;
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        if self.sequence.increment_by == 0 {
            return Err(SchemaError::validation(format!(
                "{} has an increment of 0",
                self.meta.key()
            )));
        }
        DatabaseObject::new(self.meta, ObjectKind::Sequence(self.sequence))
    }
}

/// Restart of an existing sequence.
///
/// Sequences cannot be migrated in place, so moving one forward is modeled
/// as a separate object. It is recorded in the ledger under the sequence's
/// own name, so its version must be higher than the sequence's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterSequenceStart {
    pub sequence_name: String,
    pub restart_with: i64,
    pub increment_by: i64,
    pub cache: u32,
}

impl AlterSequenceStart {
    pub fn builder(
        schema: impl Into<String>,
        sequence_name: impl Into<String>,
        restart_with: i64,
    ) -> AlterSequenceStartBuilder {
        let schema = schema.into();
        let sequence_name = sequence_name.into();
        let mut meta = ObjectMeta::new(
            ObjectType::Sequence,
            schema.clone(),
            format!("{}.RESTART", sequence_name),
        );
        meta.set_version_tracking_name(sequence_name.clone());
        meta.add_dependency(ObjectKey::new(ObjectType::Sequence, schema, sequence_name.clone()));
        AlterSequenceStartBuilder {
            meta,
            alter: AlterSequenceStart {
                sequence_name,
                restart_with,
                increment_by: 1,
                cache: 20,
            },
        }
    }

    pub(crate) async fn apply(&self, schema: &str, adapter: &dyn SchemaAdapter) -> Result<()> {
        adapter
            .alter_sequence_restart_with(
                schema,
                &self.sequence_name,
                self.restart_with,
                self.cache,
                self.increment_by,
            )
            .await
    }
}

/// Builder for [`AlterSequenceStart`] objects
#[derive(Debug)]
pub struct AlterSequenceStartBuilder {
    meta: ObjectMeta,
    alter: AlterSequenceStart,
}

impl_meta_builder!(AlterSequenceStartBuilder);

impl AlterSequenceStartBuilder {
    pub fn increment_by(mut self, value: i64) -> Self {
        self.alter.increment_by = value;
        self
    }

    pub fn cache(mut self, size: u32) -> Self {
        self.alter.cache = size;
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        if self.alter.increment_by == 0 {
            return Err(SchemaError::validation(format!(
                "{} has an increment of 0",
                self.meta.key()
            )));
        }
        DatabaseObject::new(self.meta, ObjectKind::AlterSequenceStart(self.alter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_defaults() {
        let seq = Sequence::builder("S", "FHIR_SEQUENCE").build().unwrap();
        let ObjectKind::Sequence(sequence) = seq.kind() else {
            panic!("expected a sequence");
        };
        assert_eq!(sequence.start_with, 1);
        assert_eq!(sequence.increment_by, 1);
        assert_eq!(sequence.cache, 20);
    }

    #[test]
    fn test_zero_increment_rejected() {
        assert!(Sequence::builder("S", "SEQ").increment_by(0).build().is_err());
    }

    #[test]
    fn test_restart_tracks_under_sequence_name() {
        let alter = AlterSequenceStart::builder("S", "FHIR_SEQUENCE", 10_000)
            .version(2)
            .build()
            .unwrap();

        assert_eq!(alter.name(), "FHIR_SEQUENCE.RESTART");
        assert_eq!(alter.meta().tracking_name(), "FHIR_SEQUENCE");
        assert!(
            alter
                .dependencies()
                .contains(&ObjectKey::new(ObjectType::Sequence, "S", "FHIR_SEQUENCE"))
        );
    }
}
