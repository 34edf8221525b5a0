//! Fact record encoding
//!
//! Each storage backend registers a [`RecordFactory`] that turns stored
//! records into tuples of a given predicate and back.

use crate::ast::Predicate;
use crate::value::Tuple;

use super::error::{StorageError, StorageResult};

/// Encodes and decodes one fact record
pub trait RecordFactory: Send + Sync {
    /// Short name of the record format
    fn format(&self) -> &'static str;

    fn encode(&self, tuple: &Tuple) -> StorageResult<String>;

    /// Decode a record of `predicate`, checking its arity
    fn decode(&self, predicate: &Predicate, record: &str) -> StorageResult<Tuple>;
}

/// One JSON document per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordFactory;

impl RecordFactory for JsonRecordFactory {
    fn format(&self) -> &'static str {
        "jsonl"
    }

    fn encode(&self, tuple: &Tuple) -> StorageResult<String> {
        Ok(serde_json::to_string(tuple)?)
    }

    fn decode(&self, predicate: &Predicate, record: &str) -> StorageResult<Tuple> {
        let tuple: Tuple = serde_json::from_str(record)?;
        if tuple.arity() != predicate.arity {
            return Err(StorageError::Metadata(format!(
                "record of arity {} in {predicate}",
                tuple.arity()
            )));
        }
        if !tuple.is_ground() {
            return Err(StorageError::Metadata(format!(
                "non-ground record {tuple} in {predicate}"
            )));
        }
        Ok(tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;

    #[test]
    fn test_json_record_round_trip_with_nested_terms() {
        let factory = JsonRecordFactory;
        let tuple = Tuple::new(vec![
            Term::string("a"),
            Term::list(vec![Term::int(1), Term::int(2)]),
        ]);
        let line = factory.encode(&tuple).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(
            factory.decode(&Predicate::new("p", 2), &line).unwrap(),
            tuple
        );
    }

    #[test]
    fn test_decode_rejects_wrong_arity_and_variables() {
        let factory = JsonRecordFactory;
        let line = factory.encode(&Tuple::ints(&[1])).unwrap();
        assert!(factory.decode(&Predicate::new("p", 2), &line).is_err());

        let open = factory.encode(&Tuple::new(vec![Term::var("X")])).unwrap();
        assert!(factory.decode(&Predicate::new("p", 1), &open).is_err());
    }
}
