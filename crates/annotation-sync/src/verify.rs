//! Shape checks for rows returned by the persistence service.
//!
//! A row is trusted only after it deserializes (normalizing legacy token
//! lists on the way) and passes the same structural validation as parser
//! output. A mutating call that reports success without a row is treated
//! exactly like a failed call.

use serde::de::DeserializeOwned;
use subtag_annotation::{Segment, Sense, validate};

use crate::PersistenceError;
use crate::persistence::Row;

fn parse<T: DeserializeOwned>(operation: &'static str, row: Row) -> Result<T, PersistenceError> {
    serde_json::from_value(row).map_err(|e| PersistenceError::MalformedRow {
        operation,
        reason: e.to_string(),
    })
}

pub(crate) fn required(operation: &'static str, row: Option<Row>) -> Result<Row, PersistenceError> {
    row.ok_or(PersistenceError::MissingRow { operation })
}

pub(crate) fn segment(operation: &'static str, row: Row) -> Result<Segment, PersistenceError> {
    let segment: Segment = parse(operation, row)?;
    validate::segment(&segment).map_err(|e| PersistenceError::MalformedRow {
        operation,
        reason: e.to_string(),
    })?;
    Ok(segment)
}

pub(crate) fn segments(
    operation: &'static str,
    rows: Vec<Row>,
) -> Result<Vec<Segment>, PersistenceError> {
    rows.into_iter().map(|row| segment(operation, row)).collect()
}

pub(crate) fn sense(operation: &'static str, row: Row) -> Result<Sense, PersistenceError> {
    let sense: Sense = parse(operation, row)?;
    validate::sense(&sense).map_err(|e| PersistenceError::MalformedRow {
        operation,
        reason: e.to_string(),
    })?;
    Ok(sense)
}

pub(crate) fn senses(operation: &'static str, rows: Vec<Row>) -> Result<Vec<Sense>, PersistenceError> {
    rows.into_iter().map(|row| sense(operation, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_row_is_an_error() {
        assert!(matches!(
            required("update_segment", None),
            Err(PersistenceError::MissingRow {
                operation: "update_segment"
            })
        ));
    }

    #[test]
    fn rejects_rows_with_wrong_shape() {
        let err = segment("segment", json!({ "id": "m_0", "text": "x" })).unwrap_err();
        assert!(matches!(err, PersistenceError::MalformedRow { .. }));
    }

    #[test]
    fn rejects_rows_breaking_invariants() {
        let err = segment(
            "segment",
            json!({ "id": "m_0", "text": "x", "startTime": 3.0, "endTime": 1.0 }),
        )
        .unwrap_err();
        assert!(matches!(err, PersistenceError::MalformedRow { .. }));

        let err = sense(
            "sense",
            json!({ "id": 1, "definition": " ", "ownerWord": "w" }),
        )
        .unwrap_err();
        assert!(matches!(err, PersistenceError::MalformedRow { .. }));
    }

    #[test]
    fn normalizes_legacy_rows() {
        let s = segment(
            "segment",
            json!({ "id": "m_0", "text": "a b", "startTime": 0.0, "endTime": 1.0, "tokens": ["a", "b"] }),
        )
        .unwrap();
        assert_eq!(s.tokens().len(), 2);
        assert!(!s.tokens()[0].is_tagged());
    }
}
