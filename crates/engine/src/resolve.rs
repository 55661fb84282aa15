use std::collections::BTreeMap;

use crate::error::ReconError;
use crate::model::{OrderKey, RecordKind};

/// Index from `order_release_id` to the line items known for it, built from
/// the persisted master set plus every order line in the incoming batches.
#[derive(Debug, Default)]
pub struct LineIndex {
    lines: BTreeMap<String, Vec<String>>,
}

/// Outcome of joining a return/settlement row to the order lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unique order line found.
    Key(OrderKey),
    /// The release id (or the named line item) is unknown.
    Unknown,
}

impl LineIndex {
    pub fn insert(&mut self, order_release_id: &str, line_item_id: &str) {
        let items = self.lines.entry(order_release_id.to_string()).or_default();
        if !items.iter().any(|l| l == line_item_id) {
            items.push(line_item_id.to_string());
        }
    }

    pub fn insert_key(&mut self, key: &OrderKey) {
        self.insert(&key.order_release_id, &key.line_item_id);
    }

    /// Resolve a return/settlement row to its canonical key.
    ///
    /// An explicit line item id takes precedence; otherwise the release id
    /// must map to exactly one line item. Several candidates with no line
    /// item named is an `AmbiguousJoin`.
    pub fn resolve(
        &self,
        kind: RecordKind,
        order_release_id: &str,
        line_item_id: Option<&str>,
    ) -> Result<Resolution, ReconError> {
        let Some(items) = self.lines.get(order_release_id) else {
            return Ok(Resolution::Unknown);
        };

        if let Some(line) = line_item_id {
            if items.iter().any(|l| l == line) {
                return Ok(Resolution::Key(OrderKey::new(order_release_id, line)));
            }
            return Ok(Resolution::Unknown);
        }

        match items.as_slice() {
            [only] => Ok(Resolution::Key(OrderKey::new(order_release_id, only.clone()))),
            [] => Ok(Resolution::Unknown),
            many => Err(ReconError::AmbiguousJoin {
                kind,
                order_release_id: order_release_id.to_string(),
                candidates: many.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> LineIndex {
        let mut idx = LineIndex::default();
        idx.insert("OR1", "L1");
        idx.insert("OR2", "L1");
        idx.insert("OR2", "L2");
        idx
    }

    #[test]
    fn unique_line_resolves_without_line_id() {
        let idx = index();
        let r = idx.resolve(RecordKind::Return, "OR1", None).unwrap();
        assert_eq!(r, Resolution::Key(OrderKey::new("OR1", "L1")));
    }

    #[test]
    fn explicit_line_id_takes_precedence() {
        let idx = index();
        let r = idx.resolve(RecordKind::Settlement, "OR2", Some("L2")).unwrap();
        assert_eq!(r, Resolution::Key(OrderKey::new("OR2", "L2")));
    }

    #[test]
    fn multiple_candidates_without_line_id_is_ambiguous() {
        let idx = index();
        let err = idx.resolve(RecordKind::Return, "OR2", None).unwrap_err();
        assert_eq!(
            err,
            ReconError::AmbiguousJoin {
                kind: RecordKind::Return,
                order_release_id: "OR2".into(),
                candidates: 2,
            }
        );
    }

    #[test]
    fn unknown_release_id_is_not_an_error() {
        let idx = index();
        let r = idx.resolve(RecordKind::Settlement, "OR9", None).unwrap();
        assert_eq!(r, Resolution::Unknown);
    }

    #[test]
    fn named_line_not_in_index_is_unknown() {
        let idx = index();
        let r = idx.resolve(RecordKind::Return, "OR1", Some("L7")).unwrap();
        assert_eq!(r, Resolution::Unknown);
    }

    #[test]
    fn duplicate_inserts_do_not_create_ambiguity() {
        let mut idx = LineIndex::default();
        idx.insert("OR1", "L1");
        idx.insert("OR1", "L1");
        let r = idx.resolve(RecordKind::Return, "OR1", None).unwrap();
        assert_eq!(r, Resolution::Key(OrderKey::new("OR1", "L1")));
    }
}
