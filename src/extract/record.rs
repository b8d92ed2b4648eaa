use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical data row group: values keyed by header label in header
/// declaration order, plus nested child records when a vertical merge groups
/// several physical rows under one parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalRecord {
    /// Physical row the record starts at (the anchor row for grouped records).
    pub row: u32,
    pub values: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchicalRecord>,
}

impl HierarchicalRecord {
    pub fn new(row: u32) -> Self {
        Self {
            row,
            values: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn insert(&mut self, label: &str, value: Value) {
        self.values.insert(label.to_owned(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }

    /// Flattens the nested shape into one map per leaf row, each carrying the
    /// parent values of every level above it. Records without children
    /// flatten to themselves.
    pub fn flatten(&self) -> Vec<IndexMap<String, Value>> {
        if self.children.is_empty() {
            return vec![self.values.clone()];
        }
        let mut rows = Vec::new();
        for child in &self.children {
            for mut flat in child.flatten() {
                let mut merged = self.values.clone();
                // Parent labels come first; a child never overrides them.
                for (label, value) in flat.drain(..) {
                    merged.entry(label).or_insert(value);
                }
                rows.push(merged);
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(row: u32, pairs: &[(&str, Value)]) -> HierarchicalRecord {
        let mut record = HierarchicalRecord::new(row);
        for (label, value) in pairs {
            record.insert(label, value.clone());
        }
        record
    }

    #[test]
    fn leaf_record_flattens_to_itself() {
        let leaf = record(4, &[("Line", json!(1)), ("Output", json!(120))]);
        let flat = leaf.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0]["Output"], json!(120));
    }

    #[test]
    fn parent_value_repeats_across_flattened_children() {
        let mut parent = record(5, &[("Equipment ID", json!("EQ-001"))]);
        parent.children.push(record(5, &[("Reading", json!(10))]));
        parent.children.push(record(6, &[("Reading", json!(11))]));
        parent.children.push(record(7, &[("Reading", json!(12))]));

        let flat = parent.flatten();
        assert_eq!(flat.len(), 3);
        for (index, row) in flat.iter().enumerate() {
            assert_eq!(row["Equipment ID"], json!("EQ-001"));
            assert_eq!(row["Reading"], json!(10 + index as i64));
        }
        // Parent label precedes child labels.
        assert_eq!(flat[0].keys().next().unwrap(), "Equipment ID");
    }

    #[test]
    fn nested_levels_flatten_depth_first() {
        let mut inner = record(5, &[("Batch", json!("B-9"))]);
        inner.children.push(record(5, &[("Qty", json!(3))]));
        let mut outer = record(5, &[("Plant", json!("North"))]);
        outer.children.push(inner);

        let flat = outer.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0]["Plant"], json!("North"));
        assert_eq!(flat[0]["Batch"], json!("B-9"));
        assert_eq!(flat[0]["Qty"], json!(3));
    }

    #[test]
    fn serde_round_trip_preserves_order() {
        let mut parent = record(2, &[("B", json!(1)), ("A", json!(2))]);
        parent.children.push(record(3, &[("C", json!(3))]));
        let text = serde_json::to_string(&parent).unwrap();
        let back: HierarchicalRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, parent);
        assert_eq!(back.values.keys().collect::<Vec<_>>(), vec!["B", "A"]);
    }
}
