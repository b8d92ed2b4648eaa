//! # Output Module
//!
//! Turns extraction results into the JSON envelope consumers receive. Two
//! record shapes: nested (the extractor's native parent/child form) and
//! flattened (one object per leaf row with parent values repeated).
use crate::extract::HierarchicalRecord;
use crate::structure::{MetadataItem, HeaderMap};
use serde_json::{json, Map, Value};

/// Formatting choices for one run.
#[derive(Copy, Clone, Debug)]
pub struct OutputFormatter {
    pub flatten: bool,
    pub include_headers: bool,
    pub include_metadata: bool,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            flatten: false,
            include_headers: true,
            include_metadata: true,
        }
    }
}

/// Everything extracted from one sheet, ready for formatting.
#[derive(Clone, Debug, Default)]
pub struct SheetResult {
    pub headers: HeaderMap,
    pub metadata: Vec<MetadataItem>,
    pub records: Vec<HierarchicalRecord>,
}

impl SheetResult {
    /// Leaf record count: what a flattened rendition would contain.
    pub fn leaf_count(&self) -> u64 {
        fn leaves(record: &HierarchicalRecord) -> u64 {
            if record.children.is_empty() {
                1
            } else {
                record.children.iter().map(leaves).sum()
            }
        }
        self.records.iter().map(leaves).sum()
    }
}

impl OutputFormatter {
    /// One sheet's section of the output document.
    pub fn format_sheet(&self, result: &SheetResult) -> Value {
        let mut section = Map::new();
        if self.include_headers {
            let headers: Map<String, Value> = result
                .headers
                .iter()
                .map(|(col, label)| (col.to_string(), Value::String(label.clone())))
                .collect();
            section.insert("headers".to_owned(), Value::Object(headers));
        }
        if self.include_metadata {
            section.insert(
                "metadata".to_owned(),
                json!(result.metadata),
            );
        }
        let records: Vec<Value> = if self.flatten {
            result
                .records
                .iter()
                .flat_map(|record| record.flatten())
                .map(|row| json!(row))
                .collect()
        } else {
            result.records.iter().map(|record| json!(record)).collect()
        };
        section.insert("record_count".to_owned(), json!(result.leaf_count()));
        section.insert("records".to_owned(), Value::Array(records));
        Value::Object(section)
    }

    /// Whole-workbook envelope: per-sheet sections plus a summary block.
    pub fn format_workbook<'a, I>(&self, sheets: I) -> Value
    where
        I: IntoIterator<Item = (&'a str, &'a SheetResult)>,
    {
        let mut sections = Map::new();
        let mut total_records = 0u64;
        for (name, result) in sheets {
            total_records += result.leaf_count();
            sections.insert(name.to_owned(), self.format_sheet(result));
        }
        json!({
            "sheets": sections,
            "summary": {
                "sheet_count": sections.len(),
                "total_records": total_records,
            },
        })
    }
}
