use crate::extract::record::HierarchicalRecord;
use crate::grid::{CellValue, RowChunk, RowValues};
use crate::structure::{CellPosition, HeaderMap, MergeMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Extraction behavior toggles.
#[derive(Copy, Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Emit `null` for empty uncovered cells instead of omitting them.
    pub include_empty_cells: bool,
}

/// A vertical merge whose span is still open: rows through `end_row` attach
/// their non-parent columns as children of this value. Serialized as part of
/// the stream state so a span may straddle chunk and checkpoint boundaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParentContext {
    pub column: u32,
    pub header_label: String,
    pub value: Value,
    pub anchor_row: u32,
    pub end_row: u32,
    pub children: Vec<HierarchicalRecord>,
}

/// Walks data rows and resolves merges into nested records. Stateless apart
/// from the parent-context stack handed in by the caller, which is what makes
/// extraction restartable by chunk.
pub struct HierarchicalExtractor<'a> {
    sheet: &'a str,
    headers: &'a HeaderMap,
    merges: &'a MergeMap,
    options: ExtractOptions,
}

impl<'a> HierarchicalExtractor<'a> {
    pub fn new(
        sheet: &'a str,
        headers: &'a HeaderMap,
        merges: &'a MergeMap,
        options: ExtractOptions,
    ) -> Self {
        Self {
            sheet,
            headers,
            merges,
            options,
        }
    }

    /// Processes one chunk of rows, appending completed records to `out` and
    /// leaving any still-open parent span on `stack`.
    pub fn extract_chunk(
        &self,
        chunk: &RowChunk,
        stack: &mut Vec<ParentContext>,
        out: &mut Vec<HierarchicalRecord>,
    ) {
        for (row, values) in &chunk.rows {
            self.process_row(*row, values, stack, out);
        }
    }

    fn process_row(
        &self,
        row: u32,
        values: &RowValues,
        stack: &mut Vec<ParentContext>,
        out: &mut Vec<HierarchicalRecord>,
    ) {
        // Stale contexts should have closed at their end row already.
        Self::close_while(stack, out, |context| context.end_row < row);

        // Open a parent context for every vertical merge anchored here,
        // left to right so nesting follows column order.
        for (&col, label) in self.headers {
            let pos = CellPosition::new(row, col);
            if let Some(region) = self.merges.anchor_at(pos) {
                if region.is_vertical_dominant() {
                    stack.push(ParentContext {
                        column: col,
                        header_label: label.clone(),
                        value: self.convert(&region.value, row, col),
                        anchor_row: row,
                        end_row: region.range.max_row,
                        children: Vec::new(),
                    });
                }
            }
        }

        // Assemble this row's record from the non-parent columns.
        let mut record = HierarchicalRecord::new(row);
        for (&col, label) in self.headers {
            let pos = CellPosition::new(row, col);
            if let Some(region) = self.merges.region_at(pos) {
                if region.is_vertical_dominant() {
                    // Carried by the open parent context for the whole span.
                    continue;
                }
                if region.anchor() == pos {
                    // Compound value: applied at the first header label of
                    // the span, remaining covered columns stay silent.
                    record.insert(label, self.convert(&region.value, row, col));
                }
                continue;
            }
            match values.get(&col) {
                Some(value) if !value.is_empty() => {
                    record.insert(label, self.convert(value, row, col));
                }
                _ if self.options.include_empty_cells => record.insert(label, Value::Null),
                _ => {}
            }
        }

        if let Some(parent) = stack.last_mut() {
            if !record.is_empty() {
                parent.children.push(record);
            }
        } else if !record.is_empty() {
            out.push(record);
        }

        // Spans ending on this row close innermost-first so their records
        // are emitted as soon as they are complete.
        Self::close_while(stack, out, |context| context.end_row <= row);
    }

    /// Force-flushes any context still open at end of sheet. A dangling merge
    /// at the very bottom must not lose data.
    pub fn flush(&self, stack: &mut Vec<ParentContext>, out: &mut Vec<HierarchicalRecord>) {
        if !stack.is_empty() {
            warn!(
                sheet = self.sheet,
                open = stack.len(),
                "parent context still open at end of sheet, flushing"
            );
        }
        Self::close_while(stack, out, |_| true);
    }

    fn close_while<F>(
        stack: &mut Vec<ParentContext>,
        out: &mut Vec<HierarchicalRecord>,
        predicate: F,
    ) where
        F: Fn(&ParentContext) -> bool,
    {
        while stack.last().map(&predicate).unwrap_or(false) {
            let context = stack.pop().expect("checked by predicate");
            let record = Self::resolve(context);
            match stack.last_mut() {
                Some(parent) => parent.children.push(record),
                None => out.push(record),
            }
        }
    }

    fn resolve(context: ParentContext) -> HierarchicalRecord {
        let mut record = HierarchicalRecord::new(context.anchor_row);
        record.insert(&context.header_label, context.value);
        record.children = context.children;
        record
    }

    /// A single bad cell degrades to `null`; it never aborts extraction.
    fn convert(&self, value: &CellValue, row: u32, col: u32) -> Value {
        match value.to_json(row, col) {
            Ok(value) => value,
            Err(error) => {
                warn!(sheet = self.sheet, %error, "cell value degraded to null");
                Value::Null
            }
        }
    }
}
