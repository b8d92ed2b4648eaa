use crate::grid::Dimensions;
use crate::structure::{CellPosition, MergedRegion, StructuralError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Index over a sheet's merged regions: every covered position resolves to
/// its owning region, anchors are addressable in O(1). Built once per sheet;
/// immutable afterwards and shared by reference within one worker.
#[derive(Clone, Debug, Default)]
pub struct MergeMap {
    regions: Vec<Arc<MergedRegion>>,
    cells: HashMap<CellPosition, Arc<MergedRegion>>,
    anchors: HashMap<CellPosition, Arc<MergedRegion>>,
}

impl MergeMap {
    /// Builds the index from the regions a grid source reports, in any order.
    ///
    /// Overlapping regions or regions outside the sheet bounds are
    /// data-integrity errors in the source file and fail the sheet.
    pub fn build(
        sheet: &str,
        dims: &Dimensions,
        regions: Vec<MergedRegion>,
    ) -> Result<Self, StructuralError> {
        let mut map = MergeMap::default();
        for region in regions {
            if region.range.max_row > dims.max_row || region.range.max_col > dims.max_col {
                return Err(StructuralError::MergeOutOfBounds {
                    sheet: sheet.to_owned(),
                    range: region.range,
                    dims: *dims,
                });
            }
            let region = Arc::new(region);
            for pos in region.range.positions() {
                if let Some(existing) = map.cells.insert(pos, Arc::clone(&region)) {
                    return Err(StructuralError::OverlappingMerge {
                        sheet: sheet.to_owned(),
                        first: existing.range,
                        second: region.range,
                    });
                }
            }
            map.anchors.insert(region.anchor(), Arc::clone(&region));
            map.regions.push(region);
        }
        debug!(sheet, regions = map.regions.len(), "built merge map");
        Ok(map)
    }

    /// The region covering a position, if any.
    pub fn region_at(&self, pos: CellPosition) -> Option<&Arc<MergedRegion>> {
        self.cells.get(&pos)
    }

    /// The region anchored (top-left) at a position, if any.
    pub fn anchor_at(&self, pos: CellPosition) -> Option<&Arc<MergedRegion>> {
        self.anchors.get(&pos)
    }

    pub fn is_anchor(&self, pos: CellPosition) -> bool {
        self.anchors.contains_key(&pos)
    }

    pub fn regions(&self) -> &[Arc<MergedRegion>] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
