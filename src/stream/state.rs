use crate::extract::ParentContext;
use serde::{Deserialize, Serialize};

/// Complete resumable position of one sheet's streaming pass. Everything a
/// fresh coordinator needs to continue lives here, including parent spans
/// opened by a vertical merge that straddles the suspension point, so the
/// struct is serialized verbatim into checkpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub sheet_name: String,
    /// First unprocessed row. Resume starts exactly here.
    pub next_row: u32,
    /// Last data row of the sheet, inclusive.
    pub end_row: u32,
    pub chunk_size: usize,
    /// Vertical merges still open at `next_row`, outermost first.
    pub open_parents: Vec<ParentContext>,
    pub records_emitted: u64,
    pub chunk_index: u32,
}

impl StreamState {
    pub fn new(sheet_name: &str, data_start_row: u32, end_row: u32, chunk_size: usize) -> Self {
        Self {
            sheet_name: sheet_name.to_owned(),
            next_row: data_start_row,
            end_row,
            chunk_size: chunk_size.max(1),
            open_parents: Vec::new(),
            records_emitted: 0,
            chunk_index: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_row > self.end_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_with_open_parents() {
        let mut state = StreamState::new("Production", 4, 120, 50);
        state.next_row = 54;
        state.chunk_index = 1;
        state.records_emitted = 12;
        state.open_parents.push(ParentContext {
            column: 1,
            header_label: "Equipment ID".to_owned(),
            value: json!("EQ-001"),
            anchor_row: 52,
            end_row: 57,
            children: Vec::new(),
        });

        let text = serde_json::to_string(&state).unwrap();
        let back: StreamState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.open_parents[0].end_row, 57);
    }

    #[test]
    fn exhaustion_is_inclusive_of_end_row() {
        let mut state = StreamState::new("S", 2, 5, 10);
        assert!(!state.is_exhausted());
        state.next_row = 5;
        assert!(!state.is_exhausted());
        state.next_row = 6;
        assert!(state.is_exhausted());
    }
}
