use std::collections::BTreeMap;

use bit_vec::BitVec;
use itertools::Itertools;

/// Statistics of a scan, copied out of the scan at one point in time.
#[derive(Debug, Clone)]
pub struct ScanInfo {
    pages_visited: usize,
    rows_visited: usize,
    rows_qualified: usize,
    deleted_rows_visited: usize,

    // None means every column
    columns: Option<BitVec<u32>>,
    columns_fetched: usize,

    tree_height: i32,
}

/// Live counters kept by a scan.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScanCounters {
    pub pages_visited: usize,
    pub rows_visited: usize,
    pub rows_qualified: usize,
    pub deleted_rows_visited: usize,
}

impl ScanInfo {
    pub(crate) fn new<E>(
        counters: &ScanCounters,
        columns: Option<&BitVec<u32>>,
        row_width: usize,
        height: Result<usize, E>,
    ) -> Self {
        let columns_fetched = match columns {
            Some(bits) => bits.iter().filter(|b| *b).count(),
            None => row_width,
        };

        Self {
            pages_visited: counters.pages_visited,
            rows_visited: counters.rows_visited,
            rows_qualified: counters.rows_qualified,
            deleted_rows_visited: counters.deleted_rows_visited,
            columns: columns.cloned(),
            columns_fetched,
            // a failed lookup is reported, not raised
            tree_height: height.map(|h| h as i32).unwrap_or(-1),
        }
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited
    }

    pub fn rows_visited(&self) -> usize {
        self.rows_visited
    }

    pub fn rows_qualified(&self) -> usize {
        self.rows_qualified
    }

    pub fn deleted_rows_visited(&self) -> usize {
        self.deleted_rows_visited
    }

    pub fn columns_fetched(&self) -> usize {
        self.columns_fetched
    }

    pub fn columns(&self) -> Option<&BitVec<u32>> {
        self.columns.as_ref()
    }

    pub fn tree_height(&self) -> i32 {
        self.tree_height
    }

    /// The statistics as display properties.
    pub fn get_all_scan_info(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("Scan type".to_string(), "btree".to_string());
        props.insert(
            "Number of pages visited".to_string(),
            self.pages_visited.to_string(),
        );
        props.insert(
            "Number of rows qualified".to_string(),
            self.rows_qualified.to_string(),
        );
        props.insert(
            "Number of rows visited".to_string(),
            self.rows_visited.to_string(),
        );
        props.insert(
            "Number of deleted rows visited".to_string(),
            self.deleted_rows_visited.to_string(),
        );

        let fetched = match &self.columns {
            Some(bits) => format!(
                "{{{}}}",
                bits.iter()
                    .enumerate()
                    .filter(|(_, set)| *set)
                    .map(|(i, _)| i)
                    .join(", ")
            ),
            None => "All".to_string(),
        };
        props.insert("Columns fetched".to_string(), fetched);
        props.insert(
            "Number of columns fetched".to_string(),
            self.columns_fetched.to_string(),
        );
        props.insert("Tree height".to_string(), self.tree_height.to_string());
        props
    }
}
