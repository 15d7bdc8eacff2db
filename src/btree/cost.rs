use super::{scan::ScanBound, search::SearchParams, BTree};
use crate::types::SmallResult;

impl BTree {
    /// Estimate the fraction of the index a range scan would return.
    ///
    /// Each bound is searched for in optimizer mode, the estimate is the part
    /// of the index left of the stop position but not left of the start
    /// position. Without a start the range begins at 0, without a stop it
    /// ends at 1.
    pub fn estimate_range_fraction(
        &self,
        start: Option<&ScanBound>,
        stop: Option<&ScanBound>,
    ) -> SmallResult<f64> {
        let left_of_start = match start {
            Some(bound) => self.left_fraction_of(bound)?,
            None => 0.0,
        };
        let left_of_stop = match stop {
            Some(bound) => self.left_fraction_of(bound)?,
            None => 1.0,
        };

        Ok((left_of_stop - left_of_start).max(0.0))
    }

    fn left_fraction_of(&self, bound: &ScanBound) -> SmallResult<f64> {
        let mut sp = SearchParams::new(bound.key.clone(), bound.partial_key_match(), true);
        self.optimizer_search(&mut sp)?;
        Ok(sp.left_fraction)
    }
}
