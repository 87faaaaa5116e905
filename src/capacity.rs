use crate::error::{TreeError, TreeResult};

/// Occupancy bounds derived from the maximum branching degree `D`
///
/// - `max_branching = D`
/// - `min_branching = ceil(D / 2)`
/// - `max_keys = D - 1`
/// - `min_keys = min_branching - 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub min_keys: usize,
    pub max_keys: usize,
    pub min_branching: usize,
    pub max_branching: usize,
}

impl Capacity {
    /// Derive the bounds for a degree, rejecting `D < 2`
    pub fn new(max_branching_degree: usize) -> TreeResult<Self> {
        if max_branching_degree < 2 {
            return Err(TreeError::InvalidDegree(max_branching_degree));
        }

        let min_branching = max_branching_degree.div_ceil(2);
        Ok(Self {
            min_keys: min_branching - 1,
            max_keys: max_branching_degree - 1,
            min_branching,
            max_branching: max_branching_degree,
        })
    }

    /// The configured degree `D`
    pub fn degree(&self) -> usize {
        self.max_branching
    }

    /// Keys held by a completely full classic B-Tree of the given height: `D^h - 1`
    pub fn classic_keys_for_height(&self, levels: usize) -> usize {
        let Ok(levels) = u32::try_from(levels) else {
            return usize::MAX;
        };
        self.max_branching
            .checked_pow(levels)
            .map_or(usize::MAX, |nodes| nodes - 1)
    }

    /// Distinct keys held by a completely full B+Tree of the given height.
    ///
    /// Only leaves carry entries, so this is `(D - 1) * D^(h - 1)`.
    pub fn bplus_keys_for_height(&self, levels: usize) -> usize {
        if levels == 0 {
            return 0;
        }
        let Ok(levels) = u32::try_from(levels) else {
            return usize::MAX;
        };
        self.max_branching
            .checked_pow(levels - 1)
            .and_then(|leaves| leaves.checked_mul(self.max_keys))
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_three() {
        let cap = Capacity::new(3).unwrap();
        assert_eq!(cap.min_keys, 1);
        assert_eq!(cap.max_keys, 2);
        assert_eq!(cap.min_branching, 2);
        assert_eq!(cap.max_branching, 3);
    }

    #[test]
    fn test_even_degree() {
        let cap = Capacity::new(4).unwrap();
        assert_eq!(cap.min_keys, 1);
        assert_eq!(cap.max_keys, 3);
        assert_eq!(cap.min_branching, 2);

        let cap = Capacity::new(6).unwrap();
        assert_eq!(cap.min_keys, 2);
        assert_eq!(cap.max_keys, 5);
    }

    #[test]
    fn test_degree_two_is_smallest() {
        let cap = Capacity::new(2).unwrap();
        assert_eq!(cap.min_keys, 0);
        assert_eq!(cap.max_keys, 1);

        assert_eq!(Capacity::new(1), Err(TreeError::InvalidDegree(1)));
        assert_eq!(Capacity::new(0), Err(TreeError::InvalidDegree(0)));
    }

    #[test]
    fn test_keys_for_height() {
        let cap = Capacity::new(3).unwrap();
        assert_eq!(cap.classic_keys_for_height(0), 0);
        assert_eq!(cap.classic_keys_for_height(1), 2);
        assert_eq!(cap.classic_keys_for_height(2), 8);
        assert_eq!(cap.classic_keys_for_height(3), 26);

        assert_eq!(cap.bplus_keys_for_height(0), 0);
        assert_eq!(cap.bplus_keys_for_height(1), 2);
        assert_eq!(cap.bplus_keys_for_height(2), 6);
        assert_eq!(cap.bplus_keys_for_height(3), 18);
    }

    #[test]
    fn test_keys_for_height_saturates() {
        let cap = Capacity::new(1000).unwrap();
        assert_eq!(cap.classic_keys_for_height(64), usize::MAX);
        assert_eq!(cap.bplus_keys_for_height(64), usize::MAX);
    }
}
