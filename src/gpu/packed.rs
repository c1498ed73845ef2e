/// Packed sequence with a range table
///
/// A hole-free `Vec` of records partitioned among owners. Each owner gets
/// one contiguous range; ranges are kept in the order they were pushed and
/// always tile the sequence exactly. This is the only place that physically
/// moves records around, and it knows nothing about images or tracks.

/// One entry of the range table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange<K> {
    pub owner: K,
    pub start: usize,
    pub count: usize,
}

impl<K> DrawRange<K> {
    pub fn end(&self) -> usize {
        self.start + self.count
    }
}

#[derive(Debug, Clone)]
pub struct PackedRanges<K, T> {
    records: Vec<T>,
    ranges: Vec<DrawRange<K>>,
}

impl<K, T> Default for PackedRanges<K, T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            ranges: Vec::new(),
        }
    }
}

impl<K: Copy + PartialEq, T: Copy + Default> PackedRanges<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn ranges(&self) -> &[DrawRange<K>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of the owner in the range table
    pub fn slot_of(&self, owner: K) -> Option<usize> {
        self.ranges.iter().position(|r| r.owner == owner)
    }

    pub fn range(&self, owner: K) -> Option<&DrawRange<K>> {
        self.ranges.iter().find(|r| r.owner == owner)
    }

    /// Append a new range at the end of the sequence.
    /// Returns the new slot, or `None` if the owner already has a range.
    pub fn push_range(&mut self, owner: K, records: impl IntoIterator<Item = T>) -> Option<usize> {
        if self.slot_of(owner).is_some() {
            return None;
        }
        let start = self.records.len();
        self.records.extend(records);
        self.ranges.push(DrawRange {
            owner,
            start,
            count: self.records.len() - start,
        });
        Some(self.ranges.len() - 1)
    }

    /// Cut the owner's range out and close the gap.
    /// Returns the slot it occupied and the removed range.
    pub fn remove_range(&mut self, owner: K) -> Option<(usize, DrawRange<K>)> {
        let slot = self.slot_of(owner)?;
        let removed = self.ranges.remove(slot);
        self.records.drain(removed.start..removed.end());
        for range in &mut self.ranges[slot..] {
            range.start -= removed.count;
        }
        Some((slot, removed))
    }

    /// Grow or shrink the owner's range at its tail, shifting every later
    /// range. New records are `T::default()` until written.
    /// Returns the slot of the owner.
    pub fn resize_range(&mut self, owner: K, count: usize) -> Option<usize> {
        let slot = self.slot_of(owner)?;
        let DrawRange { start, count: old, .. } = self.ranges[slot];
        let end = start + old;

        if count > old {
            let delta = count - old;
            self.records
                .splice(end..end, std::iter::repeat(T::default()).take(delta));
            for range in &mut self.ranges[slot + 1..] {
                range.start += delta;
            }
        } else if count < old {
            let delta = old - count;
            self.records.drain(end - delta..end);
            for range in &mut self.ranges[slot + 1..] {
                range.start -= delta;
            }
        }
        self.ranges[slot].count = count;
        Some(slot)
    }

    /// Mutable view of the owner's records
    pub fn records_mut(&mut self, owner: K) -> Option<&mut [T]> {
        let range = *self.range(owner)?;
        Some(&mut self.records[range.start..range.end()])
    }

    /// Ranges tile the sequence in table order without gaps or overlap
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 0;
        for range in &self.ranges {
            if range.start != expected {
                return false;
            }
            expected = range.end();
        }
        expected == self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_with(sizes: &[(char, usize)]) -> PackedRanges<char, u32> {
        let mut packed = PackedRanges::new();
        for &(owner, count) in sizes {
            let base = owner as u32 * 100;
            packed.push_range(owner, (0..count as u32).map(|i| base + i));
        }
        packed
    }

    #[test]
    fn test_push_appends_in_order() {
        let packed = packed_with(&[('a', 5), ('b', 3)]);
        assert_eq!(packed.len(), 8);
        assert_eq!(packed.ranges()[1], DrawRange { owner: 'b', start: 5, count: 3 });
        assert!(packed.is_contiguous());
    }

    #[test]
    fn test_push_duplicate_owner_rejected() {
        let mut packed = packed_with(&[('a', 2)]);
        assert_eq!(packed.push_range('a', [1, 2]), None);
        assert_eq!(packed.len(), 2);
    }

    #[test]
    fn test_remove_first_shifts_later_ranges() {
        let mut packed = packed_with(&[('a', 5), ('b', 3)]);
        let (slot, removed) = packed.remove_range('a').unwrap();
        assert_eq!(slot, 0);
        assert_eq!(removed.count, 5);
        assert_eq!(packed.ranges(), &[DrawRange { owner: 'b', start: 0, count: 3 }]);
        assert_eq!(packed.records(), &[9800, 9801, 9802]);
        assert!(packed.is_contiguous());
    }

    #[test]
    fn test_remove_middle_preserves_order() {
        let mut packed = packed_with(&[('a', 2), ('b', 4), ('c', 1), ('d', 3)]);
        packed.remove_range('b').unwrap();
        let owners: Vec<char> = packed.ranges().iter().map(|r| r.owner).collect();
        assert_eq!(owners, vec!['a', 'c', 'd']);
        assert_eq!(packed.range('c').unwrap().start, 2);
        assert_eq!(packed.range('d').unwrap().start, 3);
        assert_eq!(packed.records()[2], 'c' as u32 * 100);
        assert!(packed.is_contiguous());
    }

    #[test]
    fn test_grow_inserts_at_range_tail() {
        let mut packed = packed_with(&[('a', 2), ('b', 2)]);
        assert_eq!(packed.resize_range('a', 4), Some(0));
        assert_eq!(packed.range('a').unwrap().count, 4);
        assert_eq!(packed.range('b').unwrap().start, 4);
        // Old records stay at the front of the range, new ones are defaulted
        assert_eq!(&packed.records()[..4], &[9700, 9701, 0, 0]);
        assert_eq!(&packed.records()[4..], &[9800, 9801]);
        assert!(packed.is_contiguous());
    }

    #[test]
    fn test_shrink_shifts_down() {
        let mut packed = packed_with(&[('a', 3), ('b', 2)]);
        packed.resize_range('a', 1).unwrap();
        assert_eq!(packed.records(), &[9700, 9800, 9801]);
        assert_eq!(packed.range('b').unwrap().start, 1);
        assert!(packed.is_contiguous());
    }

    #[test]
    fn test_empty_range_is_still_tracked() {
        let mut packed = packed_with(&[('a', 0), ('b', 2)]);
        assert_eq!(packed.range('b').unwrap().start, 0);
        packed.resize_range('a', 1).unwrap();
        assert_eq!(packed.range('b').unwrap().start, 1);
        assert!(packed.is_contiguous());
    }

    #[test]
    fn test_records_mut_writes_only_owner() {
        let mut packed = packed_with(&[('a', 2), ('b', 2)]);
        for r in packed.records_mut('b').unwrap() {
            *r = 1;
        }
        assert_eq!(packed.records(), &[9700, 9701, 1, 1]);
        assert!(packed.records_mut('z').is_none());
    }

    #[test]
    fn test_random_walk_keeps_tiling() {
        let mut packed: PackedRanges<u8, u32> = PackedRanges::new();
        let mut state: u32 = 7;
        for _ in 0..500 {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            let owner = ((state >> 24) % 6) as u8;
            let size = ((state >> 8) % 7) as usize;
            match (state >> 4) % 3 {
                0 => {
                    packed.push_range(owner, std::iter::repeat(owner as u32).take(size));
                }
                1 => {
                    packed.remove_range(owner);
                }
                _ => {
                    packed.resize_range(owner, size);
                }
            }
            assert!(packed.is_contiguous());
            let total: usize = packed.ranges().iter().map(|r| r.count).sum();
            assert_eq!(total, packed.len());
        }
    }
}
