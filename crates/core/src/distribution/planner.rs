//! Batch planning for whitelist registration.
//!
//! A registration call carries one `vector<address>` pure argument, and the
//! ledger caps the size of a pure argument. [`BatchPlanner`] cuts an ordered
//! entry list into contiguous batches that respect both a cardinality bound
//! and the serialized-size budget. The size check runs for every entry and
//! wins over the cardinality bound when entries encode larger than expected.

use crate::bcs::{self, BcsEncode};
use crate::config::BatchLimits;

/// Planning failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// A single entry does not fit in a batch on its own.
    #[error(
        "entry {index} encodes to {encoded_size} bytes as a one-element batch, budget is {budget}"
    )]
    UnencodableEntry {
        index: usize,
        encoded_size: usize,
        budget: usize,
    },
}

/// A contiguous slice of the input sized for one registration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<'a, T> {
    /// Position of this batch in submission order.
    pub index: usize,
    /// Position of the first entry in the original list.
    pub offset: usize,
    pub entries: &'a [T],
    /// Size of `entries` encoded as a BCS vector.
    pub serialized_size: usize,
}

impl<T> Batch<'_, T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlanner {
    max_entries: usize,
    max_bytes: usize,
}

impl BatchPlanner {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            max_bytes,
        }
    }

    pub fn from_limits(limits: &BatchLimits) -> Self {
        Self::new(limits.max_batch_entries, limits.max_batch_bytes)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Lazily plan `entries`. The iterator yields at most one error, then ends.
    pub fn plan<'a, T: BcsEncode>(&self, entries: &'a [T]) -> Batches<'a, T> {
        Batches {
            planner: *self,
            entries,
            offset: 0,
            index: 0,
            failed: false,
        }
    }

    /// Plan everything up front so nothing is submitted if any entry is
    /// unencodable.
    pub fn plan_all<'a, T: BcsEncode>(&self, entries: &'a [T]) -> Result<Vec<Batch<'a, T>>, PlanError> {
        self.plan(entries).collect()
    }
}

/// Iterator returned by [`BatchPlanner::plan`].
pub struct Batches<'a, T> {
    planner: BatchPlanner,
    entries: &'a [T],
    offset: usize,
    index: usize,
    failed: bool,
}

impl<'a, T: BcsEncode> Iterator for Batches<'a, T> {
    type Item = Result<Batch<'a, T>, PlanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.entries.len() {
            return None;
        }

        let remaining = &self.entries[self.offset..];
        let mut count = 0usize;
        let mut payload = 0usize;
        for entry in remaining.iter().take(self.planner.max_entries) {
            let next_payload = payload + entry.encoded_len();
            if bcs::uleb128_len(count + 1) + next_payload > self.planner.max_bytes {
                break;
            }
            payload = next_payload;
            count += 1;
        }

        if count == 0 {
            self.failed = true;
            return Some(Err(PlanError::UnencodableEntry {
                index: self.offset,
                encoded_size: bcs::uleb128_len(1) + remaining[0].encoded_len(),
                budget: self.planner.max_bytes,
            }));
        }

        let batch = Batch {
            index: self.index,
            offset: self.offset,
            entries: &remaining[..count],
            serialized_size: bcs::uleb128_len(count) + payload,
        };
        self.offset += count;
        self.index += 1;
        Some(Ok(batch))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::bcs::encode::encode_vector;
    use crate::config::{DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_BATCH_ENTRIES};
    use crate::ledger::SuiAddress;

    fn addresses(n: usize) -> Vec<SuiAddress> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[24..].copy_from_slice(&(i as u64).to_be_bytes());
                SuiAddress::new(bytes)
            })
            .collect()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(511, 1)]
    #[case(512, 2)]
    #[case(601, 2)]
    #[case(1533, 3)]
    fn test_default_limits_batch_count(#[case] n: usize, #[case] expected: usize) {
        let planner = BatchPlanner::new(DEFAULT_MAX_BATCH_ENTRIES, DEFAULT_MAX_BATCH_BYTES);
        let addrs = addresses(n);
        let batches = planner.plan_all(&addrs).unwrap();
        assert_eq!(batches.len(), expected);
        for batch in &batches {
            assert!(batch.len() <= DEFAULT_MAX_BATCH_ENTRIES);
            assert!(batch.serialized_size <= DEFAULT_MAX_BATCH_BYTES);
            assert_eq!(encode_vector(batch.entries).len(), batch.serialized_size);
        }
    }

    #[test]
    fn test_full_address_batch_fits_default_budget() {
        // 2-byte length prefix + 511 * 32
        let planner = BatchPlanner::new(DEFAULT_MAX_BATCH_ENTRIES, DEFAULT_MAX_BATCH_BYTES);
        let addrs = addresses(511);
        let batches = planner.plan_all(&addrs).unwrap();
        assert_eq!(batches[0].serialized_size, 2 + 511 * 32);
    }

    #[test]
    fn test_size_budget_overrides_cardinality() {
        // Room for 3 addresses (1 + 96 = 97) but not 4 (1 + 128).
        let planner = BatchPlanner::new(100, 100);
        let addrs = addresses(10);
        let batches = planner.plan_all(&addrs).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert!(batches.iter().all(|b| b.serialized_size <= 100));
    }

    #[test]
    fn test_variable_length_entries_split_on_size() {
        let entries = vec![
            "a".repeat(40),
            "b".repeat(40),
            "c".repeat(10),
            "d".repeat(90),
            "e".to_string(),
        ];
        let planner = BatchPlanner::new(10, 100);
        let batches = planner.plan_all(&entries).unwrap();
        let offsets: Vec<(usize, usize)> = batches.iter().map(|b| (b.offset, b.len())).collect();
        // 1 + 41 + 41 + 11 = 94; adding 91 overflows. 1 + 91 + 2 = 94.
        assert_eq!(offsets, vec![(0, 3), (3, 2)]);
        for batch in &batches {
            assert_eq!(encode_vector(batch.entries).len(), batch.serialized_size);
        }
    }

    #[test]
    fn test_single_oversized_entry_fails() {
        let planner = BatchPlanner::new(511, 16);
        let addrs = addresses(3);
        let err = planner.plan_all(&addrs).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnencodableEntry {
                index: 0,
                encoded_size: 33,
                budget: 16
            }
        );
    }

    #[test]
    fn test_oversized_entry_mid_list_reports_index_and_stops() {
        let entries = vec!["ok".to_string(), "x".repeat(500), "after".to_string()];
        let planner = BatchPlanner::new(10, 64);
        let mut iter = planner.plan(&entries);

        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.entries, &entries[..1]);

        match iter.next() {
            Some(Err(PlanError::UnencodableEntry { index, .. })) => assert_eq!(index, 1),
            other => panic!("expected UnencodableEntry, got {other:?}"),
        }
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_batches_are_lazy() {
        let planner = BatchPlanner::new(2, DEFAULT_MAX_BATCH_BYTES);
        let addrs = addresses(7);
        let first_two: Vec<_> = planner.plan(&addrs).take(2).collect::<Result<_, _>>().unwrap();
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[1].offset, 2);
        assert_eq!(first_two[1].index, 1);
    }

    proptest! {
        #[test]
        fn prop_batches_partition_input(n in 0usize..2000, bound in 1usize..600) {
            let planner = BatchPlanner::new(bound, DEFAULT_MAX_BATCH_BYTES * 4);
            let addrs = addresses(n);
            let batches = planner.plan_all(&addrs).unwrap();

            prop_assert_eq!(batches.len(), n.div_ceil(bound));
            let joined: Vec<SuiAddress> = batches.iter().flat_map(|b| b.entries.iter().copied()).collect();
            prop_assert_eq!(&joined, &addrs);
            for (i, batch) in batches.iter().enumerate() {
                prop_assert_eq!(batch.index, i);
                prop_assert!(batch.len() <= bound);
                prop_assert!(batch.serialized_size <= planner.max_bytes());
            }
        }

        #[test]
        fn prop_size_budget_never_exceeded(
            lens in proptest::collection::vec(0usize..300, 0..200),
            budget in 400usize..4096,
        ) {
            let entries: Vec<String> = lens.iter().map(|l| "z".repeat(*l)).collect();
            let planner = BatchPlanner::new(64, budget);
            let batches = planner.plan_all(&entries).unwrap();
            let total: usize = batches.iter().map(|b| b.len()).sum();
            prop_assert_eq!(total, entries.len());
            for batch in &batches {
                prop_assert!(batch.serialized_size <= budget);
                prop_assert_eq!(encode_vector(batch.entries).len(), batch.serialized_size);
            }
        }
    }
}
