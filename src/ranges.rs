//! Run-length compression of per-offset values into ordered ranges.

use crate::model::{UsageRange, UsageRanges};

/// Merge consecutive equal values into `{start, end, count}` ranges.
///
/// The result is contiguous, ordered and covers `[0, values.len())`;
/// empty input yields no ranges.
#[must_use]
pub fn compress(values: &[u32]) -> UsageRanges {
    let mut ranges: Vec<UsageRange> = Vec::new();

    for (offset, &value) in values.iter().enumerate() {
        match ranges.last_mut() {
            Some(last) if last.count == value => last.end_offset = offset + 1,
            _ => ranges.push(UsageRange {
                start_offset: offset,
                end_offset: offset + 1,
                count: value,
            }),
        }
    }

    UsageRanges {
        length: values.len(),
        ranges,
    }
}

/// Expand ranges back into one value per offset.
#[must_use]
pub fn expand(usage: &UsageRanges) -> Vec<u32> {
    let mut values = vec![0; usage.length];
    for range in &usage.ranges {
        let end = range.end_offset.min(usage.length);
        if range.start_offset < end {
            values[range.start_offset..end].fill(range.count);
        }
    }
    values
}
