//! Coverage reconciler.
//!
//! Merges several coverage samples of the same script into one mask. A byte
//! only counts as wasted when it went unexecuted in every sample, so a byte
//! used by any observed load is never reported.

use crate::error::{BundlecovError, Result};
use crate::model::{CoverageSample, UsageRanges};
use crate::ranges;

/// Per-offset count of samples in which the offset never executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedMask {
    counts: Vec<u32>,
    samples: usize,
}

impl UnusedMask {
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn samples(&self) -> usize {
        self.samples
    }

    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// `1` where the offset was unexecuted in every sample, else `0`.
    #[must_use]
    pub fn wasted(&self) -> Vec<u32> {
        self.counts
            .iter()
            .map(|&count| u32::from(count as usize == self.samples))
            .collect()
    }

    /// The wasted view, run-length encoded.
    #[must_use]
    pub fn to_ranges(&self) -> UsageRanges {
        ranges::compress(&self.wasted())
    }
}

/// Reconcile the samples of one script whose content is `content_length`
/// bytes long.
///
/// Every sample must report the same script length, no longer than the
/// content; anything else is a consistency error for this script.
pub fn reconcile(samples: &[CoverageSample], content_length: usize) -> Result<UnusedMask> {
    let first = samples.first().ok_or(BundlecovError::NoCoverageSamples)?;
    let length = first.length();
    if length > content_length {
        return Err(BundlecovError::CoverageOutOfBounds {
            length,
            content_length,
            sample: 0,
        });
    }

    for (idx, sample) in samples.iter().enumerate().skip(1) {
        let actual = sample.length();
        if actual != length {
            return Err(BundlecovError::CoverageLengthMismatch {
                expected: length,
                actual,
                sample: idx,
            });
        }
    }

    let counts = samples
        .iter()
        .fold(vec![0u32; length], |mut counts, sample| {
            for (offset, unexecuted) in unexecuted_offsets(sample, length).into_iter().enumerate() {
                counts[offset] += u32::from(unexecuted);
            }
            counts
        });

    Ok(UnusedMask {
        counts,
        samples: samples.len(),
    })
}

/// Offsets covered by at least one zero-count range of the sample.
fn unexecuted_offsets(sample: &CoverageSample, length: usize) -> Vec<bool> {
    let mut unexecuted = vec![false; length];
    for range in sample.ranges().filter(|r| r.count == 0) {
        let end = range.end_offset.min(length);
        if range.start_offset < end {
            unexecuted[range.start_offset..end].fill(true);
        }
    }
    unexecuted
}
