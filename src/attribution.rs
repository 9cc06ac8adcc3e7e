//! Byte attributor: folds mapping spans into per-source byte totals.

use std::collections::BTreeMap;

use crate::error::{BundlecovError, Result};
use crate::mapping::{walk, GeneratedLines, MappingPolicy, MappingSpan};
use crate::model::{FileSizeMap, SourceMapping, UsageRanges};

/// Running totals while walking a script's mappings.
#[derive(Debug, Default)]
struct Attribution {
    files: BTreeMap<String, u64>,
    mapped_bytes: u64,
}

impl Attribution {
    fn add(mut self, span: MappingSpan<'_>) -> Self {
        *self.files.entry(span.source.to_string()).or_insert(0) += span.length;
        self.mapped_bytes += span.length;
        self
    }

    fn finish(self, total_bytes: u64) -> FileSizeMap {
        FileSizeMap {
            files: self.files,
            unmapped_bytes: total_bytes.saturating_sub(self.mapped_bytes),
            total_bytes,
        }
    }
}

/// Number of bytes the content counts for, newlines excluded.
#[must_use]
pub fn counted_bytes(content: &str, lines: &GeneratedLines) -> u64 {
    (content.len() + 1 - lines.count()) as u64
}

/// Compute how many generated bytes each original source file contributed.
///
/// `total_bytes` excludes one byte per newline; whatever the mappings do not
/// claim is reported as `unmapped_bytes`.
pub fn compute_file_size_map(
    mappings: &[SourceMapping],
    content: &str,
    policy: MappingPolicy,
) -> Result<FileSizeMap> {
    let lines = GeneratedLines::new(content);
    let attribution = walk(mappings, &lines, policy)
        .try_fold(Attribution::default(), |acc, span| {
            Ok::<_, BundlecovError>(acc.add(span?))
        })?;
    Ok(attribution.finish(counted_bytes(content, &lines)))
}

/// Attribute the wasted bytes of `usage` to original source files.
///
/// Span offsets past the end of the usage ranges count as used.
pub fn unused_by_source(
    mappings: &[SourceMapping],
    content: &str,
    usage: &UsageRanges,
    policy: MappingPolicy,
) -> Result<BTreeMap<String, u64>> {
    let lines = GeneratedLines::new(content);
    let prefix = wasted_prefix_sums(usage);
    let wasted_before = |offset: usize| prefix[offset.min(usage.length)];

    let unused = walk(mappings, &lines, policy).try_fold(BTreeMap::new(), |mut acc, span| {
        let span = span?;
        let wasted = wasted_before(span.end_offset()) - wasted_before(span.start_offset);
        if wasted > 0 {
            *acc.entry(span.source.to_string()).or_insert(0) += wasted;
        }
        Ok::<_, BundlecovError>(acc)
    });
    unused
}

/// `prefix[i]` is the number of wasted bytes in `[0, i)`.
fn wasted_prefix_sums(usage: &UsageRanges) -> Vec<u64> {
    let mut prefix = vec![0u64; usage.length + 1];
    for range in &usage.ranges {
        let wasted = u64::from(range.count > 0);
        for offset in range.start_offset..range.end_offset {
            prefix[offset + 1] = prefix[offset] + wasted;
        }
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UsageRange;
    use proptest::prelude::*;

    const BASE64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    fn push_vlq(out: &mut String, value: i64) {
        let mut v = (if value < 0 { (-value << 1) | 1 } else { value << 1 }) as u64;
        loop {
            let mut digit = (v & 31) as usize;
            v >>= 5;
            if v > 0 {
                digit |= 32;
            }
            out.push(BASE64[digit] as char);
            if v == 0 {
                break;
            }
        }
    }

    /// Encode per-line `column -> source index` segments as a `mappings` string.
    fn encode_mappings(lines: &[BTreeMap<u32, u8>]) -> String {
        let mut out = String::new();
        let mut prev_source = 0i64;
        for (idx, segments) in lines.iter().enumerate() {
            if idx > 0 {
                out.push(';');
            }
            let mut prev_col = 0i64;
            for (n, (&col, &source)) in segments.iter().enumerate() {
                if n > 0 {
                    out.push(',');
                }
                push_vlq(&mut out, i64::from(col) - prev_col);
                push_vlq(&mut out, i64::from(source) - prev_source);
                out.push_str("AA");
                prev_col = i64::from(col);
                prev_source = i64::from(source);
            }
        }
        out
    }

    fn mapping(source: Option<&str>, line: u32, col: u32, last: Option<u32>) -> SourceMapping {
        SourceMapping {
            source: source.map(str::to_owned),
            generated_line: line,
            generated_column: col,
            last_generated_column: last,
        }
    }

    #[test]
    fn test_single_line_two_sources() {
        let content = "x".repeat(100);
        let mappings = [
            mapping(Some("x.ts"), 1, 0, Some(49)),
            mapping(Some("y.ts"), 1, 50, None),
        ];
        let map = compute_file_size_map(&mappings, &content, MappingPolicy::Lenient).unwrap();
        assert_eq!(map.files.get("x.ts"), Some(&50));
        assert_eq!(map.files.get("y.ts"), Some(&50));
        assert_eq!(map.unmapped_bytes, 0);
        assert_eq!(map.total_bytes, 100);
    }

    #[test]
    fn test_newlines_not_counted() {
        let content = "abcdef\nghij\n";
        let mappings = [mapping(Some("a.ts"), 1, 0, None), mapping(Some("a.ts"), 2, 2, None)];
        let map = compute_file_size_map(&mappings, content, MappingPolicy::Lenient).unwrap();
        // 12 bytes, 3 lines => 10 counted bytes
        assert_eq!(map.total_bytes, 10);
        assert_eq!(map.files.get("a.ts"), Some(&8));
        assert_eq!(map.unmapped_bytes, 2);
        assert_eq!(map.mapped_bytes() + map.unmapped_bytes, map.total_bytes);
    }

    #[test]
    fn test_empty_map_all_unmapped() {
        let map = compute_file_size_map(&[], "abc\ndef", MappingPolicy::Strict).unwrap();
        assert!(map.files.is_empty());
        assert_eq!(map.unmapped_bytes, 6);
        assert_eq!(map.total_bytes, 6);
    }

    #[test]
    fn test_invalid_column_does_not_touch_map() {
        let content = "abcdefghij";
        let valid = [mapping(Some("a.ts"), 1, 0, Some(3))];
        let with_invalid = [
            mapping(Some("a.ts"), 1, 0, Some(3)),
            mapping(Some("b.ts"), 1, 10, None),
        ];
        let a = compute_file_size_map(&valid, content, MappingPolicy::Lenient).unwrap();
        let b = compute_file_size_map(&with_invalid, content, MappingPolicy::Lenient).unwrap();
        assert_eq!(a, b);
        assert!(!b.files.contains_key("b.ts"));
    }

    #[test]
    fn test_strict_mode_fails() {
        let mappings = [mapping(Some("b.ts"), 1, 10, None)];
        let err = compute_file_size_map(&mappings, "abc", MappingPolicy::Strict).unwrap_err();
        assert!(err.is_invalid_mapping());
    }

    #[test]
    fn test_unused_by_source() {
        // line 1: "abcde" (0..5), line 2: "fghij" (6..11)
        let content = "abcde\nfghij";
        let mappings = [
            mapping(Some("a.ts"), 1, 0, Some(2)),
            mapping(Some("b.ts"), 1, 3, None),
            mapping(Some("c.ts"), 2, 0, None),
        ];
        let usage = UsageRanges {
            length: 11,
            ranges: vec![
                UsageRange { start_offset: 0, end_offset: 4, count: 0 },
                UsageRange { start_offset: 4, end_offset: 8, count: 1 },
                UsageRange { start_offset: 8, end_offset: 11, count: 0 },
            ],
        };
        let unused = unused_by_source(&mappings, content, &usage, MappingPolicy::Lenient).unwrap();
        assert_eq!(unused.get("a.ts"), None);
        // b.ts covers offsets 3,4 -> offset 4 wasted
        assert_eq!(unused.get("b.ts"), Some(&1));
        // c.ts covers offsets 6..11 -> 6,7 wasted
        assert_eq!(unused.get("c.ts"), Some(&2));
    }

    #[test]
    fn test_unused_by_source_strict_fails() {
        let mappings = [mapping(Some("a.ts"), 3, 0, None)];
        let usage = UsageRanges {
            length: 3,
            ranges: vec![UsageRange { start_offset: 0, end_offset: 3, count: 1 }],
        };
        let err = unused_by_source(&mappings, "abc", &usage, MappingPolicy::Strict).unwrap_err();
        assert!(err.is_invalid_mapping());
        let lenient = unused_by_source(&mappings, "abc", &usage, MappingPolicy::Lenient).unwrap();
        assert!(lenient.is_empty());
    }

    #[test]
    fn test_unused_by_source_clamps_short_usage() {
        let content = "abcdefgh";
        let mappings = [mapping(Some("a.ts"), 1, 0, None)];
        let usage = UsageRanges {
            length: 4,
            ranges: vec![UsageRange { start_offset: 0, end_offset: 4, count: 1 }],
        };
        let unused = unused_by_source(&mappings, content, &usage, MappingPolicy::Lenient).unwrap();
        assert_eq!(unused.get("a.ts"), Some(&4));
    }

    #[test]
    fn test_encode_mappings_matches_known_string() {
        let lines = vec![BTreeMap::from([(0, 0), (50, 1)])];
        assert_eq!(encode_mappings(&lines), "AAAA,kDCAA");
    }

    proptest! {
        #[test]
        fn prop_mapped_plus_unmapped_is_counted_bytes(
            lines in proptest::collection::vec(
                (0u32..24, proptest::collection::btree_map(0u32..24, 0u8..2, 0..5)),
                1..6,
            ),
            trailing_newline in any::<bool>(),
        ) {
            let segments: Vec<BTreeMap<u32, u8>> = lines
                .iter()
                .map(|(len, cols)| {
                    cols.iter()
                        .filter(|(col, _)| **col < *len)
                        .map(|(col, source)| (*col, *source))
                        .collect()
                })
                .collect();
            let mut content = lines
                .iter()
                .map(|(len, _)| "x".repeat(*len as usize))
                .collect::<Vec<_>>()
                .join("\n");
            if trailing_newline {
                content.push('\n');
            }

            let map = serde_json::json!({
                "version": 3,
                "sources": ["a.ts", "b.ts"],
                "names": [],
                "mappings": encode_mappings(&segments),
            });
            let mappings = crate::mapping::decode(&map).unwrap();
            let sizes = compute_file_size_map(&mappings, &content, MappingPolicy::Strict).unwrap();

            let newlines = content.matches('\n').count();
            prop_assert_eq!(sizes.total_bytes as usize, content.len() - newlines);
            prop_assert_eq!(sizes.mapped_bytes() + sizes.unmapped_bytes, sizes.total_bytes);

            let expected_mapped: u64 = lines
                .iter()
                .zip(&segments)
                .map(|((len, _), segs)| segs.keys().next().map_or(0, |first| u64::from(len - first)))
                .sum();
            prop_assert_eq!(sizes.mapped_bytes(), expected_mapped);
        }
    }
}
