//! Mapping walker.
//!
//! Decodes a source-map payload into [`SourceMapping`]s (with column spans
//! computed from the next mapping on the same generated line) and turns each
//! mapping into the generated byte span it covers.
//!
//! Malformed mappings are dropped under [`MappingPolicy::Lenient`] and
//! reported as errors under [`MappingPolicy::Strict`].

use sourcemap::DecodedMap;

use crate::error::{BundlecovError, Result};
use crate::model::SourceMapping;

/// What to do with a mapping that points outside the generated content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MappingPolicy {
    /// Drop it silently.
    #[default]
    Lenient,
    /// Fail with `InvalidMappingLine` / `InvalidMappingColumn`.
    Strict,
}

impl MappingPolicy {
    #[must_use]
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            MappingPolicy::Strict
        } else {
            MappingPolicy::Lenient
        }
    }
}

/// Line layout of generated content, split on `\n`.
#[derive(Debug, Clone)]
pub struct GeneratedLines {
    starts: Vec<usize>,
    lengths: Vec<usize>,
}

impl GeneratedLines {
    pub fn new(content: &str) -> Self {
        let mut starts = Vec::new();
        let mut lengths = Vec::new();
        let mut offset = 0;
        for line in content.split('\n') {
            starts.push(offset);
            lengths.push(line.len());
            offset += line.len() + 1;
        }
        Self { starts, lengths }
    }

    /// Number of lines; always at least one.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lengths.len()
    }

    /// Length of a 1-based line, without its terminator.
    #[must_use]
    pub fn line_length(&self, line: u32) -> Option<usize> {
        let idx = (line as usize).checked_sub(1)?;
        self.lengths.get(idx).copied()
    }

    /// Byte offset of the first character of a 1-based line.
    #[must_use]
    pub fn line_start(&self, line: u32) -> Option<usize> {
        let idx = (line as usize).checked_sub(1)?;
        self.starts.get(idx).copied()
    }
}

/// The generated bytes covered by one attributable mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingSpan<'a> {
    pub source: &'a str,
    pub generated_line: u32,
    pub generated_column: u32,
    /// Absolute byte offset of the span in the content.
    pub start_offset: usize,
    pub length: u64,
}

impl MappingSpan<'_> {
    #[must_use]
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.length as usize
    }
}

/// Decode a raw source-map payload (regular or indexed) into mappings in
/// generated order.
pub fn decode(map: &serde_json::Value) -> Result<Vec<SourceMapping>> {
    let raw = serde_json::to_vec(map)?;
    let sm = match sourcemap::decode_slice(&raw)? {
        DecodedMap::Regular(sm) => sm,
        DecodedMap::Index(index) => index.flatten()?,
        _ => {
            return Err(BundlecovError::Parse(
                "unsupported source map flavor".to_string(),
            ))
        }
    };

    let mut tokens: Vec<(u32, u32, Option<&str>)> = sm
        .tokens()
        .map(|t| (t.get_dst_line(), t.get_dst_col(), t.get_source()))
        .collect();
    tokens.sort_by_key(|&(line, col, _)| (line, col));

    Ok(with_column_spans(&tokens))
}

/// Each mapping ends one column before the next mapping on its line; the
/// last mapping of a line has no end. Zero-width mappings are dropped.
fn with_column_spans(tokens: &[(u32, u32, Option<&str>)]) -> Vec<SourceMapping> {
    let mut mappings = Vec::with_capacity(tokens.len());
    for (idx, &(line, col, source)) in tokens.iter().enumerate() {
        let next_col = tokens
            .get(idx + 1)
            .filter(|next| next.0 == line)
            .map(|next| next.1);
        let last_generated_column = match next_col {
            Some(next) if next <= col => continue,
            Some(next) => Some(next - 1),
            None => None,
        };
        mappings.push(SourceMapping {
            source: source.filter(|s| !s.is_empty()).map(str::to_owned),
            generated_line: line + 1,
            generated_column: col,
            last_generated_column,
        });
    }
    mappings
}

/// Walk mappings in order, yielding the span of every attributable one.
///
/// Mappings without a source are never yielded. Out-of-range mappings are
/// dropped or reported depending on `policy`.
pub fn walk<'a>(
    mappings: &'a [SourceMapping],
    lines: &'a GeneratedLines,
    policy: MappingPolicy,
) -> impl Iterator<Item = Result<MappingSpan<'a>>> + 'a {
    mappings
        .iter()
        .filter_map(move |m| span_of(m, lines, policy).transpose())
}

fn span_of<'a>(
    mapping: &'a SourceMapping,
    lines: &GeneratedLines,
    policy: MappingPolicy,
) -> Result<Option<MappingSpan<'a>>> {
    let source = match mapping.source.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(None),
    };

    let line = mapping.generated_line;
    let (line_length, line_start) = match (lines.line_length(line), lines.line_start(line)) {
        (Some(len), Some(start)) => (len, start),
        _ => {
            return reject(
                policy,
                BundlecovError::InvalidMappingLine {
                    line,
                    max_line: lines.count(),
                },
            )
        }
    };

    let column = mapping.generated_column;
    if column as usize >= line_length {
        return reject(
            policy,
            BundlecovError::InvalidMappingColumn {
                line,
                column,
                max_column: line_length,
            },
        );
    }

    let length = match mapping.last_generated_column {
        Some(last) if last as usize >= line_length => {
            return reject(
                policy,
                BundlecovError::InvalidMappingColumn {
                    line,
                    column: last,
                    max_column: line_length,
                },
            );
        }
        Some(last) => u64::from(last + 1).saturating_sub(u64::from(column)),
        None => (line_length - column as usize) as u64,
    };

    Ok(Some(MappingSpan {
        source,
        generated_line: line,
        generated_column: column,
        start_offset: line_start + column as usize,
        length,
    }))
}

fn reject<T>(policy: MappingPolicy, err: BundlecovError) -> Result<Option<T>> {
    match policy {
        MappingPolicy::Lenient => Ok(None),
        MappingPolicy::Strict => Err(err),
    }
}
