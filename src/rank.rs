//! Ranked "top N" views that fold the tail into a single row.

use serde::Serialize;

/// One row of a ranked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedRow {
    pub label: String,
    pub value: u64,
    /// How many input rows this one stands for.
    pub rows: usize,
    pub remainder: bool,
}

/// Sort rows by value descending (ties by label) and keep the first
/// `limit`. The rest is summed into one `"K more"` row, so the total of the
/// returned values always equals the total of the input.
#[must_use]
pub fn top_n<I, S>(rows: I, limit: usize) -> Vec<RankedRow>
where
    I: IntoIterator<Item = (S, u64)>,
    S: Into<String>,
{
    let mut rows: Vec<RankedRow> = rows
        .into_iter()
        .map(|(label, value)| RankedRow {
            label: label.into(),
            value,
            rows: 1,
            remainder: false,
        })
        .collect();
    rows.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.label.cmp(&b.label)));

    if rows.len() <= limit {
        return rows;
    }

    let rest = rows.split_off(limit);
    rows.push(RankedRow {
        label: format!("{} more", rest.len()),
        value: rest.iter().map(|r| r.value).sum(),
        rows: rest.len(),
        remainder: true,
    });
    rows
}
