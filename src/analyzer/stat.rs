//! `stat1`/`stat4` row types and their ASCII/CSV serialization.
//!
//! Formats follow §6.3: `stat1.stat` is space-separated unsigned decimal
//! integers optionally followed by a single-space `unordered` token;
//! `stat4`'s three count fields are each exactly K space-separated
//! decimal integers.

use super::AnalyzerError;

/// One row of the `stat1` table: `(tbl, idx, stat)`.
///
/// `index` is `None` for the optional table-level summary row, whose
/// `stat` field is just the table's row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat1Row {
    pub table: String,
    pub index: Option<String>,
    pub rowcount: u64,
    /// `avg[c]` for each column position; empty for the table-level row.
    pub avg: Vec<u64>,
    pub unordered: bool,
}

impl Stat1Row {
    /// Formats the `stat` field: `"rowcount avg[0] avg[1] … avg[K-1]"`,
    /// with a trailing ` unordered` token when set.
    pub fn format_stat(&self) -> String {
        let mut out = self.rowcount.to_string();
        for a in &self.avg {
            out.push(' ');
            out.push_str(&a.to_string());
        }
        if self.unordered {
            out.push_str(" unordered");
        }
        out
    }

    /// Parses a `stat1.stat` field back into a row. Stops at the first
    /// non-digit/non-space token, which (if present and equal to
    /// `"unordered"`) sets the unordered flag; any other trailing token
    /// is a corrupt row.
    pub fn parse(table: String, index: Option<String>, stat: &str) -> Result<Self, AnalyzerError> {
        let mut unordered = false;
        let mut numbers = Vec::new();
        for token in stat.split_ascii_whitespace() {
            if token == "unordered" {
                unordered = true;
                continue;
            }
            if unordered {
                return Err(AnalyzerError::Corrupt(format!("trailing token after unordered: {stat:?}")));
            }
            let n: u64 = token
                .parse()
                .map_err(|_| AnalyzerError::Corrupt(format!("non-numeric stat1 token: {token:?}")))?;
            numbers.push(n);
        }
        let Some((&rowcount, avg)) = numbers.split_first() else {
            return Err(AnalyzerError::Corrupt("empty stat1 field".into()));
        };
        Ok(Self {
            table,
            index,
            rowcount,
            avg: avg.to_vec(),
            unordered,
        })
    }
}

/// One row of the `stat4` table: `(tbl, idx, neq, nlt, ndlt, sample)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat4Row {
    pub table: String,
    pub index: String,
    pub eq: Vec<u64>,
    pub lt: Vec<u64>,
    pub dlt: Vec<u64>,
    pub sample: Vec<u8>,
}

fn format_csv(values: &[u64]) -> String {
    values
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_csv(field: &str, expected_len: usize) -> Result<Vec<u64>, AnalyzerError> {
    let values: Vec<u64> = field
        .split_ascii_whitespace()
        .map(|t| t.parse().map_err(|_| AnalyzerError::Corrupt(format!("non-numeric stat4 token: {t:?}"))))
        .collect::<Result<_, _>>()?;
    if values.len() != expected_len {
        return Err(AnalyzerError::Corrupt(format!(
            "expected {expected_len} counts, got {}",
            values.len()
        )));
    }
    Ok(values)
}

impl Stat4Row {
    pub fn format_eq(&self) -> String {
        format_csv(&self.eq)
    }
    pub fn format_lt(&self) -> String {
        format_csv(&self.lt)
    }
    pub fn format_dlt(&self) -> String {
        format_csv(&self.dlt)
    }

    /// Parses the three count fields, validating each holds exactly
    /// `ncols` integers.
    pub fn parse_counts(neq: &str, nlt: &str, ndlt: &str, ncols: usize) -> Result<(Vec<u64>, Vec<u64>, Vec<u64>), AnalyzerError> {
        Ok((parse_csv(neq, ncols)?, parse_csv(nlt, ncols)?, parse_csv(ndlt, ncols)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat1_round_trips() {
        let row = Stat1Row {
            table: "t".into(),
            index: Some("idx".into()),
            rowcount: 1000,
            avg: vec![50, 5],
            unordered: true,
        };
        let formatted = row.format_stat();
        assert_eq!(formatted, "1000 50 5 unordered");
        let parsed = Stat1Row::parse(row.table.clone(), row.index.clone(), &formatted).unwrap();
        assert_eq!(parsed, row);
    }

    #[test]
    fn stat1_without_unordered_round_trips() {
        let row = Stat1Row {
            table: "t".into(),
            index: Some("idx".into()),
            rowcount: 4,
            avg: vec![4, 2, 1],
            unordered: false,
        };
        let formatted = row.format_stat();
        let parsed = Stat1Row::parse(row.table.clone(), row.index.clone(), &formatted).unwrap();
        assert_eq!(parsed, row);
    }

    #[test]
    fn table_level_row_has_no_averages() {
        let row = Stat1Row {
            table: "t".into(),
            index: None,
            rowcount: 42,
            avg: vec![],
            unordered: false,
        };
        assert_eq!(row.format_stat(), "42");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Stat1Row::parse("t".into(), None, "not a number").is_err());
        assert!(Stat1Row::parse("t".into(), None, "").is_err());
        assert!(Stat1Row::parse("t".into(), None, "10 unordered 20").is_err());
    }

    #[test]
    fn stat4_counts_round_trip() {
        let row = Stat4Row {
            table: "t".into(),
            index: "idx".into(),
            eq: vec![1, 2, 3],
            lt: vec![4, 5, 6],
            dlt: vec![7, 8, 9],
            sample: vec![0xAB],
        };
        let (eq, lt, dlt) = Stat4Row::parse_counts(&row.format_eq(), &row.format_lt(), &row.format_dlt(), 3).unwrap();
        assert_eq!(eq, row.eq);
        assert_eq!(lt, row.lt);
        assert_eq!(dlt, row.dlt);
    }

    #[test]
    fn stat4_counts_reject_wrong_column_count() {
        assert!(Stat4Row::parse_counts("1 2", "1 2", "1 2", 3).is_err());
    }
}
