//! Whitespace-separated integer input files.
//!
//! Pair format: two lines, one vector per line (inner products).
//!
//! Batch format: `vector_count vector_size` followed by
//! `vector_count * vector_size` integers in any layout (mean, variance).

use std::fs;
use std::io::Write;
use std::path::Path;

use itertools::Itertools;

use crate::error::{Result, StatsError};

/// `vector_count` vectors of `vector_size` integers, stored flat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Number of vectors.
    pub vector_count: usize,
    /// Elements per vector.
    pub vector_size: usize,
    /// All elements, vector after vector.
    pub values: Vec<i64>,
}

impl Batch {
    /// Flat batch from its parts; the length must match the header.
    pub fn new(vector_count: usize, vector_size: usize, values: Vec<i64>) -> Result<Self> {
        let expected = vector_count
            .checked_mul(vector_size)
            .ok_or_else(|| StatsError::InputShape("batch size overflows".into()))?;
        if expected == 0 {
            return Err(StatsError::InputShape("batch holds no elements".into()));
        }
        if values.len() != expected {
            return Err(StatsError::InputShape(format!(
                "header announces {vector_count}x{vector_size} = {expected} values, found {}",
                values.len()
            )));
        }
        Ok(Self {
            vector_count,
            vector_size,
            values,
        })
    }

    /// Total number of elements.
    pub fn total_elements(&self) -> usize {
        self.values.len()
    }

    /// The vectors one by one.
    pub fn vectors(&self) -> impl Iterator<Item = &[i64]> {
        self.values.chunks(self.vector_size)
    }
}

fn parse_int(token: &str, position: usize) -> Result<i64> {
    token.parse().map_err(|e| StatsError::Parse {
        position,
        message: format!("'{token}': {e}"),
    })
}

fn parse_count(token: Option<&str>, position: usize, name: &str) -> Result<usize> {
    let token = token.ok_or_else(|| StatsError::Parse {
        position,
        message: format!("missing {name}"),
    })?;
    token.parse().map_err(|e| StatsError::Parse {
        position,
        message: format!("{name} '{token}': {e}"),
    })
}

/// Parse the two-line pair format.
pub fn parse_pair(text: &str) -> Result<(Vec<i64>, Vec<i64>)> {
    let mut position = 0;
    let mut lines = Vec::with_capacity(2);
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let values = line
            .split_whitespace()
            .map(|tok| {
                let value = parse_int(tok, position);
                position += 1;
                value
            })
            .collect::<Result<Vec<_>>>()?;
        lines.push(values);
    }

    match <[Vec<i64>; 2]>::try_from(lines) {
        Ok([left, right]) if left.len() == right.len() => Ok((left, right)),
        Ok([left, right]) => Err(StatsError::InputShape(format!(
            "operand lengths differ: {} vs {}",
            left.len(),
            right.len()
        ))),
        Err(lines) => Err(StatsError::InputShape(format!(
            "expected two vectors, found {}",
            lines.len()
        ))),
    }
}

/// Parse the batch format.
pub fn parse_batch(text: &str) -> Result<Batch> {
    let mut tokens = text.split_whitespace();
    let vector_count = parse_count(tokens.next(), 0, "vector_count")?;
    let vector_size = parse_count(tokens.next(), 1, "vector_size")?;
    let values = tokens
        .enumerate()
        .map(|(i, tok)| parse_int(tok, i + 2))
        .collect::<Result<Vec<_>>>()?;
    Batch::new(vector_count, vector_size, values)
}

/// Read a pair file.
pub fn read_pair(path: impl AsRef<Path>) -> Result<(Vec<i64>, Vec<i64>)> {
    parse_pair(&fs::read_to_string(path)?)
}

/// Read a batch file.
pub fn read_batch(path: impl AsRef<Path>) -> Result<Batch> {
    parse_batch(&fs::read_to_string(path)?)
}

/// Write `batch` in the batch format, one vector per line.
pub fn write_batch<W: Write>(mut out: W, batch: &Batch) -> Result<()> {
    writeln!(out, "{} {}", batch.vector_count, batch.vector_size)?;
    for vector in batch.vectors() {
        writeln!(out, "{}", vector.iter().join(" "))?;
    }
    Ok(())
}

/// Write `left` and `right` in the pair format.
pub fn write_pair<W: Write>(mut out: W, left: &[i64], right: &[i64]) -> Result<()> {
    writeln!(out, "{}", left.iter().join(" "))?;
    writeln!(out, "{}", right.iter().join(" "))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        let (v, w) = parse_pair("1 2\n\n3   4\n").unwrap();
        assert_eq!(v, vec![1, 2]);
        assert_eq!(w, vec![3, 4]);
    }

    #[test]
    fn test_parse_pair_errors() {
        assert!(matches!(parse_pair("1 2 3\n4 5\n"), Err(StatsError::InputShape(_))));
        assert!(matches!(parse_pair("1 2\n"), Err(StatsError::InputShape(_))));
        assert!(matches!(parse_pair("1 2\n3 4\n5 6\n"), Err(StatsError::InputShape(_))));
        match parse_pair("1 2\n3 x\n") {
            Err(StatsError::Parse { position, .. }) => assert_eq!(position, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_batch() {
        let batch = parse_batch("2 4\n1 2 3 4\n5 6 7 8\n").unwrap();
        assert_eq!(batch.total_elements(), 8);
        assert_eq!(batch.vectors().count(), 2);
        assert_eq!(batch.values, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_batch_errors() {
        assert!(matches!(parse_batch("2 4\n1 2 3\n"), Err(StatsError::InputShape(_))));
        assert!(matches!(parse_batch("0 4\n"), Err(StatsError::InputShape(_))));
        assert!(matches!(parse_batch(""), Err(StatsError::Parse { position: 0, .. })));
        assert!(matches!(parse_batch("1 -2\n"), Err(StatsError::Parse { position: 1, .. })));
        assert!(matches!(parse_batch("1 2\n1 y\n"), Err(StatsError::Parse { position: 3, .. })));
    }

    #[test]
    fn test_write_then_parse_batch() {
        let batch = Batch::new(3, 2, vec![1, -2, 0, 4, 5, -6]).unwrap();
        let mut buf = Vec::new();
        write_batch(&mut buf, &batch).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "3 2\n1 -2\n0 4\n5 -6\n");
        assert_eq!(parse_batch(&text).unwrap(), batch);
    }
}
