//! Pose record reader
//!
//! A pose file is a sequence of records, each made of
//!
//! ```text
//! <blank separator line>
//! <index line>
//! r00 r01 r02 tx
//! r10 r11 r12 ty
//! r20 r21 r22 tz
//! 0   0   0   1
//! ```
//!
//! Extra blank lines between records are tolerated, and a record may omit the
//! index line.

use nalgebra::Matrix4;
use scan3d_core::{Error, Result, Transform};
use std::io::BufRead;

/// One record as read from the file, before SE(3) validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRecord {
    /// Content of the index line, empty when the record had none
    pub label: String,
    pub matrix: Matrix4<f64>,
}

pub struct PoseReader<R> {
    reader: R,
    line_number: usize,
    records: usize,
}

impl<R: BufRead> PoseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            records: 0,
        }
    }

    /// Number of records returned so far.
    pub fn records_read(&self) -> usize {
        self.records
    }

    /// Next pose, validated as a rigid transform.
    ///
    /// `Ok(None)` at the end of input. Malformed numbers or a truncated record
    /// give `Error::Parse`; a matrix that is not a rigid transform gives
    /// `Error::MalformedTransform`.
    pub fn next_pose(&mut self) -> Result<Option<Transform>> {
        match self.next_record()? {
            Some(record) => Transform::from_matrix(record.matrix).map(Some),
            None => Ok(None),
        }
    }

    /// Next raw record without checking that the matrix is rigid.
    pub fn next_record(&mut self) -> Result<Option<PoseRecord>> {
        let first = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        let mut rows: Vec<[f64; 4]> = Vec::with_capacity(4);
        let label = match self.parse_row(&first) {
            Ok(row) => {
                rows.push(row);
                String::new()
            }
            Err(_) => first.trim().to_string(),
        };

        while rows.len() < 4 {
            let line = self.read_line()?.ok_or_else(|| {
                Error::Parse(format!(
                    "pose record ends after {} of 4 matrix rows (line {})",
                    rows.len(),
                    self.line_number
                ))
            })?;
            rows.push(self.parse_row(&line)?);
        }

        let values: Vec<f64> = rows.iter().flatten().copied().collect();
        self.records += 1;
        tracing::trace!(record = self.records, label = %label, "read pose record");
        Ok(Some(PoseRecord {
            label,
            matrix: Matrix4::from_row_slice(&values),
        }))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(line))
    }

    fn parse_row(&self, line: &str) -> Result<[f64; 4]> {
        let values = line
            .split_whitespace()
            .map(|s| {
                s.parse::<f64>().map_err(|_| {
                    Error::Parse(format!(
                        "invalid number '{}' in pose file (line {})",
                        s, self.line_number
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        <[f64; 4]>::try_from(values.as_slice()).map_err(|_| {
            Error::Parse(format!(
                "expected 4 values per pose row, got {} (line {})",
                values.len(),
                self.line_number
            ))
        })
    }
}

impl<R: BufRead> Iterator for PoseReader<R> {
    type Item = Result<Transform>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pose().transpose()
    }
}
