//! Convenience file writer
//!
//! [`XlsxWriter`] wraps [`Workbook`] for the common case: open a file, get a
//! first sheet named "Sheet1", push rows, save. Anything beyond that (column
//! defaults, cancellation, custom buffer sizes, in-memory sinks) goes through
//! [`Workbook`] directly.

use crate::cell::Cell;
use crate::error::Result;
use crate::workbook::Workbook;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Streaming `.xlsx` file writer with a worksheet already open
///
/// # Examples
///
/// ```no_run
/// use xlsxstream::XlsxWriter;
///
/// let mut writer = XlsxWriter::new("output.xlsx").unwrap();
/// writer.write_row(&["Name", "Age", "City"]).unwrap();
/// writer.write_row(&["Alice", "30", "New York"]).unwrap();
/// writer.save().unwrap();
/// ```
pub struct XlsxWriter {
    inner: Workbook<BufWriter<File>>,
}

impl XlsxWriter {
    /// Create a writer for `path` with a "Sheet1" worksheet open
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut inner = Workbook::create(path)?;
        inner.add_sheet("Sheet1")?;
        Ok(XlsxWriter { inner })
    }

    /// Write a row of string cells
    pub fn write_row<I, S>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cells: Vec<Cell> = data
            .into_iter()
            .map(|s| Cell::new(s.as_ref()))
            .collect();
        self.inner.write_row(&cells)
    }

    /// Write a row of typed cells
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use xlsxstream::{Cell, XlsxWriter};
    ///
    /// let mut writer = XlsxWriter::new("output.xlsx").unwrap();
    /// writer
    ///     .write_row_typed(&[Cell::new("Alice"), Cell::new(30), Cell::new(true)])
    ///     .unwrap();
    /// writer.save().unwrap();
    /// ```
    pub fn write_row_typed(&mut self, cells: &[Cell]) -> Result<()> {
        self.inner.write_row(cells)
    }

    /// Write multiple string rows at once
    pub fn write_rows_batch<I, R, S>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Close the current worksheet and open a new one
    pub fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.inner.add_sheet(name)
    }

    /// Access the underlying workbook for styles and options
    pub fn workbook(&mut self) -> &mut Workbook<BufWriter<File>> {
        &mut self.inner
    }

    /// Finish the package and flush the file
    pub fn save(self) -> Result<()> {
        self.inner.close()?;
        Ok(())
    }
}
