//! # xlsxstream
//!
//! A streaming writer for XLSX (SpreadsheetML) workbooks.
//!
//! Worksheet XML is produced through a fixed-size buffer that is flushed to
//! the output as it fills, so memory usage stays constant no matter how many
//! rows are written or how large individual cells are. Cell values larger
//! than the whole buffer are streamed piecewise across flushes without ever
//! growing the buffer.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use xlsxstream::{Cell, XlsxWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = XlsxWriter::new("output.xlsx")?;
//!
//! writer.write_row(&["Name", "Age", "City"])?;
//! writer.write_row_typed(&[
//!     Cell::new("Alice"),
//!     Cell::new(30),
//!     Cell::new("New York"),
//! ])?;
//!
//! writer.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Multiple sheets, styles, and formulas
//!
//! ```rust,no_run
//! use xlsxstream::{Cell, Formula, Style, Workbook};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut wb = Workbook::create("report.xlsx")?;
//! let header = wb.register_style(&Style::new().bold());
//!
//! wb.add_sheet("Totals")?;
//! wb.write_row(&[Cell::styled("Amount", header)])?;
//! wb.write_row(&[Cell::new(12.5)])?;
//! wb.write_row(&[Cell::formula(Formula::new("=SUM(A2:A2)"), 12.5)])?;
//!
//! wb.close()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cell;
pub mod encode;
pub mod error;
pub mod row;
pub mod styles;
pub mod workbook;
pub mod worksheet;
pub mod writer;

pub use buffer::{CancelToken, MIN_BUFFER_SIZE};
pub use cell::{Cell, CellValue, Formula, StyleId};
pub use error::{Result, XlsxError};
pub use row::RowOptions;
pub use styles::{Style, StyleRegistry};
pub use workbook::Workbook;
pub use worksheet::{ColumnOptions, SheetOptions, SheetWriter, MAX_COLUMNS, MAX_ROWS};
pub use writer::XlsxWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_surface_smoke() {
        // Drive the re-exported types end to end against an in-memory sink
        let mut sheet = SheetWriter::new(Vec::new()).unwrap();
        sheet
            .write_row(&[Cell::new("hello"), Cell::new(1), Cell::new(true)])
            .unwrap();
        let xml = String::from_utf8(sheet.finish().unwrap()).unwrap();
        assert!(xml.contains(
            "<row r=\"1\"><c t=\"inlineStr\"><is><t>hello</t></is></c>\
             <c><v>1</v></c><c t=\"b\"><v>1</v></c></row>"
        ));
    }
}
