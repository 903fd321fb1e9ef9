//! Worksheet streaming writer
//!
//! Owns the flush buffer and the row writer, emits the worksheet XML prolog
//! and epilog, and drives the flush protocol against the output sink. Rows
//! are numbered 1, 2, 3, ... in the order added; the whole worksheet is
//! produced with a single fixed-size buffer regardless of cell sizes.
//!
//! [`SheetWriter`] owns its sink and is the standalone public surface.
//! [`SheetCore`] is the same state machine with the sink passed per call,
//! which is how the workbook drives sheets against its ZIP stream.

use crate::buffer::{Buffer, CancelToken};
use crate::cell::{Cell, StyleId};
use crate::encode::encode_f64;
use crate::error::{Result, XlsxError};
use crate::row::{RowOptions, RowWriter, StyleContext};
use std::collections::HashMap;
use std::io::Write;

/// Maximum row count of the XLSX format
pub const MAX_ROWS: u32 = 1_048_576;
/// Maximum column count of the XLSX format
pub const MAX_COLUMNS: u16 = 16_384;

const XML_DECL: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const WORKSHEET_OPEN: &[u8] = b"<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">";
const SHEET_DATA_OPEN: &[u8] = b"<sheetData>";
const FOOTER: &[u8] = b"</sheetData></worksheet>";

/// Per-column defaults registered at worksheet creation
#[derive(Debug, Clone)]
pub struct ColumnOptions {
    /// 1-based column number
    pub col: u16,
    /// Column width in Excel character units
    pub width: Option<f64>,
    /// Default style for cells in this column that carry none of their own
    pub style: Option<StyleId>,
}

/// Options applied when a worksheet is opened
#[derive(Debug, Clone, Default)]
pub struct SheetOptions {
    /// Flush buffer size in bytes; clamped up to the 512-byte minimum
    pub buffer_size: usize,
    /// Column defaults, emitted as a `<cols>` block before the sheet data
    pub columns: Vec<ColumnOptions>,
    /// Style applied to unstyled date-time cells so they render as dates
    pub date_style: Option<StyleId>,
    /// Cancellation token observed at every flush boundary
    pub cancel: Option<CancelToken>,
}

/// Worksheet state machine: buffer, row writer, and style defaults. The
/// output sink is supplied on every call so an owner can route all sheets
/// through one stream.
pub(crate) struct SheetCore {
    buf: Buffer,
    rows: RowWriter,
    column_styles: HashMap<u16, StyleId>,
    default_date_xf: Option<u32>,
}

impl SheetCore {
    /// Validate options and emit the worksheet prolog
    pub(crate) fn open<W: Write>(options: SheetOptions, sink: &mut W) -> Result<Self> {
        let mut column_styles = HashMap::new();
        for col in &options.columns {
            if col.col == 0 || col.col > MAX_COLUMNS {
                return Err(XlsxError::OutOfRange {
                    what: "column number",
                    value: col.col as u64,
                    max: MAX_COLUMNS as u64,
                });
            }
            if let Some(style) = col.style {
                column_styles.insert(col.col, style);
            }
        }

        let mut buf = match options.cancel {
            Some(token) => Buffer::with_cancel(options.buffer_size, token),
            None => Buffer::new(options.buffer_size),
        };

        buf.extend(XML_DECL);
        buf.extend(WORKSHEET_OPEN);
        write_cols_block(&options.columns, &mut buf, sink)?;
        if !buf.try_extend(SHEET_DATA_OPEN) {
            buf.flush(sink)?;
            buf.extend(SHEET_DATA_OPEN);
        }

        Ok(SheetCore {
            buf,
            rows: RowWriter::new(),
            column_styles,
            default_date_xf: options.date_style.map(|s| s.date_xf),
        })
    }

    pub(crate) fn write_row_with<W: Write>(
        &mut self,
        cells: &[Cell],
        options: &RowOptions,
        sink: &mut W,
    ) -> Result<()> {
        if self.rows.next_row() > MAX_ROWS {
            return Err(XlsxError::OutOfRange {
                what: "row index",
                value: self.rows.next_row() as u64,
                max: MAX_ROWS as u64,
            });
        }
        if cells.len() > MAX_COLUMNS as usize {
            return Err(XlsxError::OutOfRange {
                what: "column count",
                value: cells.len() as u64,
                max: MAX_COLUMNS as u64,
            });
        }
        for cell in cells {
            if cell.value.is_non_finite() {
                return Err(XlsxError::NotFinite);
            }
        }

        let ctx = StyleContext {
            row_style: options.style,
            column_styles: &self.column_styles,
            default_date_xf: self.default_date_xf,
        };
        if !self.rows.try_write_row(cells, &ctx, &mut self.buf) {
            self.rows.write_row_resume(cells, &ctx, &mut self.buf, sink)?;
        }
        Ok(())
    }

    /// Index the next row will carry (1-based)
    pub(crate) fn next_row(&self) -> u32 {
        self.rows.next_row()
    }

    pub(crate) fn rows_written(&self) -> u32 {
        self.rows.rows_written()
    }

    /// Write the worksheet epilog and flush everything to `sink`
    pub(crate) fn finish<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        if !self.buf.try_extend(FOOTER) {
            self.buf.flush(sink)?;
            self.buf.extend(FOOTER);
        }
        self.buf.flush(sink)
    }
}

/// Streaming writer for one worksheet XML part, owning its output sink
pub struct SheetWriter<W: Write> {
    core: SheetCore,
    sink: W,
}

impl<W: Write> SheetWriter<W> {
    /// Create a worksheet writer with default options (64 KiB buffer)
    pub fn new(sink: W) -> Result<Self> {
        Self::with_options(
            sink,
            SheetOptions {
                buffer_size: 64 * 1024,
                ..SheetOptions::default()
            },
        )
    }

    /// Create a worksheet writer and emit the XML prolog
    pub fn with_options(mut sink: W, options: SheetOptions) -> Result<Self> {
        let core = SheetCore::open(options, &mut sink)?;
        Ok(SheetWriter { core, sink })
    }

    /// Append the next row. Tries the cheap one-shot path first and only
    /// falls back to the flush-and-resume path when the buffer fills up.
    pub fn write_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.core
            .write_row_with(cells, &RowOptions::default(), &mut self.sink)
    }

    /// Append the next row with row-level options
    pub fn write_row_with(&mut self, cells: &[Cell], options: &RowOptions) -> Result<()> {
        self.core.write_row_with(cells, options, &mut self.sink)
    }

    /// Append a row at an explicit 1-based index. The index must be exactly
    /// the next one in sequence; anything else is rejected.
    pub fn write_row_at(&mut self, row: u32, cells: &[Cell]) -> Result<()> {
        if row != self.core.next_row() {
            return Err(XlsxError::RowOutOfSequence {
                expected: self.core.next_row(),
                got: row,
            });
        }
        self.write_row(cells)
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u32 {
        self.core.rows_written()
    }

    /// Write the worksheet epilog, flush everything, and return the sink
    pub fn finish(mut self) -> Result<W> {
        self.core.finish(&mut self.sink)?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Emit `<cols><col .../></cols>` for the registered column defaults
fn write_cols_block<W: Write>(
    columns: &[ColumnOptions],
    buf: &mut Buffer,
    sink: &mut W,
) -> Result<()> {
    let mut sorted: Vec<&ColumnOptions> = columns
        .iter()
        .filter(|c| c.width.is_some() || c.style.is_some())
        .collect();
    if sorted.is_empty() {
        return Ok(());
    }
    sorted.sort_by_key(|c| c.col);

    let mut entry = Vec::with_capacity(96);
    push_entry(buf, sink, b"<cols>")?;
    for col in sorted {
        entry.clear();
        let mut fmt = itoa::Buffer::new();
        entry.extend_from_slice(b"<col min=\"");
        entry.extend_from_slice(fmt.format(col.col).as_bytes());
        entry.extend_from_slice(b"\" max=\"");
        entry.extend_from_slice(fmt.format(col.col).as_bytes());
        entry.extend_from_slice(b"\"");
        if let Some(width) = col.width {
            let mut num = [0u8; 24];
            let n = encode_f64(width, &mut num);
            entry.extend_from_slice(b" width=\"");
            entry.extend_from_slice(&num[..n]);
            entry.extend_from_slice(b"\" customWidth=\"1\"");
        }
        if let Some(style) = col.style {
            entry.extend_from_slice(b" style=\"");
            entry.extend_from_slice(fmt.format(style.xf).as_bytes());
            entry.extend_from_slice(b"\"");
        }
        entry.extend_from_slice(b"/>");
        push_entry(buf, sink, &entry)?;
    }
    push_entry(buf, sink, b"</cols>")?;
    Ok(())
}

fn push_entry<W: Write>(buf: &mut Buffer, sink: &mut W, bytes: &[u8]) -> Result<()> {
    if !buf.try_extend(bytes) {
        buf.flush(sink)?;
        buf.extend(bytes);
    }
    Ok(())
}
