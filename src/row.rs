//! Row writer: iterates the cells of one row, delegating to the cell
//! writers, and carries the resumption cursor that lets a row survive any
//! number of buffer flushes mid-row
//!
//! The cheap path is [`RowWriter::try_write_row`], which writes the whole
//! row in one shot or reports the first cell that did not fit. The caller
//! then drives [`RowWriter::write_row_resume`], which flushes and continues
//! from the cursor, switching to the piece-by-piece cell path when a single
//! cell is larger than the entire buffer.

use crate::buffer::Buffer;
use crate::cell::{
    try_write_cell, try_write_end_element, try_write_formula_cell, try_write_formula_end,
    try_write_formula_value_mid, write_formula_start_element, write_raw_piecewise,
    write_start_element, write_value_piecewise, Cell, CellValue, StyleId,
};
use crate::error::Result;
use std::collections::HashMap;
use std::io::Write;

/// Worst-case row start tag: `<row r="1048576">`
pub(crate) const MAX_ROW_START_LEN: usize = 17;
const ROW_START_OPEN: &[u8] = b"<row r=\"";
const ROW_START_CLOSE: &[u8] = b"\">";
const ROW_END: &[u8] = b"</row>";

/// Per-row options passed alongside the cells
#[derive(Debug, Clone, Default)]
pub struct RowOptions {
    /// Default style applied to cells of this row that carry none of their
    /// own
    pub style: Option<StyleId>,
}

/// Style lookup context for one row: explicit cell style, then the row
/// default, then the per-column default, then (date-time only) the sheet's
/// default date style
pub(crate) struct StyleContext<'a> {
    pub row_style: Option<StyleId>,
    pub column_styles: &'a HashMap<u16, StyleId>,
    pub default_date_xf: Option<u32>,
}

impl StyleContext<'_> {
    pub(crate) fn resolve(&self, cell: &Cell, col: usize) -> Option<u32> {
        let style = cell
            .style
            .or(self.row_style)
            .or_else(|| self.column_styles.get(&(col as u16 + 1)).copied());
        let is_date = matches!(cell.value, CellValue::DateTime(_));
        match style {
            Some(s) if is_date => Some(s.date_xf),
            Some(s) => Some(s.xf),
            None if is_date => self.default_date_xf,
            None => None,
        }
    }
}

#[inline]
fn try_write_cell_dispatch(cell: &Cell, style: Option<u32>, buf: &mut Buffer) -> bool {
    match &cell.formula {
        Some(f) => try_write_formula_cell(f, &cell.value, style, buf),
        None => try_write_cell(&cell.value, style, buf),
    }
}

/// Retry a bounded fragment once after a flush; the minimum buffer size
/// guarantees the retry succeeds
fn write_or_flush<W: Write>(
    buf: &mut Buffer,
    sink: &mut W,
    write: impl Fn(&mut Buffer) -> bool,
) -> Result<()> {
    if !write(buf) {
        buf.flush(sink)?;
        let ok = write(buf);
        debug_assert!(ok, "atomic fragment must fit in an empty buffer");
    }
    Ok(())
}

/// State machine for writing `<row>` elements with strictly increasing
/// indices. `col` is the resumption cursor: -1 before the row start tag is
/// written, otherwise the number of completed cells.
pub(crate) struct RowWriter {
    next_row: u32,
    col: i32,
}

impl RowWriter {
    pub(crate) fn new() -> Self {
        RowWriter {
            next_row: 1,
            col: -1,
        }
    }

    /// Index the next row will carry (1-based)
    pub(crate) fn next_row(&self) -> u32 {
        self.next_row
    }

    /// Rows completed so far
    pub(crate) fn rows_written(&self) -> u32 {
        self.next_row - 1
    }

    /// One-shot synchronous attempt. Returns false as soon as any fragment
    /// cannot be proven to fit, leaving the cursor at the first incomplete
    /// cell; the caller must then drive [`RowWriter::write_row_resume`].
    pub(crate) fn try_write_row(
        &mut self,
        cells: &[Cell],
        ctx: &StyleContext<'_>,
        buf: &mut Buffer,
    ) -> bool {
        debug_assert_eq!(self.col, -1, "previous row not completed");
        if !self.try_write_row_start(buf) {
            return false;
        }
        for (i, cell) in cells.iter().enumerate() {
            if !try_write_cell_dispatch(cell, ctx.resolve(cell, i), buf) {
                self.col = i as i32;
                return false;
            }
        }
        // Close the row only if a worst-case next row start also still
        // fits; otherwise report failure so the caller flushes once instead
        // of twice
        if ROW_END.len() + MAX_ROW_START_LEN > buf.remaining() {
            self.col = cells.len() as i32;
            return false;
        }
        buf.extend(ROW_END);
        self.complete_row();
        true
    }

    /// Resume after a failed one-shot attempt: flush, continue from the
    /// cursor, stream oversized cells piecewise, close the row.
    pub(crate) fn write_row_resume<W: Write>(
        &mut self,
        cells: &[Cell],
        ctx: &StyleContext<'_>,
        buf: &mut Buffer,
        sink: &mut W,
    ) -> Result<()> {
        // The failed attempt already proved the next fragment does not fit
        buf.flush(sink)?;
        if self.col < 0 {
            let ok = self.try_write_row_start(buf);
            debug_assert!(ok);
        }

        let mut col = self.col as usize;
        while col < cells.len() {
            let cell = &cells[col];
            let style = ctx.resolve(cell, col);
            if try_write_cell_dispatch(cell, style, buf) {
                col += 1;
                continue;
            }
            if !buf.is_empty() {
                buf.flush(sink)?;
                if try_write_cell_dispatch(cell, style, buf) {
                    col += 1;
                    continue;
                }
            }
            // The cell is larger than the whole buffer
            self.write_cell_piecewise(cell, style, buf, sink)?;
            col += 1;
        }
        self.col = col as i32;

        write_or_flush(buf, sink, |b| b.try_extend(ROW_END))?;
        self.complete_row();
        Ok(())
    }

    fn complete_row(&mut self) {
        self.next_row += 1;
        self.col = -1;
    }

    fn try_write_row_start(&mut self, buf: &mut Buffer) -> bool {
        let mut fmt = itoa::Buffer::new();
        let digits = fmt.format(self.next_row);
        let required = ROW_START_OPEN.len() + digits.len() + ROW_START_CLOSE.len();
        if required > buf.remaining() {
            return false;
        }
        buf.extend(ROW_START_OPEN);
        buf.extend(digits.as_bytes());
        buf.extend(ROW_START_CLOSE);
        self.col = 0;
        true
    }

    /// Stream one cell whose encoded form exceeds the buffer capacity:
    /// start element, value fragments with interleaved flushes, end element
    fn write_cell_piecewise<W: Write>(
        &self,
        cell: &Cell,
        style: Option<u32>,
        buf: &mut Buffer,
        sink: &mut W,
    ) -> Result<()> {
        buf.flush(sink)?;
        match &cell.formula {
            Some(formula) => {
                write_formula_start_element(&cell.value, style, buf);
                let mut cursor = 0;
                while !write_raw_piecewise(formula.escaped().as_bytes(), &mut cursor, buf) {
                    buf.flush(sink)?;
                }
                write_or_flush(buf, sink, |b| try_write_formula_value_mid(&cell.value, b))?;
                let mut cursor = 0;
                while !write_value_piecewise(&cell.value, &mut cursor, buf) {
                    buf.flush(sink)?;
                }
                write_or_flush(buf, sink, |b| try_write_formula_end(&cell.value, b))?;
            }
            None => {
                write_start_element(&cell.value, style, buf);
                let mut cursor = 0;
                while !write_value_piecewise(&cell.value, &mut cursor, buf) {
                    buf.flush(sink)?;
                }
                write_or_flush(buf, sink, |b| try_write_end_element(&cell.value, b))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Formula;

    fn ctx<'a>(columns: &'a HashMap<u16, StyleId>) -> StyleContext<'a> {
        StyleContext {
            row_style: None,
            column_styles: columns,
            default_date_xf: None,
        }
    }

    /// Write one row through the sync-then-resume protocol into `sink`
    fn write_row(cells: &[Cell], buf: &mut Buffer, writer: &mut RowWriter, sink: &mut Vec<u8>) {
        let columns = HashMap::new();
        let ctx = ctx(&columns);
        if !writer.try_write_row(cells, &ctx, buf) {
            writer.write_row_resume(cells, &ctx, buf, sink).unwrap();
        }
    }

    #[test]
    fn test_mixed_row_exact_bytes() {
        // Mixed-type row: int, escaped string, bool, null string
        let cells = vec![
            Cell::new(42),
            Cell::new("A&B"),
            Cell::new(true),
            Cell::new(None::<&str>),
        ];
        let mut buf = Buffer::new(4096);
        let mut writer = RowWriter::new();
        let mut sink = Vec::new();
        write_row(&cells, &mut buf, &mut writer, &mut sink);
        buf.flush(&mut sink).unwrap();

        assert_eq!(
            String::from_utf8(sink).unwrap(),
            "<row r=\"1\"><c><v>42</v></c>\
             <c t=\"inlineStr\"><is><t>A&amp;B</t></is></c>\
             <c t=\"b\"><v>1</v></c>\
             <c t=\"inlineStr\"><is><t></t></is></c></row>"
        );
        assert_eq!(writer.rows_written(), 1);
    }

    #[test]
    fn test_resumption_is_byte_identical_at_every_cursor() {
        // Reference output through an effectively unbounded buffer
        let cells: Vec<Cell> = (0..8)
            .map(|i| Cell::new(format!("cell-{i}-{}", "x".repeat(i * 40))))
            .collect();
        let mut reference = Vec::new();
        {
            let mut buf = Buffer::new(1 << 20);
            let mut writer = RowWriter::new();
            write_row(&cells, &mut buf, &mut writer, &mut reference);
            buf.flush(&mut reference).unwrap();
        }

        // Force the one-shot attempt to fail at every possible point by
        // pre-filling the buffer with padding before the row starts
        for padding in 0..MIN_PAD_RANGE {
            let mut buf = Buffer::new(512);
            let mut writer = RowWriter::new();
            let mut sink = Vec::new();
            buf.extend(&vec![b'#'; padding]);
            write_row(&cells, &mut buf, &mut writer, &mut sink);
            buf.flush(&mut sink).unwrap();

            // Strip the padding, which was flushed ahead of the row
            let out = &sink[padding..];
            assert_eq!(out, reference.as_slice(), "padding {padding}");
        }
    }

    const MIN_PAD_RANGE: usize = 500;

    #[test]
    fn test_oversized_formula_cell_streams() {
        let long_formula = format!("CONCAT(\"{}\")", "z".repeat(3000));
        let cells = vec![Cell::formula(Formula::new(&long_formula), "result")];
        let mut buf = Buffer::new(512);
        let mut writer = RowWriter::new();
        let mut sink = Vec::new();
        write_row(&cells, &mut buf, &mut writer, &mut sink);
        buf.flush(&mut sink).unwrap();

        let xml = String::from_utf8(sink).unwrap();
        let expected_formula = format!("CONCAT(&quot;{}&quot;)", "z".repeat(3000));
        assert_eq!(
            xml,
            format!(
                "<row r=\"1\"><c t=\"str\"><f>{expected_formula}</f><v>result</v></c></row>"
            )
        );
    }

    #[test]
    fn test_style_resolution_order() {
        let mut columns = HashMap::new();
        columns.insert(2u16, StyleId::from_raw(9));
        let ctx = StyleContext {
            row_style: Some(StyleId::from_raw(5)),
            column_styles: &columns,
            default_date_xf: Some(1),
        };

        // Explicit cell style wins
        let styled = Cell::styled(1, StyleId::from_raw(3));
        assert_eq!(ctx.resolve(&styled, 0), Some(3));
        // Row default beats column default
        assert_eq!(ctx.resolve(&Cell::new(1), 1), Some(5));

        let no_row = StyleContext {
            row_style: None,
            column_styles: &columns,
            default_date_xf: Some(1),
        };
        // Column default applies by 1-based column number
        assert_eq!(no_row.resolve(&Cell::new(1), 1), Some(9));
        assert_eq!(no_row.resolve(&Cell::new(1), 0), None);
        // Unstyled date-time falls back to the sheet date style
        assert_eq!(no_row.resolve(&Cell::new(CellValue::DateTime(1.0)), 0), Some(1));

        // A registered style resolves to its date twin for date-time cells
        let date_style = StyleId { xf: 4, date_xf: 7 };
        let cell = Cell::styled(CellValue::DateTime(2.0), date_style);
        assert_eq!(no_row.resolve(&cell, 0), Some(7));
        let cell = Cell::styled(CellValue::Int(2), date_style);
        assert_eq!(no_row.resolve(&cell, 0), Some(4));
    }

    #[test]
    fn test_row_indices_increment() {
        let mut buf = Buffer::new(4096);
        let mut writer = RowWriter::new();
        let mut sink = Vec::new();
        for _ in 0..3 {
            write_row(&[Cell::new(1)], &mut buf, &mut writer, &mut sink);
        }
        buf.flush(&mut sink).unwrap();
        let xml = String::from_utf8(sink).unwrap();
        assert!(xml.contains("<row r=\"1\">"));
        assert!(xml.contains("<row r=\"2\">"));
        assert!(xml.contains("<row r=\"3\">"));
        assert_eq!(writer.next_row(), 4);
    }
}
