//! Cell data model and the per-kind cell XML writers
//!
//! Every writer follows the same protocol: a `try_*` call either writes the
//! complete fragment and returns true, or proves it cannot fit in the
//! remaining buffer and returns false *without partial mutation*. Required
//! bytes are computed from a worst-case value length first, falling back to
//! the exact escaped length for strings. Values larger than the whole buffer
//! go through the start-element / piecewise-value / end-element path instead.

use crate::buffer::Buffer;
use crate::encode::{
    datetime_to_serial, encode_bool, encode_f32, encode_f64, encode_i32, escape_into,
    escape_piecewise, escape_to_string, escaped_len, escaped_len_bound, MAX_BOOL_LEN, MAX_F32_LEN,
    MAX_F64_LEN, MAX_I32_LEN,
};
use chrono::{NaiveDate, NaiveDateTime};

/// Opaque style identifier handed out by the style registry.
///
/// Carries a second, implicit xf index (`date_xf`) used when the cell value
/// is a date-time and the style has no explicit number format, so date
/// defaults apply automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleId {
    pub(crate) xf: u32,
    pub(crate) date_xf: u32,
}

impl StyleId {
    /// Wrap a raw cellXfs index without a date-formatted twin
    pub fn from_raw(xf: u32) -> Self {
        StyleId { xf, date_xf: xf }
    }

    /// The cellXfs index emitted for non-date cells
    pub fn index(&self) -> u32 {
        self.xf
    }
}

/// Represents a single typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell, emitted self-closing
    Empty,
    /// Inline string value
    String(String),
    /// 32-bit integer value
    Int(i32),
    /// 32-bit float value
    Float(f32),
    /// 64-bit float value
    Double(f64),
    /// Boolean value
    Bool(bool),
    /// Date-time value as an OLE Automation date serial number
    DateTime(f64),
}

impl CellValue {
    /// Date-time value from a chrono timestamp
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        CellValue::DateTime(datetime_to_serial(dt))
    }

    /// Date value (midnight) from a chrono date
    pub fn from_date(date: &NaiveDate) -> Self {
        CellValue::DateTime(crate::encode::date_to_serial(date))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True for NaN or infinite float values, which the format cannot store
    pub(crate) fn is_non_finite(&self) -> bool {
        match self {
            CellValue::Float(v) => !v.is_finite(),
            CellValue::Double(v) | CellValue::DateTime(v) => !v.is_finite(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v)
    }
}

impl From<f32> for CellValue {
    fn from(v: f32) -> Self {
        CellValue::Float(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Double(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::from_datetime(&dt)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(date: NaiveDate) -> Self {
        CellValue::from_date(&date)
    }
}

// Nullable primitives: a missing number/bool/date is an empty cell, while a
// missing string is an empty inline string cell.
macro_rules! impl_from_option_empty {
    ($($t:ty),*) => {$(
        impl From<Option<$t>> for CellValue {
            fn from(v: Option<$t>) -> Self {
                v.map_or(CellValue::Empty, Into::into)
            }
        }
    )*};
}

impl_from_option_empty!(i32, f32, f64, bool, NaiveDateTime, NaiveDate);

impl From<Option<&str>> for CellValue {
    fn from(v: Option<&str>) -> Self {
        CellValue::String(v.unwrap_or_default().to_string())
    }
}

impl From<Option<String>> for CellValue {
    fn from(v: Option<String>) -> Self {
        CellValue::String(v.unwrap_or_default())
    }
}

/// Formula text, XML-escaped once at construction so all later length
/// arithmetic is exact
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    escaped: String,
}

impl Formula {
    /// Create a formula from Excel formula text (without the leading `=`)
    pub fn new(text: &str) -> Self {
        Formula {
            escaped: escape_to_string(text.strip_prefix('=').unwrap_or(text)),
        }
    }

    pub(crate) fn escaped(&self) -> &str {
        &self.escaped
    }
}

/// A cell: typed value, optional style, optional formula with this value as
/// its cached result. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: Option<StyleId>,
    pub formula: Option<Formula>,
}

impl Cell {
    /// Data-only cell
    pub fn new(value: impl Into<CellValue>) -> Self {
        Cell {
            value: value.into(),
            style: None,
            formula: None,
        }
    }

    /// Styled cell
    pub fn styled(value: impl Into<CellValue>, style: StyleId) -> Self {
        Cell {
            value: value.into(),
            style: Some(style),
            formula: None,
        }
    }

    /// Formula cell with a cached result value
    pub fn formula(formula: Formula, cached: impl Into<CellValue>) -> Self {
        Cell {
            value: cached.into(),
            style: None,
            formula: Some(formula),
        }
    }

    /// Styled formula cell with a cached result value
    pub fn formula_styled(formula: Formula, cached: impl Into<CellValue>, style: StyleId) -> Self {
        Cell {
            value: cached.into(),
            style: Some(style),
            formula: Some(formula),
        }
    }
}

impl<T: Into<CellValue>> From<T> for Cell {
    fn from(value: T) -> Self {
        Cell::new(value)
    }
}

// Fixed XML scaffolding lengths (bit-exact grammar per cell kind)
const CELL_OPEN: &[u8] = b"<c"; // + optional ` s="N"`
const NUM_MID: &[u8] = b"><v>";
const BOOL_MID: &[u8] = b" t=\"b\"><v>";
const STR_MID: &[u8] = b" t=\"inlineStr\"><is><t>";
const VALUE_END: &[u8] = b"</v></c>";
const STR_END: &[u8] = b"</t></is></c>";
const EMPTY_END: &[u8] = b"/>";
const NUM_FORMULA_MID: &[u8] = b"><f>";
const BOOL_FORMULA_MID: &[u8] = b" t=\"b\"><f>";
const STR_FORMULA_MID: &[u8] = b" t=\"str\"><f>";
const FORMULA_VALUE_MID: &[u8] = b"</f><v>";
const FORMULA_EMPTY_END: &[u8] = b"</f></c>";

/// ` s="` + id + `"`
#[inline]
fn style_attr_len(style_txt: Option<&str>) -> usize {
    style_txt.map_or(0, |s| s.len() + 5)
}

#[inline]
fn push_style(buf: &mut Buffer, style_txt: Option<&str>) {
    if let Some(id) = style_txt {
        buf.extend(b" s=\"");
        buf.extend(id.as_bytes());
        buf.extend(b"\"");
    }
}

/// One-shot `<c ...><v>N</v></c>` for a bounded-length value
fn try_write_bounded(
    style_txt: Option<&str>,
    mid: &[u8],
    value_max: usize,
    encode: impl FnOnce(&mut [u8]) -> usize,
    buf: &mut Buffer,
) -> bool {
    let required = CELL_OPEN.len() + style_attr_len(style_txt) + mid.len() + value_max
        + VALUE_END.len();
    if required > buf.remaining() {
        return false;
    }
    buf.extend(CELL_OPEN);
    push_style(buf, style_txt);
    buf.extend(mid);
    let n = encode(buf.writable());
    buf.advance(n);
    buf.extend(VALUE_END);
    true
}

/// Attempt to write the complete cell element in one shot.
///
/// Returns false without touching the buffer when the element cannot be
/// proven to fit; the caller must flush (and possibly fall back to the
/// piecewise path) and retry.
pub(crate) fn try_write_cell(value: &CellValue, style: Option<u32>, buf: &mut Buffer) -> bool {
    let mut style_fmt = itoa::Buffer::new();
    let style_txt = match style {
        Some(id) => Some(&*style_fmt.format(id)),
        None => None,
    };

    match value {
        CellValue::Empty => {
            let required = CELL_OPEN.len() + style_attr_len(style_txt) + EMPTY_END.len();
            if required > buf.remaining() {
                return false;
            }
            buf.extend(CELL_OPEN);
            push_style(buf, style_txt);
            buf.extend(EMPTY_END);
            true
        }
        CellValue::Int(v) => {
            try_write_bounded(style_txt, NUM_MID, MAX_I32_LEN, |d| encode_i32(*v, d), buf)
        }
        CellValue::Float(v) => {
            try_write_bounded(style_txt, NUM_MID, MAX_F32_LEN, |d| encode_f32(*v, d), buf)
        }
        CellValue::Double(v) | CellValue::DateTime(v) => {
            try_write_bounded(style_txt, NUM_MID, MAX_F64_LEN, |d| encode_f64(*v, d), buf)
        }
        CellValue::Bool(v) => {
            try_write_bounded(style_txt, BOOL_MID, MAX_BOOL_LEN, |d| encode_bool(*v, d), buf)
        }
        CellValue::String(s) => {
            let scaffold =
                CELL_OPEN.len() + style_attr_len(style_txt) + STR_MID.len() + STR_END.len();
            let remaining = buf.remaining();
            // Optimistic worst-case estimate first, exact length only when
            // the estimate does not fit
            let fits = scaffold.saturating_add(escaped_len_bound(s)) <= remaining
                || scaffold.saturating_add(escaped_len(s)) <= remaining;
            if !fits {
                return false;
            }
            buf.extend(CELL_OPEN);
            push_style(buf, style_txt);
            buf.extend(STR_MID);
            let n = escape_into(s, buf.writable());
            buf.advance(n);
            buf.extend(STR_END);
            true
        }
    }
}

/// Attempt to write a complete formula cell in one shot:
/// `<c ...><f>text</f><v>cached</v></c>` with the type attribute dictated by
/// the cached value (`t="str"` for strings, `t="b"` for booleans).
pub(crate) fn try_write_formula_cell(
    formula: &Formula,
    cached: &CellValue,
    style: Option<u32>,
    buf: &mut Buffer,
) -> bool {
    let mut style_fmt = itoa::Buffer::new();
    let style_txt = match style {
        Some(id) => Some(&*style_fmt.format(id)),
        None => None,
    };
    let ftext = formula.escaped().as_bytes();
    let scaffold = CELL_OPEN.len()
        + style_attr_len(style_txt)
        + formula_mid(cached).len()
        + ftext.len()
        + FORMULA_VALUE_MID.len()
        + VALUE_END.len();
    let remaining = buf.remaining();

    let (value_fits, value_max) = match cached {
        CellValue::Empty => (true, 0),
        CellValue::Int(_) => (true, MAX_I32_LEN),
        CellValue::Float(_) => (true, MAX_F32_LEN),
        CellValue::Double(_) | CellValue::DateTime(_) => (true, MAX_F64_LEN),
        CellValue::Bool(_) => (true, MAX_BOOL_LEN),
        CellValue::String(s) => {
            let fits = scaffold.saturating_add(escaped_len_bound(s)) <= remaining
                || scaffold.saturating_add(escaped_len(s)) <= remaining;
            (fits, 0)
        }
    };
    if !value_fits || scaffold.saturating_add(value_max) > remaining {
        return false;
    }

    buf.extend(CELL_OPEN);
    push_style(buf, style_txt);
    buf.extend(formula_mid(cached));
    buf.extend(ftext);
    write_formula_cached_value(cached, buf);
    true
}

/// `<f>`-opening fragment for a formula cell, typed by its cached value
fn formula_mid(cached: &CellValue) -> &'static [u8] {
    match cached {
        CellValue::Bool(_) => BOOL_FORMULA_MID,
        CellValue::String(_) => STR_FORMULA_MID,
        _ => NUM_FORMULA_MID,
    }
}

/// `</f><v>cached</v></c>` (or `</f></c>` when there is no cached value);
/// capacity must already be proven
fn write_formula_cached_value(cached: &CellValue, buf: &mut Buffer) {
    match cached {
        CellValue::Empty => {
            buf.extend(FORMULA_EMPTY_END);
            return;
        }
        _ => buf.extend(FORMULA_VALUE_MID),
    }
    let n = match cached {
        CellValue::Int(v) => encode_i32(*v, buf.writable()),
        CellValue::Float(v) => encode_f32(*v, buf.writable()),
        CellValue::Double(v) | CellValue::DateTime(v) => encode_f64(*v, buf.writable()),
        CellValue::Bool(v) => encode_bool(*v, buf.writable()),
        CellValue::String(s) => escape_into(s, buf.writable()),
        CellValue::Empty => unreachable!(),
    };
    buf.advance(n);
    buf.extend(VALUE_END);
}

/// Write only the opening of a cell element, used when the full cell has
/// been proven NOT to fit and the value must be streamed piecewise. The
/// buffer must have just been flushed; the fragment is bounded well under
/// the minimum buffer size.
pub(crate) fn write_start_element(value: &CellValue, style: Option<u32>, buf: &mut Buffer) {
    let mut style_fmt = itoa::Buffer::new();
    let style_txt = match style {
        Some(id) => Some(&*style_fmt.format(id)),
        None => None,
    };
    buf.extend(CELL_OPEN);
    push_style(buf, style_txt);
    buf.extend(match value {
        CellValue::String(_) => STR_MID,
        CellValue::Bool(_) => BOOL_MID,
        _ => NUM_MID,
    });
}

/// Opening of a formula cell element up to and including `<f>`
pub(crate) fn write_formula_start_element(
    cached: &CellValue,
    style: Option<u32>,
    buf: &mut Buffer,
) {
    let mut style_fmt = itoa::Buffer::new();
    let style_txt = match style {
        Some(id) => Some(&*style_fmt.format(id)),
        None => None,
    };
    buf.extend(CELL_OPEN);
    push_style(buf, style_txt);
    buf.extend(formula_mid(cached));
}

/// `</f><v>` between a streamed formula and its cached value (`</f></c>`
/// directly when there is no cached value)
pub(crate) fn try_write_formula_value_mid(cached: &CellValue, buf: &mut Buffer) -> bool {
    match cached {
        CellValue::Empty => buf.try_extend(FORMULA_EMPTY_END),
        _ => buf.try_extend(FORMULA_VALUE_MID),
    }
}

/// Closing tag after a streamed formula cached value
pub(crate) fn try_write_formula_end(cached: &CellValue, buf: &mut Buffer) -> bool {
    match cached {
        CellValue::Empty => true,
        _ => buf.try_extend(VALUE_END),
    }
}

/// Write as much of the value as fits, advancing `cursor`; returns true once
/// the entire value has been written. Only strings are ever unbounded; the
/// bounded kinds complete in a single call against a freshly flushed buffer.
pub(crate) fn write_value_piecewise(
    value: &CellValue,
    cursor: &mut usize,
    buf: &mut Buffer,
) -> bool {
    match value {
        CellValue::String(s) => escape_piecewise(s, cursor, buf),
        CellValue::Empty => true,
        CellValue::Int(v) => write_bounded_once(MAX_I32_LEN, |d| encode_i32(*v, d), cursor, buf),
        CellValue::Float(v) => write_bounded_once(MAX_F32_LEN, |d| encode_f32(*v, d), cursor, buf),
        CellValue::Double(v) | CellValue::DateTime(v) => {
            write_bounded_once(MAX_F64_LEN, |d| encode_f64(*v, d), cursor, buf)
        }
        CellValue::Bool(v) => write_bounded_once(MAX_BOOL_LEN, |d| encode_bool(*v, d), cursor, buf),
    }
}

fn write_bounded_once(
    max: usize,
    encode: impl FnOnce(&mut [u8]) -> usize,
    cursor: &mut usize,
    buf: &mut Buffer,
) -> bool {
    if *cursor > 0 {
        return true;
    }
    if max > buf.remaining() {
        return false;
    }
    let n = encode(buf.writable());
    buf.advance(n);
    *cursor = n.max(1);
    true
}

/// Write raw pre-escaped bytes (formula text) piecewise; byte splits are
/// safe because concatenation reproduces the input exactly
pub(crate) fn write_raw_piecewise(bytes: &[u8], cursor: &mut usize, buf: &mut Buffer) -> bool {
    let n = (bytes.len() - *cursor).min(buf.remaining());
    buf.extend(&bytes[*cursor..*cursor + n]);
    *cursor += n;
    *cursor == bytes.len()
}

/// Closing tag for a piecewise-written cell. Must succeed whenever called
/// directly after a flush, which the minimum buffer size guarantees.
pub(crate) fn try_write_end_element(value: &CellValue, buf: &mut Buffer) -> bool {
    let end: &[u8] = match value {
        CellValue::String(_) => STR_END,
        _ => VALUE_END,
    };
    buf.try_extend(end)
}
