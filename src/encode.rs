//! Primitive value encoders
//!
//! Pure functions that turn typed values into their canonical UTF-8 XML text
//! form, plus the worst-case and exact length arithmetic the cell writers use
//! to prove a fragment fits before committing bytes. All output is
//! locale-invariant: period decimal separator, no grouping.

use crate::buffer::Buffer;
use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Worst-case UTF-8 length of an encoded `i32` ("-2147483648")
pub(crate) const MAX_I32_LEN: usize = 11;
/// Worst-case UTF-8 length of an encoded `u32` ("4294967295")
pub(crate) const MAX_U32_LEN: usize = 10;
/// Worst-case length of a shortest-round-trip `f32` (ryu bound)
pub(crate) const MAX_F32_LEN: usize = 16;
/// Worst-case length of a shortest-round-trip `f64` (ryu bound)
pub(crate) const MAX_F64_LEN: usize = 24;
/// Booleans encode as "0" or "1"
pub(crate) const MAX_BOOL_LEN: usize = 1;
/// Longest escape sequence emitted for a single character ("&quot;")
pub(crate) const MAX_ESCAPE_LEN: usize = 6;

/// Largest integer magnitude exactly representable in an f64
const F64_INT_LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
/// Largest integer magnitude exactly representable in an f32
const F32_INT_LIMIT: f32 = 16_777_216.0; // 2^24

#[inline]
pub(crate) fn encode_i32(v: i32, dst: &mut [u8]) -> usize {
    let mut fmt = itoa::Buffer::new();
    let s = fmt.format(v);
    dst[..s.len()].copy_from_slice(s.as_bytes());
    s.len()
}

#[inline]
pub(crate) fn encode_u32(v: u32, dst: &mut [u8]) -> usize {
    let mut fmt = itoa::Buffer::new();
    let s = fmt.format(v);
    dst[..s.len()].copy_from_slice(s.as_bytes());
    s.len()
}

/// Encode an `f32` in its shortest round-trip form. Integer-valued floats
/// inside the exactly-representable range print without a trailing ".0".
#[inline]
pub(crate) fn encode_f32(v: f32, dst: &mut [u8]) -> usize {
    if v.fract() == 0.0 && v.abs() < F32_INT_LIMIT {
        let mut fmt = itoa::Buffer::new();
        let s = fmt.format(v as i32);
        dst[..s.len()].copy_from_slice(s.as_bytes());
        s.len()
    } else {
        let mut fmt = ryu::Buffer::new();
        let s = fmt.format(v);
        dst[..s.len()].copy_from_slice(s.as_bytes());
        s.len()
    }
}

/// Encode an `f64` in its shortest round-trip form. Integer-valued doubles
/// inside the exactly-representable range print without a trailing ".0",
/// which is what makes whole-day date serials come out as plain integers.
#[inline]
pub(crate) fn encode_f64(v: f64, dst: &mut [u8]) -> usize {
    if v.fract() == 0.0 && v.abs() < F64_INT_LIMIT {
        let mut fmt = itoa::Buffer::new();
        let s = fmt.format(v as i64);
        dst[..s.len()].copy_from_slice(s.as_bytes());
        s.len()
    } else {
        let mut fmt = ryu::Buffer::new();
        let s = fmt.format(v);
        dst[..s.len()].copy_from_slice(s.as_bytes());
        s.len()
    }
}

#[inline]
pub(crate) fn encode_bool(v: bool, dst: &mut [u8]) -> usize {
    dst[0] = if v { b'1' } else { b'0' };
    1
}

/// OLE Automation date serial: days since 1899-12-30, fractional part is
/// time of day, sub-second precision carried through nanoseconds.
pub fn datetime_to_serial(dt: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    let days = (dt.date() - epoch).num_days() as f64;
    let secs =
        dt.time().num_seconds_from_midnight() as f64 + dt.time().nanosecond() as f64 * 1e-9;
    days + secs / 86_400.0
}

/// OLE Automation date serial for a plain date (midnight)
pub fn date_to_serial(date: &NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
    (*date - epoch).num_days() as f64
}

/// Encode one input byte of text content into `tmp`, returning the length.
/// Multi-byte UTF-8 continuation bytes are never escaped, so byte-wise
/// processing is sound; the piecewise writer still keeps scalar boundaries.
#[inline]
fn encode_byte(byte: u8, tmp: &mut [u8; 8]) -> usize {
    let seq: &[u8] = match byte {
        b'&' => b"&amp;",
        b'<' => b"&lt;",
        b'>' => b"&gt;",
        b'"' => b"&quot;",
        b'\'' => b"&apos;",
        c if c < 0x20 && !matches!(c, b'\t' | b'\n' | b'\r') => {
            // &#N; with N in 0..32
            tmp[0] = b'&';
            tmp[1] = b'#';
            let n = encode_u32(c as u32, &mut tmp[2..]);
            tmp[2 + n] = b';';
            return 3 + n;
        }
        c => {
            tmp[0] = c;
            return 1;
        }
    };
    tmp[..seq.len()].copy_from_slice(seq);
    seq.len()
}

/// True if `s` contains any character that escaping would rewrite. The
/// memchr passes cover the five markup delimiters; the residual scan only
/// looks for C0 controls other than tab, CR and LF.
#[inline]
pub(crate) fn text_is_clean(s: &str) -> bool {
    let bytes = s.as_bytes();
    memchr::memchr3(b'&', b'<', b'>', bytes).is_none()
        && memchr::memchr2(b'"', b'\'', bytes).is_none()
        && !bytes
            .iter()
            .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Exact byte length of `s` after escaping
pub(crate) fn escaped_len(s: &str) -> usize {
    if text_is_clean(s) {
        return s.len();
    }
    let mut tmp = [0u8; 8];
    s.bytes().map(|b| encode_byte(b, &mut tmp)).sum()
}

/// Worst-case byte length of `s` after escaping (6 output bytes per input
/// byte); saturates instead of overflowing for pathological lengths
#[inline]
pub(crate) fn escaped_len_bound(s: &str) -> usize {
    s.len().saturating_mul(MAX_ESCAPE_LEN)
}

/// Escape the whole of `s` into `dst`; the caller must have proven capacity
/// for at least [`escaped_len`] bytes. Returns the bytes written.
pub(crate) fn escape_into(s: &str, dst: &mut [u8]) -> usize {
    if text_is_clean(s) {
        dst[..s.len()].copy_from_slice(s.as_bytes());
        return s.len();
    }
    let mut tmp = [0u8; 8];
    let mut written = 0;
    for byte in s.bytes() {
        let n = encode_byte(byte, &mut tmp);
        dst[written..written + n].copy_from_slice(&tmp[..n]);
        written += n;
    }
    written
}

/// Escape `s` into an owned string (used when formula text is escaped once
/// at construction time)
pub(crate) fn escape_to_string(s: &str) -> String {
    if text_is_clean(s) {
        return s.to_owned();
    }
    let mut tmp = [0u8; 8];
    let mut out = String::with_capacity(escaped_len(s));
    for ch in s.chars() {
        if ch.is_ascii() {
            let n = encode_byte(ch as u8, &mut tmp);
            // escape sequences are pure ASCII
            for &b in &tmp[..n] {
                out.push(b as char);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Escape as much of `s[*cursor..]` as fits in `buf`, advancing `cursor`
/// over the consumed input bytes. Escape sequences and multi-byte scalars
/// are written atomically, never split across a flush. Returns true once
/// the whole string has been consumed.
pub(crate) fn escape_piecewise(s: &str, cursor: &mut usize, buf: &mut Buffer) -> bool {
    let mut tmp = [0u8; 8];
    for (offset, ch) in s[*cursor..].char_indices() {
        let n = if ch.is_ascii() {
            encode_byte(ch as u8, &mut tmp)
        } else {
            ch.encode_utf8(&mut tmp).len()
        };
        if n > buf.remaining() {
            *cursor += offset;
            return false;
        }
        buf.extend(&tmp[..n]);
    }
    *cursor = s.len();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_string(f: impl FnOnce(&mut [u8]) -> usize) -> String {
        let mut dst = [0u8; 64];
        let n = f(&mut dst);
        String::from_utf8(dst[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_integer_encoding() {
        assert_eq!(encode_to_string(|d| encode_i32(0, d)), "0");
        assert_eq!(encode_to_string(|d| encode_i32(-42, d)), "-42");
        assert_eq!(
            encode_to_string(|d| encode_i32(i32::MIN, d)),
            "-2147483648"
        );
        assert_eq!(encode_to_string(|d| encode_i32(i32::MIN, d)).len(), MAX_I32_LEN);
        assert_eq!(
            encode_to_string(|d| encode_u32(u32::MAX, d)).len(),
            MAX_U32_LEN
        );
    }

    #[test]
    fn test_float_encoding() {
        assert_eq!(encode_to_string(|d| encode_f64(42.0, d)), "42");
        assert_eq!(encode_to_string(|d| encode_f64(-0.5, d)), "-0.5");
        assert_eq!(encode_to_string(|d| encode_f64(1234.56, d)), "1234.56");
        assert_eq!(encode_to_string(|d| encode_f32(2.5, d)), "2.5");
        assert_eq!(encode_to_string(|d| encode_f32(100.0, d)), "100");
        // Round-trip through shortest form
        let s = encode_to_string(|d| encode_f64(0.1, d));
        assert_eq!(s.parse::<f64>().unwrap(), 0.1);
    }

    #[test]
    fn test_bool_encoding() {
        assert_eq!(encode_to_string(|d| encode_bool(true, d)), "1");
        assert_eq!(encode_to_string(|d| encode_bool(false, d)), "0");
    }

    #[test]
    fn test_date_serial() {
        // 2000-01-01 is OLE serial 36526
        let dt = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(datetime_to_serial(&dt), 36526.0);
        assert_eq!(
            date_to_serial(&NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
            36526.0
        );

        // Noon is half a day
        let noon = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(datetime_to_serial(&noon), 36526.5);

        let serial = encode_to_string(|d| {
            let v = datetime_to_serial(&dt);
            encode_f64(v, d)
        });
        assert_eq!(serial, "36526");
    }

    #[test]
    fn test_escaping() {
        let mut dst = [0u8; 256];

        let n = escape_into("A&B", &mut dst);
        assert_eq!(&dst[..n], b"A&amp;B");
        assert_eq!(escaped_len("A&B"), 7);

        let n = escape_into("<a href=\"x\">'</a>", &mut dst);
        assert_eq!(
            &dst[..n],
            b"&lt;a href=&quot;x&quot;&gt;&apos;&lt;/a&gt;".as_slice()
        );

        // Tab, CR, LF pass through; other controls become character refs
        let n = escape_into("a\tb\nc\rd\u{1}e", &mut dst);
        assert_eq!(&dst[..n], b"a\tb\nc\rd&#1;e");

        // Clean strings are returned verbatim, multi-byte included
        assert!(text_is_clean("héllo wörld"));
        assert_eq!(escaped_len("héllo"), "héllo".len());
    }

    #[test]
    fn test_clean_classification_matches_escape_set() {
        // Every byte the escaper rewrites must defeat the fast path
        for dirty in ["&", "<", ">", "\"", "'", "\u{1}", "\u{1f}", "a\u{b}z"] {
            assert!(!text_is_clean(dirty), "{dirty:?}");
        }
        // Tab, CR, LF pass through raw and stay on the fast path
        for clean in ["", "plain", "a\tb", "a\nb", "a\rb", "日本語"] {
            assert!(text_is_clean(clean), "{clean:?}");
        }
    }

    #[test]
    fn test_escape_piecewise_matches_one_shot() {
        // Long enough to force several flush cycles through a 512-byte buffer
        let s = "a<b&c\"d'e>f\u{2}gé€😀".repeat(200);
        let s = s.as_str();
        let mut expected = vec![0u8; escaped_len(s)];
        let n = escape_into(s, &mut expected);
        expected.truncate(n);

        // Drain through a minimum-size buffer and reassemble
        let mut buf = Buffer::new(0);
        let mut out = Vec::new();
        let mut cursor = 0;
        while !escape_piecewise(s, &mut cursor, &mut buf) {
            buf.flush(&mut out).unwrap();
        }
        buf.flush(&mut out).unwrap();
        assert_eq!(out, expected);
        assert_eq!(cursor, s.len());
    }
}
