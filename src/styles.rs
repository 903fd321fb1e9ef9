//! Cell style registry and `xl/styles.xml` emission
//!
//! Styles are interned up front: each distinct combination of font flags and
//! number format yields one `cellXfs` entry, and the returned [`StyleId`]
//! indexes that entry. Every id also carries a date twin, an xf with the same
//! font but a date number format, so unformatted date-time cells still render
//! as dates when a style is applied through a row or column default.

use crate::cell::StyleId;
use crate::encode::escape_to_string;
use crate::error::Result;
use indexmap::IndexMap;
use std::io::Write;

/// Builtin number format id for `mm-dd-yy`
const DATE_NUM_FMT: u32 = 14;
/// Custom number format ids start here; lower ids are reserved builtins
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// A cell format: font emphasis plus an optional number format code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    /// Excel number format code, e.g. `"0.00%"` or `"yyyy-mm-dd"`
    pub number_format: Option<String>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn number_format(mut self, code: impl Into<String>) -> Self {
        self.number_format = Some(code.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FontKey {
    bold: bool,
    italic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct XfKey {
    num_fmt: u32,
    font: u32,
}

/// Interns fonts, number formats, and cell xfs in first-use order
pub struct StyleRegistry {
    fonts: IndexMap<FontKey, u32>,
    num_fmts: IndexMap<String, u32>,
    xfs: IndexMap<XfKey, u32>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleRegistry {
    /// Registry seeded with xf 0 (general) and xf 1 (builtin date format)
    pub fn new() -> Self {
        let mut fonts = IndexMap::new();
        fonts.insert(
            FontKey {
                bold: false,
                italic: false,
            },
            0,
        );
        let mut xfs = IndexMap::new();
        xfs.insert(XfKey { num_fmt: 0, font: 0 }, 0);
        xfs.insert(
            XfKey {
                num_fmt: DATE_NUM_FMT,
                font: 0,
            },
            1,
        );
        StyleRegistry {
            fonts,
            num_fmts: IndexMap::new(),
            xfs,
        }
    }

    /// Style applied to unformatted date-time cells
    pub fn default_date_style(&self) -> StyleId {
        StyleId { xf: 1, date_xf: 1 }
    }

    /// Number of cell xfs issued so far
    pub fn xf_count(&self) -> u32 {
        self.xfs.len() as u32
    }

    /// Intern `style` and return its id.
    ///
    /// Registering the same style twice returns the same id.
    pub fn register(&mut self, style: &Style) -> StyleId {
        let font = self.intern_font(FontKey {
            bold: style.bold,
            italic: style.italic,
        });
        let num_fmt = match &style.number_format {
            Some(code) => self.intern_num_fmt(code),
            None => 0,
        };
        let xf = self.intern_xf(XfKey { num_fmt, font });
        // A style with an explicit number format keeps it for dates too;
        // otherwise the date twin swaps in the builtin date format.
        let date_xf = if style.number_format.is_some() {
            xf
        } else {
            self.intern_xf(XfKey {
                num_fmt: DATE_NUM_FMT,
                font,
            })
        };
        StyleId { xf, date_xf }
    }

    fn intern_font(&mut self, key: FontKey) -> u32 {
        let next = self.fonts.len() as u32;
        *self.fonts.entry(key).or_insert(next)
    }

    fn intern_num_fmt(&mut self, code: &str) -> u32 {
        if let Some(id) = self.num_fmts.get(code) {
            return *id;
        }
        let id = FIRST_CUSTOM_NUM_FMT + self.num_fmts.len() as u32;
        self.num_fmts.insert(code.to_string(), id);
        id
    }

    fn intern_xf(&mut self, key: XfKey) -> u32 {
        let next = self.xfs.len() as u32;
        *self.xfs.entry(key).or_insert(next)
    }

    /// Write the complete `xl/styles.xml` part
    pub fn write_xml<W: Write>(&self, sink: &mut W) -> Result<()> {
        let mut xml = String::with_capacity(1024);
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        xml.push_str(
            "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        );

        if !self.num_fmts.is_empty() {
            xml.push_str(&format!("<numFmts count=\"{}\">", self.num_fmts.len()));
            for (code, id) in &self.num_fmts {
                xml.push_str(&format!(
                    "<numFmt numFmtId=\"{}\" formatCode=\"{}\"/>",
                    id,
                    escape_to_string(code)
                ));
            }
            xml.push_str("</numFmts>");
        }

        xml.push_str(&format!("<fonts count=\"{}\">", self.fonts.len()));
        for key in self.fonts.keys() {
            xml.push_str("<font>");
            if key.bold {
                xml.push_str("<b/>");
            }
            if key.italic {
                xml.push_str("<i/>");
            }
            xml.push_str("<sz val=\"11\"/><name val=\"Calibri\"/></font>");
        }
        xml.push_str("</fonts>");

        xml.push_str(
            "<fills count=\"2\">\
             <fill><patternFill patternType=\"none\"/></fill>\
             <fill><patternFill patternType=\"gray125\"/></fill>\
             </fills>",
        );
        xml.push_str(
            "<borders count=\"1\">\
             <border><left/><right/><top/><bottom/><diagonal/></border>\
             </borders>",
        );
        xml.push_str(
            "<cellStyleXfs count=\"1\">\
             <xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/>\
             </cellStyleXfs>",
        );

        xml.push_str(&format!("<cellXfs count=\"{}\">", self.xfs.len()));
        for key in self.xfs.keys() {
            xml.push_str(&format!(
                "<xf numFmtId=\"{}\" fontId=\"{}\" fillId=\"0\" borderId=\"0\" xfId=\"0\"",
                key.num_fmt, key.font
            ));
            if key.num_fmt != 0 {
                xml.push_str(" applyNumberFormat=\"1\"");
            }
            if key.font != 0 {
                xml.push_str(" applyFont=\"1\"");
            }
            xml.push_str("/>");
        }
        xml.push_str("</cellXfs></styleSheet>");

        sink.write_all(xml.as_bytes())?;
        Ok(())
    }
}
