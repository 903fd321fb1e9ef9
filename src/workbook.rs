//! XLSX package assembly over a ZIP container
//!
//! The workbook streams worksheet parts one at a time through a single
//! [`crate::worksheet::SheetCore`]; opening a new sheet closes the previous
//! one. Parts whose content depends on the final sheet list (workbook.xml,
//! its relationships, the content types, styles.xml) are written at close.

use crate::buffer::CancelToken;
use crate::cell::{Cell, StyleId};
use crate::error::{Result, XlsxError};
use crate::row::RowOptions;
use crate::styles::{Style, StyleRegistry};
use crate::worksheet::{SheetCore, SheetOptions};
use chrono::Utc;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

const SHEET_NAME_MAX_LEN: usize = 31;
const SHEET_NAME_FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Streaming workbook writer producing a complete `.xlsx` package
pub struct Workbook<W: Write + Seek> {
    zip: ZipWriter<W>,
    styles: StyleRegistry,
    sheets: Vec<String>,
    active: Option<SheetCore>,
    buffer_size: usize,
    cancel: Option<CancelToken>,
}

impl Workbook<BufWriter<File>> {
    /// Create a workbook writing to a file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::with_capacity(64 * 1024, file))
    }
}

impl<W: Write + Seek> Workbook<W> {
    /// Create a workbook over an arbitrary seekable sink
    pub fn new(sink: W) -> Result<Self> {
        let mut zip = ZipWriter::new(sink);
        let options = part_options();

        zip.start_file("_rels/.rels", options)?;
        write_root_rels(&mut zip)?;
        zip.start_file("docProps/core.xml", options)?;
        write_core_props(&mut zip)?;
        zip.start_file("docProps/app.xml", options)?;
        write_app_props(&mut zip)?;

        Ok(Workbook {
            zip,
            styles: StyleRegistry::new(),
            sheets: Vec::new(),
            active: None,
            buffer_size: 64 * 1024,
            cancel: None,
        })
    }

    /// Flush buffer size for sheets opened after this call
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    /// Cancellation token observed by every sheet flush
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Intern a style; the returned id is valid for any cell in this workbook
    pub fn register_style(&mut self, style: &Style) -> StyleId {
        self.styles.register(style)
    }

    /// Open a new worksheet with default options, closing the current one
    pub fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.add_sheet_with(name, SheetOptions::default())
    }

    /// Open a new worksheet, closing the current one.
    ///
    /// `options.buffer_size`, `options.cancel`, and `options.date_style`
    /// fall back to workbook-level defaults when unset.
    pub fn add_sheet_with(&mut self, name: &str, mut options: SheetOptions) -> Result<()> {
        self.validate_sheet_name(name)?;
        for col in &options.columns {
            if let Some(style) = col.style {
                self.validate_style(style)?;
            }
        }
        self.finish_active_sheet()?;

        if options.buffer_size == 0 {
            options.buffer_size = self.buffer_size;
        }
        if options.cancel.is_none() {
            options.cancel = self.cancel.clone();
        }
        if options.date_style.is_none() {
            options.date_style = Some(self.styles.default_date_style());
        }

        self.sheets.push(name.to_string());
        let path = format!("xl/worksheets/sheet{}.xml", self.sheets.len());
        self.zip.start_file(path, part_options())?;
        self.active = Some(SheetCore::open(options, &mut self.zip)?);
        Ok(())
    }

    /// Append the next row to the current worksheet
    pub fn write_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.write_row_with(cells, &RowOptions::default())
    }

    /// Append the next row with row-level options
    pub fn write_row_with(&mut self, cells: &[Cell], options: &RowOptions) -> Result<()> {
        if let Some(style) = options.style {
            self.validate_style(style)?;
        }
        for cell in cells {
            if let Some(style) = cell.style {
                self.validate_style(style)?;
            }
        }
        let sheet = self
            .active
            .as_mut()
            .ok_or(XlsxError::InvalidState("no active worksheet"))?;
        sheet.write_row_with(cells, options, &mut self.zip)
    }

    /// Rows written to the current worksheet
    pub fn rows_written(&self) -> u32 {
        self.active.as_ref().map_or(0, SheetCore::rows_written)
    }

    /// Close the package: finish the open sheet, write the trailing parts,
    /// and return the underlying sink.
    pub fn close(mut self) -> Result<W> {
        self.finish_active_sheet()?;
        let options = part_options();

        self.zip.start_file("[Content_Types].xml", options)?;
        write_content_types(&mut self.zip, self.sheets.len())?;

        self.zip.start_file("xl/workbook.xml", options)?;
        write_workbook_xml(&mut self.zip, &self.sheets)?;

        self.zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        write_workbook_rels(&mut self.zip, self.sheets.len())?;

        self.zip.start_file("xl/styles.xml", options)?;
        self.styles.write_xml(&mut self.zip)?;

        let mut sink = self.zip.finish()?;
        sink.flush()?;
        Ok(sink)
    }

    fn finish_active_sheet(&mut self) -> Result<()> {
        if let Some(mut sheet) = self.active.take() {
            sheet.finish(&mut self.zip)?;
        }
        Ok(())
    }

    fn validate_sheet_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(XlsxError::InvalidSheetName("empty name".to_string()));
        }
        if name.chars().count() > SHEET_NAME_MAX_LEN {
            return Err(XlsxError::InvalidSheetName(format!(
                "{name:?} exceeds {SHEET_NAME_MAX_LEN} characters"
            )));
        }
        if let Some(ch) = name.chars().find(|c| SHEET_NAME_FORBIDDEN.contains(c)) {
            return Err(XlsxError::InvalidSheetName(format!(
                "{name:?} contains {ch:?}"
            )));
        }
        if self.sheets.iter().any(|s| s == name) {
            return Err(XlsxError::InvalidSheetName(format!("{name:?} already used")));
        }
        Ok(())
    }

    fn validate_style(&self, style: StyleId) -> Result<()> {
        let count = self.styles.xf_count();
        if style.xf >= count || style.date_xf >= count {
            return Err(XlsxError::OutOfRange {
                what: "style id",
                value: style.xf.max(style.date_xf) as u64,
                max: count.saturating_sub(1) as u64,
            });
        }
        Ok(())
    }
}

fn part_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(6))
}

fn write_content_types<W: Write>(writer: &mut W, sheet_count: usize) -> Result<()> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\n\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\n\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\n\
         <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\n",
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{i}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\n"
        ));
    }
    xml.push_str(
        "<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\n\
         <Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\n\
         <Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>\n\
         </Types>",
    );
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

fn write_root_rels<W: Write>(writer: &mut W) -> Result<()> {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

fn write_core_props<W: Write>(writer: &mut W) -> Result<()> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>xlsxstream</dc:creator>
<cp:lastModifiedBy>xlsxstream</cp:lastModifiedBy>
<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>
</cp:coreProperties>"#
    );
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

fn write_app_props<W: Write>(writer: &mut W) -> Result<()> {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>xlsxstream</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<Company></Company>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>1.0</AppVersion>
</Properties>"#;
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

fn write_workbook_xml<W: Write>(writer: &mut W, sheets: &[String]) -> Result<()> {
    let mut xml = String::with_capacity(512);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
         <sheets>",
    );
    for (i, name) in sheets.iter().enumerate() {
        let id = i + 1;
        xml.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{id}\" r:id=\"rId{id}\"/>",
            crate::encode::escape_to_string(name)
        ));
    }
    xml.push_str("</sheets></workbook>");
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

fn write_workbook_rels<W: Write>(writer: &mut W, sheet_count: usize) -> Result<()> {
    let mut xml = String::with_capacity(512);
    xml.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            "<Relationship Id=\"rId{i}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{i}.xml\"/>"
        ));
    }
    xml.push_str(&format!(
        "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
        sheet_count + 1
    ));
    xml.push_str("</Relationships>");
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_workbook() -> Workbook<Cursor<Vec<u8>>> {
        Workbook::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn test_sheet_name_rules() {
        let mut wb = new_workbook();
        assert!(matches!(
            wb.add_sheet("").unwrap_err(),
            XlsxError::InvalidSheetName(_)
        ));
        assert!(matches!(
            wb.add_sheet("a/b").unwrap_err(),
            XlsxError::InvalidSheetName(_)
        ));
        assert!(matches!(
            wb.add_sheet(&"x".repeat(32)).unwrap_err(),
            XlsxError::InvalidSheetName(_)
        ));

        wb.add_sheet("Data").unwrap();
        assert!(matches!(
            wb.add_sheet("Data").unwrap_err(),
            XlsxError::InvalidSheetName(_)
        ));
        wb.add_sheet(&"x".repeat(31)).unwrap();
    }

    #[test]
    fn test_write_row_requires_sheet() {
        let mut wb = new_workbook();
        assert!(matches!(
            wb.write_row(&[Cell::new(1)]).unwrap_err(),
            XlsxError::InvalidState(_)
        ));
    }

    #[test]
    fn test_unregistered_style_rejected() {
        let mut wb = new_workbook();
        wb.add_sheet("Sheet1").unwrap();
        let bogus = StyleId::from_raw(99);
        let err = wb.write_row(&[Cell::styled(1, bogus)]).unwrap_err();
        assert!(matches!(err, XlsxError::OutOfRange { what: "style id", .. }));

        let real = wb.register_style(&Style::new().bold());
        wb.write_row(&[Cell::styled(1, real)]).unwrap();
    }

    #[test]
    fn test_close_produces_zip() {
        let mut wb = new_workbook();
        wb.add_sheet("First").unwrap();
        wb.write_row(&[Cell::new("hello"), Cell::new(42)]).unwrap();
        wb.add_sheet("Second").unwrap();
        wb.write_row(&[Cell::new(true)]).unwrap();
        let cursor = wb.close().unwrap();

        let mut archive = zip::ZipArchive::new(cursor).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "docProps/core.xml",
            "docProps/app.xml",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "xl/worksheets/sheet1.xml",
            "xl/worksheets/sheet2.xml",
        ] {
            assert!(names.iter().any(|n| n == part), "missing {part}");
        }
    }

    #[test]
    fn test_content_types_lists_every_sheet() {
        use std::io::Read;

        let mut wb = new_workbook();
        wb.add_sheet("A").unwrap();
        wb.add_sheet("B").unwrap();
        wb.add_sheet("C").unwrap();
        let cursor = wb.close().unwrap();

        let mut archive = zip::ZipArchive::new(cursor).unwrap();
        let mut types = String::new();
        archive
            .by_name("[Content_Types].xml")
            .unwrap()
            .read_to_string(&mut types)
            .unwrap();
        for i in 1..=3 {
            assert!(types.contains(&format!("/xl/worksheets/sheet{i}.xml")));
        }
    }
}
