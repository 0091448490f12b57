use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use anyhow::{bail, Context};
use quick_xml::escape::escape;
use quick_xml::events::Event;

/// Accept the Office formats this crate reads.
pub fn accepts(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str(),
        "docx" | "xlsx"
    )
}

// ── DOCX → TXT ───────────────────────────────────────────────────────────────

/// Write the paragraphs of `input` (a .docx) to `output` as UTF-8 text, one
/// paragraph per line.  Header parts come first and footer parts last.
/// Empty paragraphs are kept as blank lines; a blank document yields a single
/// newline.
pub fn docx_to_txt(input: &Path, output: &Path) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("not a DOCX (zip) file")?;

    let headers = story_parts(&archive, "header");
    let footers = story_parts(&archive, "footer");
    if archive.by_name("word/document.xml").is_err() {
        bail!("DOCX has no word/document.xml");
    }

    let mut paragraphs = Vec::new();
    let parts = headers
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("word/document.xml"))
        .chain(footers.iter().map(String::as_str));
    for part in parts {
        let xml = read_part(&mut archive, part)?;
        let parsed = parse_docx_paragraphs(&xml).with_context(|| format!("parsing {part}"))?;
        paragraphs.extend(parsed);
    }
    tracing::debug!("docx_to_txt: {} paragraphs from {}", paragraphs.len(), input.display());

    let mut text: String = paragraphs.iter().map(|p| format!("{p}\n")).collect();
    if text.is_empty() {
        text.push('\n');
    }
    std::fs::write(output, text).with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

/// `word/header*.xml` or `word/footer*.xml` part names, in numeric order.
fn story_parts<R: Read + Seek>(archive: &zip::ZipArchive<R>, kind: &str) -> Vec<String> {
    let prefix = format!("word/{kind}");
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| {
            n.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".xml"))
                .is_some_and(|num| num.chars().all(|c| c.is_ascii_digit()))
        })
        .map(str::to_string)
        .collect();
    names.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    names
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> anyhow::Result<String> {
    let mut entry = archive.by_name(name).with_context(|| format!("DOCX has no {name}"))?;
    let mut s = String::new();
    entry.read_to_string(&mut s).with_context(|| format!("reading {name}"))?;
    Ok(s)
}

/// Collect the text of every paragraph in a WordprocessingML part, in order.
///
/// `w:tab` becomes a tab and every `w:br`/`w:cr` (page breaks included) a
/// newline inside the paragraph.
fn parse_docx_paragraphs(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current_para = String::new();
    let mut in_para = false;
    let mut in_t = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).context("malformed XML")? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:t" => in_t = true,
                b"w:p" => {
                    in_para = true;
                    current_para.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" if in_para => current_para.push('\t'),
                b"w:br" | b"w:cr" if in_para => current_para.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_t = false,
                b"w:p" => {
                    paragraphs.push(std::mem::take(&mut current_para));
                    in_para = false;
                }
                _ => {}
            },
            Event::Text(e) => {
                if in_t {
                    current_para.push_str(&e.unescape()?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

// ── DOCX writer ──────────────────────────────────────────────────────────────

/// One body element of a generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(String),
    PageBreak,
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

/// Write a minimal WordprocessingML package containing `blocks`.
pub fn write_docx(path: &Path, title: Option<&str>, blocks: &[Block]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

    zip.start_file("_rels/.rels", opts)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;

    zip.start_file("docProps/core.xml", opts)?;
    zip.write_all(core_xml(title).as_bytes())?;

    zip.start_file("word/document.xml", opts)?;
    zip.write_all(document_xml(blocks).as_bytes())?;

    zip.finish()?.flush()?;
    Ok(())
}

fn core_xml(title: Option<&str>) -> String {
    let title = title
        .map(|t| format!("<dc:title>{}</dc:title>", escape(&xml_safe(t))))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">{title}</cp:coreProperties>"#
    )
}

fn document_xml(blocks: &[Block]) -> String {
    let mut body = String::new();
    for block in blocks {
        match block {
            Block::Paragraph(text) if text.is_empty() => body.push_str("<w:p/>"),
            Block::Paragraph(text) => {
                body.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
                body.push_str(&escape(&xml_safe(text)));
                body.push_str("</w:t></w:r></w:p>");
            }
            Block::PageBreak => body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

/// Drop characters XML 1.0 cannot carry (C0 controls other than tab/LF/CR).
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|&c| c >= ' ' || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

// ── XLSX → CSV ───────────────────────────────────────────────────────────────

/// Write the first worksheet of `input` as CSV.
///
/// Every row of the used range is written, padded to the sheet width, so the
/// first row acts as the header.
pub fn xlsx_to_csv(input: &Path, output: &Path) -> anyhow::Result<()> {
    use calamine::{open_workbook_auto, Reader};

    let mut wb = open_workbook_auto(input)
        .with_context(|| format!("opening workbook {}", input.display()))?;
    let Some(sheet_name) = wb.sheet_names().first().cloned() else {
        bail!("workbook has no worksheets");
    };
    let range = wb
        .worksheet_range(&sheet_name)
        .with_context(|| format!("reading sheet '{sheet_name}'"))?;

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut out = BufWriter::new(file);
    let mut rows = 0usize;
    for row in range.rows() {
        let fields: Vec<String> = row.iter().map(cell_to_string).collect();
        write_csv_record(&mut out, &fields)?;
        rows += 1;
    }
    if rows == 0 {
        // empty sheet: one blank record
        out.write_all(b"\n")?;
    }
    out.flush()?;

    tracing::debug!("xlsx_to_csv: {rows} rows from sheet '{sheet_name}'");
    Ok(())
}

fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// RFC 4180: quote fields containing a comma, quote, CR or LF; double quotes.
fn write_csv_record<W: Write>(out: &mut W, fields: &[String]) -> std::io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        if field.contains([',', '"', '\r', '\n']) {
            write!(out, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            out.write_all(field.as_bytes())?;
        }
    }
    out.write_all(b"\n")
}
