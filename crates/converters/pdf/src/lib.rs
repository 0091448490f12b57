pub mod writer;

use std::path::Path;

use anyhow::{anyhow, Context};
use convert_office::Block;

pub use writer::{PdfWriter, PlacedLine};

/// Check if a file is a PDF based on extension.
pub fn accepts(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Extract the text layer of `input` into `output` as UTF-8.
pub fn pdf_to_txt(input: &Path, output: &Path) -> anyhow::Result<()> {
    let text = extract_text(input)?;
    let mut text = pages(&text).collect::<Vec<_>>().join("\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    std::fs::write(output, text).with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

/// Rebuild the text of `input` as a DOCX: one paragraph per text line,
/// a page break between PDF pages.
///
/// Layout, fonts, tables and images are not carried over.
pub fn pdf_to_docx(input: &Path, output: &Path) -> anyhow::Result<()> {
    let text = extract_text(input)?;

    let mut blocks = Vec::new();
    for (i, page) in pages(&text).enumerate() {
        if i > 0 {
            blocks.push(Block::PageBreak);
        }
        blocks.extend(page.lines().map(|l| Block::Paragraph(l.trim_end().to_string())));
    }

    let title = input.file_stem().and_then(|s| s.to_str());
    convert_office::write_docx(output, title, &blocks)
}

/// Run pdf-extract over the file.
///
/// pdf-extract can panic on malformed PDFs; `catch_unwind` turns that into
/// an error so one bad upload cannot take down a worker thread.
fn extract_text(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("empty PDF file"));
    }

    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes)) {
        Ok(Ok(text)) => {
            tracing::debug!("extracted {} chars from {}", text.len(), path.display());
            Ok(text)
        }
        Ok(Err(e)) => Err(anyhow!("PDF extraction failed: {e}")),
        Err(_) => Err(anyhow!("PDF extraction panicked (malformed PDF)")),
    }
}

/// Split extracted text into pages on form feeds, trimming the blank lines
/// pdf-extract puts around each page.
fn pages(text: &str) -> impl Iterator<Item = &str> {
    text.split('\u{0c}')
        .map(|p| p.trim_matches('\n'))
        .filter(|p| !p.trim().is_empty())
}
