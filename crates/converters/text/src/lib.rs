use std::path::Path;

use anyhow::{bail, Context};
use convert_pdf::{PdfWriter, PlacedLine};

const MM: f32 = 72.0 / 25.4;

/// A4 portrait, in points.
const PAGE_WIDTH: f32 = 210.0 * MM;
const PAGE_HEIGHT: f32 = 297.0 * MM;

const LEFT_MARGIN: f32 = 10.0 * MM;
const TOP_MARGIN: f32 = 10.0 * MM;
/// A line that would start inside this band goes to the next page.
const BOTTOM_MARGIN: f32 = 15.0 * MM;
const LINE_HEIGHT: f32 = 10.0 * MM;
const FONT_SIZE: f32 = 12.0;

/// Check if a file is plain text based on extension.
pub fn accepts(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// Typeset a UTF-8 text file onto A4 pages, one input line per 10 mm row.
///
/// Lines are trimmed and not wrapped.  An empty file yields one blank page.
pub fn txt_to_pdf(input: &Path, output: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if content_inspector::inspect(&bytes).is_binary() {
        bail!("input does not look like a text file");
    }
    let text = String::from_utf8(bytes).context("input is not valid UTF-8")?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let pages = layout(text);
    let mut writer = PdfWriter::new();
    for page in &pages {
        writer.add_text_page(PAGE_WIDTH, PAGE_HEIGHT, FONT_SIZE, page)?;
    }
    tracing::debug!("txt_to_pdf: {} pages from {}", pages.len(), input.display());
    writer.save(output)
}

/// Place each trimmed line in its own row, starting a new page when the next
/// row would cross the bottom margin.  Always returns at least one page.
fn layout(text: &str) -> Vec<Vec<PlacedLine>> {
    let mut pages = vec![Vec::new()];
    let mut row_top = TOP_MARGIN;

    for line in text.lines() {
        if row_top + LINE_HEIGHT > PAGE_HEIGHT - BOTTOM_MARGIN {
            pages.push(Vec::new());
            row_top = TOP_MARGIN;
        }
        // Baseline sits roughly centred in the row.
        let baseline = row_top + LINE_HEIGHT / 2.0 + 0.3 * FONT_SIZE;
        if let Some(page) = pages.last_mut() {
            page.push(PlacedLine {
                x: LEFT_MARGIN,
                y: PAGE_HEIGHT - baseline,
                text: line.trim().to_string(),
            });
        }
        row_top += LINE_HEIGHT;
    }
    pages
}
