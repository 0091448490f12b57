//! Minimal PDF output: text pages in Helvetica and full-page RGB images.

use std::io::Write;
use std::path::Path;

use anyhow::{ensure, Context};
use flate2::{write::ZlibEncoder, Compression};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// A line of text at an absolute position (points, origin bottom-left).
#[derive(Debug, Clone)]
pub struct PlacedLine {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    font_id: Option<ObjectId>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self { doc, pages_id, kids: Vec::new(), font_id: None }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Add a page of `width`×`height` points with the given lines set in
    /// Helvetica at `font_size`.  Characters outside WinAnsi print as `?`.
    pub fn add_text_page(
        &mut self,
        width: f32,
        height: f32,
        font_size: f32,
        lines: &[PlacedLine],
    ) -> anyhow::Result<()> {
        let font_id = self.helvetica();
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };

        let mut ops = Vec::with_capacity(lines.len() * 4 + 2);
        for line in lines.iter().filter(|l| !l.text.is_empty()) {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), Object::Real(font_size)]));
            ops.push(Operation::new("Td", vec![Object::Real(line.x), Object::Real(line.y)]));
            ops.push(Operation::new("Tj", vec![Object::string_literal(to_win_ansi(&line.text))]));
            ops.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations: ops }.encode().context("encoding page content")?;
        self.push_page(width, height, resources, Stream::new(dictionary! {}, content));
        Ok(())
    }

    /// Add a page exactly the size of the image (1 px = 1 pt) showing it.
    /// `rgb` is 8-bit interleaved RGB, row-major, `width * height * 3` bytes.
    pub fn add_image_page(&mut self, width: u32, height: u32, rgb: &[u8]) -> anyhow::Result<()> {
        ensure!(width > 0 && height > 0, "image has zero size");
        ensure!(
            rgb.len() == width as usize * height as usize * 3,
            "RGB buffer is {} bytes, expected {}",
            rgb.len(),
            width as usize * height as usize * 3
        );

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(rgb)?;
        let compressed = encoder.finish()?;

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(width.into()),
                "Height" => Object::Integer(height.into()),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "FlateDecode",
            },
            compressed,
        )
        .with_compression(false);
        let image_id = self.doc.add_object(image);

        let resources = dictionary! {
            "XObject" => dictionary! { "Im1" => image_id },
        };
        let (w, h) = (width as f32, height as f32);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(w),
                        Object::Real(0.0),
                        Object::Real(0.0),
                        Object::Real(h),
                        Object::Real(0.0),
                        Object::Real(0.0),
                    ],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        }
        .encode()
        .context("encoding page content")?;
        self.push_page(w, h, resources, Stream::new(dictionary! {}, content));
        Ok(())
    }

    /// Finish the page tree and write the document.
    pub fn save(mut self, path: &Path) -> anyhow::Result<()> {
        ensure!(!self.kids.is_empty(), "PDF has no pages");
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => Object::Integer(count),
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();
        self.doc
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn helvetica(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }

    fn push_page(&mut self, width: f32, height: f32, resources: lopdf::Dictionary, content: Stream) {
        let content_id = self.doc.add_object(content);
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width),
                Object::Real(height),
            ],
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
    }
}

/// Map text onto WinAnsi bytes: ASCII and Latin-1 pass through, everything
/// else (and control characters) becomes `?`.
fn to_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}
