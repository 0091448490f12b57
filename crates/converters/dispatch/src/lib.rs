use std::fmt;
use std::path::Path;

use anyhow::{bail, Context};
use convert_common::api::{Action, ConversionInfo};

/// A converter reads the input path and writes the output path.
pub type ConvertFn = fn(&Path, &Path) -> anyhow::Result<()>;

/// Registry lookup key: lowercase extension with leading dot, plus action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversionKey {
    pub ext: String,
    pub action: Action,
}

impl ConversionKey {
    pub fn new(ext: &str, action: Action) -> Self {
        let ext = ext.trim_start_matches('.').to_lowercase();
        Self { ext: format!(".{ext}"), action }
    }

    /// Derive the key from an uploaded file name and the raw action string.
    ///
    /// Fails for names without an extension and for unknown actions; both
    /// are reported as unsupported conversions.
    pub fn from_file_name(file_name: &str, action: &str) -> Result<Self, Unsupported> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let unsupported = || Unsupported {
            ext: if ext.is_empty() { String::new() } else { format!(".{}", ext.to_lowercase()) },
            action: action.to_string(),
        };
        if ext.is_empty() {
            return Err(unsupported());
        }
        let action: Action = action.parse().map_err(|_| unsupported())?;
        Ok(Self::new(ext, action))
    }
}

/// No registry entry for this (extension, action) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported {
    pub ext: String,
    pub action: String,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ext = if self.ext.is_empty() { "(none)" } else { &self.ext };
        write!(f, "conversion '{}' not supported for extension {}", self.action, ext)
    }
}

impl std::error::Error for Unsupported {}

/// One row of the registry.
pub struct ConversionEntry {
    pub input_ext: &'static str,
    pub action: Action,
    pub output_ext: &'static str,
    convert: ConvertFn,
}

impl fmt::Debug for ConversionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionEntry")
            .field("input_ext", &self.input_ext)
            .field("action", &self.action)
            .field("output_ext", &self.output_ext)
            .finish_non_exhaustive()
    }
}

impl ConversionEntry {
    /// `<stem>_<action><output_ext>`, e.g. `report_pdf_to_docx.docx`.
    pub fn output_file_name(&self, stem: &str) -> String {
        format!("{}_{}{}", stem, self.action, self.output_ext)
    }

    /// Run the converter.  A converter that reports success but leaves no
    /// output, or an empty one, is treated as a failure.
    pub fn run(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        (self.convert)(input, output)
            .with_context(|| format!("{} failed", self.action))?;
        let meta = std::fs::metadata(output)
            .with_context(|| format!("{} produced no output file", self.action))?;
        if meta.len() == 0 {
            bail!("{} produced an empty file", self.action);
        }
        Ok(())
    }

    pub fn info(&self) -> ConversionInfo {
        ConversionInfo {
            input_ext: self.input_ext.to_string(),
            action: self.action,
            output_ext: self.output_ext.to_string(),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[rustfmt::skip]
static REGISTRY: &[ConversionEntry] = &[
    ConversionEntry { input_ext: ".pdf",  action: Action::PdfToDocx, output_ext: ".docx", convert: convert_pdf::pdf_to_docx },
    ConversionEntry { input_ext: ".pdf",  action: Action::PdfToTxt,  output_ext: ".txt",  convert: convert_pdf::pdf_to_txt },
    ConversionEntry { input_ext: ".txt",  action: Action::TxtToPdf,  output_ext: ".pdf",  convert: convert_text::txt_to_pdf },
    ConversionEntry { input_ext: ".docx", action: Action::DocxToTxt, output_ext: ".txt",  convert: convert_office::docx_to_txt },
    ConversionEntry { input_ext: ".jpg",  action: Action::ImgToPdf,  output_ext: ".pdf",  convert: convert_image::img_to_pdf },
    ConversionEntry { input_ext: ".jpeg", action: Action::ImgToPdf,  output_ext: ".pdf",  convert: convert_image::img_to_pdf },
    ConversionEntry { input_ext: ".png",  action: Action::ImgToPdf,  output_ext: ".pdf",  convert: convert_image::img_to_pdf },
    ConversionEntry { input_ext: ".xlsx", action: Action::XlsxToCsv, output_ext: ".csv",  convert: convert_office::xlsx_to_csv },
    ConversionEntry { input_ext: ".mp4",  action: Action::Mp4ToMp3,  output_ext: ".mp3",  convert: convert_media::mp4_to_mp3 },
    ConversionEntry { input_ext: ".mp3",  action: Action::Mp3ToWav,  output_ext: ".wav",  convert: convert_media::mp3_to_wav },
];

/// Every supported conversion, in table order.
pub fn entries() -> &'static [ConversionEntry] {
    REGISTRY
}

/// Exact match on (extension, action).
pub fn lookup(key: &ConversionKey) -> Option<&'static ConversionEntry> {
    REGISTRY
        .iter()
        .find(|e| e.input_ext == key.ext && e.action == key.action)
}

/// Key derivation plus lookup, for a client-supplied file name and action.
pub fn resolve(file_name: &str, action: &str) -> Result<&'static ConversionEntry, Unsupported> {
    let key = ConversionKey::from_file_name(file_name, action)?;
    lookup(&key).ok_or(Unsupported { ext: key.ext, action: key.action.to_string() })
}
