use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A conversion the client can ask for, as sent in the `action` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PdfToDocx,
    PdfToTxt,
    TxtToPdf,
    DocxToTxt,
    ImgToPdf,
    XlsxToCsv,
    Mp4ToMp3,
    Mp3ToWav,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::PdfToDocx,
        Action::PdfToTxt,
        Action::TxtToPdf,
        Action::DocxToTxt,
        Action::ImgToPdf,
        Action::XlsxToCsv,
        Action::Mp4ToMp3,
        Action::Mp3ToWav,
    ];

    /// The identifier used on the wire and in output file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::PdfToDocx => "pdf_to_docx",
            Action::PdfToTxt  => "pdf_to_txt",
            Action::TxtToPdf  => "txt_to_pdf",
            Action::DocxToTxt => "docx_to_txt",
            Action::ImgToPdf  => "img_to_pdf",
            Action::XlsxToCsv => "xlsx_to_csv",
            Action::Mp4ToMp3  => "mp4_to_mp3",
            Action::Mp3ToWav  => "mp3_to_wav",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by `Action::from_str` for identifiers outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action '{}'", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for Action {
    type Err = UnknownAction;

    /// Exact match only: action identifiers are not case-folded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// GET /api/v1/conversions response entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionInfo {
    /// Lowercase, with leading dot (".pdf").
    pub input_ext: String,
    pub action: Action,
    pub output_ext: String,
}
