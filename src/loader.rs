//! Text extraction for job postings and resumes.
//!
//! Plain text and markdown are decoded as UTF-8, dropping invalid bytes.
//! PDFs go through `pdf-extract`; `.docx` files are read straight from the
//! `word/document.xml` part of the archive. Every path ends in
//! [`normalize`].

use std::{
    borrow::Cow,
    fs,
    io::Read,
    path::Path,
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    error::{Error, Result},
    text_util::normalize,
};

const DOCX_BODY_PART: &str = "word/document.xml";

/// Text runs, paragraph ends, tabs and line breaks in WordprocessingML.
static DOCX_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<w:t(?:\s[^>]*)?>(?P<text>[^<]*)</w:t>|(?P<para></w:p>)|(?P<tab><w:tab/>)|(?P<br><w:br\s*/>)",
    )
    .expect("valid regex")
});

static XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);")
        .expect("valid regex")
});

/// Load a document and return its normalized text.
///
/// The format is chosen by extension (case-insensitive); unknown extensions
/// are read as text.
pub fn load_document(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let raw = match ext.as_str() {
        "pdf" => load_pdf(path)?,
        "docx" => load_docx(path)?,
        _ => load_text(path)?,
    };

    Ok(normalize(&raw))
}

fn ingestion_error(path: &Path, reason: impl ToString) -> Error {
    Error::Ingestion {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn load_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| ingestion_error(path, e))?;
    Ok(decode_lossy(&bytes))
}

/// Decode UTF-8, dropping invalid sequences instead of replacing them.
pub fn decode_lossy(bytes: &[u8]) -> String {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => text.replace('\u{fffd}', ""),
    }
}

fn load_pdf(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path).map_err(|e| ingestion_error(path, e))
}

fn load_docx(path: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| ingestion_error(path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ingestion_error(path, e))?;
    let mut part = archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| ingestion_error(path, e))?;

    let mut xml = Vec::new();
    part.read_to_end(&mut xml)
        .map_err(|e| ingestion_error(path, e))?;

    Ok(docx_text(&decode_lossy(&xml)))
}

/// Extract paragraph text from a WordprocessingML body, one line per
/// paragraph.
pub fn docx_text(xml: &str) -> String {
    let mut out = String::new();
    for caps in DOCX_TOKENS.captures_iter(xml) {
        if let Some(text) = caps.name("text") {
            out.push_str(&unescape_xml(text.as_str()));
        } else if caps.name("tab").is_some() {
            out.push('\t');
        } else {
            // paragraph end or explicit break
            out.push('\n');
        }
    }
    out
}

fn unescape_xml(text: &str) -> Cow<'_, str> {
    XML_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                .and_then(|n| n.ok())
                .and_then(char::from_u32),
        };
        decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
    })
}
