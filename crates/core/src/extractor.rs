//! Pull UTF-8 text out of `.txt` / `.docx` files (C3).

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{FilexError, Result};

/// Extract text from a supported file. `.txt` is read as UTF-8, falling back
/// to Latin-1 on decode failure (no third encoding attempt). `.docx` is
/// opened as an Office Open XML document and its paragraphs joined with
/// newlines. Any other extension fails with `UnsupportedType`.
pub fn extract_text(path: &Path) -> Result<String> {
    let extension =
        path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();

    match extension.as_str() {
        "txt" => extract_txt(path),
        "docx" => extract_docx(path),
        other => Err(FilexError::UnsupportedType(format!(".{other} is not a supported type"))),
    }
}

fn extract_txt(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Ok(latin1_decode(e.as_bytes())),
    }
}

/// Every byte of Latin-1 (ISO-8859-1) maps 1:1 onto the first 256 Unicode
/// codepoints, so this decode can never fail.
fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn extract_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| FilexError::DocxParseError(format!("not a valid docx archive: {e}")))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| FilexError::DocxParseError(format!("missing word/document.xml: {e}")))?
        .read_to_string(&mut document_xml)
        .map_err(|e| FilexError::DocxParseError(format!("unreadable word/document.xml: {e}")))?;

    paragraphs_from_document_xml(&document_xml)
}

/// Walk `word/document.xml`, joining the text runs of each `<w:p>` paragraph
/// with no separator and paragraphs with newlines.
fn paragraphs_from_document_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_text = false,
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| FilexError::DocxParseError(format!("bad xml text: {err}")))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(FilexError::DocxParseError(format!("xml parse error: {err}")));
            }
        }
        buf.clear();
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n"))
}
