//! Extension-keyed text extraction for uploaded documents.
//!
//! The pipeline hands over raw bytes plus the file extension; this module
//! returns plain UTF-8 text. PDF goes through `pdf-extract`; the OOXML
//! formats (docx, pptx, xlsx) are read straight out of their ZIP container
//! with bounded entry reads, collecting `<t>` text elements via `quick-xml`.
//! Plain-text extensions are decoded lossily.

use std::io::Read;

/// Extensions decoded as plain UTF-8 text.
const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "log", "json"];

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure. Never panics on malformed input; the ingestion
/// pipeline swallows these and marks the file's task as failed.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file extension: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from `bytes` according to the lowercase file
/// extension (no leading dot).
pub fn extract_text(extension: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    match extension {
        "pdf" => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        "docx" => extract_ooxml(bytes, |name| name == "word/document.xml"),
        "pptx" => extract_ooxml(bytes, |name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
        }),
        "xlsx" => extract_ooxml(bytes, |name| name == "xl/sharedStrings.xml"),
        ext if PLAIN_TEXT_EXTENSIONS.contains(&ext) => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

/// Opens the OOXML ZIP container, reads every entry selected by `wanted`
/// (in numeric order for multi-part documents like pptx slides), and
/// concatenates the text elements found in each.
fn extract_ooxml(bytes: &[u8], wanted: fn(&str) -> bool) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| wanted(name))
        .map(|s| s.to_string())
        .collect();
    entries.sort_by_key(|name| trailing_number(name));

    if entries.is_empty() {
        return Err(ExtractError::Ooxml("no text part found in archive".to_string()));
    }

    let mut out = String::new();
    for name in entries {
        let xml = read_entry_bounded(&mut archive, &name)?;
        let text = collect_text_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

/// Numeric suffix of an entry name (`ppt/slides/slide12.xml` → 12), used to
/// keep multi-part documents in document order.
fn trailing_number(name: &str) -> u32 {
    name.trim_end_matches(".xml")
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn read_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Collects the text content of every `<t>` element (local name), which
/// covers `w:t` runs in docx, `a:t` runs in pptx slides, and the `<t>`
/// children of xlsx shared strings.
fn collect_text_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut parts: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                in_t = e.local_name().as_ref() == b"t";
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                let text = te.unescape().unwrap_or_default();
                if !text.is_empty() {
                    parts.push(text.into_owned());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(parts.join(" "))
}
