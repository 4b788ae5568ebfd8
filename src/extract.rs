//! Turning uploaded files into analysis inputs.
//!
//! Documents are sniffed by magic bytes: `%PDF` goes through `pdf-extract`,
//! `PK` (a ZIP container) is read as DOCX, and anything else is decoded as
//! UTF-8 text (lossy). DOCX paragraphs become lines, so requirement lines
//! survive for chunking.
//!
//! The test table is CSV. Cells are trimmed, blank records skipped, and
//! ragged rows allowed; row 0 is the header. A table with no rows at all is
//! [`PipelineError::MalformedInput`]; a header-only table is passed through
//! and classified downstream.
//!
//! Parsing is CPU-bound and runs on the blocking pool.

use std::io::Read;

use async_trait::async_trait;
use base64::Engine;

use reqtrace_core::error::{PipelineError, Result};
use reqtrace_core::models::{JobFiles, ParsedInputs};

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Converts a job's stored files into text and table rows.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, files: &JobFiles) -> Result<ParsedInputs>;
}

/// The default parser: PDF, DOCX or plain-text documents plus a CSV table.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParser;

#[async_trait]
impl DocumentParser for FileParser {
    async fn parse(&self, files: &JobFiles) -> Result<ParsedInputs> {
        let files = files.clone();
        tokio::task::spawn_blocking(move || parse_files(&files))
            .await
            .map_err(|e| PipelineError::Internal(e.into()))?
    }
}

pub fn parse_files(files: &JobFiles) -> Result<ParsedInputs> {
    let base = extract_document(&decode_base64("baseDoc", &files.base)?)?;
    let updated = match &files.updated {
        Some(blob) => extract_document(&decode_base64("updatedDoc", blob)?)?,
        None => String::new(),
    };
    let tests = parse_table(&decode_base64("testsTable", &files.tests)?)?;
    Ok(ParsedInputs {
        base,
        updated,
        tests,
    })
}

pub fn decode_base64(field: &str, data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| PipelineError::Validation(format!("{} is not valid base64: {}", field, e)))
}

/// Extract plain text from a document's bytes.
pub fn extract_document(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(b"%PDF") {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| PipelineError::MalformedInput(format!("PDF extraction failed: {}", e)))
    } else if bytes.starts_with(b"PK") {
        extract_docx(bytes)
    } else {
        Ok(decode_text(bytes))
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn ooxml_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::MalformedInput(format!("DOCX extraction failed: {}", e))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_error)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml_error("word/document.xml not found"))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(ooxml_error)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_error("word/document.xml exceeds size limit"));
    }
    docx_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one output line per `<w:p>` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().map_err(ooxml_error)?.as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Parse CSV bytes into trimmed rows, header first.
pub fn parse_table(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| PipelineError::MalformedInput(format!("test table is not valid CSV: {}", e)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(PipelineError::MalformedInput(
            "test table has no rows".to_string(),
        ));
    }
    Ok(rows)
}
