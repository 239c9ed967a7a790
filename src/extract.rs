//! Text extraction for binary document formats.
//!
//! The reader supplies raw bytes; this module turns them into plain UTF-8
//! text. PDF and DOCX are decoded structurally, HTML is reduced to its
//! visible text with block elements on their own lines, and everything else
//! is treated as (possibly lossy) UTF-8.

use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose content is never visible text.
const HTML_SKIPPED: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Elements that end a line of extracted text.
const HTML_BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tr", "ul",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Document kinds with a dedicated extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Html,
    PlainText,
}

impl DocumentKind {
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => DocumentKind::Pdf,
            Some("docx") => DocumentKind::Docx,
            Some("html" | "htm" | "xhtml") => DocumentKind::Html,
            _ => DocumentKind::PlainText,
        }
    }
}

/// Decode the bytes of the file at `path` into text, choosing the extractor by extension.
pub fn extract_text(path: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    match DocumentKind::from_path(path) {
        DocumentKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::Html => Ok(extract_html(bytes)),
        DocumentKind::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn extract_html(bytes: &[u8]) -> String {
    let source = String::from_utf8_lossy(bytes);
    let document = scraper::Html::parse_document(&source);
    let mut raw = String::new();
    push_visible_text(document.root_element(), &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_visible_text(element: scraper::ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if HTML_SKIPPED.contains(&name) {
        return;
    }
    for child in element.children() {
        match child.value() {
            // Source line breaks are layout, not structure.
            scraper::Node::Text(text) => out.push_str(&text.replace(|c: char| c.is_whitespace(), " ")),
            scraper::Node::Element(_) => {
                if let Some(child) = scraper::ElementRef::wrap(child) {
                    push_visible_text(child, out);
                }
            }
            _ => {}
        }
    }
    match name {
        "td" | "th" => out.push(' '),
        _ if HTML_BLOCKS.contains(&name) => out.push('\n'),
        _ => {}
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    paragraphs_from_document_xml(&xml)
}

/// Collects `w:t` runs, ending each `w:p` paragraph with a newline.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push(' ');
                    }
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_path("x/report.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path("memo.docx"), DocumentKind::Docx);
        assert_eq!(DocumentKind::from_path("site/index.HTM"), DocumentKind::Html);
        assert_eq!(DocumentKind::from_path("notes.md"), DocumentKind::PlainText);
        assert_eq!(DocumentKind::from_path("Makefile"), DocumentKind::PlainText);
    }

    #[test]
    fn plain_text_is_lossy_utf8() {
        let text = extract_text("a.txt", b"caf\xc3\xa9 \xff").unwrap();
        assert!(text.starts_with("café"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text("a.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text("a.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Cats are</w:t></w:r><w:r><w:t>mammals.</w:t></w:r></w:p>
    <w:p><w:r><w:t>The sky is blue.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text("doc.docx", &docx_with(xml)).unwrap();
        assert_eq!(text, "Cats are mammals.\nThe sky is blue.");
    }

    #[test]
    fn html_keeps_visible_text_only() {
        let page = r#"<!DOCTYPE html>
<html>
  <head><title>Ignored</title><style>p { color: red; }</style></head>
  <body>
    <h1>Cats</h1>
    <p>Cats are <b>mammals</b>
       and sleep a lot.</p>
    <script>var hidden = "not text";</script>
    <ul><li>purr</li><li>hiss</li></ul>
    <table><tr><td>fur</td><td>soft</td></tr></table>
    <p>Tom &amp; Jerry</p>
  </body>
</html>"#;
        let text = extract_text("cats.html", page.as_bytes()).unwrap();
        assert_eq!(
            text,
            "Cats\nCats are mammals and sleep a lot.\npurr\nhiss\nfur soft\nTom & Jerry"
        );
    }
}
