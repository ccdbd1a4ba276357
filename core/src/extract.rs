//! Plain-text extraction for the file formats the indexer understands.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub trait TextExtractor: Send + Sync {
    /// Lower-case extensions handled, without the dot.
    fn extensions(&self) -> &[&'static str];

    /// Extracted text; empty output means "no content", not an error.
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Decode bytes as UTF-8 (BOM stripped), falling back to Windows-1252,
/// which also covers Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Extraction { path: path.to_path_buf(), reason: e.to_string() })
}

pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&'static str] { &["txt"] }

    fn extract(&self, path: &Path) -> Result<String> { Ok(decode_text(&read_file(path)?)) }
}

lazy_static! {
    static ref MD_FENCE: Regex = Regex::new(r"(?m)^[ \t]*(```|~~~).*$").expect("valid regex");
    static ref MD_IMAGE: Regex = Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex");
    static ref MD_LINK: Regex = Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex");
    static ref MD_REF_DEF: Regex = Regex::new(r"(?m)^[ \t]*\[[^\]]+\]:[ \t]*\S+.*$").expect("valid regex");
    static ref MD_HTML_TAG: Regex = Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex");
    static ref MD_HEADING: Regex = Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]*").expect("valid regex");
    static ref MD_QUOTE: Regex = Regex::new(r"(?m)^[ \t]*>[ \t]?").expect("valid regex");
    static ref MD_RULE: Regex = Regex::new(r"(?m)^[ \t]*([-*_][ \t]*){3,}$").expect("valid regex");
    static ref MD_LIST: Regex = Regex::new(r"(?m)^[ \t]*([-*+]|\d+[.)])[ \t]+").expect("valid regex");
    static ref MD_STRONG: Regex = Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("valid regex");
    static ref MD_EM_STAR: Regex = Regex::new(r"\*([^*\n]+)\*").expect("valid regex");
    static ref MD_EM_UNDERSCORE: Regex = Regex::new(r"(^|[^\w])_([^_\n]+)_([^\w]|$)").expect("valid regex");
    static ref MD_CODE: Regex = Regex::new(r"`([^`]*)`").expect("valid regex");
}

/// Strip Markdown syntax, keeping the readable text.
pub fn markdown_to_text(md: &str) -> String {
    let s = MD_FENCE.replace_all(md, "");
    let s = MD_IMAGE.replace_all(&s, "$1");
    let s = MD_LINK.replace_all(&s, "$1");
    let s = MD_REF_DEF.replace_all(&s, "");
    let s = MD_HTML_TAG.replace_all(&s, "");
    let s = MD_RULE.replace_all(&s, "");
    let s = MD_HEADING.replace_all(&s, "");
    let s = MD_QUOTE.replace_all(&s, "");
    let s = MD_LIST.replace_all(&s, "");
    let s = MD_STRONG.replace_all(&s, "$1$2");
    let s = MD_EM_STAR.replace_all(&s, "$1");
    let s = MD_EM_UNDERSCORE.replace_all(&s, "$1$2$3");
    let s = MD_CODE.replace_all(&s, "$1");
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn extensions(&self) -> &[&'static str] { &["md", "markdown"] }

    fn extract(&self, path: &Path) -> Result<String> { Ok(markdown_to_text(&decode_text(&read_file(path)?))) }
}

/// Extractors by extension.
#[derive(Clone)]
pub struct ExtractorRegistry {
    by_ext: BTreeMap<String, Arc<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PlainTextExtractor));
        registry.register(Arc::new(MarkdownExtractor));
        registry
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self { Self { by_ext: BTreeMap::new() } }

    /// Register `extractor` for all of its extensions, replacing earlier ones.
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        for ext in extractor.extensions() {
            self.by_ext.insert(ext.to_lowercase(), extractor.clone());
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn TextExtractor> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        self.by_ext.get(&ext).map(|e| e.as_ref())
    }

    /// Extensions with a leading dot, e.g. `[".md", ".txt"]`.
    pub fn supported_formats(&self) -> Vec<String> {
        self.by_ext.keys().map(|e| format!(".{e}")).collect()
    }
}
