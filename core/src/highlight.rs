use crate::analyzer::{Analyzer, Token};
use crate::schema::Document;
use std::collections::HashSet;
use tracing::warn;

pub const DEFAULT_MAX_CHARS: usize = 250;
pub const DEFAULT_SURROUND: usize = 40;
pub const DEFAULT_PRE_TAG: &str = "<em>";
pub const DEFAULT_POST_TAG: &str = "</em>";
/// Returned when a document has no content to show at all.
pub const CONTENT_UNAVAILABLE: &str = "[Content unavailable]";

/// Cut `text` to `max_chars` characters, appending `...` when it was cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Byte range of the selected fragment and the matches inside it.
#[derive(Debug, Clone, PartialEq)]
struct Fragment<'t> {
    start: usize,
    end: usize,
    matches: Vec<&'t Token>,
}

/// Picks the best window of content around query matches and marks the
/// matched words.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlighter {
    max_chars: usize,
    surround: usize,
    pre_tag: String,
    post_tag: String,
}

impl Default for Highlighter {
    fn default() -> Self { Self::new(DEFAULT_MAX_CHARS, DEFAULT_SURROUND) }
}

impl Highlighter {
    pub fn new(max_chars: usize, surround: usize) -> Self {
        Self { max_chars: max_chars.max(1), surround, pre_tag: DEFAULT_PRE_TAG.into(), post_tag: DEFAULT_POST_TAG.into() }
    }

    pub fn with_tags(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.pre_tag = pre.into();
        self.post_tag = post.into();
        self
    }

    /// Snippet of `doc.content` for the analyzed query `terms`. Never fails:
    /// when no fragment can be built the truncated content is returned.
    pub fn highlight(&self, analyzer: &Analyzer, doc: &Document, terms: &HashSet<String>) -> String {
        let tokens = analyzer.tokens(&doc.content);
        match self.fragment(&doc.content, &tokens, terms).and_then(|f| f.map(|f| self.render(&doc.content, &f)).transpose()) {
            Ok(Some(snippet)) => snippet,
            Ok(None) => self.fallback(&doc.content),
            Err(reason) => {
                warn!(path = %doc.path, %reason, "highlighting failed, using truncated content");
                self.fallback(&doc.content)
            }
        }
    }

    pub fn fallback(&self, content: &str) -> String {
        if content.trim().is_empty() {
            return CONTENT_UNAVAILABLE.to_string();
        }
        truncate_text(content, self.max_chars)
    }

    /// Best window: the one covering the most distinct terms, then the most
    /// matches, then the earliest. Byte lengths bound the char count.
    fn fragment<'t>(&self, text: &str, tokens: &'t [Token], terms: &HashSet<String>) -> Result<Option<Fragment<'t>>, String> {
        let matches: Vec<&Token> = tokens.iter().filter(|t| terms.contains(&t.term)).collect();
        if matches.is_empty() {
            return Ok(None);
        }
        let unusable = |t: &&Token| t.start >= t.end || t.end > text.len() || !text.is_char_boundary(t.start) || !text.is_char_boundary(t.end);
        if let Some(bad) = matches.iter().copied().find(unusable) {
            return Err(format!("token offsets {}..{} outside content", bad.start, bad.end));
        }

        let mut best: Option<((usize, usize), usize, usize)> = None;
        for i in 0..matches.len() {
            let mut j = i;
            while j + 1 < matches.len() && matches[j + 1].end - matches[i].start <= self.max_chars {
                j += 1;
            }
            let distinct = matches[i..=j].iter().map(|t| t.term.as_str()).collect::<HashSet<_>>().len();
            let key = (distinct, j - i + 1);
            if best.map_or(true, |(k, _, _)| key > k) {
                best = Some((key, i, j));
            }
        }
        let Some((_, i, j)) = best else { return Ok(None) };

        let core_start = matches[i].start;
        let core_end = floor_char_boundary(text, matches[j].end.min(core_start + self.max_chars));
        let room = self.max_chars.saturating_sub(core_end - core_start);
        let left = self.surround.min(core_start).min(room);
        let right = self.surround.min(text.len() - core_end).min(room - left);

        let mut start = floor_char_boundary(text, core_start - left);
        let mut end = floor_char_boundary(text, core_end + right);
        // avoid starting or ending in the middle of a word
        if start > 0 {
            if let Some(ws) = text[start..core_start].find(char::is_whitespace) {
                start += ws;
                start += text[start..].chars().next().map_or(0, |c| c.len_utf8());
            }
        }
        if end < text.len() {
            if let Some(ws) = text[core_end..end].rfind(char::is_whitespace) {
                end = core_end + ws;
            }
        }
        let matches = matches[i..=j].iter().copied().filter(|t| t.end <= end).collect();
        Ok(Some(Fragment { start, end: end.max(start), matches }))
    }

    fn render(&self, text: &str, fragment: &Fragment<'_>) -> Result<String, String> {
        let mut out = String::with_capacity(fragment.end - fragment.start + fragment.matches.len() * 9);
        let mut cursor = fragment.start;
        for t in &fragment.matches {
            if t.start < cursor || !text.is_char_boundary(t.start) || !text.is_char_boundary(t.end) {
                return Err(format!("token offsets {}..{} not usable", t.start, t.end));
            }
            out.push_str(&text[cursor..t.start]);
            out.push_str(&self.pre_tag);
            out.push_str(&text[t.start..t.end]);
            out.push_str(&self.post_tag);
            cursor = t.end;
        }
        out.push_str(&text[cursor..fragment.end]);
        Ok(out)
    }
}
