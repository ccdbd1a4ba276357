use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
    static ref PORTUGUESE_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","à","ao","aos","aquela","aquelas","aquele","aqueles","aquilo","as","às","até",
            "com","como","da","das","de","dela","delas","dele","deles","depois","do","dos",
            "e","é","ela","elas","ele","eles","em","entre","era","eram","essa","essas","esse","esses","esta","estas","este","estes","eu",
            "foi","foram","há","isso","isto","já","lhe","lhes","mais","mas","me","mesmo","meu","meus","minha","minhas","muito",
            "na","não","nas","nem","no","nos","nós","nossa","nossas","nosso","nossos","num","numa",
            "o","os","ou","para","pela","pelas","pelo","pelos","por","qual","quando","que","quem",
            "se","sem","ser","seu","seus","só","sua","suas","também","te","tem","têm","teu","tu","tua",
            "um","uma","umas","uns","você","vocês","vos"
        ];
        words.iter().copied().collect()
    };
}

/// Language rules used for stemming and stop-word removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Portuguese,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Portuguese => "portuguese",
        }
    }

    fn algorithm(self) -> Algorithm {
        match self {
            Language::English => Algorithm::English,
            Language::Portuguese => Algorithm::Portuguese,
        }
    }

    fn stopwords(self) -> &'static HashSet<&'static str> {
        match self {
            Language::English => &ENGLISH_STOPWORDS,
            Language::Portuguese => &PORTUGUESE_STOPWORDS,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "pt" | "portuguese" => Ok(Language::Portuguese),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// An analyzed term together with where it came from in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Ordinal of the word in the text, counting removed stop-words.
    pub position: u32,
    /// Byte range of the original word.
    pub start: usize,
    pub end: usize,
}

/// Tokenizes and normalizes text: NFKC, lowercase, stop-word removal,
/// stemming, then diacritic folding.
///
/// The same instance must be used for indexing and querying; the index
/// store owns one and hands it out to the writer and the query parser.
pub struct Analyzer {
    language: Language,
    stemmer: Stemmer,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer").field("language", &self.language).finish()
    }
}

impl Analyzer {
    pub fn new(language: Language) -> Self {
        Self { language, stemmer: Stemmer::create(language.algorithm()) }
    }

    pub fn language(&self) -> Language { self.language }

    /// Tokenize text into (term, position).
    pub fn analyze(&self, text: &str) -> Vec<(String, u32)> {
        self.tokens(text).into_iter().map(|t| (t.term, t.position)).collect()
    }

    /// Like [`Analyzer::analyze`] but keeps the byte offsets of every word,
    /// which the highlighter needs to mark matches in the original text.
    pub fn tokens(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(text).enumerate() {
            if let Some(term) = self.normalize_word(mat.as_str()) {
                tokens.push(Token { term, position: pos as u32, start: mat.start(), end: mat.end() });
            }
        }
        tokens
    }

    /// Normalize a single word, returning `None` for stop-words.
    pub fn normalize_word(&self, word: &str) -> Option<String> {
        let lowered = word.nfkc().collect::<String>().to_lowercase();
        if self.language.stopwords().contains(lowered.as_str()) {
            return None;
        }
        let stem = self.stemmer.stem(&lowered);
        let folded: String = stem.nfd().filter(|c| !is_combining_mark(*c)).collect();
        if folded.is_empty() { None } else { Some(folded) }
    }
}
