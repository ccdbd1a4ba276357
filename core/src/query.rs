use crate::analyzer::Analyzer;
use crate::schema::Field;
use std::collections::HashSet;

pub const TITLE_BOOST: f32 = 3.0;
pub const CONTENT_BOOST: f32 = 1.0;

/// Default boosts: a title match weighs three times a content match.
pub fn default_boosts() -> Vec<(Field, f32)> {
    vec![(Field::Title, TITLE_BOOST), (Field::Content, CONTENT_BOOST)]
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Term(String),
    /// Analyzed terms with their position offset from the first one.
    Phrase(Vec<(String, u32)>),
}

impl Clause {
    pub fn terms(&self) -> Vec<&str> {
        match self {
            Clause::Term(t) => vec![t.as_str()],
            Clause::Phrase(parts) => parts.iter().map(|(t, _)| t.as_str()).collect(),
        }
    }
}

/// A parsed query: every required clause must match in at least one of
/// `fields`, no excluded clause may match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub required: Vec<Clause>,
    pub excluded: Vec<Clause>,
    pub fields: Vec<(Field, f32)>,
}

impl Query {
    /// A query with no required clause matches nothing.
    pub fn is_empty(&self) -> bool { self.required.is_empty() }

    /// Terms worth highlighting.
    pub fn positive_terms(&self) -> HashSet<String> {
        self.required.iter().flat_map(|c| c.terms()).map(|t| t.to_string()).collect()
    }
}

#[derive(Debug, PartialEq)]
struct RawClause {
    negated: bool,
    phrase: bool,
    text: String,
}

/// Split a query string into words and quoted phrases, each optionally
/// negated with a leading `-`. An unterminated quote runs to the end.
fn split_clauses(input: &str) -> Vec<RawClause> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let negated = c == '-';
        if negated {
            chars.next();
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            let text: String = chars.by_ref().take_while(|&c| c != '"').collect();
            out.push(RawClause { negated, phrase: true, text });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() { break; }
                text.push(c);
                chars.next();
            }
            if !negated && text == "AND" { continue; }
            out.push(RawClause { negated, phrase: false, text });
        }
    }
    out
}

/// Turns a user query string into a [`Query`], analyzing every word with the
/// index's analyzer.
pub struct QueryParser<'a> {
    analyzer: &'a Analyzer,
    fields: Vec<(Field, f32)>,
}

impl<'a> QueryParser<'a> {
    pub fn new(analyzer: &'a Analyzer, fields: Vec<(Field, f32)>) -> Self { Self { analyzer, fields } }

    pub fn parse(&self, input: &str) -> Query {
        let mut query = Query { fields: self.fields.clone(), ..Default::default() };
        for raw in split_clauses(input) {
            let terms = self.analyzer.analyze(&raw.text);
            let clauses: Vec<Clause> = match (raw.phrase, terms.len()) {
                (_, 0) => continue,
                (true, n) if n > 1 => {
                    let first = terms[0].1;
                    vec![Clause::Phrase(terms.into_iter().map(|(t, p)| (t, p - first)).collect())]
                }
                _ => terms.into_iter().map(|(t, _)| Clause::Term(t)).collect(),
            };
            let target = if raw.negated { &mut query.excluded } else { &mut query.required };
            for clause in clauses {
                if !target.contains(&clause) {
                    target.push(clause);
                }
            }
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Language;

    fn parse(input: &str) -> Query {
        let analyzer = Analyzer::new(Language::English);
        QueryParser::new(&analyzer, default_boosts()).parse(input)
    }

    #[test]
    fn words_are_required_and_deduplicated() {
        let q = parse("Searching the searches AND indexes");
        assert_eq!(q.required, vec![Clause::Term("search".into()), Clause::Term("index".into())]);
        assert!(q.excluded.is_empty());
        assert_eq!(q.fields, default_boosts());
    }

    #[test]
    fn phrases_keep_relative_positions() {
        let q = parse("\"state of the art\" -draft");
        assert_eq!(q.required, vec![Clause::Phrase(vec![("state".into(), 0), ("art".into(), 3)])]);
        assert_eq!(q.excluded, vec![Clause::Term("draft".into())]);
    }

    #[test]
    fn stopword_only_query_is_empty() {
        assert!(parse("the and of").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        let clauses = split_clauses("a \"b c");
        assert_eq!(clauses[1], RawClause { negated: false, phrase: true, text: "b c".into() });
    }
}
