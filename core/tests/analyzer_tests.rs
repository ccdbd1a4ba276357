use docseek_core::analyzer::{Analyzer, Language};

fn words(analyzer: &Analyzer, text: &str) -> Vec<String> {
    analyzer.analyze(text).into_iter().map(|(w, _)| w).collect()
}

#[test]
fn it_normalizes_and_stems() {
    let words = words(&Analyzer::new(Language::English), "Running Runners RUN! The café menu.");
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // diacritics are folded after stemming: café -> cafe
    assert!(words.contains(&"cafe".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = words(&Analyzer::new(Language::English), "The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.len(), 5);
}

#[test]
fn analysis_is_deterministic() {
    let analyzer = Analyzer::new(Language::English);
    let text = "Indexing indexes, searching searches: naïve résumé";
    let once = analyzer.analyze(text);
    assert_eq!(once, analyzer.analyze(text));
    assert_eq!(once, Analyzer::new(Language::English).analyze(text));
    assert!(once.iter().all(|(w, _)| w.is_ascii()));
}

#[test]
fn query_and_document_terms_agree_across_case_and_accents() {
    let analyzer = Analyzer::new(Language::Portuguese);
    assert_eq!(analyzer.normalize_word("Ação"), analyzer.normalize_word("ação"));
    assert_eq!(analyzer.normalize_word("INDEXAÇÃO"), analyzer.normalize_word("indexação"));
}

#[test]
fn numbers_alone_are_not_terms() {
    let analyzer = Analyzer::new(Language::English);
    assert!(analyzer.analyze("2024 42").is_empty());
    assert_eq!(words(&analyzer, "rust2024"), vec!["rust2024".to_string()]);
}
