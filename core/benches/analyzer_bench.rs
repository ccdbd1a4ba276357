use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docseek_core::analyzer::{Analyzer, Language};
use docseek_core::highlight::Highlighter;
use docseek_core::Document;
use std::collections::HashSet;

const SAMPLE: &str = "Inverted indexes map every normalized term to the documents that contain it. \
Queries are analyzed with the same rules as documents, so stemming and stop-word removal \
line up at both ends. Ranking uses BM25F with a boosted title field, and the highlighter \
picks the densest window of matches to show as a snippet. Ação, café and naïve résumés \
exercise the Unicode folding path. ";

fn bench_analyze(c: &mut Criterion) {
    let text = SAMPLE.repeat(50);
    let english = Analyzer::new(Language::English);
    let portuguese = Analyzer::new(Language::Portuguese);
    c.bench_function("analyze_english", |b| b.iter(|| english.analyze(black_box(&text))));
    c.bench_function("analyze_portuguese", |b| b.iter(|| portuguese.analyze(black_box(&text))));
}

fn bench_highlight(c: &mut Criterion) {
    let analyzer = Analyzer::new(Language::English);
    let doc = Document::new("/bench.txt", "bench.txt", SAMPLE.repeat(50), "txt");
    let terms: HashSet<String> = ["snippet", "ranking"].iter().filter_map(|w| analyzer.normalize_word(w)).collect();
    let highlighter = Highlighter::default();
    c.bench_function("highlight_snippet", |b| b.iter(|| highlighter.highlight(&analyzer, black_box(&doc), &terms)));
}

criterion_group!(benches, bench_analyze, bench_highlight);
criterion_main!(benches);
