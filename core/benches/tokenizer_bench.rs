use criterion::{criterion_group, criterion_main, Criterion};
use ir_core::tokenizer::{tokenize, Analyzer};

const TEXT: &str = "Davis is a city in Yolo County, California. It is the home of the University \
of California, Davis, and has a population of roughly sixty-six thousand. The city is known for \
its bicycles, its farmers market, and its many parks and greenbelts. Students make up a large \
share of the residents during the academic year.";

fn bench_tokenize(c: &mut Criterion) {
    let text = TEXT.repeat(50);
    c.bench_function("tokenize_plain", |b| b.iter(|| tokenize(&text)));
    let analyzer = Analyzer::new(true, true);
    c.bench_function("tokenize_stem_stopwords", |b| b.iter(|| analyzer.tokenize(&text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
