use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fwsc_lex::tokenize;
use fwsc_util::FileId;

fn bench_tokenize(c: &mut Criterion) {
    let unit = "class Main { val fact: Int => Int = (n: Int) => \
                if n <= 1 then 1 else n * fact(n - 1); \
                val main = () => printlnInt(fact(readInt())) }\n";
    let source = unit.repeat(64);

    c.bench_function("tokenize_64_classes", |b| {
        b.iter(|| tokenize(black_box(&source), FileId::DUMMY).unwrap())
    });
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
