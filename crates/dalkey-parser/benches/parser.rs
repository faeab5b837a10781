//! Parser benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dalkey_parser::{parse, transform_regexp};

const SAMPLE_SOURCE: &str = r#"
// Sample code for benchmarking
function fibonacci(n) {
    if (n <= 1) return n;
    return fibonacci(n - 1) + fibonacci(n - 2);
}

var Calculator = function () {
    this.result = 0;
};

Calculator.prototype.add = function (x, y) {
    return x + y;
};

Calculator.prototype.multiply = function (x, y) {
    return x * y;
};

var calc = new Calculator();
var numbers = [1, 2, 3, 4, 5];
var doubled = [];
for (var i = 0; i < numbers.length; i++) {
    doubled[i] = calc.multiply(numbers[i], 2);
}

var config = {
    name: 'calc',
    version: 3,
    get label() { return this.name; }
};

try {
    throw new Error('nope');
} catch (e) {
    calc.result = e ? 0 : 1;
}
"#;

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    group.throughput(Throughput::Bytes(SAMPLE_SOURCE.len() as u64));

    group.bench_function("sample", |b| {
        b.iter(|| {
            let (program, errors) = parse(black_box(SAMPLE_SOURCE));
            assert!(errors.is_empty());
            program
        });
    });

    group.finish();
}

fn bench_transform_regexp(c: &mut Criterion) {
    let mut group = c.benchmark_group("regexp");

    group.bench_function("safe-subset", |b| {
        b.iter(|| transform_regexp(black_box("([a-z]+)(?:[0-9]{2,4})|[A-Z][a-z]*")));
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_transform_regexp);
criterion_main!(benches);
