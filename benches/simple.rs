use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hark::{Config, Grammar, IntentGraph, RecognizeOptions};

const TEMPLATE: &str = r#"
[LightOn]
light_name = (living room lamp | kitchen light | bedroom light | porch light)
turn on [the] <light_name>{name}
switch [the] <light_name>{name} on

[LightOff]
turn off [the] <LightOn.light_name>{name}
switch [the] <LightOn.light_name>{name} off

[SetBrightness]
set [the] brightness to (ten:10 | twenty:20 | fifty:50 | hundred:100){value!int}
dim [the] (living room lamp | bedroom light){name}

[SetColor]
set [the] light to (2 red | 1 blue | green | yellow | purple){color}
"#;

fn compiled_graph() -> IntentGraph {
    let grammar = Grammar::parse(TEMPLATE).unwrap();
    let grammar = hark::expand(&grammar, &Default::default(), &Default::default()).unwrap();
    hark::compile(&grammar).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut c = c.benchmark_group("simple");
    c.measurement_time(Duration::from_secs(10)).sample_size(100);

    c.bench_function("parse+expand+compile", |b| {
        b.iter(|| compiled_graph())
    });

    let graph = compiled_graph();
    let strict = RecognizeOptions {
        config: Config {
            fuzzy: false,
            ..Default::default()
        },
        ..Default::default()
    };
    c.bench_function("strict recognize", |b| {
        b.iter(|| {
            hark::recognize_with_options(
                black_box(&graph),
                "turn on the living room lamp",
                &strict,
            )
            .unwrap()
        })
    });

    let mut fuzzy = RecognizeOptions::default();
    fuzzy.stop_words.insert("please".to_string());
    c.bench_function("fuzzy recognize", |b| {
        b.iter(|| {
            hark::recognize_with_options(
                black_box(&graph),
                "please turn on the living room lamp",
                &fuzzy,
            )
            .unwrap()
        })
    });

    c.bench_function("fuzzy recognize (no match)", |b| {
        b.iter(|| {
            hark::recognize_with_options(black_box(&graph), "play some music", &fuzzy).unwrap()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
