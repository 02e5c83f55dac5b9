//! Detection latency benchmarks
//!
//! Detection runs on every message before any network call, so it has to stay
//! in the microsecond range even with a few hundred terms loaded.
//!
//! Run with: cargo bench -p modshield-classifiers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modshield_classifiers::{Detector, DetectorConfig, Normalizer, SuffixMode, TermSet};
use modshield_core::Term;

fn term_set(count: usize) -> TermSet {
    let base = ["cat", "dog", "worm", "bad word", "rat", "toad", "slug", "weasel"];
    TermSet::new((0..count).map(|i| {
        let word = base[i % base.len()];
        Term::new(&format!("{}{}", word, "x".repeat(i / base.len())), "bench")
    }))
}

const TEXTS: &[(&str, &str)] = &[
    ("short_clean", "Hello, how are you today?"),
    ("short_obfuscated", "you are such a c.4.t"),
    ("medium_clean", "The quick brown fox jumps over the lazy dog. This is a test sentence with nothing to find."),
    ("medium_hit", "Honestly the whole thread is full of vv0rms and r@ts, mods please look at this."),
];

/// Detector over a small and a large term list
fn benchmark_detector(c: &mut Criterion) {
    for count in [8, 200] {
        let detector = Detector::new(term_set(count), &DetectorConfig::default());
        let mut group = c.benchmark_group(format!("Detector_{}_terms", count));
        group.sample_size(100);

        for (name, text) in TEXTS {
            group.bench_with_input(BenchmarkId::new("detect", name), text, |b, text| {
                b.iter(|| detector.detect(black_box(text)))
            });
        }
        group.finish();
    }
}

/// Literal vs obfuscated suffix handling
fn benchmark_suffix_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Suffix_Mode");
    for mode in [SuffixMode::Literal, SuffixMode::Obfuscated] {
        let config = DetectorConfig {
            suffix_mode: mode,
            ..Default::default()
        };
        let detector = Detector::new(term_set(50), &config);
        group.bench_with_input(
            BenchmarkId::new("detect", format!("{:?}", mode)),
            &"so many cats and c4ts here",
            |b, text| b.iter(|| detector.detect(black_box(text))),
        );
    }
    group.finish();
}

fn benchmark_normalizer(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    c.bench_function("normalize_medium", |b| {
        b.iter(|| normalizer.normalize(black_box("Y0u @re $uch a c.4.t, h0nestly. ÇÄŤ!")))
    });
}

criterion_group!(
    benches,
    benchmark_detector,
    benchmark_suffix_modes,
    benchmark_normalizer
);
criterion_main!(benches);
