//! Criterion benchmarks for dependency validation and plan lookups.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use phasefield_bench::chain_attributes;
use phasefield_core::FieldId;
use phasefield_deps::{tokenize, validate, DependencyResolver, EquationSide};

fn bench_validate(c: &mut Criterion) {
    for fields in [8u32, 64, 256] {
        let set = chain_attributes(fields);
        c.bench_function(&format!("validate_{fields}_fields"), |b| {
            b.iter(|| {
                let plan = validate(black_box(&set)).unwrap();
                black_box(&plan);
            });
        });
    }
}

fn bench_resolver_new(c: &mut Criterion) {
    let set = chain_attributes(64);
    c.bench_function("resolver_new_64_fields", |b| {
        b.iter(|| {
            let resolver = DependencyResolver::new(set.clone()).unwrap();
            black_box(resolver.plan());
        });
    });
}

fn bench_flags_lookup(c: &mut Criterion) {
    let plan = validate(&chain_attributes(256)).unwrap();
    c.bench_function("flags_for_256_fields", |b| {
        b.iter(|| {
            for i in 0..256 {
                black_box(plan.flags_for(FieldId(i), EquationSide::Rhs));
                black_box(plan.flags_for(FieldId(i), EquationSide::Lhs));
            }
        });
    });
}

fn bench_tokenize(c: &mut Criterion) {
    let list = (0..64)
        .map(|i| match i % 4 {
            0 => format!("f{i}"),
            1 => format!("grad(f{i})"),
            2 => format!(" hess( f{i} ) "),
            _ => format!("change(f{i})"),
        })
        .collect::<Vec<_>>()
        .join(", ");
    c.bench_function("tokenize_64_tokens", |b| {
        b.iter(|| {
            let n = tokenize(black_box(&list)).count();
            black_box(n);
        });
    });
}

criterion_group!(
    benches,
    bench_validate,
    bench_resolver_new,
    bench_flags_lookup,
    bench_tokenize
);
criterion_main!(benches);
