//! Benchmarks for seencache group operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seencache::{Group, GroupOptions};
use tempfile::TempDir;

fn group_benchmarks(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let group = Group::open("bench", temp_dir.path(), GroupOptions::new(100_000, 3)).unwrap();

    let keys: Vec<String> = (0..10_000).map(|i| format!("https://example.com/item/{}", i)).collect();
    group.insert_many(&keys);

    let mut i = 0usize;
    c.bench_function("insert", |b| {
        b.iter(|| {
            group.insert(black_box(&keys[i % keys.len()]));
            i += 1;
        })
    });

    c.bench_function("lookup_hit", |b| {
        b.iter(|| {
            i += 1;
            black_box(group.lookup(&keys[i % keys.len()], 0))
        })
    });

    c.bench_function("lookup_miss", |b| {
        b.iter(|| black_box(group.lookup("https://example.com/never-inserted", 0)))
    });

    c.bench_function("write_to_disk", |b| {
        b.iter(|| {
            group.insert(&keys[0]);
            black_box(group.write_to_disk())
        })
    });
}

criterion_group!(benches, group_benchmarks);
criterion_main!(benches);
