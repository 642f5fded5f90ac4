//! # Notebook Benchmarks
//!
//! Throughput of the save path (resolve + link + upsert) and of the sweep.
//!
//! Run with: `cargo bench -p notegraph-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use notegraph_core::{
    EntityKind, EntityResolver, Extraction, FixedExtractor, GraphPolicy, NoteDraft, Notebook,
    RedbStore, Sweeper,
};
use std::collections::BTreeMap;
use std::hint::black_box;

/// Extraction naming `width` people from a pool of `pool`, chained by
/// "knows" relations.
fn extraction(seed: usize, width: usize, pool: usize) -> Extraction {
    let names: Vec<String> = (0..width)
        .map(|i| format!("person {}", (seed + i) % pool))
        .collect();
    let mut extraction = Extraction::default();
    for name in &names {
        extraction = extraction.with_entity(EntityKind::Person, name.clone());
    }
    for pair in names.windows(2) {
        extraction = extraction.with_relation(pair[0].clone(), pair[1].clone(), "knows");
    }
    extraction
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_save_notes(c: &mut Criterion) {
    let mut group = c.benchmark_group("save_notes");

    for notes in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(notes), notes, |b, &notes| {
            b.iter(|| {
                let notebook = Notebook::in_memory(GraphPolicy::default()).expect("notebook");
                for i in 0..notes {
                    let extractor = FixedExtractor::new(extraction(i, 4, 50));
                    notebook
                        .save_note(
                            &extractor,
                            NoteDraft::new(format!("benchmark note {}", i)),
                            &mut |_| {},
                        )
                        .expect("save");
                }
                black_box(notebook.stats().expect("stats"))
            });
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let policy = GraphPolicy::default();
            b.iter(|| {
                let store = RedbStore::open_in_memory().expect("store");
                let resolver = EntityResolver::new(&policy);
                let txn = store.write().expect("write");
                for i in 0..size {
                    let name = format!("entity {}", i % (size / 2));
                    let resolved = resolver
                        .resolve(&txn, EntityKind::Other, &name, &BTreeMap::new())
                        .expect("resolve");
                    black_box(resolved);
                }
                txn.commit().expect("commit");
            });
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let store = RedbStore::open_in_memory().expect("store");
                let txn = store.write().expect("write");
                let note = txn.insert_memory("bench", Vec::new()).expect("note");
                for i in 0..size {
                    let entity = txn
                        .insert_entity(EntityKind::Other, &format!("e{}", i), BTreeMap::new())
                        .expect("insert");
                    if i % 2 == 0 {
                        txn.link(note.id, entity.id).expect("link");
                    }
                }
                black_box(Sweeper::sweep(&txn).expect("sweep"));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_save_notes, bench_resolve, bench_sweep);
criterion_main!(benches);
