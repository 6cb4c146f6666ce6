//! Criterion benchmarks for the hot paths: movegen, perft, evaluation
//! and a fixed-depth search.

use std::sync::atomic::AtomicBool;

use criterion::{criterion_group, criterion_main, Criterion};

use vanguard::board::{EvaluationState, MoveGen, Position};
use vanguard::search::{SearchLimits, SearchState, Searcher};

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

fn bench_movegen(c: &mut Criterion) {
    let pos = Position::from_fen(KIWIPETE, false).unwrap();
    c.bench_function("movegen_pseudo_legal", |b| {
        b.iter(|| pos.generate_pseudo_legal_moves(MoveGen::All).len())
    });
    c.bench_function("movegen_legal", |b| {
        b.iter(|| pos.generate_legal_moves().len())
    });
}

fn bench_perft(c: &mut Criterion) {
    c.bench_function("perft_startpos_4", |b| {
        let mut pos = Position::new();
        b.iter(|| pos.perft(4))
    });
    c.bench_function("perft_kiwipete_3", |b| {
        let mut pos = Position::from_fen(KIWIPETE, false).unwrap();
        b.iter(|| pos.perft(3))
    });
}

fn bench_evaluation(c: &mut Criterion) {
    let mut pos = Position::new();
    let mut eval = EvaluationState::new();
    eval.reset(&pos);
    let line = ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6"];

    c.bench_function("nnue_incremental_line", |b| {
        b.iter(|| {
            let mut total = 0i64;
            for uci in line {
                pos.push_uci(uci, false).unwrap();
                eval.push(&pos);
                total += i64::from(eval.evaluate(&pos));
            }
            for _ in line {
                pos.pop();
                eval.pop();
            }
            total
        })
    });
}

fn bench_search(c: &mut Criterion) {
    c.bench_function("search_depth_6", |b| {
        b.iter(|| {
            let pos = Position::from_fen(KIWIPETE, false).unwrap();
            let mut state = SearchState::new(16);
            let stop = AtomicBool::new(false);
            let limits = SearchLimits {
                depth: Some(6),
                ..Default::default()
            };
            let mut searcher = Searcher::new(pos, &mut state, &stop, limits);
            searcher.run(|_| {}).score
        })
    });
}

criterion_group!(
    benches,
    bench_movegen,
    bench_perft,
    bench_evaluation,
    bench_search
);
criterion_main!(benches);
