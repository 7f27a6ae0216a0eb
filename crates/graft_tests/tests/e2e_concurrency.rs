//! E2E Tests: Concurrency & Cancellation
//!
//! Worker-pool evaluation must be bit-identical to the single-worker
//! path; cancellation aborts with a `Cancelled` error; snapshots stay
//! isolated from evaluation writes.

mod common;

use common::to_yaml;
use graft_base::ErrorKind;
use graft_engine::{DataflowOrder, Engine, EngineOptions, MergeOptions};
use graft_tree::Path;

const WIDE_DOC: &str = "\
meta:
  app: demo
  env: prod
a: (( concat meta.app \"-a\" ))
b: (( concat meta.app \"-b\" ))
c: (( concat meta.env \"-c\" ))
d: (( calc 6 * 7 ))
e: (( grab meta.app ))
f: (( join \"/\" parts ))
parts: [x, y, z]
g: (( grab a ))
h: (( concat b \"+\" c ))
";

fn run(options: EngineOptions) -> String {
    let tree = Engine::new(options)
        .merge_and_evaluate(&[WIDE_DOC], &MergeOptions::new())
        .unwrap();
    to_yaml(&tree)
}

#[test]
fn e2e_parallel_output_matches_single_worker() {
    let single = run(EngineOptions::new());
    let parallel = run(EngineOptions::new().with_max_concurrency(4));
    assert_eq!(single, parallel);
}

#[test]
fn e2e_parallel_runs_are_deterministic() {
    let first = run(EngineOptions::new().with_max_concurrency(8));
    for _ in 0..5 {
        assert_eq!(first, run(EngineOptions::new().with_max_concurrency(8)));
    }
}

#[test]
fn e2e_alphabetical_runs_are_bit_identical() {
    let options = || EngineOptions::new().with_dataflow_order(DataflowOrder::Alphabetical);
    assert_eq!(run(options()), run(options()));
}

#[test]
fn e2e_insertion_order_also_converges() {
    let single = run(EngineOptions::new().with_dataflow_order(DataflowOrder::Insertion));
    let parallel = run(EngineOptions::new()
        .with_dataflow_order(DataflowOrder::Insertion)
        .with_max_concurrency(4));
    assert_eq!(single, parallel);
}

#[test]
fn e2e_cancelled_before_start_aborts() {
    let engine = Engine::new(EngineOptions::new());
    engine.cancel_token().cancel();
    let errors = engine
        .merge_and_evaluate(&["a: 1\n"], &MergeOptions::new())
        .unwrap_err();
    assert!(errors.contains_kind(ErrorKind::Cancelled));
}

#[test]
fn e2e_evaluation_is_idempotent() {
    let engine = Engine::new(EngineOptions::new());
    let tree = engine
        .merge_and_evaluate(&[WIDE_DOC], &MergeOptions::new())
        .unwrap();
    let once = to_yaml(&tree);

    let again = engine
        .merge_and_evaluate(&[&once], &MergeOptions::new())
        .unwrap();
    assert_eq!(once, to_yaml(&again));
}

#[test]
fn e2e_snapshot_isolated_from_evaluation() {
    let engine = Engine::new(EngineOptions::new());
    let docs = engine.parse(&["a: 1\nb: (( grab a ))\n"]).unwrap();
    let outcome = engine.merge(&docs, &MergeOptions::new()).unwrap();
    let mut tree = outcome.tree;

    let before = tree.snapshot();
    engine.evaluate(&mut tree).unwrap();

    let b = Path::parse("b").unwrap();
    assert_eq!(
        before.get(&b).unwrap().as_str(),
        Some("(( grab a ))")
    );
    assert_eq!(tree.get(&b).unwrap().as_int(), Some(1));
}
