//! The three-phase evaluator.
//!
//! For each phase (Merge, Param, Eval) the evaluator collects the
//! phase's jobs, schedules them into waves, and runs each job exactly
//! once: `Replace` responses substitute the value at the job's cursor,
//! `Inject` responses merge into the enclosing mapping (or splice into
//! the enclosing sequence, shifting the cursors of later jobs in the
//! same list). Failures accumulate per phase; independent subtrees keep
//! evaluating, and a non-empty error set at phase end aborts the
//! remaining phases.
//!
//! After a clean Eval phase come the post-processing passes: registered
//! sorts first, then pruning (the user's list united with
//! operator-registered paths) repeated to fixpoint so removals cascade.
//!
//! With `max_concurrency > 1`, each wave's jobs run on a worker pool
//! against an O(1) snapshot and their responses apply serially in wave
//! order, which keeps output bit-identical to the single-worker path.

use crate::context::{EvalState, OpContext};
use crate::graph::{collect_jobs, schedule, Job};
use crate::merge::merge_pair;
use crate::op::{check_arity, Action, Phase, Registry, Response};
use crate::options::EngineOptions;
use crate::pool::WorkerPool;
use graft_base::{CancelToken, Error, MultiError, Result};
use graft_lang::Expr;
use graft_tree::path::shared_identifier_field;
use graft_tree::{Path, Segment, Tree, Value};
use log::{debug, trace, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Runs the merge–param–eval pipeline over one tree.
pub struct Evaluator {
    registry: Registry,
    options: EngineOptions,
    state: Arc<EvalState>,
    cancel: CancelToken,
    prune_request: Vec<String>,
}

impl Evaluator {
    pub fn new(options: EngineOptions) -> Evaluator {
        Evaluator::with_state(options, EvalState::new())
    }

    /// Uses pre-wired state (secret stores, seeded registrations).
    pub fn with_state(options: EngineOptions, state: EvalState) -> Evaluator {
        Evaluator {
            registry: Registry::with_custom(&options.custom_operators),
            options,
            state: Arc::new(state),
            cancel: CancelToken::new(),
            prune_request: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Evaluator {
        self.cancel = cancel;
        self
    }

    /// Paths the caller wants removed after evaluation.
    pub fn with_prune_request(mut self, paths: Vec<String>) -> Evaluator {
        self.prune_request = paths;
        self
    }

    pub fn state(&self) -> &EvalState {
        &self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Evaluates the tree in place.
    pub fn evaluate(&self, tree: &mut Tree) -> std::result::Result<(), MultiError> {
        let mut pool = None;
        if self.options.max_concurrency > 1 {
            pool = Some(WorkerPool::new(self.options.max_concurrency));
        }

        for phase in [Phase::Merge, Phase::Param, Phase::Eval] {
            let mut errors = MultiError::new();
            if let Err(e) = self.cancel.check() {
                errors.push(e);
                return Err(errors);
            }

            let (mut jobs, collect_errors) =
                collect_jobs(tree.root(), phase, &self.registry, &self.options);
            errors.extend(collect_errors);
            debug!("eval: phase {} with {} job(s)", phase.as_str(), jobs.len());

            let waves = match schedule(&jobs, self.options.dataflow_order) {
                Ok(waves) => waves,
                Err(e) => {
                    errors.push(e);
                    return Err(errors);
                }
            };

            for wave in waves {
                if self.cancel.is_cancelled() {
                    errors.push(Error::cancelled("evaluation cancelled"));
                    return Err(errors);
                }
                match &pool {
                    Some(pool) if wave.len() > 1 => {
                        self.run_wave_parallel(pool, tree, &mut jobs, &wave, &mut errors)
                    }
                    _ => {
                        for index in wave {
                            self.run_job_inline(tree, &mut jobs, index, &mut errors);
                        }
                    }
                }
            }

            if !errors.is_empty() {
                return Err(errors);
            }
        }

        let mut errors = MultiError::new();
        self.apply_sorts(tree, &mut errors);
        self.apply_prunes(tree, &mut errors);
        errors.into_result()
    }

    fn run_job_inline(
        &self,
        tree: &mut Tree,
        jobs: &mut [Job],
        index: usize,
        errors: &mut MultiError,
    ) {
        let job = jobs[index].clone();
        if !leaf_is_intact(tree, &job) {
            trace!("eval: skipping {} (leaf no longer present)", job.cursor);
            return;
        }
        let root = tree.root().clone();
        let result = execute_job(
            &root,
            &job,
            &self.registry,
            &self.options,
            &self.state,
            &self.cancel,
        );
        self.apply_result(tree, jobs, &job, result, errors);
    }

    fn run_wave_parallel(
        &self,
        pool: &WorkerPool,
        tree: &mut Tree,
        jobs: &mut [Job],
        wave: &[usize],
        errors: &mut MultiError,
    ) {
        let snapshot = tree.snapshot();
        let (tx, rx) = crossbeam_channel::bounded::<(usize, Result<Response>)>(wave.len());

        let mut dispatched = Vec::new();
        for (slot, &index) in wave.iter().enumerate() {
            let job = jobs[index].clone();
            if !leaf_is_intact(tree, &job) {
                trace!("eval: skipping {} (leaf no longer present)", job.cursor);
                continue;
            }
            dispatched.push(index);
            let tx = tx.clone();
            let root = snapshot.root().clone();
            let registry = self.registry.clone();
            let options = self.options.clone();
            let state = Arc::clone(&self.state);
            let cancel = self.cancel.clone();
            pool.submit(Box::new(move || {
                let result = execute_job(&root, &job, &registry, &options, &state, &cancel);
                // The receiver only disappears on evaluator teardown.
                let _ = tx.send((slot, result));
            }));
        }
        drop(tx);

        let mut results: Vec<(usize, Result<Response>)> = rx.iter().collect();
        results.sort_by_key(|(slot, _)| *slot);

        // Responses apply serially, in wave (tie-break) order, so the
        // parallel path commutes with the single-worker one.
        for (slot, result) in results {
            let index = wave[slot];
            let job = jobs[index].clone();
            if !dispatched.contains(&index) {
                continue;
            }
            self.apply_result(tree, jobs, &job, result, errors);
        }
    }

    fn apply_result(
        &self,
        tree: &mut Tree,
        jobs: &mut [Job],
        job: &Job,
        result: Result<Response>,
        errors: &mut MultiError,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                errors.push(e.with_path(job.cursor.to_string()));
                return;
            }
        };
        match response.action {
            Action::Replace => {
                if let Err(e) = tree.set(&job.cursor, response.value) {
                    errors.push(e.with_path(job.cursor.to_string()));
                }
            }
            Action::Inject => {
                if let Err(e) = self.apply_inject(tree, jobs, job, response.value) {
                    errors.push(e.with_path(job.cursor.to_string()));
                }
            }
        }
    }

    /// Removes the call site and merges the injected value into the
    /// enclosing mapping, or splices it into the enclosing sequence.
    fn apply_inject(
        &self,
        tree: &mut Tree,
        jobs: &mut [Job],
        job: &Job,
        value: Value,
    ) -> Result<()> {
        let parent = job
            .cursor
            .parent()
            .ok_or_else(|| Error::evaluation("inject cannot target the document root"))?;
        let last = job.cursor.last().cloned().expect("cursor has a segment");

        match last {
            Segment::Key(_) => {
                tree.delete(&job.cursor)?;
                let existing = tree.get(&parent)?.clone();
                if !matches!(existing, Value::Map(_)) {
                    return Err(Error::evaluation(format!(
                        "cannot inject into a {}",
                        existing.type_name()
                    )));
                }
                if !matches!(value, Value::Map(_)) {
                    return Err(Error::validation(format!(
                        "cannot inject a {} into a map",
                        value.type_name()
                    )));
                }
                // Locally defined keys win over injected ones.
                let merged = merge_pair(&value, &existing)
                    .map_err(|multi| Error::evaluation(multi.to_string()))?;
                tree.set(&parent, merged)
            }
            Segment::Index(at) => {
                let existing = tree.get(&parent)?.clone();
                let Some(items) = existing.as_list() else {
                    return Err(Error::evaluation(format!(
                        "cannot splice into a {}",
                        existing.type_name()
                    )));
                };
                let mut spliced: Vec<Value> = items.clone();
                spliced.remove(at);
                let inserted = match value {
                    Value::List(new_items) => {
                        let n = new_items.len();
                        for (offset, item) in new_items.iter().enumerate() {
                            spliced.insert(at + offset, item.clone());
                        }
                        n
                    }
                    single => {
                        spliced.insert(at, single);
                        1
                    }
                };
                tree.set(&parent, Value::list(spliced))?;
                shift_list_cursors(jobs, &parent, at, inserted as i64 - 1);
                Ok(())
            }
            Segment::Select { .. } => Err(Error::evaluation(
                "inject cursor was not canonicalized",
            )),
        }
    }

    fn apply_sorts(&self, tree: &mut Tree, errors: &mut MultiError) {
        let registered = self
            .state
            .sort_paths
            .read()
            .expect("sort lock poisoned")
            .clone();
        for (path, field) in registered {
            if !tree.exists(&path) {
                // The list may have been restructured away; nothing to do.
                continue;
            }
            let value = match tree.get(&path) {
                Ok(v) => v.clone(),
                Err(e) => {
                    errors.push(e.with_path(path.to_string()));
                    continue;
                }
            };
            let Some(items) = value.as_list() else {
                errors.push(
                    Error::validation(format!(
                        "sort target is a {}, expected a list",
                        value.type_name()
                    ))
                    .with_path(path.to_string()),
                );
                continue;
            };
            match sort_list(items, field.as_deref()) {
                Ok(sorted) => {
                    if let Err(e) = tree.set(&path, Value::list(sorted)) {
                        errors.push(e.with_path(path.to_string()));
                    }
                }
                Err(e) => errors.push(e.with_path(path.to_string())),
            }
        }
    }

    fn apply_prunes(&self, tree: &mut Tree, errors: &mut MultiError) {
        let mut pending: Vec<Path> = Vec::new();
        for source in &self.prune_request {
            match Path::parse(source) {
                Ok(path) => pending.push(path),
                Err(e) => errors.push(e.with_path(format!("$.{source}"))),
            }
        }
        pending.extend(
            self.state
                .prune_paths
                .read()
                .expect("prune lock poisoned")
                .iter()
                .cloned(),
        );
        // Deeper (and later-indexed) paths first, so list removals do
        // not shift the targets of removals still pending.
        pending.sort_by(|a, b| b.to_string().cmp(&a.to_string()));
        pending.dedup();

        // Removals can expose further removals (a pruned parent makes a
        // child path unreachable); iterate until nothing changes.
        loop {
            let mut progressed = false;
            pending.retain(|path| match path.canonicalize(tree.root()) {
                Ok(canonical) => {
                    if tree.delete(&canonical).is_ok() {
                        trace!("prune: removed {canonical}");
                        progressed = true;
                        false
                    } else {
                        true
                    }
                }
                Err(_) => false, // already gone
            });
            if !progressed || pending.is_empty() {
                break;
            }
        }
    }
}

fn leaf_is_intact(tree: &Tree, job: &Job) -> bool {
    matches!(tree.get(&job.cursor), Ok(Value::String(s)) if *s == job.source)
}

/// Runs one job against an immutable root. Panics inside operator code
/// are caught and surfaced as operator errors; a failing job never tears
/// down the evaluation.
pub(crate) fn execute_job(
    root: &Value,
    job: &Job,
    registry: &Registry,
    options: &EngineOptions,
    state: &EvalState,
    cancel: &CancelToken,
) -> Result<Response> {
    let op = registry
        .get(&job.name)
        .ok_or_else(|| Error::operator(format!("no such operator '{}'", job.name)))?;
    let Expr::Call { args, .. } = &job.expr else {
        return Err(Error::evaluation("job expression is not an operator call"));
    };
    check_arity(&job.name, op.as_ref(), args)?;

    let ctx = OpContext {
        root,
        here: &job.cursor,
        state,
        options,
        registry,
        cancel,
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| op.run(&ctx, args))) {
        Ok(result) => result,
        Err(payload) => {
            warn!("eval: operator '{}' panicked at {}", job.name, job.cursor);
            Err(Error::operator(format!(
                "operator '{}' panicked: {}",
                job.name,
                panic_message(&payload)
            )))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Shifts the list-index cursors of still-pending jobs after a splice
/// at `parent`.
fn shift_list_cursors(jobs: &mut [Job], parent: &Path, at: usize, delta: i64) {
    if delta == 0 {
        return;
    }
    for job in jobs.iter_mut() {
        if !parent.is_ancestor_of(&job.cursor) || job.cursor.len() <= parent.len() {
            continue;
        }
        let mut segments = job.cursor.segments().to_vec();
        if let Segment::Index(i) = segments[parent.len()] {
            if i > at {
                segments[parent.len()] = Segment::Index((i as i64 + delta) as usize);
                job.cursor = Path::from_segments(segments);
            }
        }
    }
}

/// Stable sort of a list: numeric, string, or by mapping field.
fn sort_list(items: &[Value], field: Option<&str>) -> Result<Vec<Value>> {
    if items.len() < 2 {
        return Ok(items.to_vec());
    }

    let mut sorted = items.to_vec();
    if items.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
        sorted.sort_by(|a, b| {
            let (a, b) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });
        return Ok(sorted);
    }
    if items.iter().all(|v| matches!(v, Value::String(_))) {
        sorted.sort_by(|a, b| a.as_str().unwrap_or("").cmp(b.as_str().unwrap_or("")));
        return Ok(sorted);
    }
    if items.iter().all(|v| matches!(v, Value::Map(_))) {
        let field = match field {
            Some(f) => f.to_string(),
            None => shared_identifier_field(items)
                .ok_or_else(|| {
                    Error::validation(
                        "cannot sort maps without a shared identifier field (use `sort by <field>`)",
                    )
                })?
                .to_string(),
        };
        let mut keyed: Vec<(String, Value)> = Vec::with_capacity(items.len());
        for item in &sorted {
            let key = item
                .as_map()
                .and_then(|m| m.get(&field))
                .and_then(|v| v.stringify())
                .ok_or_else(|| {
                    Error::validation(format!("list entry lacks sortable field '{field}'"))
                })?;
            keyed.push((key, item.clone()));
        }
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        return Ok(keyed.into_iter().map(|(_, v)| v).collect());
    }
    Err(Error::validation(
        "cannot sort a list of mixed or non-sortable types",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_list_numeric_and_string() {
        let nums = vec![Value::Int(3), Value::Float(1.5), Value::Int(2)];
        let sorted = sort_list(&nums, None).unwrap();
        assert_eq!(sorted[0], Value::Float(1.5));
        assert_eq!(sorted[2], Value::Int(3));

        let strs = vec![Value::from("pear"), Value::from("apple")];
        let sorted = sort_list(&strs, None).unwrap();
        assert_eq!(sorted[0], Value::from("apple"));
    }

    #[test]
    fn sort_list_by_field() {
        let mut a = indexmap::IndexMap::new();
        a.insert("name".to_string(), Value::from("zeta"));
        let mut b = indexmap::IndexMap::new();
        b.insert("name".to_string(), Value::from("alpha"));
        let items = vec![Value::map(a), Value::map(b)];

        let sorted = sort_list(&items, Some("name")).unwrap();
        assert_eq!(
            sorted[0].as_map().unwrap()["name"],
            Value::from("alpha")
        );
        // The identifier field is auto-detected when unspecified.
        assert!(sort_list(&items, None).is_ok());
    }

    #[test]
    fn sort_list_mixed_types_fails() {
        let items = vec![Value::Int(1), Value::from("x")];
        assert!(sort_list(&items, None).is_err());
    }

    #[test]
    fn shift_cursors_after_splice() {
        let parent = Path::parse("xs").unwrap();
        let mut jobs = vec![Job {
            index: 0,
            cursor: Path::parse("xs[3].v").unwrap(),
            source: String::new(),
            name: "grab".into(),
            expr: Expr::Call {
                name: "grab".into(),
                args: vec![],
                pos: graft_base::Pos::new(1, 1),
            },
            phase: Phase::Eval,
            deps: vec![],
        }];
        // One element at index 1 replaced by three: later cursors shift by 2.
        shift_list_cursors(&mut jobs, &parent, 1, 2);
        assert_eq!(jobs[0].cursor.to_string(), "$.xs[5].v");
    }
}
