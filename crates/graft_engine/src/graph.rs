//! Operator-call collection and the dependency-graph scheduler.
//!
//! For each phase, the tree is walked depth-first (mappings in insertion
//! order, sequences by index) collecting opcall leaves into [`Job`]s.
//! Each job's dependencies are the tree references its expression
//! mentions, canonicalized against the current tree; a reference that
//! does not resolve is depth-stripped to its nearest existing ancestor,
//! and contributes no edge at all if that strips it to the root.
//!
//! # Conditional dependencies
//!
//! References inside an alternation chain that carries a literal branch
//! are tagged conditional: the literal guarantees the chain can resolve,
//! so a cycle through those references is survivable. Conditional edges
//! still order evaluation when satisfiable, but they are ignored for
//! cycle detection — when Kahn's algorithm stalls, a job whose every
//! unsatisfied in-edge is conditional is released (tie-break first);
//! a stall with no such job is a fatal cycle naming every remaining path.

use crate::op::{DependencyKind, Phase, Registry, TrackedDependency};
use crate::options::{DataflowOrder, EngineOptions};
use graft_base::MultiError;
use graft_lang::parser::{is_opcall, parse_expression};
use graft_lang::Expr;
use graft_tree::{Path, Segment, Value};
use log::{debug, trace};

/// One schedulable operator call.
#[derive(Debug, Clone)]
pub struct Job {
    /// Document scan order, used for `DataflowOrder::Insertion`.
    pub index: usize,
    /// Canonical path of the opcall leaf.
    pub cursor: Path,
    /// The original leaf text, used to verify the leaf is still intact
    /// when the job finally runs.
    pub source: String,
    /// Operator name.
    pub name: String,
    /// The parsed call expression.
    pub expr: Expr,
    pub phase: Phase,
    pub deps: Vec<TrackedDependency>,
}

/// Walks the tree and builds the jobs of one phase. Parse failures are
/// collected, not fatal, so one run reports every bad expression.
pub fn collect_jobs(
    root: &Value,
    phase: Phase,
    registry: &Registry,
    options: &EngineOptions,
) -> (Vec<Job>, MultiError) {
    let mut collector = Collector {
        root,
        phase,
        registry,
        parse_opts: registry.parse_options(options.use_enhanced_parser),
        jobs: Vec::new(),
        errors: MultiError::new(),
    };
    collector.walk(root, &Path::root());
    (collector.jobs, collector.errors)
}

struct Collector<'a> {
    root: &'a Value,
    phase: Phase,
    registry: &'a Registry,
    parse_opts: graft_lang::ParseOptions,
    jobs: Vec<Job>,
    errors: MultiError,
}

impl<'a> Collector<'a> {
    fn walk(&mut self, node: &Value, path: &Path) {
        match node {
            Value::Map(entries) => {
                for (key, child) in entries.iter() {
                    self.walk(child, &path.child(Segment::Key(key.clone())));
                }
            }
            Value::List(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.walk(child, &path.child(Segment::Index(i)));
                }
            }
            Value::String(leaf) if is_opcall(leaf) => self.visit_leaf(leaf, path),
            _ => {}
        }
    }

    fn visit_leaf(&mut self, leaf: &str, path: &Path) {
        let expr = match parse_expression(leaf, &self.parse_opts) {
            Ok(expr) => expr,
            Err(e) => {
                // Report parse failures in the first phase only; later
                // phases never run once a phase ends with errors.
                if self.phase == Phase::Merge {
                    self.errors.push(e.with_path(path.to_string()));
                }
                return;
            }
        };
        let Expr::Call { name, args, .. } = &expr else {
            return;
        };
        let Some(op) = self.registry.get(name) else {
            trace!("scheduler: leaving unknown operator '{name}' at {path} untouched");
            return;
        };
        if op.phase() != self.phase {
            return;
        }

        let auto = self.auto_dependencies(&expr);
        let deps = op.dependencies(path, args, auto);
        trace!(
            "scheduler: job '{name}' at {path} with {} dependenc{}",
            deps.len(),
            if deps.len() == 1 { "y" } else { "ies" }
        );
        self.jobs.push(Job {
            index: self.jobs.len(),
            cursor: path.clone(),
            source: leaf.to_string(),
            name: name.clone(),
            expr: expr.clone(),
            phase: self.phase,
            deps,
        });
    }

    /// References mentioned by the expression, canonicalized, with
    /// conditional tagging applied to guarded alternation chains.
    fn auto_dependencies(&self, expr: &Expr) -> Vec<TrackedDependency> {
        let mut raw: Vec<(&Path, bool)> = Vec::new();
        collect_refs(expr, false, &mut raw);

        let mut deps: Vec<TrackedDependency> = Vec::new();
        for (path, conditional) in raw {
            let resolved = match path.canonicalize(self.root) {
                Ok(canonical) => canonical,
                Err(_) => {
                    let ancestor = path.nearest_existing_ancestor(self.root);
                    if ancestor.is_root() {
                        // Nothing of the reference exists yet; no edge.
                        continue;
                    }
                    ancestor
                }
            };
            let kind = if conditional {
                DependencyKind::Conditional
            } else {
                DependencyKind::Unconditional
            };
            let dep = TrackedDependency {
                path: resolved,
                kind,
            };
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        deps
    }
}

/// Walks an expression tagging references that sit in an alternation
/// chain with a literal branch.
fn collect_refs<'e>(expr: &'e Expr, guarded: bool, out: &mut Vec<(&'e Path, bool)>) {
    match expr {
        Expr::Reference(path, _) => out.push((path, guarded)),
        Expr::Literal(..) | Expr::EnvVar(..) => {}
        Expr::Alternation { branches, .. } => {
            let has_literal = branches.iter().any(|b| b.is_literal());
            for branch in branches {
                collect_refs(branch, guarded || has_literal, out);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_refs(arg, guarded, out);
            }
        }
        Expr::Unary { operand, .. } => collect_refs(operand, guarded, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_refs(lhs, guarded, out);
            collect_refs(rhs, guarded, out);
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
            ..
        } => {
            collect_refs(cond, guarded, out);
            collect_refs(then, guarded, out);
            collect_refs(otherwise, guarded, out);
        }
    }
}

/// The evaluation order: waves of job indices. Jobs within a wave have
/// no unresolved dependencies among themselves and may run in parallel;
/// waves run in sequence. Flattening the waves gives the single-worker
/// order.
pub fn schedule(jobs: &[Job], order: DataflowOrder) -> Result<Vec<Vec<usize>>, graft_base::Error> {
    let n = jobs.len();
    // edges[to] = [(from, kind)]: `to` waits on `from`.
    let mut in_edges: Vec<Vec<(usize, DependencyKind)>> = vec![Vec::new(); n];
    for (to, job) in jobs.iter().enumerate() {
        for dep in &job.deps {
            for (from, other) in jobs.iter().enumerate() {
                if from == to {
                    continue;
                }
                let overlaps = dep.path.is_ancestor_of(&other.cursor)
                    || other.cursor.is_ancestor_of(&dep.path);
                if !overlaps {
                    continue;
                }
                match in_edges[to].iter_mut().find(|(f, _)| *f == from) {
                    Some(edge) => {
                        // An unconditional edge dominates a conditional one.
                        if dep.kind == DependencyKind::Unconditional {
                            edge.1 = DependencyKind::Unconditional;
                        }
                    }
                    None => in_edges[to].push((from, dep.kind)),
                }
            }
        }
    }

    let tie_break = |a: usize, b: usize| match order {
        DataflowOrder::Alphabetical => jobs[a]
            .cursor
            .to_string()
            .cmp(&jobs[b].cursor.to_string())
            .then(jobs[a].index.cmp(&jobs[b].index)),
        DataflowOrder::Insertion => jobs[a].index.cmp(&jobs[b].index),
    };

    let mut done = vec![false; n];
    let mut waves: Vec<Vec<usize>> = Vec::new();
    let mut remaining = n;

    while remaining > 0 {
        let mut ready: Vec<usize> = (0..n)
            .filter(|&i| !done[i])
            .filter(|&i| in_edges[i].iter().all(|(from, _)| done[*from]))
            .collect();
        ready.sort_by(|&a, &b| tie_break(a, b));

        let wave = if !ready.is_empty() {
            ready
        } else {
            // Stalled: release the first job held back only by
            // conditional edges.
            let mut releasable: Vec<usize> = (0..n)
                .filter(|&i| !done[i])
                .filter(|&i| {
                    in_edges[i]
                        .iter()
                        .filter(|(from, _)| !done[*from])
                        .all(|(_, kind)| *kind == DependencyKind::Conditional)
                })
                .collect();
            releasable.sort_by(|&a, &b| tie_break(a, b));
            match releasable.first() {
                Some(&job) => {
                    debug!(
                        "scheduler: releasing {} past conditional dependencies",
                        jobs[job].cursor
                    );
                    vec![job]
                }
                None => {
                    let mut cycle: Vec<String> = (0..n)
                        .filter(|&i| !done[i])
                        .map(|i| jobs[i].cursor.to_string())
                        .collect();
                    cycle.sort();
                    return Err(graft_base::Error::cycle(format!(
                        "cycle detected involving: {}",
                        cycle.join(", ")
                    )));
                }
            }
        };

        for &job in &wave {
            done[job] = true;
            remaining -= 1;
        }
        waves.push(wave);
    }

    Ok(waves)
}
