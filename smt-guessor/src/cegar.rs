// cegar.rs
//
// Counterexample-guided refinement for one candidate room count K.
//
//   SOLVING --UNSAT--> Infeasible(K)
//   SOLVING --SAT--> check determinism --conflict--> add clause, SOLVING
//                                      \--ok--> check transitivity --conflict--> add clause, SOLVING
//                                                                   \--ok--> check door budget --overflow--> add clause, SOLVING
//                                                                                                \--ok--> Solution
//
// Only the first conflict of a pass is turned into a clause. The partition is
// rebuilt from scratch on every model.
//
// Door budget: a room B needs one door per neighbour port it cannot share,
//   sum over A != B of max(#ports A->B, #ports B->A) + #ports B->B <= 6.
// The count only grows as more steps land in the same classes, so a room over
// budget stays over budget for any model that keeps the witness nodes
// partitioned the same way.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cnf::ClauseBuilder;
use crate::config::SolveOptions;
use crate::encoder::{encode_base, Encoding};
use crate::equiv_vars::EquivVars;
use crate::error::GuessError;
use crate::oracle::{Model, Oracle, Verdict};
use crate::trace::{Door, TraceModel, TransitionStep, DOOR_COUNT};
use crate::union_find::Partition;

/// Observed ports between one room and one neighbour, first step per port.
#[derive(Debug, Default)]
struct Incidence {
    incoming: Vec<TransitionStep>,
    outgoing: Vec<TransitionStep>,
}

/// room -> neighbour -> ports, with rooms given by `root`.
fn port_incidence(
    steps: &[TransitionStep],
    mut root: impl FnMut(usize) -> usize,
) -> BTreeMap<usize, BTreeMap<usize, Incidence>> {
    let mut ports: BTreeMap<(usize, Door), TransitionStep> = BTreeMap::new();
    for st in steps {
        ports.entry((root(st.src), st.door)).or_insert(*st);
    }
    let mut rooms: BTreeMap<usize, BTreeMap<usize, Incidence>> = BTreeMap::new();
    for (&(a, _), st) in &ports {
        let b = root(st.dst);
        rooms.entry(a).or_default().entry(b).or_default().outgoing.push(*st);
        if a != b {
            rooms.entry(b).or_default().entry(a).or_default().incoming.push(*st);
        }
    }
    rooms
}

fn doors_needed(room: usize, nbrs: &BTreeMap<usize, Incidence>) -> usize {
    nbrs.iter()
        .map(|(&a, inc)| {
            if a == room {
                inc.outgoing.len()
            } else {
                inc.incoming.len().max(inc.outgoing.len())
            }
        })
        .sum()
}

/// A model that passed every check.
#[derive(Debug, Clone)]
pub struct Solution {
    pub rooms: usize,
    pub model: Model,
    pub vars: EquivVars,
    pub partition: Partition,
    pub iterations: usize,
    pub clauses: usize,
}

impl Solution {
    /// Pairs whose `Eq` value disagrees with the partition closure.
    /// Zero iff the relation in the model is an equivalence.
    pub fn transitivity_violations(&self) -> usize {
        let n = self.partition.len();
        let mut bad = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let same = self.partition.root(i) == self.partition.root(j);
                if same != self.model.equiv(&self.vars, i, j) {
                    bad += 1;
                }
            }
        }
        bad
    }

    /// Rooms whose observed ports cannot fit into six doors.
    pub fn door_budget_violations(&self, trace: &TraceModel) -> usize {
        port_incidence(&trace.steps, |x| self.partition.root(x))
            .iter()
            .filter(|&(&room, nbrs)| doors_needed(room, nbrs) > DOOR_COUNT)
            .count()
    }

    /// Steps disagreeing with an earlier step on (room, door) -> room.
    pub fn determinism_violations(&self, trace: &TraceModel) -> usize {
        let mut seen: HashMap<(usize, Door), usize> = HashMap::new();
        let mut bad = 0;
        for st in &trace.steps {
            let key = (self.partition.root(st.src), st.door);
            let dst = self.partition.root(st.dst);
            if *seen.entry(key).or_insert(dst) != dst {
                bad += 1;
            }
        }
        bad
    }
}

/// Partition plus sorted adjacency of true `Eq` pairs for one model.
struct ModelView {
    partition: Partition,
    adj: Vec<Vec<usize>>,
}

impl ModelView {
    fn new(n: usize, vars: &EquivVars, model: &Model) -> Self {
        let mut partition = Partition::new(n);
        let mut adj = vec![Vec::new(); n];
        for ((i, j), v) in vars.iter() {
            if model.var(v) {
                partition.unite(i, j);
                adj[i].push(j);
                adj[j].push(i);
            }
        }
        for list in adj.iter_mut() {
            list.sort_unstable();
        }
        Self { partition, adj }
    }

    fn is_true(&self, a: usize, b: usize) -> bool {
        a == b || self.adj[a].binary_search(&b).is_ok()
    }

    /// Two steps leaving the same class through the same door but landing
    /// in different classes, ordered by source index.
    fn determinism_conflict(
        &mut self,
        steps: &[TransitionStep],
    ) -> Option<(TransitionStep, TransitionStep)> {
        let mut trans: HashMap<(usize, Door), (usize, TransitionStep)> = HashMap::new();
        for st in steps {
            let a = self.partition.find(st.src);
            let b = self.partition.find(st.dst);
            match trans.entry((a, st.door)) {
                Entry::Vacant(e) => {
                    e.insert((b, *st));
                }
                Entry::Occupied(e) => {
                    let (b2, prev) = *e.get();
                    if b2 != b {
                        return Some(if prev.src < st.src { (prev, *st) } else { (*st, prev) });
                    }
                }
            }
        }
        None
    }

    /// Any chain of true pairs from `from` to `to`, as a vertex list.
    fn path(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        let mut prev = vec![usize::MAX; self.adj.len()];
        prev[from] = from;
        let mut q = VecDeque::from([from]);
        while let Some(u) = q.pop_front() {
            if u == to {
                break;
            }
            for &v in &self.adj[u] {
                if prev[v] == usize::MAX {
                    prev[v] = u;
                    q.push_back(v);
                }
            }
        }
        if prev[to] == usize::MAX {
            return None;
        }
        let mut verts = vec![to];
        let mut u = to;
        while u != from {
            u = prev[u];
            verts.push(u);
        }
        verts.reverse();
        Some(verts)
    }

    /// Nodes witnessing the first room over its door budget.
    fn door_overflow(&mut self, steps: &[TransitionStep]) -> Option<(usize, Vec<usize>)> {
        let rooms = port_incidence(steps, |x| self.partition.find(x));
        let (&room, nbrs) = rooms
            .iter()
            .find(|&(&room, nbrs)| doors_needed(room, nbrs) > DOOR_COUNT)?;
        let mut witness: Vec<usize> = nbrs
            .values()
            .flat_map(|inc| inc.incoming.iter().chain(&inc.outgoing))
            .flat_map(|st| [st.src, st.dst])
            .collect();
        witness.sort_unstable();
        witness.dedup();
        Some((room, witness))
    }

    /// First `(a, j, b)` with `a < b`, `Eq(a,j)`, `Eq(j,b)` and `¬Eq(a,b)`,
    /// scanning the shared node `j` in ascending order.
    fn transitivity_conflict(&self) -> Option<(usize, usize, usize)> {
        for (j, nb) in self.adj.iter().enumerate() {
            for (x, &a) in nb.iter().enumerate() {
                for &b in &nb[(x + 1)..] {
                    if !self.is_true(a, b) {
                        return Some((a, j, b));
                    }
                }
            }
        }
        None
    }
}

/// One K-run: base encoding plus the refinement loop.
pub struct Refiner<'a> {
    trace: &'a TraceModel,
    options: &'a SolveOptions,
    enc: Encoding,
}

impl<'a> Refiner<'a> {
    pub fn new(trace: &'a TraceModel, rooms: usize, options: &'a SolveOptions) -> Self {
        let enc = encode_base(trace, rooms, options.seed_determinism);
        Self {
            trace,
            options,
            enc,
        }
    }

    pub fn clause_count(&self) -> usize {
        self.enc.clauses.len()
    }

    pub fn run<O: Oracle>(self, oracle: O) -> Result<Solution, GuessError> {
        self.run_until(oracle, None)
    }

    /// Like `run`, but gives up with `Cancelled` once `cancel` is set.
    /// The flag is only read between oracle calls.
    pub fn run_until<O: Oracle>(
        mut self,
        mut oracle: O,
        cancel: Option<&AtomicBool>,
    ) -> Result<Solution, GuessError> {
        let rooms = self.enc.rooms;
        let n = self.trace.node_count();
        let every = self.options.progress_every.max(1);
        let mut iteration = 0usize;

        loop {
            iteration += 1;
            if let Some(limit) = self.options.max_iterations {
                if iteration > limit {
                    return Err(GuessError::MaxIterationsExceeded {
                        rooms,
                        iterations: limit,
                    });
                }
            }
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(GuessError::Cancelled { rooms });
            }
            if iteration == 1 || iteration % every == 0 {
                tracing::info!(
                    "[K={}] iterate {}, clauses={}",
                    rooms,
                    iteration,
                    self.enc.clauses.len()
                );
            }

            let model = match oracle.solve(&self.enc.clauses) {
                Verdict::Sat(m) => m,
                Verdict::Unsat => return Err(GuessError::Infeasible { rooms }),
                Verdict::Unknown => {
                    tracing::warn!("[K={}] oracle returned unknown at iteration {}", rooms, iteration);
                    return Err(GuessError::Indeterminate { rooms, iteration });
                }
            };

            let mut view = ModelView::new(n, &self.enc.vars, &model);

            if let Some((s1, s2)) = view.determinism_conflict(&self.trace.steps) {
                self.add_determinism_clause(&view, s1, s2)?;
                continue;
            }

            if let Some((a, j, b)) = view.transitivity_conflict() {
                let vars = &mut self.enc.vars;
                let pool = &mut self.enc.pool;
                let clause = ClauseBuilder::new()
                    .fails(vars.get(pool, a, j))
                    .fails(vars.get(pool, j, b))
                    .holds(vars.get(pool, a, b))
                    .build()
                    .ok_or_else(|| {
                        GuessError::InvariantDecodeFailure(format!(
                            "transitivity conflict ({a},{j},{b}) is already satisfied"
                        ))
                    })?;
                tracing::debug!(
                    "[K={}] R1 add  (~m[{},{}] | ~m[{},{}] | m[{},{}])",
                    rooms,
                    a.min(j),
                    a.max(j),
                    j.min(b),
                    j.max(b),
                    a,
                    b
                );
                self.enc.clauses.add(clause);
                continue;
            }

            if let Some((room, witness)) = view.door_overflow(&self.trace.steps) {
                self.add_door_budget_clause(&view, room, &witness)?;
                continue;
            }

            tracing::info!("[K={}] success after {} iterations", rooms, iteration);
            return Ok(Solution {
                rooms,
                model,
                vars: self.enc.vars,
                partition: view.partition,
                iterations: iteration,
                clauses: self.enc.clauses.len(),
            });
        }
    }

    /// Guards every pair on a path joining the two sources and implies the
    /// destinations are equal, so the model cannot dodge the cut by
    /// reconnecting the sources through other nodes.
    fn add_determinism_clause(
        &mut self,
        view: &ModelView,
        s1: TransitionStep,
        s2: TransitionStep,
    ) -> Result<(), GuessError> {
        let rooms = self.enc.rooms;
        let vars = &mut self.enc.vars;
        let pool = &mut self.enc.pool;
        let verts = view
            .path(s1.src, s2.src)
            .unwrap_or_else(|| vec![s1.src, s2.src]);

        let mut clause = ClauseBuilder::new();
        for w in verts.windows(2) {
            clause = clause.fails(vars.get(pool, w[0], w[1]));
        }
        let clause = clause
            .holds(vars.get(pool, s1.dst, s2.dst))
            .build()
            .ok_or_else(|| {
                GuessError::InvariantDecodeFailure(format!(
                    "determinism conflict between nodes {} and {} shares a destination",
                    s1.src, s2.src
                ))
            })?;

        tracing::debug!(
            "[K={}] R2-path len={} implies m[{},{}]",
            rooms,
            verts.len() - 1,
            s1.dst,
            s2.dst
        );
        self.enc.clauses.add(clause);
        Ok(())
    }

    /// Forbids the witness nodes from falling into the same classes again:
    /// some guard inside a class breaks, or two classes merge.
    fn add_door_budget_clause(
        &mut self,
        view: &ModelView,
        room: usize,
        witness: &[usize],
    ) -> Result<(), GuessError> {
        let rooms = self.enc.rooms;
        let mut classes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &x in witness {
            classes.entry(view.partition.root(x)).or_default().push(x);
        }

        let mut guards = BTreeSet::new();
        for members in classes.values() {
            let head = members[0];
            for &m in &members[1..] {
                let verts = view.path(head, m).ok_or_else(|| {
                    GuessError::InvariantDecodeFailure(format!(
                        "nodes {head} and {m} share a class but no true path"
                    ))
                })?;
                for w in verts.windows(2) {
                    guards.insert((w[0].min(w[1]), w[0].max(w[1])));
                }
            }
        }
        let heads: Vec<usize> = classes.values().map(|m| m[0]).collect();

        let vars = &mut self.enc.vars;
        let pool = &mut self.enc.pool;
        let mut clause = ClauseBuilder::new();
        for &(i, j) in &guards {
            clause = clause.fails(vars.get(pool, i, j));
        }
        for (x, &a) in heads.iter().enumerate() {
            for &b in &heads[(x + 1)..] {
                clause = clause.holds(vars.get(pool, a, b));
            }
        }
        let clause = clause.build().ok_or_else(|| {
            GuessError::InvariantDecodeFailure(format!(
                "door budget conflict at room {room} is already satisfied"
            ))
        })?;

        tracing::debug!(
            "[K={}] R3 add  room={} classes={} guards={}",
            rooms,
            room,
            heads.len(),
            guards.len()
        );
        self.enc.clauses.add(clause);
        Ok(())
    }
}

/// Runs the loop for a single K with a fresh oracle.
pub fn solve_for_rooms<O: Oracle>(
    trace: &TraceModel,
    rooms: usize,
    options: &SolveOptions,
    oracle: O,
) -> Result<Solution, GuessError> {
    tracing::info!("[K={}] start CEGAR", rooms);
    Refiner::new(trace, rooms, options).run(oracle)
}
