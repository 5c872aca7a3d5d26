// encoder.rs
//
// Constraints that hold for every K-run and never need refining:
//   (a) differing labels => not the same room
//   (b) every trace starts in the same room
//   (c) leader(i) <-> no earlier node is the same room; leader(0) holds
//   (d) exactly K leaders
//   (e) optional seed: same door from the same room leads to the same room

use crate::cnf::{exactly_k, ClauseBuilder, ClauseSet, Lit, Term, VarPool};
use crate::equiv_vars::EquivVars;
use crate::trace::{TraceModel, DOOR_COUNT};

/// Everything one K-run owns: variables, leaders and the growing clause set.
#[derive(Debug, Clone)]
pub struct Encoding {
    pub rooms: usize,
    pub pool: VarPool,
    pub vars: EquivVars,
    pub leaders: Vec<Lit>,
    pub clauses: ClauseSet,
}

pub fn encode_base(model: &TraceModel, rooms: usize, seed_determinism: bool) -> Encoding {
    let n = model.node_count();
    let mut pool = VarPool::new();
    let mut vars = EquivVars::new();
    let mut clauses = ClauseSet::new();

    // (a)
    for i in 0..n {
        for j in (i + 1)..n {
            if model.label(i) != model.label(j) {
                if let Some(c) = ClauseBuilder::new().fails(vars.get(&mut pool, i, j)).build() {
                    clauses.add(c);
                }
            }
        }
    }

    // (b)
    for (a, &i) in model.start_nodes.iter().enumerate() {
        for &j in &model.start_nodes[(a + 1)..] {
            if let Some(c) = ClauseBuilder::new().holds(vars.get(&mut pool, i, j)).build() {
                clauses.add(c);
            }
        }
    }

    // (e)
    let mut seeded = 0usize;
    if seed_determinism {
        let mut by_door = vec![Vec::new(); DOOR_COUNT];
        for st in &model.steps {
            by_door[st.door as usize].push(*st);
        }
        for group in &by_door {
            for (a, s1) in group.iter().enumerate() {
                for s2 in &group[(a + 1)..] {
                    // already forced apart by (a)
                    if model.label(s1.src) != model.label(s2.src) {
                        continue;
                    }
                    let guard = vars.get(&mut pool, s1.src, s2.src);
                    let then = vars.get(&mut pool, s1.dst, s2.dst);
                    if let Some(c) = ClauseBuilder::new().fails(guard).holds(then).build() {
                        clauses.add(c);
                        seeded += 1;
                    }
                }
            }
        }
    }

    // (c)
    let leaders: Vec<Lit> = (0..n).map(|_| Lit::pos(pool.next())).collect();
    if let Some(&first) = leaders.first() {
        clauses.unit(first);
    }
    for i in 1..n {
        let lead = leaders[i];
        let mut any_earlier = vec![lead];
        for j in 0..i {
            if let Term::Lit(eq) = vars.get(&mut pool, i, j) {
                clauses.add(vec![!lead, !eq]);
                any_earlier.push(eq);
            }
        }
        clauses.add(any_earlier);
    }

    // (d)
    exactly_k(&mut clauses, &mut pool, &leaders, rooms);

    tracing::debug!(
        rooms,
        nodes = n,
        pairs = vars.len(),
        seeded,
        clauses = clauses.len(),
        "base encoding ready"
    );

    Encoding {
        rooms,
        pool,
        vars,
        leaders,
        clauses,
    }
}
