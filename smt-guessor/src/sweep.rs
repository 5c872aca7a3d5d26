// sweep.rs
//
// Tries candidate room counts until one converges. K-runs share nothing but
// the read-only trace model, so the parallel variant only has to coordinate
// cancellation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::cegar::{solve_for_rooms, Refiner, Solution};
use crate::config::{RoomRange, SolveOptions};
use crate::error::GuessError;
use crate::finalize_map::{finalize_guess_map, FinalizeStats};
use crate::guess_map::GuessMap;
use crate::oracle::{CadicalOracle, Oracle};
use crate::trace::{build_trace_model, TraceInput, TraceModel};

#[derive(Debug, Clone)]
pub struct SweepSuccess {
    pub map: GuessMap,
    pub solution: Solution,
    pub stats: FinalizeStats,
}

fn finish(
    trace: &TraceModel,
    solution: Solution,
    options: &SolveOptions,
) -> Result<SweepSuccess, GuessError> {
    let report = finalize_guess_map(trace, &solution, options.port_completion)?;
    Ok(SweepSuccess {
        map: report.map,
        solution,
        stats: report.stats,
    })
}

/// Folds per-K failures in ascending K. `Infeasible` moves on, inconclusive
/// outcomes are remembered, anything else is fatal.
#[derive(Default)]
struct Failures {
    inconclusive: Option<GuessError>,
}

impl Failures {
    fn record(&mut self, err: GuessError) -> Result<(), GuessError> {
        match err {
            GuessError::Infeasible { rooms } => {
                tracing::info!("[K={}] infeasible", rooms);
                Ok(())
            }
            GuessError::Cancelled { .. } => Ok(()),
            e if e.is_inconclusive() => {
                tracing::warn!("skipping: {}", e);
                self.inconclusive.get_or_insert(e);
                Ok(())
            }
            e => Err(e),
        }
    }

    fn exhausted(self, range: RoomRange) -> GuessError {
        self.inconclusive.unwrap_or(GuessError::InfeasibleForAllK {
            min: range.min,
            max: range.max,
        })
    }
}

/// Smallest K in `range` that converges, one K at a time.
pub fn sweep<O, F>(
    trace: &TraceModel,
    range: RoomRange,
    options: &SolveOptions,
    mut make_oracle: F,
) -> Result<SweepSuccess, GuessError>
where
    O: Oracle,
    F: FnMut(usize) -> O,
{
    let mut failures = Failures::default();
    for k in range.iter() {
        match solve_for_rooms(trace, k, options, make_oracle(k)) {
            Ok(solution) => return finish(trace, solution, options),
            Err(e) => failures.record(e)?,
        }
    }
    Err(failures.exhausted(range))
}

/// Same answer as [`sweep`] with up to `jobs` K-runs on blocking threads.
///
/// A success cancels every larger K still running. Smaller K keep going and
/// take over if they succeed too.
pub async fn sweep_parallel<O, F>(
    trace: Arc<TraceModel>,
    range: RoomRange,
    options: SolveOptions,
    make_oracle: F,
    jobs: usize,
) -> Result<SweepSuccess, GuessError>
where
    O: Oracle + 'static,
    F: Fn(usize) -> O + Send + Sync + 'static,
{
    let make_oracle = Arc::new(make_oracle);
    let options = Arc::new(options);
    let jobs = jobs.max(1);

    let mut pending = range.iter().peekable();
    let mut running: BTreeMap<usize, Arc<AtomicBool>> = BTreeMap::new();
    let mut outcomes: BTreeMap<usize, GuessError> = BTreeMap::new();
    let mut best: Option<Solution> = None;
    let mut set = JoinSet::new();

    loop {
        while set.len() < jobs {
            let Some(&k) = pending.peek() else { break };
            if best.as_ref().is_some_and(|b| k > b.rooms) {
                break;
            }
            pending.next();

            let cancel = Arc::new(AtomicBool::new(false));
            running.insert(k, cancel.clone());
            let trace = trace.clone();
            let options = options.clone();
            let make_oracle = make_oracle.clone();
            set.spawn_blocking(move || {
                tracing::info!("[K={}] start CEGAR", k);
                let result = Refiner::new(&trace, k, &options).run_until(make_oracle(k), Some(&cancel));
                (k, result)
            });
        }

        let Some(joined) = set.join_next().await else { break };
        let (k, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                for flag in running.values() {
                    flag.store(true, Ordering::Relaxed);
                }
                return Err(GuessError::Worker(e.to_string()));
            }
        };
        running.remove(&k);

        match result {
            Ok(solution) if best.as_ref().map_or(true, |b| k < b.rooms) => {
                for (other, flag) in running.range((k + 1)..) {
                    tracing::debug!("[K={}] cancelled by success at K={}", other, k);
                    flag.store(true, Ordering::Relaxed);
                }
                best = Some(solution);
            }
            Ok(_) => {}
            Err(e) => {
                outcomes.insert(k, e);
            }
        }
    }

    let limit = best.as_ref().map_or(usize::MAX, |b| b.rooms);
    let mut failures = Failures::default();
    for (_, e) in outcomes.into_iter().take_while(|(k, _)| *k < limit) {
        failures.record(e)?;
    }
    match best {
        Some(solution) => finish(&trace, solution, &options),
        None => Err(failures.exhausted(range)),
    }
}

fn load(input: &TraceInput) -> Result<TraceModel, GuessError> {
    let trace = build_trace_model(input)?;
    tracing::info!(
        "traces={} nodes={} steps={}",
        trace.plans.len(),
        trace.node_count(),
        trace.steps.len()
    );
    Ok(trace)
}

/// Traces in, map out, with the CaDiCaL oracle, one K at a time.
///
/// Progress goes through `tracing`; how much of it shows is up to the
/// subscriber the caller installs.
pub fn guess(
    input: &TraceInput,
    range: RoomRange,
    options: &SolveOptions,
) -> Result<GuessMap, GuessError> {
    let trace = load(input)?;
    let limit = options.conflict_limit;
    sweep(&trace, range, options, |_| CadicalOracle::new(limit)).map(|s| s.map)
}

/// [`guess`] with up to `jobs` room counts in flight.
pub async fn guess_parallel(
    input: &TraceInput,
    range: RoomRange,
    options: SolveOptions,
    jobs: usize,
) -> Result<GuessMap, GuessError> {
    let trace = Arc::new(load(input)?);
    let limit = options.conflict_limit;
    sweep_parallel(trace, range, options, move |_| CadicalOracle::new(limit), jobs)
        .await
        .map(|s| s.map)
}
