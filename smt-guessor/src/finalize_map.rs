// finalize_map.rs
//
// 収束したモデル (Solution) から /guess 用 Map を構成する。
// - 判定: クラス数 == K / クラス内ラベル一致 / 開始ノードが同じ部屋 / 前向き遷移が一意
// - 構成: rooms / startingRoom / connections
//
// Any failed check is a defect in the refinement loop, never bad input:
// the loop already keeps every room within its six doors.

use crate::cegar::Solution;
use crate::config::PortCompletion;
use crate::error::GuessError;
use crate::guess_map::{Connection, Endpoint, GuessMap};
use crate::trace::{Door, Label, TraceModel, DOOR_COUNT};

pub struct FinalizeReport {
    pub map: GuessMap,
    pub stats: FinalizeStats,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinalizeStats {
    pub edges: usize,          // connections.len()
    pub observed_ports: usize, // ports fixed by a traversal
    pub reverse_observed: usize,
    pub filled: usize, // self-loops added by completion
}

fn decode_failure(msg: String) -> GuessError {
    tracing::error!("decode failed: {}", msg);
    GuessError::InvariantDecodeFailure(msg)
}

/// Room id per node, label per room, starting room.
fn decode_rooms(
    trace: &TraceModel,
    solution: &Solution,
) -> Result<(Vec<usize>, Vec<Label>, usize), GuessError> {
    let k = solution.partition.class_count();
    if k != solution.rooms {
        return Err(decode_failure(format!(
            "{} classes for K={}",
            k, solution.rooms
        )));
    }

    let room_of = solution.partition.canonical_ids();
    let mut labels: Vec<Option<Label>> = vec![None; k];
    for (idx, &room) in room_of.iter().enumerate() {
        let label = trace.label(idx);
        let slot = &mut labels[room];
        match *slot {
            None => *slot = Some(label),
            Some(l) if l != label => {
                return Err(decode_failure(format!(
                    "room {} mixes labels {} and {} (node {})",
                    room, l, label, idx
                )));
            }
            Some(_) => {}
        }
    }
    let labels = labels
        .into_iter()
        .enumerate()
        .map(|(room, l)| l.ok_or_else(|| decode_failure(format!("room {} has no members", room))))
        .collect::<Result<Vec<_>, _>>()?;

    let starting_room = match trace.start_nodes.first() {
        Some(&s) => room_of[s],
        None => return Err(decode_failure("trace set has no start node".to_string())),
    };
    if let Some(&s) = trace
        .start_nodes
        .iter()
        .find(|&&s| room_of[s] != starting_room)
    {
        return Err(decode_failure(format!(
            "start node {} is in room {}, expected {}",
            s, room_of[s], starting_room
        )));
    }

    Ok((room_of, labels, starting_room))
}

/// (room, door) -> room from the observed steps.
fn forward_ports(
    trace: &TraceModel,
    room_of: &[usize],
    rooms: usize,
) -> Result<Vec<[Option<usize>; DOOR_COUNT]>, GuessError> {
    let mut fwd = vec![[None; DOOR_COUNT]; rooms];
    for st in &trace.steps {
        let a = room_of[st.src];
        let b = room_of[st.dst];
        let slot = &mut fwd[a][st.door as usize];
        match *slot {
            None => *slot = Some(b),
            Some(prev) if prev != b => {
                return Err(decode_failure(format!(
                    "room {} door {} leads to both {} and {}",
                    a, st.door, prev, b
                )));
            }
            Some(_) => {}
        }
    }
    Ok(fwd)
}

/// Pairs each observed forward port with a door on its destination room.
/// A door whose own traversal leads back wins over an unobserved one.
fn pair_ports(
    fwd: &[[Option<usize>; DOOR_COUNT]],
    completion: PortCompletion,
    stats: &mut FinalizeStats,
) -> Result<Vec<Connection>, GuessError> {
    let rooms = fwd.len();
    let mut paired = vec![[false; DOOR_COUNT]; rooms];
    let mut connections = Vec::new();

    for a in 0..rooms {
        for door in 0..DOOR_COUNT {
            let Some(b) = fwd[a][door] else { continue };
            stats.observed_ports += 1;
            if paired[a][door] {
                continue;
            }
            let back = (0..DOOR_COUNT)
                .find(|&d| !paired[b][d] && fwd[b][d] == Some(a))
                .inspect(|_| stats.reverse_observed += 1)
                .or_else(|| (0..DOOR_COUNT).find(|&d| !paired[b][d] && fwd[b][d].is_none()))
                .ok_or_else(|| {
                    decode_failure(format!(
                        "no free door on room {} to pair with room {} door {}",
                        b, a, door
                    ))
                })?;
            paired[a][door] = true;
            paired[b][back] = true;
            connections.push(connection(
                Endpoint { room: a, door: door as Door },
                Endpoint { room: b, door: back as Door },
            ));
        }
    }

    if completion == PortCompletion::Fill {
        for (room, doors) in paired.iter().enumerate() {
            for door in (0..DOOR_COUNT).filter(|&d| !doors[d]) {
                let e = Endpoint { room, door: door as Door };
                connections.push(connection(e, e));
                stats.filled += 1;
            }
        }
    }

    connections.sort_by_key(|c| (c.from, c.to));
    Ok(connections)
}

fn connection(x: Endpoint, y: Endpoint) -> Connection {
    Connection {
        from: x.min(y),
        to: x.max(y),
    }
}

/// 入口: 判定→構成
pub fn finalize_guess_map(
    trace: &TraceModel,
    solution: &Solution,
    completion: PortCompletion,
) -> Result<FinalizeReport, GuessError> {
    let (room_of, rooms, starting_room) = decode_rooms(trace, solution)?;
    let fwd = forward_ports(trace, &room_of, rooms.len())?;
    let mut stats = FinalizeStats::default();
    let connections = pair_ports(&fwd, completion, &mut stats)?;
    stats.edges = connections.len();

    tracing::info!(
        "[K={}] decoded: edges={} observed_ports={} filled={}",
        solution.rooms,
        stats.edges,
        stats.observed_ports,
        stats.filled
    );

    Ok(FinalizeReport {
        map: GuessMap {
            rooms,
            starting_room,
            connections,
        },
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cegar::solve_for_rooms;
    use crate::config::SolveOptions;
    use crate::guess_map::verify_traces;
    use crate::oracle::CadicalOracle;
    use crate::trace::{build_trace_model, TraceInput};

    fn model(plans: &[&str], results: &[&[i64]]) -> TraceModel {
        build_trace_model(&TraceInput {
            plans: plans.iter().map(|p| p.to_string()).collect(),
            results: results.iter().map(|r| r.to_vec()).collect(),
        })
        .unwrap()
    }

    fn decode(m: &TraceModel, k: usize, completion: PortCompletion) -> Result<FinalizeReport, GuessError> {
        let sol = solve_for_rooms(m, k, &SolveOptions::default(), CadicalOracle::new(None)).unwrap();
        finalize_guess_map(m, &sol, completion)
    }

    fn ep(room: usize, door: Door) -> Endpoint {
        Endpoint { room, door }
    }

    #[test]
    fn single_room_gets_six_self_loops() {
        let m = model(&[""], &[&[3]]);
        let report = decode(&m, 1, PortCompletion::Fill).unwrap();
        let map = report.map;
        assert_eq!(map.rooms, vec![3]);
        assert_eq!(map.starting_room, 0);
        assert_eq!(map.connections.len(), 6);
        assert!(map.connections.iter().all(|c| c.from == c.to));
        assert_eq!(map.check_matching(), Ok(()));
        assert_eq!(report.stats.filled, 6);
    }

    #[test]
    fn two_room_example() {
        let m = model(&["0", "00"], &[&[0, 1], &[0, 1, 0]]);
        let map = decode(&m, 2, PortCompletion::Fill).unwrap().map;
        assert_eq!(map.rooms, vec![0, 1]);
        assert_eq!(map.starting_room, 0);
        assert_eq!(map.connections[0].from, ep(0, 0));
        assert_eq!(map.connections[0].to, ep(1, 0));
        assert_eq!(map.connections.len(), 11);
        assert_eq!(map.check_matching(), Ok(()));
        assert_eq!(verify_traces(&map, &m), Ok(()));
    }

    #[test]
    fn observed_reverse_door_is_preferred() {
        let m = model(&["03"], &[&[0, 1, 0]]);
        let report = decode(&m, 2, PortCompletion::Fill).unwrap();
        assert!(report
            .map
            .connections
            .iter()
            .any(|c| c.from == ep(0, 0) && c.to == ep(1, 3)));
        assert_eq!(report.stats.reverse_observed, 1);
        assert_eq!(verify_traces(&report.map, &m), Ok(()));
    }

    #[test]
    fn no_completion_keeps_only_observed_ports() {
        let m = model(&["03"], &[&[0, 1, 0]]);
        let map = decode(&m, 2, PortCompletion::None).unwrap().map;
        assert_eq!(map.connections.len(), 1);
        assert!(matches!(
            map.check_matching(),
            Err(crate::guess_map::MapCheckError::PortMissing { .. })
        ));
    }

    #[test]
    fn observed_self_transition_pairs_with_itself() {
        let m = model(&["2"], &[&[1, 1]]);
        let map = decode(&m, 1, PortCompletion::Fill).unwrap().map;
        assert_eq!(map.connections.len(), 6);
        assert_eq!(map.check_matching(), Ok(()));
        assert_eq!(map.simulate(&[2, 2]), vec![1, 1, 1]);
    }

    #[test]
    fn decode_is_idempotent() {
        let m = model(&["0123", "50"], &[&[0, 1, 2, 1, 0], &[0, 2, 0]]);
        let sol = solve_for_rooms(&m, 3, &SolveOptions::default(), CadicalOracle::new(None)).unwrap();
        let first = finalize_guess_map(&m, &sol, PortCompletion::Fill).unwrap();
        let second = finalize_guess_map(&m, &sol, PortCompletion::Fill).unwrap();
        assert_eq!(first.map, second.map);
        assert_eq!(first.stats, second.stats);
    }

    fn six_doors_into_one_label() -> TraceModel {
        // all six doors of the start room reach label 1, and door 0 of that
        // room goes on to label 2
        model(
            &["0", "1", "2", "3", "4", "5", "00"],
            &[&[0, 1], &[0, 1], &[0, 1], &[0, 1], &[0, 1], &[0, 1], &[0, 1, 2]],
        )
    }

    #[test]
    fn over_budget_room_is_split_before_decoding() {
        let m = six_doors_into_one_label();
        let err = solve_for_rooms(&m, 3, &SolveOptions::default(), CadicalOracle::new(None)).unwrap_err();
        assert_eq!(err, GuessError::Infeasible { rooms: 3 });

        let map = decode(&m, 4, PortCompletion::Fill).unwrap().map;
        assert_eq!(map.rooms, vec![0, 1, 1, 2]);
        assert_eq!(map.check_matching(), Ok(()));
        assert_eq!(verify_traces(&map, &m), Ok(()));
    }

    #[test]
    fn unpairable_forward_table_is_a_decode_failure() {
        let mut fwd = vec![[None; DOOR_COUNT]; 3];
        fwd[0] = [Some(1); DOOR_COUNT];
        fwd[1][0] = Some(2);
        let mut stats = FinalizeStats::default();
        let err = pair_ports(&fwd, PortCompletion::Fill, &mut stats).unwrap_err();
        assert!(matches!(err, GuessError::InvariantDecodeFailure(_)));
    }
}
