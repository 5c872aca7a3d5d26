use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::trace::{Door, Label, TraceModel, DOOR_COUNT};

/// /guess 用の Map 構造
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessMap {
    pub rooms: Vec<Label>, // 各部屋の 2bit ラベル (0..3)
    #[serde(rename = "startingRoom")]
    pub starting_room: usize,
    pub connections: Vec<Connection>, // 無向辺（片側のみ列挙）
}

/// 接続 1 本
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// 端点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub room: usize,
    pub door: Door, // 0..5
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapCheckError {
    #[error("connection references room {room} door {door} outside the map")]
    OutOfRange { room: usize, door: Door },
    #[error("port room={room} door={door} appears in {count} connections")]
    PortReused { room: usize, door: Door, count: usize },
    #[error("port room={room} door={door} is not connected")]
    PortMissing { room: usize, door: Door },
    #[error("trace {trace}: expected {expected:?}, map gives {actual:?}")]
    TraceMismatch {
        trace: usize,
        expected: Vec<Label>,
        actual: Vec<Label>,
    },
}

impl GuessMap {
    /// (room, door) -> (room, door), both directions.
    pub fn port_table(&self) -> HashMap<Endpoint, Endpoint> {
        let mut m = HashMap::with_capacity(self.connections.len() * 2);
        for c in &self.connections {
            m.insert(c.from, c.to);
            m.insert(c.to, c.from);
        }
        m
    }

    /// Walks `plan` from the starting room and returns the labels seen,
    /// starting room included. Stops early at an unconnected port.
    pub fn simulate(&self, plan: &[Door]) -> Vec<Label> {
        let ports = self.port_table();
        let mut cur = self.starting_room;
        let mut labels = vec![self.rooms[cur]];
        for &door in plan {
            match ports.get(&Endpoint { room: cur, door }) {
                Some(next) => {
                    cur = next.room;
                    labels.push(self.rooms[cur]);
                }
                None => break,
            }
        }
        labels
    }

    /// Every one of the 6*K ports occurs in exactly one connection.
    pub fn check_matching(&self) -> Result<(), MapCheckError> {
        let k = self.rooms.len();
        let mut count = vec![[0usize; DOOR_COUNT]; k];
        for c in &self.connections {
            // a self-loop onto the same door occupies one port
            let pair = [c.from, c.to];
            let ends = if c.from == c.to { &pair[..1] } else { &pair[..] };
            for e in ends {
                if e.room >= k || e.door as usize >= DOOR_COUNT {
                    return Err(MapCheckError::OutOfRange {
                        room: e.room,
                        door: e.door,
                    });
                }
                count[e.room][e.door as usize] += 1;
            }
        }
        for (room, doors) in count.iter().enumerate() {
            for (door, &n) in doors.iter().enumerate() {
                let door = door as Door;
                match n {
                    1 => {}
                    0 => return Err(MapCheckError::PortMissing { room, door }),
                    other => {
                        return Err(MapCheckError::PortReused {
                            room,
                            door,
                            count: other,
                        })
                    }
                }
            }
        }
        Ok(())
    }
}

/// Replays every trace of `trace` over `map`.
pub fn verify_traces(map: &GuessMap, trace: &TraceModel) -> Result<(), MapCheckError> {
    for (i, plan) in trace.plans.iter().enumerate() {
        let expected: Vec<Label> = trace.labels(i).collect();
        let actual = map.simulate(plan);
        if actual != expected {
            return Err(MapCheckError::TraceMismatch {
                trace: i,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(a: (usize, Door), b: (usize, Door)) -> Connection {
        Connection {
            from: Endpoint { room: a.0, door: a.1 },
            to: Endpoint { room: b.0, door: b.1 },
        }
    }

    fn two_rooms() -> GuessMap {
        let mut connections = vec![conn((0, 0), (1, 0))];
        for d in 1..6 {
            connections.push(conn((0, d), (0, d)));
            connections.push(conn((1, d), (1, d)));
        }
        GuessMap {
            rooms: vec![0, 1],
            starting_room: 0,
            connections,
        }
    }

    #[test]
    fn serializes_with_starting_room_key() {
        let json = serde_json::to_value(two_rooms()).unwrap();
        assert_eq!(json["startingRoom"], 0);
        assert_eq!(json["connections"][0]["to"]["room"], 1);
    }

    #[test]
    fn simulate_follows_ports_both_ways() {
        let map = two_rooms();
        assert_eq!(map.simulate(&[0, 0, 3, 0]), vec![0, 1, 0, 0, 1]);
    }

    #[test]
    fn matching_detects_missing_and_reused_ports() {
        let mut map = two_rooms();
        assert_eq!(map.check_matching(), Ok(()));
        map.connections.pop();
        assert!(matches!(map.check_matching(), Err(MapCheckError::PortMissing { .. })));
        map.connections.push(conn((0, 1), (1, 5)));
        assert!(matches!(
            map.check_matching(),
            Err(MapCheckError::PortReused { room: 0, door: 1, count: 2 })
        ));
    }
}
