use serde::{Deserialize, Serialize};

/// What to do with ports that no trace ever walked through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortCompletion {
    /// Emit only connections backed by an observed traversal.
    None,
    /// Close every remaining port as a self-loop onto the same door.
    #[default]
    Fill,
}

impl std::str::FromStr for PortCompletion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PortCompletion::None),
            "fill" => Ok(PortCompletion::Fill),
            other => Err(format!("unknown port completion mode: {other}")),
        }
    }
}

/// Knobs for one K-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Assert `Eq(i,j) -> Eq(dst(i),dst(j))` for every same-door step pair up front.
    pub seed_determinism: bool,
    pub port_completion: PortCompletion,
    /// `None` keeps refining until the oracle answers definitely.
    pub max_iterations: Option<usize>,
    /// Conflict budget per oracle call.
    pub conflict_limit: Option<i32>,
    /// Heartbeat interval in refinement iterations.
    pub progress_every: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            seed_determinism: true,
            port_completion: PortCompletion::Fill,
            max_iterations: None,
            conflict_limit: None,
            progress_every: 1,
        }
    }
}

/// Inclusive range of candidate room counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRange {
    pub min: usize,
    pub max: usize,
}

impl RoomRange {
    pub fn exact(rooms: usize) -> Self {
        Self {
            min: rooms,
            max: rooms,
        }
    }

    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<usize> {
        self.min..=self.max
    }
}

impl Default for RoomRange {
    fn default() -> Self {
        Self { min: 1, max: 128 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: SolveOptions =
            serde_json::from_str(r#"{"port_completion":"none","max_iterations":50}"#).unwrap();
        assert_eq!(opts.port_completion, PortCompletion::None);
        assert_eq!(opts.max_iterations, Some(50));
        assert!(opts.seed_determinism);
        assert_eq!(opts.progress_every, 1);
    }

    #[test]
    fn port_completion_parses_cli_spelling() {
        assert_eq!("fill".parse::<PortCompletion>(), Ok(PortCompletion::Fill));
        assert!("all".parse::<PortCompletion>().is_err());
    }

    #[test]
    fn exact_range_yields_one_k() {
        assert_eq!(RoomRange::exact(6).iter().collect::<Vec<_>>(), vec![6]);
    }
}
