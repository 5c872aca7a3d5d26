pub mod cegar;
pub mod cnf;
pub mod config;
pub mod encoder;
pub mod equiv_vars;
pub mod error;
pub mod finalize_map;
pub mod guess_map;
pub mod oracle;
pub mod sweep;
pub mod trace;
pub mod union_find;

pub use config::{PortCompletion, RoomRange, SolveOptions};
pub use error::{GuessError, MalformedInput};
pub use guess_map::GuessMap;
pub use sweep::{guess, guess_parallel, sweep, sweep_parallel, SweepSuccess};
pub use trace::TraceInput;
