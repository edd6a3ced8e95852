mod arbiter;
mod config;
mod state;

pub use arbiter::{Authority, MatchError, ServeArbiter};
pub use config::MatchConfig;
pub use state::{MatchState, Phase, Side};
