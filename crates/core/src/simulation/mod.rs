mod timer;
mod timestep;

pub use timer::{TimerId, TimerQueue};
pub use timestep::FixedTimestep;
