pub mod controller;
pub mod state;

pub use controller::{SleepTracker, TrackerTask};
pub use state::{TrackerPhase, TrackerState};
