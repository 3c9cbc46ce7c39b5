pub mod night;

pub use night::{now_millis, SleepNight, UNRATED_QUALITY};
