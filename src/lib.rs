pub mod app;
pub mod db;
pub mod format;
pub mod observable;
pub mod settings;
pub mod store;
pub mod tracker;
pub mod utils;

pub use app::{default_data_dir, AppState};
pub use db::{Database, SleepNight};
pub use format::{format_nights, Resources, StringTable};
pub use observable::{Mapped, Observer, ValueCell};
pub use store::SleepStore;
pub use tracker::{SleepTracker, TrackerPhase, TrackerTask};
