use anyhow::Result;
use async_trait::async_trait;

use crate::{
    db::{Database, SleepNight},
    observable::Observer,
};

/// Storage the tracker needs. Any backend with these three calls will do.
#[async_trait]
pub trait SleepStore: Send + Sync + 'static {
    /// The most recently inserted night, whether or not it is still active.
    async fn get_tonight(&self) -> Result<Option<SleepNight>>;

    async fn insert(&self, night: &SleepNight) -> Result<()>;

    /// Every stored night, newest first, republished on change.
    fn all_nights(&self) -> Observer<Vec<SleepNight>>;
}

#[async_trait]
impl SleepStore for Database {
    async fn get_tonight(&self) -> Result<Option<SleepNight>> {
        Database::get_tonight(self).await
    }

    async fn insert(&self, night: &SleepNight) -> Result<()> {
        self.insert_night(night).await.map(|_| ())
    }

    fn all_nights(&self) -> Observer<Vec<SleepNight>> {
        self.nights()
    }
}
