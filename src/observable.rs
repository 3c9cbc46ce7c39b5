//! Observable values for the UI surface.
//!
//! `ValueCell` is the writable side: `publish` replaces the value and wakes
//! every subscriber, `get` returns the last published value. `Observer` is a
//! read-only subscription and `Mapped` projects an observer through a pure
//! function, recomputing on every read so it can never lag its source.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct ValueCell<T> {
    tx: watch::Sender<T>,
    sealed: Mutex<bool>,
}

impl<T> ValueCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            sealed: Mutex::new(false),
        }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replaces the value and notifies subscribers. Returns `false` once sealed.
    pub fn publish(&self, value: T) -> bool {
        let sealed = lock(&self.sealed);
        if *sealed {
            return false;
        }
        self.tx.send_replace(value);
        true
    }

    /// Refuses every later publish. Waits for a publish already underway.
    pub fn seal(&self) {
        *lock(&self.sealed) = true;
    }

    pub fn is_sealed(&self) -> bool {
        *lock(&self.sealed)
    }

    pub fn observe(&self) -> Observer<T> {
        Observer {
            rx: self.tx.subscribe(),
            gate: None,
        }
    }
}

fn lock(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    match flag.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone)]
pub struct Observer<T> {
    rx: watch::Receiver<T>,
    gate: Option<CancellationToken>,
}

impl<T> Observer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Stops delivering change notifications once `token` is cancelled.
    pub fn until(mut self, token: CancellationToken) -> Self {
        self.gate = Some(token);
        self
    }

    /// Waits for the next publish. Returns `false` when no more will arrive,
    /// either because the source is gone or the gate was cancelled.
    pub async fn changed(&mut self) -> bool {
        match self.gate.clone() {
            Some(gate) => {
                if gate.is_cancelled() {
                    return false;
                }
                tokio::select! {
                    biased;
                    _ = gate.cancelled() => false,
                    result = self.rx.changed() => result.is_ok() && !gate.is_cancelled(),
                }
            }
            None => self.rx.changed().await.is_ok(),
        }
    }

    pub fn map<U, F>(self, map: F) -> Mapped<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Mapped {
            source: self,
            map: Arc::new(map),
        }
    }
}

pub struct Mapped<S, U> {
    source: Observer<S>,
    map: Arc<dyn Fn(&S) -> U + Send + Sync>,
}

impl<S, U> Clone for Mapped<S, U> {
    fn clone(&self) -> Self {
        Self {
            source: Observer {
                rx: self.source.rx.clone(),
                gate: self.source.gate.clone(),
            },
            map: Arc::clone(&self.map),
        }
    }
}

impl<S, U> Mapped<S, U>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn get(&self) -> U {
        (self.map)(&self.source.rx.borrow())
    }

    pub async fn changed(&mut self) -> bool {
        self.source.changed().await
    }
}
