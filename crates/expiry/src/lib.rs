//! Resettable one-shot timers keyed by report id.
//!
//! Each armed id owns a tokio task that sleeps for the process-wide duration
//! and then runs its callback. Resetting aborts the task and respawns it from
//! the retained callback; cancelling aborts and forgets. A firing timer
//! removes itself from the set before invoking the callback, so the callback
//! must tolerate the report having been closed concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("no timer armed for \"{0}\"")]
    UnknownTimer(String),
}

pub type Result<T> = std::result::Result<T, TimerError>;

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Callback = Arc<dyn Fn() -> BoxedFuture + Send + Sync>;

struct TimerEntry {
    callback: Callback,
    handle: JoinHandle<()>,
}

pub struct TimerSet {
    duration: Duration,
    timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
}

impl TimerSet {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Arm a timer for `id`. An existing timer for the same id is replaced
    /// and its countdown discarded.
    pub fn arm<F, Fut>(&self, id: &str, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback = Arc::new(move || Box::pin(callback()) as BoxedFuture);
        let handle = self.spawn_timer(id.to_string(), Arc::clone(&callback));
        let mut timers = self.timers.lock().unwrap();
        if let Some(prev) = timers.insert(id.to_string(), TimerEntry { callback, handle }) {
            prev.handle.abort();
        }
    }

    /// Restart the countdown for an armed timer.
    pub fn reset(&self, id: &str) -> Result<()> {
        let mut timers = self.timers.lock().unwrap();
        let entry = timers
            .get_mut(id)
            .ok_or_else(|| TimerError::UnknownTimer(id.to_string()))?;
        entry.handle.abort();
        entry.handle = self.spawn_timer(id.to_string(), Arc::clone(&entry.callback));
        Ok(())
    }

    /// Stop and discard the timer for `id`, if any.
    pub fn cancel(&self, id: &str) {
        if let Some(entry) = self.timers.lock().unwrap().remove(id) {
            entry.handle.abort();
        }
    }

    /// Number of currently armed timers.
    pub fn armed(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    fn spawn_timer(&self, id: String, callback: Callback) -> JoinHandle<()> {
        let timers = Arc::clone(&self.timers);
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            timers.lock().unwrap().remove(&id);
            callback().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: &Arc<AtomicUsize>) -> impl Fn() -> BoxedFuture + Send + Sync {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as BoxedFuture
        }
    }

    #[tokio::test]
    async fn armed_timer_fires_once_and_forgets_itself() {
        let set = TimerSet::new(Duration::from_millis(20));
        let fired = Arc::new(AtomicUsize::new(0));
        set.arm("r1", counting_callback(&fired));
        assert_eq!(set.armed(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(set.armed(), 0);
    }

    #[tokio::test]
    async fn reset_postpones_firing() {
        let set = TimerSet::new(Duration::from_millis(60));
        let fired = Arc::new(AtomicUsize::new(0));
        set.arm("r1", counting_callback(&fired));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            set.reset("r1").expect("reset");
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_stops_the_timer() {
        let set = TimerSet::new(Duration::from_millis(20));
        let fired = Arc::new(AtomicUsize::new(0));
        set.arm("r1", counting_callback(&fired));
        set.cancel("r1");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(set.armed(), 0);
    }

    #[tokio::test]
    async fn reset_of_unknown_timer_is_an_error() {
        let set = TimerSet::new(Duration::from_millis(20));
        assert!(matches!(
            set.reset("missing"),
            Err(TimerError::UnknownTimer(_)),
        ));
    }

    #[tokio::test]
    async fn rearming_replaces_the_previous_timer() {
        let set = TimerSet::new(Duration::from_millis(30));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        set.arm("r1", counting_callback(&first));
        set.arm("r1", counting_callback(&second));
        assert_eq!(set.armed(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
