//! Per-connection inactivity timer.
//!
//! `Active -(window elapses)-> Disconnecting -(teardown)-> Terminated`. Any call to
//! [`Watchdog::touch`] moves the deadline to `now + window`; it never extends additively.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogState {
    Active,
    Disconnecting,
    Terminated,
}

pub struct Watchdog {
    window: Duration,
    state: Arc<Mutex<WatchdogState>>,
    deadline: watch::Sender<Instant>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Arms the timer. `on_expire` runs at most once, and never after [`Watchdog::cancel`].
    pub fn start<F>(window: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(Mutex::new(WatchdogState::Active));
        let (deadline, mut deadline_rx) = watch::channel(Instant::now() + window);

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let until = *deadline_rx.borrow_and_update();
                tokio::select! {
                    _ = time::sleep_until(until) => {
                        match deadline_rx.has_changed() {
                            // touched while the sleep was completing
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(_) => return,
                        }
                    }
                    changed = deadline_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            let mut state = lock(&task_state);
            if *state != WatchdogState::Active {
                return;
            }
            *state = WatchdogState::Disconnecting;
            on_expire();
        });

        Self {
            window,
            state,
            deadline,
            task,
        }
    }

    /// Resets the deadline to a full window from now.
    pub fn touch(&self) {
        if *lock(&self.state) == WatchdogState::Active {
            self.deadline.send_replace(Instant::now() + self.window);
        }
    }

    pub fn state(&self) -> WatchdogState {
        *lock(&self.state)
    }

    /// Stops the timer. Once this returns the expiry callback can no longer run.
    pub fn cancel(&self) {
        *lock(&self.state) = WatchdogState::Terminated;
        self.task.abort();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(state: &Mutex<WatchdogState>) -> MutexGuard<'_, WatchdogState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_secs(30 * 60);

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    fn counting_watchdog() -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let watchdog = Watchdog::start(WINDOW, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (watchdog, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_expires_exactly_once() {
        // given:
        let (watchdog, fired) = counting_watchdog();

        // when:
        time::sleep(minutes(31)).await;

        // then:
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.state(), WatchdogState::Disconnecting);

        time::sleep(minutes(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_by_full_window_not_additively() {
        // given:
        let (watchdog, fired) = counting_watchdog();
        time::sleep(minutes(20)).await;

        // when: two touches back to back at t=20
        watchdog.touch();
        watchdog.touch();

        // then: the old deadline (t=30) passes without firing
        time::sleep(minutes(25)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(watchdog.state(), WatchdogState::Active);

        // and the new deadline is t=50, not t=80
        time::sleep(minutes(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_expiry_never_fires() {
        // given:
        let (watchdog, fired) = counting_watchdog();
        time::sleep(minutes(10)).await;

        // when:
        watchdog.cancel();
        time::sleep(minutes(120)).await;

        // then:
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(watchdog.state(), WatchdogState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_after_expiry_is_ignored() {
        // given:
        let (watchdog, fired) = counting_watchdog();
        time::sleep(minutes(31)).await;

        // when:
        watchdog.touch();
        time::sleep(minutes(120)).await;

        // then:
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.state(), WatchdogState::Disconnecting);
    }
}
