/// Timer thread
///
/// Game time advances on a background thread. The tick count and the tick
/// hooks (where a sound server would hang) sit behind one mutex; the
/// interpreter only ever reads the count through it.
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type TickHook = Box<dyn FnMut(u32) + Send>;

#[derive(Default)]
pub struct TickState {
    pub ticks: u32,
    hooks: Vec<TickHook>,
}

/// Shared handle to the tick state
#[derive(Clone, Default)]
pub struct TickCounter {
    state: Arc<Mutex<TickState>>,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TickState> {
        // A panicking hook must not stop the clock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ticks(&self) -> u32 {
        self.lock().ticks
    }

    /// Advance the clock and run every hook, all under the lock
    pub fn advance(&self, n: u32) {
        let mut state = self.lock();
        for _ in 0..n {
            state.ticks = state.ticks.wrapping_add(1);
            let now = state.ticks;
            for hook in state.hooks.iter_mut() {
                hook(now);
            }
        }
    }

    pub fn add_hook(&self, hook: TickHook) {
        self.lock().hooks.push(hook);
    }
}

pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(counter: TickCounter, rate_hz: u32) -> Ticker {
        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_micros(1_000_000 / rate_hz.max(1) as u64);
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            debug!("ticker running every {period:?}");
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(period);
                counter.advance(1);
                trace!("tick {}", counter.ticks());
            }
        });
        Ticker {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if let Err(panic) = handle.join() {
                let message = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown cause");
                warn!("ticker thread panicked: {message}");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn hooks_see_every_tick() {
        let counter = TickCounter::new();
        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        counter.add_hook(Box::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        counter.advance(3);
        assert_eq!(counter.ticks(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn thread_advances_the_clock() {
        let counter = TickCounter::new();
        let mut ticker = Ticker::start(counter.clone(), 1000);
        thread::sleep(Duration::from_millis(50));
        ticker.stop();
        let stopped_at = counter.ticks();
        assert!(stopped_at > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.ticks(), stopped_at);
    }

    #[test]
    fn stop_survives_a_panicking_hook() {
        let counter = TickCounter::new();
        counter.add_hook(Box::new(|tick| {
            if tick == 2 {
                panic!("hook gave up");
            }
        }));
        let mut ticker = Ticker::start(counter.clone(), 1000);
        thread::sleep(Duration::from_millis(50));
        ticker.stop();
        // the thread died on tick 2 and the poisoned lock still reads
        assert_eq!(counter.ticks(), 2);
    }
}
