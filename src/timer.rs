//! Per-stage timing for the capture loop's debug log.

use std::{
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Accumulates how long one stage of frame processing takes.
///
/// Displaying a timer with `{}` prints the number of runs and their mean duration since it was
/// last displayed, and starts a new measurement window.
pub struct Timer {
    name: &'static str,
    window: Mutex<Window>,
}

#[derive(Default)]
struct Window {
    total: Duration,
    runs: u32,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            window: Mutex::new(Window::default()),
        }
    }

    /// Runs `stage` and records how long it took.
    pub fn time<T>(&self, stage: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        stage()
    }

    /// Starts timing a stage that ends when the returned guard is dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, elapsed: Duration) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.total += elapsed;
        window.runs += 1;
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Window { total, runs } = {
            let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *window)
        };
        let mean_ms = if runs == 0 {
            0.0
        } else {
            total.as_secs_f32() * 1000.0 / runs as f32
        };
        write!(f, "{}: {runs}x{mean_ms:.01}ms", self.name)
    }
}

/// Stops the measurement started by [`Timer::start`] when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Logs the capture loop's frame rate once per second, along with its stage timers.
pub struct FpsCounter {
    name: &'static str,
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            frames: 0,
            since: Instant::now(),
        }
    }

    /// Counts a frame. Once a second has passed, logs the frame rate and drains `timers`.
    pub fn tick_with<'a, I: IntoIterator<Item = &'a Timer>>(&mut self, timers: I) {
        self.frames += 1;
        if self.since.elapsed() < Duration::from_secs(1) {
            return;
        }

        let timers = timers.into_iter().map(|t| t.to_string()).collect::<Vec<_>>();
        log::debug!("{}: {} FPS ({})", self.name, self.frames, timers.join(", "));
        self.frames = 0;
        self.since = Instant::now();
    }
}
