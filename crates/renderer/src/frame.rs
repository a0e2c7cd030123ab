//! Per-refresh scheduling.
//!
//! The window loop calls [`FrameDriver::tick`] once per redraw. While the
//! driver is active each tick asks for the next redraw before rendering, so
//! the loop keeps itself alive; clearing the [`ActiveFlag`] lets the frame in
//! flight finish and stops the chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock readings handed to each rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Time since the first rendered frame.
    pub elapsed: Duration,
    /// Time since the previous rendered frame; zero after a start or resume.
    pub delta: Duration,
    /// Zero-based index of this frame.
    pub frame: u64,
}

/// Shared run/stop switch. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    fn new(active: bool) -> Self {
        Self(Arc::new(AtomicBool::new(active)))
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct FrameDriver {
    active: ActiveFlag,
    start: Option<Instant>,
    previous: Option<Instant>,
    frame: u64,
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDriver {
    pub fn new() -> Self {
        Self {
            active: ActiveFlag::new(true),
            start: None,
            previous: None,
            frame: 0,
        }
    }

    pub fn stop_handle(&self) -> ActiveFlag {
        self.active.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    pub fn pause(&mut self) {
        self.active.stop();
        self.previous = None;
    }

    /// Reactivates the driver. The next frame reports a zero delta.
    pub fn resume(&mut self) {
        self.previous = None;
        self.active.start();
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Runs one frame if the driver is active: schedules the next refresh via
    /// `request_next`, then calls `render`. Returns whether a frame ran.
    pub fn tick<E>(
        &mut self,
        now: Instant,
        request_next: impl FnOnce(),
        render: impl FnOnce(FrameTiming) -> Result<(), E>,
    ) -> Result<bool, E> {
        if !self.active.is_active() {
            self.previous = None;
            return Ok(false);
        }

        request_next();

        let start = *self.start.get_or_insert(now);
        let delta = self
            .previous
            .map_or(Duration::ZERO, |previous| now.saturating_duration_since(previous));
        let timing = FrameTiming {
            elapsed: now.saturating_duration_since(start),
            delta,
            frame: self.frame,
        };
        self.previous = Some(now);
        self.frame = self.frame.saturating_add(1);

        render(timing)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;

    #[test]
    fn tracks_elapsed_and_delta() {
        let mut driver = FrameDriver::new();
        let origin = Instant::now();
        let mut seen = Vec::new();
        for millis in [0, 16, 40] {
            let ran = driver
                .tick(origin + Duration::from_millis(millis), || {}, |timing| {
                    seen.push(timing);
                    Ok::<_, Infallible>(())
                })
                .expect("tick");
            assert!(ran);
        }
        assert_eq!(seen[0].delta, Duration::ZERO);
        assert_eq!(seen[1].delta, Duration::from_millis(16));
        assert_eq!(seen[2].delta, Duration::from_millis(24));
        assert_eq!(seen[2].elapsed, Duration::from_millis(40));
        assert_eq!(seen[2].frame, 2);
    }

    #[test]
    fn requests_next_frame_before_rendering() {
        let mut driver = FrameDriver::new();
        let requested = Cell::new(false);
        driver
            .tick(
                Instant::now(),
                || requested.set(true),
                |_| {
                    assert!(requested.get());
                    Ok::<_, Infallible>(())
                },
            )
            .expect("tick");
    }

    #[test]
    fn stop_handle_halts_scheduling_after_in_flight_frame() {
        let mut driver = FrameDriver::new();
        let handle = driver.stop_handle();
        let requests = Cell::new(0);
        let now = Instant::now();

        let ran = driver
            .tick(now, || requests.set(requests.get() + 1), |_| {
                handle.stop();
                Ok::<_, Infallible>(())
            })
            .expect("tick");
        assert!(ran, "the in-flight frame completes");

        let ran = driver
            .tick::<Infallible>(now, || requests.set(requests.get() + 1), |_| {
                panic!("stopped driver must not render")
            })
            .expect("tick");
        assert!(!ran);
        assert_eq!(requests.get(), 1);
        assert!(!driver.is_active());
    }

    #[test]
    fn resume_resets_delta() {
        let mut driver = FrameDriver::new();
        let origin = Instant::now();
        let ok = |_: FrameTiming| Ok::<_, Infallible>(());
        driver.tick(origin, || {}, ok).expect("tick");
        driver.pause();
        driver.resume();
        let mut delta = None;
        driver
            .tick(origin + Duration::from_secs(5), || {}, |timing| {
                delta = Some(timing.delta);
                Ok::<_, Infallible>(())
            })
            .expect("tick");
        assert_eq!(delta, Some(Duration::ZERO));
        assert_eq!(driver.frames_rendered(), 2);
    }

    #[test]
    fn render_errors_propagate() {
        let mut driver = FrameDriver::new();
        let result = driver.tick(Instant::now(), || {}, |_| Err("boom"));
        assert_eq!(result, Err("boom"));
    }
}
