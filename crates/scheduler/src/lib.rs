//! Frame scheduling for backdrop engines.
//!
//! A [`FrameScheduler`] owns exactly one outstanding frame request at a time.
//! The host delivers that request back through [`FrameScheduler::on_frame`],
//! which samples the injected [`MonotonicClock`], decides whether the frame
//! body should run, and immediately files the next request:
//!
//! ```text
//!   start() ──▶ host.request_frame(None)
//!                      │
//!                      ▼
//!   on_frame(id) ──▶ FrameTick { elapsed, delta, render } ──▶ engine body
//!        │
//!        └─▶ host.request_frame(cadence delay)   (until cancel())
//! ```
//!
//! Cancelling the pending request is the only way to stop the loop.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Delay between frames when the host asks for reduced motion.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler was cancelled and cannot be restarted")]
    Cancelled,
    #[error("frame loop is already running")]
    AlreadyRunning,
    #[error("throttle interval must be greater than zero")]
    ZeroInterval,
}

/// Identifier handed out by the host's frame primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(pub u64);

/// The host side of the frame loop (the equivalent of a display-refresh
/// callback plus a timer).
pub trait FrameHost {
    /// Requests one callback. `None` means "at the host's natural cadence",
    /// `Some(delay)` defers the callback by at least `delay`.
    fn request_frame(&mut self, delay: Option<Duration>) -> FrameRequestId;
    /// Cancels a previously requested callback. Unknown ids are ignored.
    fn cancel_frame(&mut self, id: FrameRequestId);
}

/// How often frames should be rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCadence {
    /// Follow the host's natural per-frame cadence.
    EveryFrame,
    /// Defer each reschedule by a fixed interval.
    Throttled(Duration),
}

impl FrameCadence {
    pub fn throttled(interval: Duration) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        Ok(Self::Throttled(interval))
    }

    /// Delay to pass to [`FrameHost::request_frame`] when rescheduling.
    pub fn reschedule_delay(&self) -> Option<Duration> {
        match self {
            FrameCadence::EveryFrame => None,
            FrameCadence::Throttled(interval) => Some(*interval),
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, FrameCadence::Throttled(_))
    }
}

impl Default for FrameCadence {
    fn default() -> Self {
        Self::EveryFrame
    }
}

/// Source of monotonic elapsed time since the clock was created.
pub trait MonotonicClock {
    fn elapsed(&self) -> Duration;
}

/// Clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl MonotonicClock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same timeline, so a
/// test can keep one copy and hand the other to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, step: Duration) {
        self.now.set(self.now.get().saturating_add(step));
    }

    /// Moves the clock to `at`. Attempts to go backwards are ignored.
    pub fn set(&self, at: Duration) {
        if at >= self.now.get() {
            self.now.set(at);
        }
    }
}

impl MonotonicClock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

/// Timing for one frame invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Time since the scheduler's clock origin.
    pub elapsed: Duration,
    /// Time since the previous invocation (zero for the first one).
    pub delta: Duration,
    /// Number of frames rendered before this one.
    pub frame_index: u64,
    /// False when the body should be skipped (surface hidden).
    pub render: bool,
}

impl FrameTick {
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Cancelled,
}

pub struct FrameScheduler {
    clock: Box<dyn MonotonicClock>,
    cadence: FrameCadence,
    state: SchedulerState,
    pending: Option<FrameRequestId>,
    last_invocation: Option<Duration>,
    frames_rendered: u64,
    gate_on_visibility: bool,
    visible: bool,
}

impl FrameScheduler {
    pub fn new(clock: Box<dyn MonotonicClock>, cadence: FrameCadence) -> Self {
        Self {
            clock,
            cadence,
            state: SchedulerState::Idle,
            pending: None,
            last_invocation: None,
            frames_rendered: 0,
            gate_on_visibility: false,
            visible: true,
        }
    }

    /// When enabled, frames delivered while the surface is hidden report
    /// `render == false` but the loop keeps rescheduling.
    pub fn with_visibility_gate(mut self, enabled: bool) -> Self {
        self.gate_on_visibility = enabled;
        self
    }

    pub fn cadence(&self) -> FrameCadence {
        self.cadence
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pending(&self) -> Option<FrameRequestId> {
        self.pending
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Current clock reading without consuming a frame.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            tracing::debug!(visible, "frame scheduler visibility changed");
        }
        self.visible = visible;
    }

    /// Files the first frame request at the host's natural cadence.
    pub fn start(&mut self, host: &mut dyn FrameHost) -> Result<FrameRequestId, SchedulerError> {
        match self.state {
            SchedulerState::Cancelled => return Err(SchedulerError::Cancelled),
            SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Idle => {}
        }
        let id = host.request_frame(None);
        self.pending = Some(id);
        self.state = SchedulerState::Running;
        tracing::trace!(request = id.0, cadence = ?self.cadence, "frame loop started");
        Ok(id)
    }

    /// Consumes a delivered frame request.
    ///
    /// Returns `None` for stale ids or once the loop is cancelled; otherwise
    /// the next request is already filed when the tick is returned.
    pub fn on_frame(&mut self, host: &mut dyn FrameHost, id: FrameRequestId) -> Option<FrameTick> {
        if self.state != SchedulerState::Running {
            return None;
        }
        if self.pending != Some(id) {
            tracing::trace!(request = id.0, pending = ?self.pending, "ignoring stale frame request");
            return None;
        }
        self.pending = None;

        let now = self.clock.elapsed();
        let delta = self
            .last_invocation
            .map(|last| now.saturating_sub(last))
            .unwrap_or(Duration::ZERO);
        self.last_invocation = Some(now);

        let render = !(self.gate_on_visibility && !self.visible);
        let tick = FrameTick {
            elapsed: now,
            delta,
            frame_index: self.frames_rendered,
            render,
        };
        if render {
            self.frames_rendered = self.frames_rendered.saturating_add(1);
        }

        let next = host.request_frame(self.cadence.reschedule_delay());
        self.pending = Some(next);
        tracing::trace!(
            request = next.0,
            delay_ms = ?self.cadence.reschedule_delay().map(|d| d.as_millis()),
            render,
            "rescheduled frame"
        );
        Some(tick)
    }

    /// Cancels the pending request. Returns true if a request was cancelled.
    /// Safe to call any number of times.
    pub fn cancel(&mut self, host: &mut dyn FrameHost) -> bool {
        self.state = SchedulerState::Cancelled;
        match self.pending.take() {
            Some(id) => {
                host.cancel_frame(id);
                true
            }
            None => false,
        }
    }
}
