use std::sync::Arc;

use super::timeline::{KeyframeTimeline, TimelineValue};
use crate::timing::TimingConfiguration;

/// Begin-time bias applied when holding a paused frame, so the held
/// offset is already in effect on the next host tick.
pub const PAUSE_BEGIN_BIAS: f64 = 1e-3;

/// Outer timeline selecting `[play_from, play_to]` of a full-length inner
/// timeline. Carries autoreverse, repeat, speed and offset; with
/// `fill_forwards` it keeps its final value once finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippingWrapper {
    /// Host time at which wrapper time 0 occurs.
    pub begin_time: f64,
    pub timing: TimingConfiguration,
    pub fill_forwards: bool,
}

impl ClippingWrapper {
    pub fn new(timing: TimingConfiguration, begin_time: f64) -> Self {
        Self {
            begin_time,
            timing,
            fill_forwards: true,
        }
    }

    /// Holds `frame` indefinitely from host time `now`.
    pub fn paused_at(frame: f64, timing: TimingConfiguration, now: f64) -> Self {
        Self::new(timing.paused_at(frame), now - PAUSE_BEGIN_BIAS)
    }

    /// Own duration: only the requested sub-range, repeated.
    pub fn duration(&self) -> f64 {
        self.timing.expected_duration()
    }

    /// Seconds past `play_from` (towards `play_to`) shown at `host_time`;
    /// `None` before the wrapper begins or after it is removed on
    /// completion.
    pub fn local_time(&self, host_time: f64) -> Option<f64> {
        let elapsed = host_time - self.begin_time;
        if elapsed < 0.0 {
            return None;
        }
        if !self.fill_forwards && self.timing.is_finished(elapsed) {
            return None;
        }
        Some(self.timing.local_time(elapsed))
    }

    pub fn frame_at(&self, host_time: f64) -> Option<f64> {
        self.local_time(host_time).map(|local| {
            let direction = if self.timing.is_reversed() { -1.0 } else { 1.0 };
            self.timing.play_from + direction * self.timing.frame_for_time(local)
        })
    }
}

/// A full-length timeline installed on a handle through its wrapper.
#[derive(Debug, Clone)]
pub struct WrappedTimeline {
    pub timeline: Arc<KeyframeTimeline>,
    pub wrapper: ClippingWrapper,
}

impl WrappedTimeline {
    pub fn new(timeline: Arc<KeyframeTimeline>, wrapper: ClippingWrapper) -> Self {
        Self { timeline, wrapper }
    }

    /// Start offset into the inner timeline that aligns wrapper time 0
    /// with `play_from`.
    pub fn inner_offset(&self) -> f64 {
        let timing = &self.wrapper.timing;
        timing.time_for_frame(timing.play_from - f64::from(self.timeline.domain().0))
    }

    pub fn sample(&self, host_time: f64) -> Option<TimelineValue> {
        let local = self.wrapper.local_time(host_time)?;
        let signed = if self.wrapper.timing.is_reversed() {
            -local
        } else {
            local
        };
        Some(self.timeline.sample_at(self.inner_offset() + signed))
    }
}
