//! Frame/time conversion and play-range arithmetic.

use serde::{Deserialize, Serialize};

/// How a play request walks the composition's frames.
///
/// Times are in seconds, frames in composition frames. `time_offset` is
/// wall-clock time already elapsed when playback starts; while paused
/// (`speed == 0`) it is the position held instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfiguration {
    pub play_from: f64,
    pub play_to: f64,
    pub framerate: f64,
    pub autoreverses: bool,
    pub repeat_count: f64,
    pub speed: f64,
    pub time_offset: f64,
}

impl Default for TimingConfiguration {
    fn default() -> Self {
        Self {
            play_from: 0.0,
            play_to: 0.0,
            framerate: 30.0,
            autoreverses: false,
            repeat_count: 1.0,
            speed: 1.0,
            time_offset: 0.0,
        }
    }
}

impl TimingConfiguration {
    pub fn new(play_from: f64, play_to: f64, framerate: f64) -> Self {
        Self {
            play_from,
            play_to,
            framerate,
            ..Self::default()
        }
    }

    pub fn with_autoreverses(mut self, autoreverses: bool) -> Self {
        self.autoreverses = autoreverses;
        self
    }

    pub fn with_repeat_count(mut self, repeat_count: f64) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_time_offset(mut self, time_offset: f64) -> Self {
        self.time_offset = time_offset;
        self
    }

    /// `play_to < play_from` plays the range backwards.
    pub fn is_reversed(&self) -> bool {
        self.play_to < self.play_from
    }

    pub fn time_for_frame(&self, frame: f64) -> f64 {
        frame / self.framerate
    }

    pub fn frame_for_time(&self, time: f64) -> f64 {
        time * self.framerate
    }

    /// Seconds to play the range once, in either direction.
    pub fn span(&self) -> f64 {
        if self.framerate > 0.0 {
            (self.play_to - self.play_from).abs() / self.framerate
        } else {
            0.0
        }
    }

    /// One forward pass, plus the way back when autoreversing.
    pub fn cycle_duration(&self) -> f64 {
        if self.autoreverses {
            self.span() * 2.0
        } else {
            self.span()
        }
    }

    fn repeats(&self) -> f64 {
        self.repeat_count.max(0.0)
    }

    /// Wall-clock seconds until playback finishes. A paused timing never
    /// finishes.
    pub fn expected_duration(&self) -> f64 {
        if self.speed == 0.0 {
            return f64::INFINITY;
        }
        let playing = self.cycle_duration() * self.repeats() / self.speed.abs();
        (playing - self.time_offset).max(0.0)
    }

    pub fn is_finished(&self, elapsed: f64) -> bool {
        elapsed >= self.expected_duration()
    }

    /// Position on the repeated, speed-scaled timeline `elapsed` seconds
    /// after playback began.
    fn active_time(&self, elapsed: f64) -> f64 {
        if self.speed == 0.0 {
            self.time_offset
        } else {
            (elapsed + self.time_offset) * self.speed.abs()
        }
    }

    /// Seconds from `play_from` towards `play_to`, in `[0, span]`.
    pub fn local_time(&self, elapsed: f64) -> f64 {
        let span = self.span();
        let cycle = self.cycle_duration();
        if cycle <= 0.0 {
            return 0.0;
        }
        let total = cycle * self.repeats();
        let active = self.active_time(elapsed).clamp(0.0, total);

        let mut position = if active >= total {
            // Finished: freeze where the last iteration stopped.
            let partial = total - (total / cycle).floor() * cycle;
            if partial > 0.0 {
                partial
            } else {
                cycle
            }
        } else {
            active % cycle
        };
        if self.autoreverses && position > span {
            position = cycle - position;
        }
        if self.speed < 0.0 {
            position = span - position;
        }
        position.clamp(0.0, span)
    }

    pub fn frame_at_elapsed(&self, elapsed: f64) -> f64 {
        let direction = if self.is_reversed() { -1.0 } else { 1.0 };
        self.play_from + direction * self.frame_for_time(self.local_time(elapsed))
    }

    /// `frame` limited to the play range, whichever way it runs.
    pub fn clamp_frame(&self, frame: f64) -> f64 {
        let (lo, hi) = if self.is_reversed() {
            (self.play_to, self.play_from)
        } else {
            (self.play_from, self.play_to)
        };
        frame.clamp(lo, hi)
    }

    /// Held at `frame` of the range: speed 0 with the matching offset.
    /// Frames outside the range hold its nearest end.
    pub fn paused_at(&self, frame: f64) -> Self {
        let direction = if self.is_reversed() { -1.0 } else { 1.0 };
        let offset = self.time_for_frame((frame - self.play_from) * direction);
        Self {
            speed: 0.0,
            time_offset: offset.clamp(0.0, self.span()),
            ..*self
        }
    }
}
