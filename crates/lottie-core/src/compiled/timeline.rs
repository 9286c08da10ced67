use glam::{Vec2, Vec3, Vec4};

use crate::error::{EngineError, Result};
use crate::geometry::CompoundPath;
use crate::keyframes::{Easing, Interpolatable, KeyframeGroup};
use crate::surface::TextOutput;

/// How a timeline moves between its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationMode {
    /// Each value holds until the next key time.
    Discrete,
    /// Values blend across each interval through its easing.
    Linear,
}

/// A sampled property value as carried by a compiled timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineValue {
    Scalar(f32),
    Vector2(Vec2),
    Color(Vec4),
    Path(CompoundPath),
    Numbers(Vec<f32>),
    Text(TextOutput),
    Visibility(bool),
}

impl TimelineValue {
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            TimelineValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            TimelineValue::Vector2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Vec4> {
        match self {
            TimelineValue::Color(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&CompoundPath> {
        match self {
            TimelineValue::Path(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f32]> {
        match self {
            TimelineValue::Numbers(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextOutput> {
        match self {
            TimelineValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TimelineValue::Visibility(v) => Some(*v),
            _ => None,
        }
    }
}

impl Interpolatable for TimelineValue {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        use TimelineValue::*;
        match (self, other) {
            (Scalar(a), Scalar(b)) => Scalar(a.lerp(b, t)),
            (Vector2(a), Vector2(b)) => Vector2(Interpolatable::lerp(a, b, t)),
            (Color(a), Color(b)) => Color(Interpolatable::lerp(a, b, t)),
            (Path(a), Path(b)) => Path(a.lerp(b, t)),
            (Numbers(a), Numbers(b)) => Numbers(a.lerp(b, t)),
            (Text(a), Text(b)) => Text(a.lerp(b, t)),
            (Visibility(a), Visibility(b)) => Visibility(a.lerp(b, t)),
            _ if t < 1.0 => self.clone(),
            _ => other.clone(),
        }
    }

    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        spatial_out: Option<Vec3>,
        spatial_in: Option<Vec3>,
    ) -> Self {
        match (self, other) {
            (TimelineValue::Vector2(a), TimelineValue::Vector2(b)) => {
                TimelineValue::Vector2(a.lerp_spatial(b, t, spatial_out, spatial_in))
            }
            _ => self.lerp(other, t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct SpatialTangents {
    out_tangent: Option<Vec3>,
    in_tangent: Option<Vec3>,
}

/// A declarative keyframe animation over one channel, in normalized time.
///
/// Key times run from exactly 0.0 to exactly 1.0 across `domain` (root
/// frames). Discrete timelines carry one value fewer than key times;
/// linear timelines carry one value per key time and one easing per
/// interval.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTimeline {
    mode: CalculationMode,
    key_times: Vec<f64>,
    values: Vec<TimelineValue>,
    easings: Vec<Easing>,
    spatial: Vec<SpatialTangents>,
    domain: (f32, f32),
    framerate: f32,
}

impl KeyframeTimeline {
    /// Builds the timeline for one keyframe group whose times are already
    /// in root frames. All-hold groups compile to a discrete timeline;
    /// hold segments inside a blended group become a constant interval
    /// followed by a zero-length step.
    pub fn from_keyframes<T>(
        group: &KeyframeGroup<T>,
        domain: (f32, f32),
        framerate: f32,
        convert: impl Fn(&T) -> TimelineValue,
    ) -> Self {
        let keyframes = group.keyframes();
        let normalize = |frame: f32| normalize(frame, domain);

        if group.is_all_hold() {
            let mut key_times = Vec::with_capacity(keyframes.len() + 1);
            key_times.push(0.0);
            key_times.extend(keyframes[1..].iter().map(|kf| normalize(kf.time)));
            key_times.push(1.0);
            return Self {
                mode: CalculationMode::Discrete,
                key_times,
                values: keyframes.iter().map(|kf| convert(&kf.value)).collect(),
                easings: Vec::new(),
                spatial: Vec::new(),
                domain,
                framerate,
            };
        }

        let mut timeline = Self {
            mode: CalculationMode::Linear,
            key_times: Vec::with_capacity(keyframes.len() + 2),
            values: Vec::with_capacity(keyframes.len() + 2),
            easings: Vec::with_capacity(keyframes.len() + 1),
            spatial: Vec::with_capacity(keyframes.len() + 1),
            domain,
            framerate,
        };
        let first = convert(&keyframes[0].value);
        if normalize(keyframes[0].time) > 0.0 {
            timeline.push_key(0.0, first.clone());
            timeline.push_interval(Easing::Linear, SpatialTangents::default());
        }
        timeline.push_key(normalize(keyframes[0].time), first);

        for pair in keyframes.windows(2) {
            let (start, end) = (&pair[0], &pair[1]);
            let end_time = normalize(end.time);
            if start.is_hold {
                let held = convert(&start.value);
                timeline.push_interval(Easing::Linear, SpatialTangents::default());
                timeline.push_key(end_time, held);
                timeline.push_interval(Easing::Linear, SpatialTangents::default());
            } else {
                timeline.push_interval(
                    Easing::between(start.out_tangent, end.in_tangent),
                    SpatialTangents {
                        out_tangent: start.spatial_out_tangent,
                        in_tangent: end.spatial_in_tangent,
                    },
                );
            }
            timeline.push_key(end_time, convert(&end.value));
        }

        let last_time = timeline.key_times.last().copied().unwrap_or(0.0);
        if last_time < 1.0 {
            let last = timeline.values.last().cloned().unwrap_or(TimelineValue::Scalar(0.0));
            timeline.push_interval(Easing::Linear, SpatialTangents::default());
            timeline.push_key(1.0, last);
        }
        // Snap the ends; the discrete form is exact by construction.
        if let Some(first) = timeline.key_times.first_mut() {
            *first = 0.0;
        }
        if let Some(last) = timeline.key_times.last_mut() {
            *last = 1.0;
        }
        timeline
    }

    /// A single value over the whole domain.
    pub fn constant(value: TimelineValue, domain: (f32, f32), framerate: f32) -> Self {
        Self {
            mode: CalculationMode::Discrete,
            key_times: vec![0.0, 1.0],
            values: vec![value],
            easings: Vec::new(),
            spatial: Vec::new(),
            domain,
            framerate,
        }
    }

    /// Holds `initial` until the first step, then each step's value from
    /// its root frame on. Steps must be in ascending frame order.
    pub fn stepped(
        initial: TimelineValue,
        steps: Vec<(f32, TimelineValue)>,
        domain: (f32, f32),
        framerate: f32,
    ) -> Self {
        let mut key_times = Vec::with_capacity(steps.len() + 2);
        let mut values = Vec::with_capacity(steps.len() + 1);
        key_times.push(0.0);
        values.push(initial);
        for (frame, value) in steps {
            key_times.push(normalize(frame, domain));
            values.push(value);
        }
        key_times.push(1.0);
        Self {
            mode: CalculationMode::Discrete,
            key_times,
            values,
            easings: Vec::new(),
            spatial: Vec::new(),
            domain,
            framerate,
        }
    }

    /// Linear timeline through values sampled at root frames, for channels
    /// computed from several keyframe groups at once.
    pub fn baked(samples: Vec<(f32, TimelineValue)>, domain: (f32, f32), framerate: f32) -> Self {
        let mut timeline = Self {
            mode: CalculationMode::Linear,
            key_times: Vec::with_capacity(samples.len() + 2),
            values: Vec::with_capacity(samples.len() + 2),
            easings: Vec::with_capacity(samples.len() + 1),
            spatial: Vec::with_capacity(samples.len() + 1),
            domain,
            framerate,
        };
        for (frame, value) in samples {
            let time = normalize(frame, domain);
            if timeline.key_times.last().is_some_and(|&last| time <= last) {
                continue;
            }
            if timeline.values.is_empty() && time > 0.0 {
                timeline.push_key(0.0, value.clone());
            }
            if !timeline.values.is_empty() {
                timeline.push_interval(Easing::Linear, SpatialTangents::default());
            }
            timeline.push_key(time, value);
        }
        match timeline.values.last().cloned() {
            None => return Self::constant(TimelineValue::Scalar(0.0), domain, framerate),
            Some(last) if timeline.key_times.last().is_some_and(|&t| t < 1.0) => {
                timeline.push_interval(Easing::Linear, SpatialTangents::default());
                timeline.push_key(1.0, last);
            }
            Some(_) => {}
        }
        if timeline.values.len() == 1 {
            return Self::constant(timeline.values.remove(0), domain, framerate);
        }
        timeline
    }

    fn push_key(&mut self, time: f64, value: TimelineValue) {
        self.key_times.push(time);
        self.values.push(value);
    }

    fn push_interval(&mut self, easing: Easing, spatial: SpatialTangents) {
        self.easings.push(easing);
        self.spatial.push(spatial);
    }

    /// Checks the length relations a native timeline requires.
    pub fn validate(&self) -> Result<()> {
        let keys = self.key_times.len();
        let values = self.values.len();
        let consistent = match self.mode {
            CalculationMode::Discrete => values + 1 == keys,
            CalculationMode::Linear => values == keys && self.easings.len() + 1 == values,
        };
        let bounded = self.key_times.first() == Some(&0.0) && self.key_times.last() == Some(&1.0);
        let ordered = self.key_times.windows(2).all(|w| w[0] <= w[1]);
        if consistent && bounded && ordered {
            Ok(())
        } else {
            Err(EngineError::MalformedTimeline {
                keys,
                values,
                easings: self.easings.len(),
            })
        }
    }

    pub fn mode(&self) -> CalculationMode {
        self.mode
    }

    pub fn key_times(&self) -> &[f64] {
        &self.key_times
    }

    pub fn values(&self) -> &[TimelineValue] {
        &self.values
    }

    pub fn easings(&self) -> &[Easing] {
        &self.easings
    }

    /// Root frames covered by normalized time `[0, 1]`.
    pub fn domain(&self) -> (f32, f32) {
        self.domain
    }

    /// Seconds the full timeline lasts at its framerate.
    pub fn duration(&self) -> f64 {
        f64::from(self.domain.1 - self.domain.0) / f64::from(self.framerate)
    }

    /// Value `seconds` after the start of the domain. Goes through the
    /// root frame in `f32` so a sample landing on a key frame matches it
    /// exactly.
    pub fn sample_at(&self, seconds: f64) -> TimelineValue {
        let frame = f64::from(self.domain.0) + seconds * f64::from(self.framerate);
        self.sample_frame(frame as f32)
    }

    pub fn sample_frame(&self, frame: f32) -> TimelineValue {
        self.sample_progress(normalize(frame, self.domain))
    }

    fn sample_progress(&self, progress: f64) -> TimelineValue {
        let progress = progress.clamp(0.0, 1.0);
        let idx = self.key_times.partition_point(|&k| k <= progress);
        match self.mode {
            CalculationMode::Discrete => {
                let i = idx.saturating_sub(1).min(self.values.len() - 1);
                self.values[i].clone()
            }
            CalculationMode::Linear => {
                if idx == 0 {
                    return self.values[0].clone();
                }
                if idx >= self.values.len() {
                    return self.values[self.values.len() - 1].clone();
                }
                let (a, b) = (idx - 1, idx);
                let span = self.key_times[b] - self.key_times[a];
                if span <= 0.0 {
                    return self.values[b].clone();
                }
                let local = ((progress - self.key_times[a]) / span) as f32;
                let eased = self.easings[a].apply(local);
                let spatial = self.spatial[a];
                self.values[a].lerp_spatial(
                    &self.values[b],
                    eased,
                    spatial.out_tangent,
                    spatial.in_tangent,
                )
            }
        }
    }
}

fn normalize(frame: f32, domain: (f32, f32)) -> f64 {
    let (start, end) = (f64::from(domain.0), f64::from(domain.1));
    if end <= start {
        return if f64::from(frame) >= start { 1.0 } else { 0.0 };
    }
    ((f64::from(frame) - start) / (end - start)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframes::Keyframe;

    fn scalar(group: &KeyframeGroup<f32>, domain: (f32, f32)) -> KeyframeTimeline {
        KeyframeTimeline::from_keyframes(group, domain, 30.0, |v| TimelineValue::Scalar(*v))
    }

    fn value(timeline: &KeyframeTimeline, frame: f32) -> f32 {
        timeline.sample_frame(frame).as_scalar().expect("scalar timeline")
    }

    #[test]
    fn linear_timelines_gain_boundary_keys() {
        let group = KeyframeGroup::new(vec![Keyframe::new(10.0, 0.0f32), Keyframe::new(50.0, 40.0)])
            .expect("ordered keyframes");
        let timeline = scalar(&group, (0.0, 100.0));
        timeline.validate().expect("well-formed timeline");
        assert_eq!(timeline.mode(), CalculationMode::Linear);
        assert_eq!(timeline.key_times(), &[0.0, 0.1, 0.5, 1.0]);
        assert_eq!(timeline.easings(), &[Easing::Linear; 3]);
        assert_eq!(value(&timeline, 5.0), 0.0);
        assert!((value(&timeline, 30.0) - 20.0).abs() < 1e-4);
        assert_eq!(value(&timeline, 90.0), 40.0);
    }

    #[test]
    fn all_hold_groups_compile_to_discrete() {
        let group = KeyframeGroup::new(vec![
            Keyframe::new(0.0, 1.0f32).hold(),
            Keyframe::new(20.0, 2.0).hold(),
            Keyframe::new(40.0, 3.0),
        ])
        .expect("ordered keyframes");
        let timeline = scalar(&group, (0.0, 60.0));
        timeline.validate().expect("well-formed timeline");
        assert_eq!(timeline.mode(), CalculationMode::Discrete);
        assert_eq!(timeline.values().len(), timeline.key_times().len() - 1);
        for (frame, expected) in [(0.0, 1.0), (19.9, 1.0), (20.0, 2.0), (39.0, 2.0), (40.0, 3.0), (60.0, 3.0)] {
            assert_eq!(value(&timeline, frame), expected, "frame {frame}");
        }
    }

    #[test]
    fn holds_inside_linear_channels_step_at_the_next_key() {
        let group = KeyframeGroup::new(vec![
            Keyframe::new(0.0, 0.0f32),
            Keyframe::new(10.0, 10.0).hold(),
            Keyframe::new(20.0, 50.0),
            Keyframe::new(30.0, 60.0),
        ])
        .expect("ordered keyframes");
        let timeline = scalar(&group, (0.0, 30.0));
        timeline.validate().expect("well-formed timeline");
        assert_eq!(timeline.mode(), CalculationMode::Linear);
        for frame in [0.0, 5.0, 10.0, 15.0, 19.5, 20.0, 25.0, 30.0] {
            assert!(
                (value(&timeline, frame) - group.value_at(frame)).abs() < 1e-4,
                "frame {frame}"
            );
        }
    }

    #[test]
    fn easing_survives_compilation() {
        let group = KeyframeGroup::new(vec![
            Keyframe::new(0.0, 0.0f32).eased(Vec2::new(0.42, 0.0), Vec2::new(0.58, 1.0)),
            Keyframe::new(30.0, 100.0),
        ])
        .expect("ordered keyframes");
        let timeline = scalar(&group, (0.0, 30.0));
        for frame in [3.0, 7.5, 15.0, 22.0] {
            assert!((value(&timeline, frame) - group.value_at(frame)).abs() < 1e-3);
        }
    }

    #[test]
    fn seconds_map_across_the_domain() {
        let group = KeyframeGroup::new(vec![Keyframe::new(0.0, 0.0f32), Keyframe::new(60.0, 60.0)])
            .expect("ordered keyframes");
        let timeline = scalar(&group, (0.0, 60.0));
        assert!((timeline.duration() - 2.0).abs() < 1e-9);
        assert!((timeline.sample_at(1.0).as_scalar().unwrap_or_default() - 30.0).abs() < 1e-4);
    }

    #[test]
    fn baked_samples_interpolate_between_frames() {
        let samples = (0..=4)
            .map(|f| (f as f32 * 10.0, TimelineValue::Scalar(f as f32)))
            .collect();
        let timeline = KeyframeTimeline::baked(samples, (0.0, 50.0), 30.0);
        timeline.validate().expect("well-formed timeline");
        assert_eq!(value(&timeline, 20.0), 2.0);
        assert!((value(&timeline, 25.0) - 2.5).abs() < 1e-5);
        assert_eq!(value(&timeline, 50.0), 4.0);
    }

    #[test]
    fn constants_are_discrete_single_values() {
        let timeline = KeyframeTimeline::constant(TimelineValue::Visibility(true), (0.0, 10.0), 30.0);
        timeline.validate().expect("well-formed timeline");
        assert_eq!(timeline.sample_frame(5.0).as_bool(), Some(true));
    }

    #[test]
    fn stepped_timelines_switch_on_their_frames() {
        let timeline = KeyframeTimeline::stepped(
            TimelineValue::Visibility(false),
            vec![(10.0, TimelineValue::Visibility(true)), (20.0, TimelineValue::Visibility(false))],
            (0.0, 30.0),
            30.0,
        );
        timeline.validate().expect("well-formed timeline");
        let visible = |frame| timeline.sample_frame(frame).as_bool();
        assert_eq!(visible(9.0), Some(false));
        assert_eq!(visible(10.0), Some(true));
        assert_eq!(visible(19.0), Some(true));
        assert_eq!(visible(20.0), Some(false));
    }

    #[test]
    fn steps_before_the_domain_apply_from_the_start() {
        let timeline = KeyframeTimeline::stepped(
            TimelineValue::Visibility(false),
            vec![(-5.0, TimelineValue::Visibility(true))],
            (0.0, 30.0),
            30.0,
        );
        timeline.validate().expect("well-formed timeline");
        assert_eq!(timeline.sample_frame(0.0).as_bool(), Some(true));
    }
}
