//! One document on one surface, played with whichever strategy fits it.

use std::time::Duration;

use lottie_core::snapshot::{self, PendingValue};
use lottie_core::{
    CompatibilityReport, CompiledEngine, CompositionTree, Diagnostics, EngineContext,
    EvaluationStats, InterpretiveEngine, SurfaceBindings, TargetSurface, TimingConfiguration,
};
use lottie_core::compiled::ClippingWrapper;
use lottie_data::model as data;

use crate::config::{EngineConfig, RenderingEngineOption};
use crate::error::{Result, SessionError};

/// The strategy a session ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Interpretive,
    Compiled,
}

/// Resolves the configured option against a classification.
pub fn select_engine(
    option: RenderingEngineOption,
    report: &CompatibilityReport,
    diagnostics: &Diagnostics,
) -> EngineKind {
    match option {
        RenderingEngineOption::Interpretive => EngineKind::Interpretive,
        RenderingEngineOption::Automatic if report.is_supported() => EngineKind::Compiled,
        RenderingEngineOption::Automatic => {
            for issue in &report.issues {
                diagnostics.warn(format!(
                    "layer {:?} falls back to the interpretive engine: {}",
                    issue.layer, issue.message
                ));
            }
            EngineKind::Interpretive
        }
        RenderingEngineOption::Compiled => {
            for issue in &report.issues {
                diagnostics.warn(format!(
                    "layer {:?} may not play correctly with the compiled engine: {}",
                    issue.layer, issue.message
                ));
            }
            EngineKind::Compiled
        }
    }
}

#[derive(Debug)]
enum Strategy {
    Interpretive(InterpretiveEngine),
    Compiled(CompiledEngine),
}

impl Strategy {
    fn kind(&self) -> EngineKind {
        match self {
            Strategy::Interpretive(_) => EngineKind::Interpretive,
            Strategy::Compiled(_) => EngineKind::Compiled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Playback {
    Stopped,
    Playing {
        timing: TimingConfiguration,
        begin: f64,
    },
    Paused {
        timing: TimingConfiguration,
        frame: f64,
    },
}

/// Owns the graph, the surface bindings and the active strategy for one
/// document.
///
/// Host times are seconds on the host's clock; the same clock must drive
/// [`tick`](Self::tick) and sample compiled timelines.
pub struct AnimationSession<S: TargetSurface> {
    config: EngineConfig,
    context: EngineContext,
    surface: S,
    tree: CompositionTree,
    bindings: SurfaceBindings,
    markers: Vec<data::Marker>,
    report: CompatibilityReport,
    strategy: Strategy,
    playback: Playback,
    appeared: bool,
    suspended: Option<ClippingWrapper>,
}

impl<S: TargetSurface> AnimationSession<S> {
    /// Builds a session with embedded images cached per `config`.
    pub fn new(document: &data::LottieJson, surface: S, config: EngineConfig) -> Result<Self> {
        let context = config.context();
        Self::with_context(document, surface, config, context)
    }

    /// Builds a session around host-supplied providers.
    pub fn with_context(
        document: &data::LottieJson,
        mut surface: S,
        config: EngineConfig,
        context: EngineContext,
    ) -> Result<Self> {
        let loaded = load(document, &mut surface, &config, &context)?;
        Ok(Self {
            config,
            context,
            surface,
            tree: loaded.tree,
            bindings: loaded.bindings,
            markers: document.markers.clone(),
            report: loaded.report,
            strategy: loaded.strategy,
            playback: Playback::Stopped,
            appeared: false,
            suspended: None,
        })
    }

    /// Decodes `json` and builds a session for it.
    pub fn from_json_str(json: &str, surface: S, config: EngineConfig) -> Result<Self> {
        let document: data::LottieJson = serde_json::from_str(json)?;
        Self::new(&document, surface, config)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn tree(&self) -> &CompositionTree {
        &self.tree
    }

    pub fn bindings(&self) -> &SurfaceBindings {
        &self.bindings
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.context.diagnostics
    }

    pub fn compatibility_report(&self) -> &CompatibilityReport {
        &self.report
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.strategy.kind()
    }

    pub fn is_appeared(&self) -> bool {
        self.appeared
    }

    /// Whole document at its own frame rate.
    pub fn default_timing(&self) -> TimingConfiguration {
        TimingConfiguration::new(
            f64::from(self.tree.in_frame()),
            f64::from(self.tree.out_frame()),
            f64::from(self.tree.framerate()),
        )
    }

    /// The span of the marker called `name`.
    pub fn marker_timing(&self, name: &str) -> Result<TimingConfiguration> {
        let marker = self
            .markers
            .iter()
            .find(|m| m.cm.as_deref() == Some(name))
            .ok_or_else(|| SessionError::UnknownMarker(name.to_string()))?;
        let from = f64::from(marker.tm.unwrap_or(self.tree.in_frame()));
        let to = from + f64::from(marker.dr.unwrap_or(0.0));
        Ok(TimingConfiguration::new(
            from,
            to,
            f64::from(self.tree.framerate()),
        ))
    }

    /// Seconds one play request lasts under the current timing.
    pub fn expected_duration(&self) -> f64 {
        match self.playback {
            Playback::Playing { timing, .. } | Playback::Paused { timing, .. } => {
                timing.expected_duration()
            }
            Playback::Stopped => self.default_timing().expected_duration(),
        }
    }

    /// The frame on screen at `host_time`.
    pub fn current_frame(&self, host_time: f64) -> f64 {
        match (&self.strategy, self.playback) {
            (Strategy::Compiled(engine), Playback::Playing { .. } | Playback::Paused { .. }) => engine
                .frame_at(host_time)
                .or_else(|| self.suspended.and_then(|w| w.frame_at(host_time)))
                .unwrap_or(f64::from(self.tree.in_frame())),
            (_, Playback::Playing { timing, begin }) => timing.frame_at_elapsed(host_time - begin),
            (_, Playback::Paused { frame, .. }) => frame,
            (_, Playback::Stopped) => f64::from(self.tree.in_frame()),
        }
    }

    /// True while a play request has time left at `host_time`.
    pub fn is_playing(&self, host_time: f64) -> bool {
        match self.playback {
            Playback::Playing { timing, begin } => !timing.is_finished(host_time - begin),
            _ => false,
        }
    }

    /// Shows `frame` and holds it. Frames outside the document hold its
    /// first or last frame.
    pub fn set_frame(&mut self, frame: f64, host_time: f64) -> Result<()> {
        let timing = self.default_timing();
        self.hold(frame, timing, host_time)
    }

    /// Freezes on `frame`, keeping the current timing for a later
    /// [`play`](Self::play). Frames outside the timing's range hold its
    /// nearest end.
    pub fn pause_at(&mut self, frame: f64, host_time: f64) -> Result<()> {
        let timing = match self.playback {
            Playback::Playing { timing, .. } | Playback::Paused { timing, .. } => timing,
            Playback::Stopped => self.default_timing(),
        };
        self.hold(frame, timing, host_time)
    }

    fn hold(&mut self, frame: f64, timing: TimingConfiguration, host_time: f64) -> Result<()> {
        let frame = timing.clamp_frame(frame);
        match &mut self.strategy {
            Strategy::Interpretive(engine) => {
                engine.render_frame(&mut self.tree, &mut self.bindings, &mut self.surface, frame as f32)?;
            }
            Strategy::Compiled(engine) => {
                if self.suspended.is_some() {
                    self.suspended = Some(ClippingWrapper::paused_at(frame, timing, host_time));
                } else {
                    engine.pause_at(&mut self.surface, frame, timing, host_time)?;
                }
            }
        }
        tracing::debug!(frame, "holding frame");
        self.playback = Playback::Paused { timing, frame };
        Ok(())
    }

    /// Starts `timing` at `host_time`. The compiled engine hands the clock
    /// to the host; the interpretive engine renders on every
    /// [`tick`](Self::tick).
    pub fn play(&mut self, timing: TimingConfiguration, host_time: f64) -> Result<()> {
        tracing::debug!(
            from = timing.play_from,
            to = timing.play_to,
            duration = timing.expected_duration(),
            engine = ?self.strategy.kind(),
            "play requested"
        );
        match &mut self.strategy {
            Strategy::Interpretive(engine) => {
                let frame = timing.frame_at_elapsed(0.0) as f32;
                engine.render_frame(&mut self.tree, &mut self.bindings, &mut self.surface, frame)?;
            }
            Strategy::Compiled(engine) => {
                if self.suspended.is_some() {
                    self.suspended = Some(ClippingWrapper::new(timing, host_time));
                } else {
                    engine.play(&mut self.surface, timing, host_time)?;
                }
            }
        }
        self.playback = Playback::Playing {
            timing,
            begin: host_time,
        };
        Ok(())
    }

    /// Plays the span of the marker called `name`.
    pub fn play_marker(&mut self, name: &str, host_time: f64) -> Result<()> {
        let timing = self.marker_timing(name)?;
        self.play(timing, host_time)
    }

    /// Renders the frame due at `host_time`. Only the interpretive engine
    /// does work here; compiled timelines run on the host's clock.
    pub fn tick(&mut self, host_time: f64) -> Result<Option<EvaluationStats>> {
        let Playback::Playing { timing, begin } = self.playback else {
            return Ok(None);
        };
        match &mut self.strategy {
            Strategy::Interpretive(engine) => {
                let frame = timing.frame_at_elapsed(host_time - begin) as f32;
                let stats =
                    engine.render_frame(&mut self.tree, &mut self.bindings, &mut self.surface, frame)?;
                Ok(Some(stats))
            }
            Strategy::Compiled(_) => Ok(None),
        }
    }

    /// Ends playback and shows the first frame again.
    pub fn stop(&mut self) -> Result<()> {
        let in_frame = self.tree.in_frame();
        match &mut self.strategy {
            Strategy::Interpretive(engine) => {
                engine.render_frame(&mut self.tree, &mut self.bindings, &mut self.surface, in_frame)?;
            }
            Strategy::Compiled(engine) => engine.stop(&mut self.surface)?,
        }
        self.suspended = None;
        self.playback = Playback::Stopped;
        tracing::debug!("playback stopped");
        Ok(())
    }

    /// The host attached the surface to a visible window.
    pub fn did_appear(&mut self) -> Result<()> {
        if self.appeared {
            // Ignored unless the policy panics.
            let _ = self
                .context
                .diagnostics
                .invariant_violation("session appeared while already on screen");
            return Ok(());
        }
        self.appeared = true;
        if let (Strategy::Compiled(engine), Some(wrapper)) = (&mut self.strategy, self.suspended.take()) {
            engine.install(&mut self.surface, wrapper)?;
        }
        Ok(())
    }

    /// The host detached the surface. Compiled timelines are removed and
    /// restored on the next [`did_appear`](Self::did_appear).
    pub fn did_disappear(&mut self) -> Result<()> {
        if !self.appeared {
            let _ = self
                .context
                .diagnostics
                .invariant_violation("session disappeared while not on screen");
            return Ok(());
        }
        self.appeared = false;
        if let Strategy::Compiled(engine) = &mut self.strategy {
            if let Some(wrapper) = engine.wrapper().copied() {
                engine.stop(&mut self.surface)?;
                self.suspended = Some(wrapper);
            }
        }
        Ok(())
    }

    /// Asks the surface for a rendered image. The result arrives through
    /// the returned value, or [`lottie_core::EngineError::Timeout`] after
    /// `timeout`.
    pub fn snapshot(&mut self, timeout: Duration) -> Result<PendingValue<Vec<u8>>> {
        let (sender, pending) = snapshot::channel(timeout);
        self.surface.request_snapshot(sender)?;
        Ok(pending)
    }

    /// Replaces the document, dropping cached assets and every handle.
    pub fn reset(&mut self, document: &data::LottieJson) -> Result<()> {
        if let Strategy::Compiled(engine) = &mut self.strategy {
            engine.stop(&mut self.surface)?;
        }
        self.context.reset();
        self.surface.clear();
        let loaded = load(document, &mut self.surface, &self.config, &self.context)?;
        self.tree = loaded.tree;
        self.bindings = loaded.bindings;
        self.markers = document.markers.clone();
        self.report = loaded.report;
        self.strategy = loaded.strategy;
        self.playback = Playback::Stopped;
        self.suspended = None;
        Ok(())
    }
}

struct Loaded {
    tree: CompositionTree,
    bindings: SurfaceBindings,
    report: CompatibilityReport,
    strategy: Strategy,
}

fn load<S: TargetSurface>(
    document: &data::LottieJson,
    surface: &mut S,
    config: &EngineConfig,
    context: &EngineContext,
) -> Result<Loaded> {
    let report = config.classifier().classify(document);
    let kind = select_engine(config.rendering_engine, &report, &context.diagnostics);
    tracing::debug!(
        engine = ?kind,
        issues = report.issues.len(),
        "selected rendering engine"
    );

    let mut tree = CompositionTree::build(document, context)?;
    let mut bindings = SurfaceBindings::build(&tree, surface);
    let strategy = match kind {
        EngineKind::Interpretive => {
            let mut engine = InterpretiveEngine::new();
            let in_frame = tree.in_frame();
            engine.render_frame(&mut tree, &mut bindings, surface, in_frame)?;
            Strategy::Interpretive(engine)
        }
        EngineKind::Compiled => Strategy::Compiled(CompiledEngine::build(
            &mut tree,
            &mut bindings,
            surface,
            &context.diagnostics,
        )?),
    };
    Ok(Loaded {
        tree,
        bindings,
        report,
        strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottie_core::compiled::{CompatibilityIssue, CompatibilityReport};
    use lottie_core::AssertionPolicy;

    fn report(issues: usize) -> CompatibilityReport {
        CompatibilityReport {
            issues: (0..issues)
                .map(|i| CompatibilityIssue {
                    rule: "time_remapping",
                    layer: format!("layer {i}"),
                    message: "time remapping re-times content per frame".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn automatic_prefers_compiled_for_supported_documents() {
        let diagnostics = Diagnostics::new(AssertionPolicy::Log);
        let kind = select_engine(RenderingEngineOption::Automatic, &report(0), &diagnostics);
        assert_eq!(kind, EngineKind::Compiled);
        assert!(diagnostics.warnings().is_empty());
    }

    #[test]
    fn automatic_falls_back_with_a_warning() {
        let diagnostics = Diagnostics::new(AssertionPolicy::Log);
        let kind = select_engine(RenderingEngineOption::Automatic, &report(1), &diagnostics);
        assert_eq!(kind, EngineKind::Interpretive);
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn forced_compiled_warns_per_issue() {
        let diagnostics = Diagnostics::new(AssertionPolicy::Log);
        let kind = select_engine(RenderingEngineOption::Compiled, &report(2), &diagnostics);
        assert_eq!(kind, EngineKind::Compiled);
        assert_eq!(diagnostics.warnings().len(), 2);
    }

    #[test]
    fn forced_interpretive_is_silent() {
        let diagnostics = Diagnostics::new(AssertionPolicy::Log);
        let kind = select_engine(RenderingEngineOption::Interpretive, &report(3), &diagnostics);
        assert_eq!(kind, EngineKind::Interpretive);
        assert!(diagnostics.warnings().is_empty());
    }
}
