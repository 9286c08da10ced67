use std::time::Duration;

use anyhow::Result;
use approx::assert_abs_diff_eq;
use glam::Vec2;
use lottie_core::surface::HandleId;
use lottie_core::EngineError;
use lottie_engine::{
    AnimationSession, AssertionPolicy, EngineConfig, EngineKind, LottieJson, RecordingSurface,
    RenderingEngineOption, TimingConfiguration,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn sliding_square() -> LottieJson {
    serde_json::from_value(json!({
        "v": "5.7.0", "ip": 0, "op": 60, "fr": 30, "w": 100, "h": 100,
        "markers": [{"cm": "second_half", "tm": 30, "dr": 30}],
        "layers": [{
            "ty": 4, "nm": "square", "ip": 0, "op": 60,
            "ks": {"p": {"a": 1, "k": [{"t": 0, "s": [0, 0]}, {"t": 60, "s": [60, 0]}]}},
            "shapes": [
                {"ty": "rc", "s": {"k": [10, 10]}, "p": {"k": [0, 0]}, "r": {"k": 0}},
                {"ty": "fl", "c": {"k": [1, 0, 0, 1]}, "o": {"k": 100}}
            ]
        }]
    }))
    .expect("valid document")
}

fn remapped() -> LottieJson {
    serde_json::from_value(json!({
        "ip": 0, "op": 60, "fr": 30, "w": 100, "h": 100,
        "assets": [{
            "id": "inner",
            "layers": [{"ty": 1, "nm": "dot", "ip": 0, "op": 60, "sc": "#ff0000", "sw": 4, "sh": 4}]
        }],
        "layers": [{
            "ty": 0, "nm": "remapped", "refId": "inner", "ip": 0, "op": 60,
            "tm": {"a": 1, "k": [{"t": 0, "s": [0]}, {"t": 60, "s": [1]}]}
        }]
    }))
    .expect("valid document")
}

fn config(option: RenderingEngineOption) -> EngineConfig {
    EngineConfig::default()
        .with_rendering_engine(option)
        .with_assertions(AssertionPolicy::Log)
}

fn session(option: RenderingEngineOption) -> Result<AnimationSession<RecordingSurface>> {
    Ok(AnimationSession::new(
        &sliding_square(),
        RecordingSurface::default(),
        config(option),
    )?)
}

fn square_handle(session: &AnimationSession<RecordingSurface>) -> HandleId {
    session.bindings().root.layers[0]
        .as_ref()
        .map(|binding| binding.handle)
        .expect("square is bound")
}

fn square_x(session: &AnimationSession<RecordingSurface>, host_time: f64) -> f32 {
    session
        .surface()
        .presented(square_handle(session), host_time)
        .map(|state| state.transform.transform_point2(Vec2::ZERO).x)
        .expect("square has a handle")
}

#[test]
fn automatic_selection_follows_the_classifier() -> Result<()> {
    init_tracing();
    let supported = session(RenderingEngineOption::Automatic)?;
    assert_eq!(supported.engine_kind(), EngineKind::Compiled);
    assert!(supported.compatibility_report().is_supported());

    let fallback = AnimationSession::new(
        &remapped(),
        RecordingSurface::default(),
        config(RenderingEngineOption::Automatic),
    )?;
    assert_eq!(fallback.engine_kind(), EngineKind::Interpretive);
    assert_eq!(fallback.compatibility_report().issues.len(), 1);
    assert_eq!(fallback.diagnostics().warnings().len(), 1);
    Ok(())
}

#[test]
fn disabled_rules_are_not_checked() -> Result<()> {
    let mut config = config(RenderingEngineOption::Automatic);
    config.disabled_compatibility_rules = vec!["time_remapping".into()];
    let session = AnimationSession::new(&remapped(), RecordingSurface::default(), config)?;
    assert!(session.compatibility_report().is_supported());
    assert_eq!(session.engine_kind(), EngineKind::Compiled);
    Ok(())
}

#[test]
fn forced_compiled_warns_but_builds() -> Result<()> {
    let session = AnimationSession::new(
        &remapped(),
        RecordingSurface::default(),
        config(RenderingEngineOption::Compiled),
    )?;
    assert_eq!(session.engine_kind(), EngineKind::Compiled);
    assert!(!session.diagnostics().warnings().is_empty());
    Ok(())
}

#[test]
fn expected_durations_follow_the_timing() -> Result<()> {
    let mut session = session(RenderingEngineOption::Interpretive)?;
    let base = TimingConfiguration::new(0.0, 60.0, 30.0);
    let scenarios = [
        (base, 2.0),
        (base.with_autoreverses(true), 4.0),
        (base.with_repeat_count(3.0), 6.0),
        (base.with_speed(2.0), 1.0),
        (
            base.with_autoreverses(true)
                .with_repeat_count(3.0)
                .with_speed(2.0),
            6.0,
        ),
        (
            TimingConfiguration::new(30.0, 300.0, 30.0)
                .with_autoreverses(true)
                .with_repeat_count(3.0)
                .with_speed(2.0)
                .with_time_offset(2.0),
            25.0,
        ),
    ];
    for (timing, expected) in scenarios {
        session.play(timing, 0.0)?;
        assert_abs_diff_eq!(session.expected_duration(), expected, epsilon = 1e-4);
    }
    session.stop()?;
    assert_abs_diff_eq!(session.expected_duration(), 2.0, epsilon = 1e-4);
    Ok(())
}

#[test]
fn interpretive_playback_renders_on_tick() -> Result<()> {
    let mut session = session(RenderingEngineOption::Interpretive)?;
    session.play(session.default_timing(), 10.0)?;
    assert_abs_diff_eq!(square_x(&session, 10.0), 0.0, epsilon = 1e-4);

    let stats = session.tick(11.0)?.expect("interpretive ticks evaluate");
    assert!(stats.recomputations() > 0);
    assert_abs_diff_eq!(session.current_frame(11.0), 30.0, epsilon = 1e-6);
    assert_abs_diff_eq!(square_x(&session, 11.0), 30.0, epsilon = 1e-3);

    let again = session.tick(11.0)?.expect("interpretive ticks evaluate");
    assert_eq!(again.recomputations(), 0);

    // Past the end the last frame holds.
    session.tick(20.0)?;
    assert!(!session.is_playing(20.0));
    assert_abs_diff_eq!(square_x(&session, 20.0), 60.0, epsilon = 1e-3);
    Ok(())
}

#[test]
fn compiled_playback_runs_on_the_host_clock() -> Result<()> {
    let mut session = session(RenderingEngineOption::Compiled)?;
    assert_eq!(session.surface().timeline_count(), 0);

    session.play(session.default_timing(), 10.0)?;
    assert!(session.surface().timeline_count() > 0);
    assert!(session.tick(11.0)?.is_none());
    assert_abs_diff_eq!(session.current_frame(11.0), 30.0, epsilon = 1e-6);
    assert_abs_diff_eq!(square_x(&session, 11.0), 30.0, epsilon = 1e-3);
    assert_abs_diff_eq!(square_x(&session, 100.0), 60.0, epsilon = 1e-3);
    Ok(())
}

#[test]
fn pausing_and_setting_frames_hold_them() -> Result<()> {
    for option in [RenderingEngineOption::Interpretive, RenderingEngineOption::Compiled] {
        let mut session = session(option)?;
        session.play(session.default_timing(), 0.0)?;
        session.pause_at(45.0, 1.0)?;
        for host in [1.0, 2.0, 50.0] {
            assert_abs_diff_eq!(session.current_frame(host), 45.0, epsilon = 1e-6);
            assert_abs_diff_eq!(square_x(&session, host), 45.0, epsilon = 1e-3);
        }
        assert_abs_diff_eq!(session.expected_duration(), 2.0, epsilon = 1e-4);

        session.set_frame(12.0, 3.0)?;
        assert_abs_diff_eq!(square_x(&session, 4.0), 12.0, epsilon = 1e-3);
    }
    Ok(())
}

#[test]
fn pausing_outside_the_play_range_holds_its_nearest_end() -> Result<()> {
    for option in [RenderingEngineOption::Interpretive, RenderingEngineOption::Compiled] {
        let mut session = session(option)?;
        session.play_marker("second_half", 0.0)?;

        session.pause_at(10.0, 0.5)?;
        assert_abs_diff_eq!(session.current_frame(0.6), 30.0, epsilon = 1e-6);
        assert_abs_diff_eq!(square_x(&session, 0.6), 30.0, epsilon = 1e-3);

        session.pause_at(90.0, 1.0)?;
        assert_abs_diff_eq!(session.current_frame(1.1), 60.0, epsilon = 1e-6);
        assert_abs_diff_eq!(square_x(&session, 1.1), 60.0, epsilon = 1e-3);

        session.set_frame(-5.0, 2.0)?;
        assert_abs_diff_eq!(session.current_frame(2.1), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(square_x(&session, 2.1), 0.0, epsilon = 1e-3);
    }
    Ok(())
}

#[test]
fn stopping_returns_to_the_first_frame() -> Result<()> {
    for option in [RenderingEngineOption::Interpretive, RenderingEngineOption::Compiled] {
        let mut session = session(option)?;
        session.play(session.default_timing(), 0.0)?;
        session.tick(1.5)?;
        session.stop()?;
        assert_eq!(session.surface().timeline_count(), 0);
        assert_abs_diff_eq!(session.current_frame(1.5), 0.0);
        assert_abs_diff_eq!(square_x(&session, 1.5), 0.0, epsilon = 1e-3);
    }
    Ok(())
}

#[test]
fn markers_select_their_span() -> Result<()> {
    let mut session = session(RenderingEngineOption::Compiled)?;
    session.play_marker("second_half", 0.0)?;
    assert_abs_diff_eq!(session.expected_duration(), 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(square_x(&session, 0.5), 45.0, epsilon = 1e-3);
    assert!(session.play_marker("missing", 0.0).is_err());
    Ok(())
}

#[test]
fn disappearing_suspends_compiled_timelines() -> Result<()> {
    let mut session = session(RenderingEngineOption::Compiled)?;
    session.did_appear()?;
    session.play(session.default_timing(), 0.0)?;
    let installed = session.surface().timeline_count();

    session.did_disappear()?;
    assert_eq!(session.surface().timeline_count(), 0);

    session.did_appear()?;
    assert_eq!(session.surface().timeline_count(), installed);
    assert_abs_diff_eq!(square_x(&session, 1.0), 30.0, epsilon = 1e-3);
    Ok(())
}

#[test]
fn impossible_transitions_are_reported() -> Result<()> {
    let mut session = session(RenderingEngineOption::Interpretive)?;
    session.did_disappear()?;
    session.did_appear()?;
    session.did_appear()?;
    let warnings = session.diagnostics().warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.starts_with("invariant violated")));
    assert!(session.is_appeared());
    Ok(())
}

#[test]
#[should_panic(expected = "invariant violated")]
fn impossible_transitions_panic_under_the_panic_policy() {
    let config = config(RenderingEngineOption::Interpretive).with_assertions(AssertionPolicy::Panic);
    let mut session =
        AnimationSession::new(&sliding_square(), RecordingSurface::default(), config).unwrap();
    let _ = session.did_disappear();
}

#[test]
fn snapshots_arrive_once_or_time_out() -> Result<()> {
    let mut session = session(RenderingEngineOption::Interpretive)?;
    let pending = session.snapshot(Duration::from_secs(1))?;
    assert_eq!(pending.try_take()?, None);
    assert!(session.surface_mut().deliver_snapshot(vec![1, 2, 3]));
    assert_eq!(pending.wait()?, vec![1, 2, 3]);

    let late = session.snapshot(Duration::from_millis(10))?;
    assert!(matches!(late.wait(), Err(EngineError::Timeout(_))));
    Ok(())
}

#[test]
fn reset_rebuilds_on_a_clean_surface() -> Result<()> {
    let mut session = session(RenderingEngineOption::Automatic)?;
    session.play(session.default_timing(), 0.0)?;
    assert!(session.surface().timeline_count() > 0);

    session.reset(&remapped())?;
    assert_eq!(session.engine_kind(), EngineKind::Interpretive);
    assert_eq!(session.surface().timeline_count(), 0);
    assert_eq!(session.surface().records().len(), session.bindings().handles().len());
    assert!(session.play_marker("second_half", 0.0).is_err());
    Ok(())
}

#[test]
fn sessions_load_from_json_text() -> Result<()> {
    let json = serde_json::to_string(&json!({
        "ip": 0, "op": 30, "fr": 30, "w": 10, "h": 10,
        "layers": [{"ty": 1, "ip": 0, "op": 30, "sc": "#00ff00", "sw": 10, "sh": 10}]
    }))?;
    let session = AnimationSession::from_json_str(
        &json,
        RecordingSurface::default(),
        EngineConfig::from_json_str(r#"{"rendering_engine": "interpretive", "assertions": "log"}"#)?,
    )?;
    assert_eq!(session.engine_kind(), EngineKind::Interpretive);
    assert_abs_diff_eq!(session.expected_duration(), 1.0, epsilon = 1e-4);

    assert!(AnimationSession::from_json_str(
        "{\"layers\": ",
        RecordingSurface::default(),
        EngineConfig::default()
    )
    .is_err());
    Ok(())
}
