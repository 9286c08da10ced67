//! Lottie schema coverage: each feature family is decoded, built into the
//! node graph and pushed through the interpretive engine onto a recording
//! surface.
//!
//! Run with: cargo test -p lottie-core --test schema_audit

use kurbo::{Rect, Shape as _};
use lottie_core::surface::{HandleRecord, HandleRole, MaskMode, Paint};
use lottie_core::{CompositionTree, EngineContext, InterpretiveEngine, RecordingSurface, SurfaceBindings};
use lottie_data::model::LottieJson;
use serde_json::json;

/// Minimal document with a single shape layer at (250, 250).
fn test_lottie_json(shapes: serde_json::Value) -> serde_json::Value {
    json!({
        "v": "5.5.0",
        "fr": 60,
        "ip": 0,
        "op": 60,
        "w": 500,
        "h": 500,
        "nm": "Test",
        "ddd": 0,
        "layers": [
            {
                "ty": 4,
                "ind": 1,
                "ip": 0,
                "op": 60,
                "st": 0,
                "nm": "Shape Layer",
                "ks": {
                    "o": { "a": 0, "k": 100 },
                    "r": { "a": 0, "k": 0 },
                    "p": { "a": 0, "k": [250, 250, 0] },
                    "a": { "a": 0, "k": [0, 0, 0] },
                    "s": { "a": 0, "k": [100, 100, 100] }
                },
                "shapes": shapes
            }
        ]
    })
}

fn create_test_lottie(shapes: serde_json::Value) -> LottieJson {
    serde_json::from_value(test_lottie_json(shapes)).expect("Failed to parse test lottie")
}

/// Builds the document and renders `frame` onto a fresh surface.
fn render(lottie: &LottieJson, frame: f32) -> RecordingSurface {
    let mut tree = CompositionTree::build(lottie, &EngineContext::default()).expect("tree builds");
    let mut surface = RecordingSurface::default();
    let mut bindings = SurfaceBindings::build(&tree, &mut surface);
    InterpretiveEngine::new()
        .render_frame(&mut tree, &mut bindings, &mut surface, frame)
        .expect("frame renders");
    surface
}

fn drawables(surface: &RecordingSurface) -> Vec<&HandleRecord> {
    surface
        .records()
        .iter()
        .filter(|r| r.role == HandleRole::Render && r.path.is_some())
        .collect()
}

fn layer<'a>(surface: &'a RecordingSurface, name: &str) -> &'a HandleRecord {
    surface
        .records()
        .iter()
        .find(|r| r.role == HandleRole::Layer && r.name == name)
        .unwrap_or_else(|| panic!("no layer handle named {name}"))
}

fn bounds(record: &HandleRecord) -> Rect {
    record.path.as_ref().expect("drawable has a path").bounding_box()
}

fn assert_rect(actual: Rect, expected: Rect) {
    let close = |a: f64, b: f64| (a - b).abs() < 0.5;
    assert!(
        close(actual.x0, expected.x0)
            && close(actual.y0, expected.y0)
            && close(actual.x1, expected.x1)
            && close(actual.y1, expected.y1),
        "bounds {actual:?}, expected {expected:?}"
    );
}

mod shapes {
    use super::*;

    #[test]
    fn test_ellipse_shape() {
        let shapes = json!([
            {
                "ty": "el",
                "nm": "Ellipse",
                "p": { "a": 0, "k": [0, 0] },
                "s": { "a": 0, "k": [100, 100] },
                "d": 1
            },
            {
                "ty": "fl",
                "nm": "Fill",
                "c": { "a": 0, "k": [1, 0, 0, 1] },
                "o": { "a": 0, "k": 100 },
                "r": 1
            }
        ]);

        let surface = render(&create_test_lottie(shapes), 0.0);
        let drawn = drawables(&surface);
        assert_eq!(drawn.len(), 1);
        assert_rect(bounds(drawn[0]), Rect::new(-50.0, -50.0, 50.0, 50.0));
        let fill = drawn[0].fill.as_ref().expect("filled");
        assert_eq!(fill.paint, Paint::Solid(glam::Vec4::new(1.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_rectangle_shape() {
        let shapes = json!([
            {
                "ty": "rc",
                "nm": "Rectangle",
                "p": { "a": 0, "k": [10, 0] },
                "s": { "a": 0, "k": [100, 50] },
                "r": { "a": 0, "k": 0 }
            },
            {
                "ty": "st",
                "c": { "a": 0, "k": [0, 0, 0, 1] },
                "o": { "a": 0, "k": 100 },
                "w": { "a": 0, "k": 3 }
            }
        ]);

        let surface = render(&create_test_lottie(shapes), 0.0);
        let drawn = drawables(&surface);
        assert_eq!(drawn.len(), 1);
        assert_rect(bounds(drawn[0]), Rect::new(-40.0, -25.0, 60.0, 25.0));
        let stroke = drawn[0].stroke.as_ref().expect("stroked");
        assert!((stroke.width - 3.0).abs() < 1e-6);
        assert!(drawn[0].fill.is_none());
    }

    #[test]
    fn test_path_shape() {
        let shapes = json!([
            {
                "ty": "sh",
                "ks": {
                    "a": 0,
                    "k": {
                        "c": true,
                        "v": [[0, 0], [100, 0], [100, 100], [0, 100]],
                        "i": [[0, 0], [0, 0], [0, 0], [0, 0]],
                        "o": [[0, 0], [0, 0], [0, 0], [0, 0]]
                    }
                }
            },
            {
                "ty": "fl",
                "c": { "a": 0, "k": [0, 1, 0, 1] },
                "o": { "a": 0, "k": 50 }
            }
        ]);

        let surface = render(&create_test_lottie(shapes), 0.0);
        let drawn = drawables(&surface);
        assert_eq!(drawn.len(), 1);
        assert_rect(bounds(drawn[0]), Rect::new(0.0, 0.0, 100.0, 100.0));
        let fill = drawn[0].fill.as_ref().expect("filled");
        assert!((fill.opacity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_polystar_shape() {
        let shapes = json!([
            {
                "ty": "sr",
                "sy": 1,
                "p": { "a": 0, "k": [0, 0] },
                "pt": { "a": 0, "k": 5 },
                "r": { "a": 0, "k": 0 },
                "or": { "a": 0, "k": 50 },
                "ir": { "a": 0, "k": 20 },
                "os": { "a": 0, "k": 0 },
                "is": { "a": 0, "k": 0 }
            },
            {
                "ty": "fl",
                "c": { "a": 0, "k": [0, 0, 1, 1] },
                "o": { "a": 0, "k": 100 }
            }
        ]);

        let surface = render(&create_test_lottie(shapes), 0.0);
        let drawn = drawables(&surface);
        assert_eq!(drawn.len(), 1);
        let rect = bounds(drawn[0]);
        // First point straight up at the outer radius.
        assert!((rect.y0 + 50.0).abs() < 0.5, "{rect:?}");
        assert!(rect.x1 <= 50.5 && rect.x0 >= -50.5 && rect.y1 <= 50.5);
    }

    #[test]
    fn test_grouped_shapes_share_a_group_handle() {
        let shapes = json!([
            {
                "ty": "gr",
                "nm": "Group",
                "it": [
                    { "ty": "el", "p": { "k": [0, 0] }, "s": { "k": [20, 20] } },
                    { "ty": "fl", "c": { "k": [1, 1, 1, 1] }, "o": { "k": 100 } },
                    { "ty": "tr", "p": { "k": [30, 0] }, "o": { "k": 100 } }
                ]
            }
        ]);

        let surface = render(&create_test_lottie(shapes), 0.0);
        let group = surface
            .records()
            .iter()
            .find(|r| r.role == HandleRole::Group && r.name == "Group")
            .expect("group handle");
        assert_eq!(
            group.transform.transform_point2(glam::Vec2::ZERO),
            glam::Vec2::new(30.0, 0.0)
        );
        let drawn = drawables(&surface);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].parent, Some(group.id));
    }
}

mod masks {
    use super::*;

    fn masked(mode: &str) -> LottieJson {
        let mut lottie = test_lottie_json(json!([]));
        lottie["layers"][0]["masksProperties"] = json!([{
            "mode": mode,
            "inv": false,
            "pt": { "a": 0, "k": {
                "c": true,
                "v": [[0, 0], [10, 0], [10, 10]],
                "i": [[0, 0], [0, 0], [0, 0]],
                "o": [[0, 0], [0, 0], [0, 0]]
            }},
            "o": { "a": 0, "k": 80 }
        }]);
        serde_json::from_value(lottie).expect("valid document")
    }

    #[test]
    fn test_all_mask_modes_present() {
        let modes = [
            ("n", MaskMode::None),
            ("a", MaskMode::Add),
            ("s", MaskMode::Subtract),
            ("i", MaskMode::Intersect),
            ("l", MaskMode::Lighten),
            ("d", MaskMode::Darken),
            ("f", MaskMode::Difference),
        ];
        for (code, mode) in modes {
            let surface = render(&masked(code), 0.0);
            let masks = &layer(&surface, "Shape Layer").masks;
            assert_eq!(masks.len(), 1, "mode {code}");
            assert_eq!(masks[0].mode, mode, "mode {code}");
            assert!((masks[0].opacity - 0.8).abs() < 1e-6);
        }
    }
}

mod keyframes {
    use super::*;

    fn with_opacity(opacity: serde_json::Value) -> LottieJson {
        let mut lottie = test_lottie_json(json!([]));
        lottie["layers"][0]["ks"]["o"] = opacity;
        serde_json::from_value(lottie).expect("valid document")
    }

    fn opacity_at(lottie: &LottieJson, frame: f32) -> f32 {
        layer(&render(lottie, frame), "Shape Layer").opacity
    }

    #[test]
    fn test_linear_interpolation() {
        let lottie = with_opacity(json!({"a": 1, "k": [
            {"t": 0, "s": [0]},
            {"t": 10, "s": [100]}
        ]}));
        assert!((opacity_at(&lottie, 5.0) - 0.5).abs() < 1e-3);
        assert!((opacity_at(&lottie, -5.0) - 0.0).abs() < 1e-6, "clamped before the first key");
        assert!((opacity_at(&lottie, 50.0) - 1.0).abs() < 1e-6, "clamped after the last key");
    }

    #[test]
    fn test_hold_keyframe() {
        let lottie = with_opacity(json!({"a": 1, "k": [
            {"t": 0, "s": [0], "h": 1},
            {"t": 10, "s": [100]}
        ]}));
        assert_eq!(opacity_at(&lottie, 5.0), 0.0);
        assert_eq!(opacity_at(&lottie, 9.99), 0.0);
        assert_eq!(opacity_at(&lottie, 10.0), 1.0);
    }

    #[test]
    fn test_bezier_easing() {
        let lottie = with_opacity(json!({"a": 1, "k": [
            {"t": 0, "s": [0], "o": {"x": [0.42], "y": [0]}, "i": {"x": [0.58], "y": [1]}},
            {"t": 10, "s": [100]}
        ]}));
        // Symmetric ease: slow start, exact midpoint.
        assert!(opacity_at(&lottie, 2.0) < 0.2);
        assert!((opacity_at(&lottie, 5.0) - 0.5).abs() < 1e-2);
        let mut previous = 0.0;
        for frame in 0..=10 {
            let value = opacity_at(&lottie, frame as f32);
            assert!(value >= previous - 1e-6, "monotonic at frame {frame}");
            previous = value;
        }
    }

    #[test]
    fn test_legacy_end_value_fills_missing_start() {
        let lottie = with_opacity(json!({"a": 1, "k": [
            {"t": 0, "s": [0], "e": [100]},
            {"t": 10}
        ]}));
        assert!((opacity_at(&lottie, 5.0) - 0.5).abs() < 1e-3);
    }
}

mod layers {
    use super::*;

    #[test]
    fn test_precomp_layer() {
        let lottie: LottieJson = serde_json::from_value(json!({
            "fr": 30, "ip": 0, "op": 60, "w": 100, "h": 100,
            "assets": [{"id": "comp_1", "layers": [
                {"ty": 1, "nm": "Inner", "ip": 0, "op": 60, "sc": "#ffffff", "sw": 10, "sh": 10,
                 "ks": {"p": {"a": 1, "k": [{"t": 0, "s": [0, 0]}, {"t": 20, "s": [20, 0]}]}}}
            ]}],
            "layers": [{"ty": 0, "nm": "Precomp", "refId": "comp_1", "ip": 0, "op": 60, "st": 10}]
        }))
        .expect("valid document");

        // Content starts at the layer's start time.
        let surface = render(&lottie, 15.0);
        let inner = layer(&surface, "Inner");
        assert_eq!(inner.parent, Some(layer(&surface, "Precomp").id));
        assert!((inner.transform.transform_point2(glam::Vec2::ZERO).x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_null_layer() {
        let lottie: LottieJson = serde_json::from_value(json!({
            "fr": 30, "ip": 0, "op": 60, "w": 100, "h": 100,
            "layers": [
                {"ty": 3, "ind": 1, "nm": "Null", "ip": 0, "op": 60,
                 "ks": {"p": {"k": [40, 0]}}},
                {"ty": 1, "ind": 2, "parent": 1, "nm": "Child", "ip": 0, "op": 60,
                 "sc": "#000000", "sw": 4, "sh": 4, "ks": {"p": {"k": [0, 2]}}}
            ]
        }))
        .expect("valid document");

        let surface = render(&lottie, 0.0);
        assert!(surface.records().iter().all(|r| r.name != "Null"), "nulls draw nothing");
        let child = layer(&surface, "Child");
        assert_eq!(
            child.transform.transform_point2(glam::Vec2::ZERO),
            glam::Vec2::new(40.0, 2.0)
        );
    }

    #[test]
    fn test_solid_layer() {
        let lottie: LottieJson = serde_json::from_value(json!({
            "fr": 30, "ip": 0, "op": 60, "w": 100, "h": 100,
            "layers": [{"ty": 1, "nm": "Solid", "ip": 0, "op": 60, "sc": "#ff8000", "sw": 64, "sh": 32}]
        }))
        .expect("valid document");

        let surface = render(&lottie, 0.0);
        let drawn = drawables(&surface);
        assert_eq!(drawn.len(), 1);
        assert_rect(bounds(drawn[0]), Rect::new(0.0, 0.0, 64.0, 32.0));
        let Some(Paint::Solid(color)) = drawn[0].fill.as_ref().map(|f| f.paint.clone()) else {
            panic!("solid fill expected");
        };
        assert!((color - glam::Vec4::new(1.0, 128.0 / 255.0, 0.0, 1.0)).abs().max_element() < 1e-3);
    }

    #[test]
    fn test_layers_outside_their_range_are_hidden() {
        let lottie: LottieJson = serde_json::from_value(json!({
            "fr": 30, "ip": 0, "op": 60, "w": 100, "h": 100,
            "layers": [{"ty": 1, "nm": "Late", "ip": 30, "op": 60, "sc": "#000000", "sw": 4, "sh": 4}]
        }))
        .expect("valid document");

        assert!(!layer(&render(&lottie, 10.0), "Late").visible);
        assert!(layer(&render(&lottie, 30.0), "Late").visible);
    }
}

mod time {
    use super::*;

    #[test]
    fn test_time_remapping() {
        let json = json!({
            "v": "5.5.0",
            "fr": 60,
            "ip": 0,
            "op": 120,
            "w": 500,
            "h": 500,
            "assets": [
                {
                    "id": "precomp_1",
                    "layers": [
                        {
                            "ty": 1,
                            "nm": "Remapped",
                            "ip": 0,
                            "op": 120,
                            "sc": "#ff0000", "sw": 10, "sh": 10,
                            "ks": {
                                "p": { "a": 1, "k": [
                                    { "t": 0, "s": [0, 0] },
                                    { "t": 60, "s": [60, 0] }
                                ]}
                            }
                        }
                    ]
                }
            ],
            "layers": [
                {
                    "ty": 0,
                    "ind": 1,
                    "ip": 0,
                    "op": 120,
                    "st": 0,
                    "refId": "precomp_1",
                    "nm": "Precomp with Time Remap",
                    "tm": { "a": 0, "k": 0.5 }
                }
            ]
        });

        let lottie: LottieJson = serde_json::from_value(json).expect("Failed to parse time remap lottie");
        // Half a second at 60 fps is inner frame 30, whatever the outer frame.
        for frame in [0.0, 60.0, 90.0] {
            let surface = render(&lottie, frame);
            let x = layer(&surface, "Remapped").transform.transform_point2(glam::Vec2::ZERO).x;
            assert!((x - 30.0).abs() < 1e-3, "frame {frame}: {x}");
        }
    }
}
