//! Static checks deciding whether the compiled strategy can represent a
//! document faithfully. Runs on the decoded document before any rendering.

use lottie_data::model as data;

/// One feature the compiled strategy cannot represent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityIssue {
    pub rule: &'static str,
    pub layer: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityReport {
    pub issues: Vec<CompatibilityIssue>,
}

impl CompatibilityReport {
    pub fn is_supported(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A named predicate over one layer. Returns a message for each feature
/// it rejects.
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityRule {
    pub name: &'static str,
    pub check: fn(&data::Layer) -> Option<String>,
}

/// An extensible table of rules.
#[derive(Debug, Clone)]
pub struct CompatibilityClassifier {
    rules: Vec<CompatibilityRule>,
}

impl Default for CompatibilityClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                CompatibilityRule {
                    name: "time_remapping",
                    check: time_remapping,
                },
                CompatibilityRule {
                    name: "animated_dash_pattern",
                    check: animated_dash_pattern,
                },
                CompatibilityRule {
                    name: "animated_repeater",
                    check: animated_repeater,
                },
            ],
        }
    }
}

impl CompatibilityClassifier {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: CompatibilityRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Drops the rule called `name`, if present.
    pub fn without(mut self, name: &str) -> Self {
        self.rules.retain(|rule| rule.name != name);
        self
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.name)
    }

    /// Checks every layer of the document, precomposition assets included.
    pub fn classify(&self, document: &data::LottieJson) -> CompatibilityReport {
        let precomp_layers = document
            .assets
            .iter()
            .filter_map(|asset| asset.layers.as_deref())
            .flatten();
        let mut report = CompatibilityReport::default();
        for layer in document.layers.iter().chain(precomp_layers) {
            for rule in &self.rules {
                if let Some(message) = (rule.check)(layer) {
                    report.issues.push(CompatibilityIssue {
                        rule: rule.name,
                        layer: layer.name().to_string(),
                        message,
                    });
                }
            }
        }
        report
    }
}

fn time_remapping(layer: &data::Layer) -> Option<String> {
    layer
        .tm
        .as_ref()
        .map(|_| "time remapping re-times content per frame".to_string())
}

fn animated_dash_pattern(layer: &data::Layer) -> Option<String> {
    any_shape(layer, &|shape| {
        let dashes = match shape {
            data::Shape::Stroke(stroke) => &stroke.d,
            data::Shape::GradientStroke(stroke) => &stroke.d,
            _ => return false,
        };
        dashes.iter().any(|dash| dash.v.is_animated())
    })
    .then(|| "dash pattern changes between keyframes".to_string())
}

fn animated_repeater(layer: &data::Layer) -> Option<String> {
    any_shape(layer, &|shape| match shape {
        data::Shape::Repeater(rp) => {
            rp.c.is_animated()
                || rp.o.is_animated()
                || rp.tr.so.is_animated()
                || rp.tr.eo.is_animated()
                || transform_is_animated(&rp.tr.t)
        }
        _ => false,
    })
    .then(|| "repeater copies change between keyframes".to_string())
}

fn transform_is_animated(tr: &data::Transform) -> bool {
    let position = match &tr.p {
        data::PositionProperty::Unified(p) => p.is_animated(),
        data::PositionProperty::Split { x, y } => x.is_animated() || y.is_animated(),
    };
    position
        || tr.a.is_animated()
        || tr.s.is_animated()
        || tr.rz.is_animated()
        || tr.sk.is_animated()
        || tr.sa.is_animated()
}

fn any_shape(layer: &data::Layer, predicate: &dyn Fn(&data::Shape) -> bool) -> bool {
    fn visit(shapes: &[data::Shape], predicate: &dyn Fn(&data::Shape) -> bool) -> bool {
        shapes.iter().any(|shape| {
            predicate(shape)
                || matches!(shape, data::Shape::Group(group) if visit(&group.it, predicate))
        })
    }
    layer.shapes.as_deref().is_some_and(|shapes| visit(shapes, predicate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(layers: serde_json::Value) -> data::LottieJson {
        serde_json::from_value(json!({
            "ip": 0, "op": 60, "fr": 30, "w": 100, "h": 100, "layers": layers
        }))
        .expect("valid document")
    }

    fn dashed(animated: bool) -> serde_json::Value {
        let dash = if animated {
            json!({"a": 1, "k": [{"t": 0, "s": [4]}, {"t": 30, "s": [8]}]})
        } else {
            json!({"k": 4})
        };
        json!([{
            "ty": 4, "nm": "lines",
            "shapes": [{"ty": "gr", "it": [
                {"ty": "el", "s": {"k": [10, 10]}, "p": {"k": [0, 0]}},
                {"ty": "st", "c": {"k": [0, 0, 0, 1]}, "w": {"k": 2}, "o": {"k": 100},
                 "d": [{"n": "d", "v": dash}, {"n": "g", "v": {"k": 2}}]}
            ]}]
        }])
    }

    #[test]
    fn plain_documents_are_supported() {
        let report = CompatibilityClassifier::default().classify(&document(dashed(false)));
        assert!(report.is_supported(), "{report:?}");
    }

    #[test]
    fn animated_dashes_in_nested_groups_are_flagged() {
        let report = CompatibilityClassifier::default().classify(&document(dashed(true)));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].rule, "animated_dash_pattern");
        assert_eq!(report.issues[0].layer, "lines");
    }

    #[test]
    fn precomposition_layers_are_checked() {
        let doc: data::LottieJson = serde_json::from_value(json!({
            "ip": 0, "op": 60, "fr": 30, "w": 100, "h": 100,
            "assets": [{"id": "inner", "layers": [
                {"ty": 3, "nm": "remapped", "tm": {"a": 1, "k": [{"t": 0, "s": [0]}, {"t": 60, "s": [2]}]}}
            ]}],
            "layers": [{"ty": 0, "refId": "inner"}]
        }))
        .expect("valid document");
        let report = CompatibilityClassifier::default().classify(&doc);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].rule, "time_remapping");
    }

    #[test]
    fn rules_can_be_removed_and_added() {
        let doc = document(dashed(true));
        let classifier = CompatibilityClassifier::default().without("animated_dash_pattern");
        assert!(classifier.classify(&doc).is_supported());
        assert_eq!(classifier.rule_names().count(), 2);

        let classifier = CompatibilityClassifier::empty().with_rule(CompatibilityRule {
            name: "no_shape_layers",
            check: |layer| (layer.ty == 4).then(|| "shape layer".to_string()),
        });
        assert_eq!(classifier.classify(&doc).issues.len(), 1);
    }

    #[test]
    fn animated_repeater_steps_are_flagged() {
        let doc = document(json!([{
            "ty": 4, "nm": "ring",
            "shapes": [
                {"ty": "el", "s": {"k": [4, 4]}, "p": {"k": [10, 0]}},
                {"ty": "fl", "c": {"k": [1, 1, 1, 1]}, "o": {"k": 100}},
                {"ty": "rp", "c": {"k": 6}, "o": {"k": 0}, "m": 1, "tr": {
                    "r": {"a": 1, "k": [{"t": 0, "s": [0]}, {"t": 30, "s": [60]}]},
                    "so": {"k": 100}, "eo": {"k": 100}
                }}
            ]
        }]));
        let report = CompatibilityClassifier::default().classify(&doc);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].rule, "animated_repeater");
    }
}
