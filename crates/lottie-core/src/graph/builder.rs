//! One-time conversion of the decoded document into the layer arena.

use std::collections::HashMap;

use glam::Vec2;
use lottie_data::model as data;

use super::layer::{
    CompositionLayer, ImageContent, LayerContent, MatteMode, MatteReference, SolidContent,
    TextNode,
};
use super::shape::ShapeGroupNode;
use super::tree::Composition;
use super::LayerId;
use crate::context::EngineContext;
use crate::geometry::parse_hex_color;

/// Precompositions nested deeper than this are dropped.
const MAX_PRECOMP_DEPTH: usize = 32;

struct BuildScope<'a> {
    document: &'a data::LottieJson,
    context: &'a EngineContext,
    /// Asset ids of the precompositions currently being expanded.
    stack: Vec<&'a str>,
}

pub(crate) fn build_root(document: &data::LottieJson, context: &EngineContext) -> Composition {
    let mut scope = BuildScope {
        document,
        context,
        stack: Vec::new(),
    };
    build_composition(
        &mut scope,
        document.nm.as_deref().unwrap_or(""),
        Vec2::new(document.w as f32, document.h as f32),
        &document.layers,
        "",
    )
}

fn build_composition<'a>(
    scope: &mut BuildScope<'a>,
    name: &str,
    size: Vec2,
    raw: &'a [data::Layer],
    keypath: &str,
) -> Composition {
    let context = scope.context;
    let diagnostics = &context.diagnostics;
    let by_index: HashMap<u32, LayerId> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, layer)| layer.ind.map(|ind| (ind, LayerId(i))))
        .collect();

    let mut layers = Vec::with_capacity(raw.len());
    for layer in raw {
        let path = if keypath.is_empty() {
            layer.name().to_string()
        } else {
            format!("{keypath}.{}", layer.name())
        };
        let content = build_content(scope, layer, &path);
        layers.push(CompositionLayer::new(layer, content, diagnostics));
    }

    for (i, layer) in raw.iter().enumerate() {
        if let Some(parent) = layer.parent {
            match by_index.get(&parent) {
                Some(&id) if id.0 != i => layers[i].parent = Some(id),
                _ => diagnostics.warn(format!(
                    "layer '{}' references missing parent {parent}",
                    layer.name()
                )),
            }
        }
    }
    break_parent_cycles(&mut layers, diagnostics);
    link_mattes(raw, &mut layers, &by_index);

    let order = evaluation_order(&layers);
    Composition::new(name.to_string(), size, layers, order)
}

fn build_content<'a>(scope: &mut BuildScope<'a>, layer: &'a data::Layer, keypath: &str) -> LayerContent {
    let context = scope.context;
    let diagnostics = &context.diagnostics;
    match layer.ty {
        0 => build_precomp(scope, layer, keypath),
        1 => {
            let color = layer
                .color
                .as_deref()
                .and_then(parse_hex_color)
                .unwrap_or_else(|| {
                    diagnostics.warn(format!("solid layer '{}' has no usable colour", layer.name()));
                    glam::Vec4::ZERO
                });
            LayerContent::Solid(SolidContent {
                color,
                size: Vec2::new(
                    layer.sw.unwrap_or(0) as f32,
                    layer.sh.unwrap_or(0) as f32,
                ),
            })
        }
        2 => {
            let asset = layer.ref_id.as_deref().and_then(|id| scope.document.asset(id));
            let image = asset.and_then(|asset| context.images.image(asset));
            if image.is_none() {
                diagnostics.warn(format!("image for layer '{}' could not be resolved", layer.name()));
            }
            let size = asset
                .map(|a| Vec2::new(a.w.unwrap_or(0) as f32, a.h.unwrap_or(0) as f32))
                .unwrap_or(Vec2::ZERO);
            LayerContent::Image(ImageContent { image, size })
        }
        3 => LayerContent::Null,
        4 => LayerContent::Shape(ShapeGroupNode::build(
            layer.name(),
            layer.shapes.as_deref().unwrap_or(&[]),
            None,
            diagnostics,
        )),
        5 => match &layer.t {
            Some(text) => LayerContent::Text(TextNode::from_data(
                text,
                keypath,
                context.text.as_ref(),
                context.fonts.as_ref(),
                diagnostics,
            )),
            None => LayerContent::Null,
        },
        other => {
            diagnostics.warn(format!(
                "layer '{}' has unsupported type {other}; treating it as a null layer",
                layer.name()
            ));
            LayerContent::Null
        }
    }
}

fn build_precomp<'a>(scope: &mut BuildScope<'a>, layer: &'a data::Layer, keypath: &str) -> LayerContent {
    let context = scope.context;
    let diagnostics = &context.diagnostics;
    let Some(ref_id) = layer.ref_id.as_deref() else {
        diagnostics.warn(format!("precomposition layer '{}' has no refId", layer.name()));
        return LayerContent::Null;
    };
    let Some(layers) = scope.document.asset(ref_id).and_then(|a| a.layers.as_deref()) else {
        diagnostics.warn(format!("precomposition '{ref_id}' not found"));
        return LayerContent::Null;
    };
    if scope.stack.contains(&ref_id) || scope.stack.len() >= MAX_PRECOMP_DEPTH {
        diagnostics.warn(format!("precomposition '{ref_id}' nests into itself; skipped"));
        return LayerContent::Null;
    }
    let size = Vec2::new(
        layer.w.unwrap_or(0) as f32,
        layer.h.unwrap_or(0) as f32,
    );
    scope.stack.push(ref_id);
    let composition = build_composition(scope, ref_id, size, layers, keypath);
    scope.stack.pop();
    LayerContent::Precomp(Box::new(composition))
}

fn break_parent_cycles(layers: &mut [CompositionLayer], diagnostics: &crate::context::Diagnostics) {
    for start in 0..layers.len() {
        let mut seen = vec![false; layers.len()];
        let mut current = start;
        seen[current] = true;
        while let Some(parent) = layers[current].parent {
            if seen[parent.0] {
                diagnostics.warn(format!(
                    "parent cycle through layer '{}'; link removed",
                    layers[current].name
                ));
                layers[current].parent = None;
                break;
            }
            seen[parent.0] = true;
            current = parent.0;
        }
    }
}

/// A matted layer uses the layer named by `tp`, or the layer directly
/// above it.
fn link_mattes(raw: &[data::Layer], layers: &mut [CompositionLayer], by_index: &HashMap<u32, LayerId>) {
    for (i, layer) in raw.iter().enumerate() {
        let Some(mode) = layer.tt.and_then(MatteMode::from_data) else {
            continue;
        };
        let source = match layer.tp {
            Some(tp) => by_index.get(&tp).copied(),
            None => i.checked_sub(1).map(LayerId),
        };
        let Some(source) = source.filter(|s| s.0 != i) else {
            continue;
        };
        layers[i].matte = Some(MatteReference { source, mode });
        layers[source.0].is_matte_source = true;
    }
}

/// Parents before children, otherwise document order.
fn evaluation_order(layers: &[CompositionLayer]) -> Vec<LayerId> {
    fn visit(id: usize, layers: &[CompositionLayer], placed: &mut [bool], order: &mut Vec<LayerId>) {
        if placed[id] {
            return;
        }
        placed[id] = true;
        if let Some(parent) = layers[id].parent {
            visit(parent.0, layers, placed, order);
        }
        order.push(LayerId(id));
    }

    let mut placed = vec![false; layers.len()];
    let mut order = Vec::with_capacity(layers.len());
    for id in 0..layers.len() {
        visit(id, layers, &mut placed, &mut order);
    }
    order
}
