//! Per-frame strategy: evaluate the graph, then write whatever changed.

use crate::error::{EngineError, Result};
use crate::graph::{
    AnimatorNode, Composition, CompositionLayer, CompositionTree, EvaluationStats, LayerContent,
    ShapeGroupNode,
};
use crate::surface::{
    CompositionBinding, ContentBinding, EntryBinding, FillRule, FillStyle, GroupBinding,
    HandleId, MaskOutput, Paint, PaintOutput, PushedLayer, SurfaceBindings, TargetSurface,
    TargetSurfaceHandle,
};

/// Walks the node graph every displayed frame.
#[derive(Debug, Default)]
pub struct InterpretiveEngine {
    last_frame: Option<f32>,
}

impl InterpretiveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<f32> {
        self.last_frame
    }

    /// Evaluates `frame` and pushes changed outputs onto their handles.
    pub fn render_frame<S: TargetSurface>(
        &mut self,
        tree: &mut CompositionTree,
        bindings: &mut SurfaceBindings,
        surface: &mut S,
        frame: f32,
    ) -> Result<EvaluationStats> {
        let stats = tree.evaluate(frame);
        push_composition(tree.root(), &mut bindings.root, surface)?;
        self.last_frame = Some(frame);
        Ok(stats)
    }

    /// Rewrites every handle regardless of what was pushed before, e.g.
    /// after compiled timelines were removed.
    pub fn push_all<S: TargetSurface>(
        &mut self,
        tree: &CompositionTree,
        bindings: &mut SurfaceBindings,
        surface: &mut S,
    ) -> Result<()> {
        bindings.invalidate();
        push_composition(tree.root(), &mut bindings.root, surface)
    }
}

fn handle<S: TargetSurface>(surface: &mut S, id: HandleId) -> Result<&mut S::Handle> {
    surface.handle_mut(id).ok_or(EngineError::MissingHandle(id.0))
}

pub(crate) fn push_composition<S: TargetSurface>(
    composition: &Composition,
    binding: &mut CompositionBinding,
    surface: &mut S,
) -> Result<()> {
    for (layer, slot) in composition.layers().iter().zip(binding.layers.iter_mut()) {
        if let Some(layer_binding) = slot {
            let pushed = layer_binding.pushed.take().unwrap_or_default();
            let next = push_layer(layer, layer_binding.handle, &pushed, surface)?;
            let content = push_content(layer, &mut layer_binding.content, pushed.content, surface)?;
            layer_binding.pushed = Some(PushedLayer { content, ..next });
        }
    }
    Ok(())
}

fn push_layer<S: TargetSurface>(
    layer: &CompositionLayer,
    id: HandleId,
    pushed: &PushedLayer,
    surface: &mut S,
) -> Result<PushedLayer> {
    let target = handle(surface, id)?;
    let transform = layer.transform.revision();
    if pushed.transform != transform {
        target.set_transform(layer.transform.global());
        target.set_opacity(layer.opacity());
    }
    let visible = layer.visible();
    if pushed.visible != Some(visible) {
        target.set_visible(visible);
    }
    let masks: Vec<u64> = layer.masks.iter().map(|m| m.revision()).collect();
    if pushed.masks != masks {
        let outputs: Vec<MaskOutput> = layer.masks.iter().map(|m| m.output().clone()).collect();
        target.set_masks(&outputs);
    }
    Ok(PushedLayer {
        transform,
        visible: Some(visible),
        masks,
        content: pushed.content,
    })
}

/// Returns the content revision now on the surface.
fn push_content<S: TargetSurface>(
    layer: &CompositionLayer,
    binding: &mut ContentBinding,
    pushed: u64,
    surface: &mut S,
) -> Result<u64> {
    match (&layer.content, binding) {
        (LayerContent::Shape(group), ContentBinding::Shape(group_binding)) => {
            push_group(group, group_binding, surface)?;
            Ok(1)
        }
        (LayerContent::Precomp(inner), ContentBinding::Precomp(inner_binding)) => {
            push_composition(inner, inner_binding, surface)?;
            Ok(1)
        }
        (LayerContent::Solid(solid), ContentBinding::Solid(id)) => {
            if pushed == 0 {
                let target = handle(surface, *id)?;
                target.set_path(&solid.path());
                target.set_fill(&FillStyle {
                    paint: Paint::Solid(solid.color),
                    opacity: 1.0,
                    rule: FillRule::NonZero,
                });
            }
            Ok(1)
        }
        (LayerContent::Image(image), ContentBinding::Image(id)) => {
            if pushed == 0 {
                handle(surface, *id)?.set_image(image.image.as_ref(), image.size);
            }
            Ok(1)
        }
        (LayerContent::Text(text), ContentBinding::Text(id)) => {
            let revision = text.revision();
            if pushed != revision {
                handle(surface, *id)?.set_text(text.output());
            }
            Ok(revision)
        }
        _ => Ok(pushed),
    }
}

pub(crate) fn push_group<S: TargetSurface>(
    group: &ShapeGroupNode,
    binding: &mut GroupBinding,
    surface: &mut S,
) -> Result<()> {
    let revision = group.transform.revision();
    if binding.pushed != Some(revision) {
        let target = handle(surface, binding.handle)?;
        target.set_transform(group.transform.local());
        target.set_opacity(group.transform.opacity());
        binding.pushed = Some(revision);
    }
    push_entries(group, &mut binding.entries, surface)
}

fn push_entries<S: TargetSurface>(
    group: &ShapeGroupNode,
    entries: &mut [EntryBinding],
    surface: &mut S,
) -> Result<()> {
    for entry in entries {
        match entry {
            EntryBinding::Render {
                handle: id,
                render,
                pushed,
            } => {
                let Some(item) = group.renders().get(*render) else {
                    continue;
                };
                let revision = group.render_revision(item);
                if *pushed == Some(revision) {
                    continue;
                }
                let target = handle(surface, *id)?;
                target.set_path(&group.render_path(item).to_bez_path());
                match group.render_paint(item) {
                    Some(PaintOutput::Fill(fill)) => target.set_fill(&fill),
                    Some(PaintOutput::Stroke(stroke)) => target.set_stroke(&stroke),
                    None => {}
                }
                target.set_trim(group.render_trim(item));
                *pushed = Some(revision);
            }
            EntryBinding::Group { item, binding } => {
                if let Some(subgroup) = group.subgroup(*item) {
                    push_group(subgroup, binding, surface)?;
                }
            }
            EntryBinding::Repeater {
                item,
                copies,
                pushed,
            } => {
                let Some(repeater) = group.repeater(*item) else {
                    continue;
                };
                let revision = repeater.revision();
                if *pushed != Some(revision) {
                    for copy in copies.iter() {
                        let Some(placement) = repeater.output().get(copy.index) else {
                            continue;
                        };
                        let target = handle(surface, copy.handle)?;
                        target.set_transform(placement.transform);
                        target.set_opacity(placement.opacity);
                        target.set_visible(placement.visible);
                    }
                    *pushed = Some(revision);
                }
                for copy in copies.iter_mut() {
                    push_entries(group, &mut copy.entries, surface)?;
                }
            }
        }
    }
    Ok(())
}
