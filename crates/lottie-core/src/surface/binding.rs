//! Handles created once per document, mirroring the composition tree.

use super::{HandleId, HandleRole, TargetSurface};
use crate::graph::{
    Composition, CompositionLayer, CompositionTree, GroupEntry, LayerContent, LayerId,
    ShapeGroupNode,
};

/// Revisions last written to a handle, so unchanged outputs are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PushedLayer {
    pub transform: u64,
    pub visible: Option<bool>,
    pub masks: Vec<u64>,
    pub content: u64,
}

#[derive(Debug, Clone)]
pub struct LayerBinding {
    pub layer: LayerId,
    pub handle: HandleId,
    pub content: ContentBinding,
    pub(crate) pushed: Option<PushedLayer>,
}

#[derive(Debug, Clone)]
pub enum ContentBinding {
    None,
    Shape(GroupBinding),
    Precomp(CompositionBinding),
    /// One render handle drawing the solid rectangle, image or text.
    Solid(HandleId),
    Image(HandleId),
    Text(HandleId),
}

/// Handles for one composition. Null layers have no handle.
#[derive(Debug, Clone, Default)]
pub struct CompositionBinding {
    pub layers: Vec<Option<LayerBinding>>,
}

#[derive(Debug, Clone)]
pub struct GroupBinding {
    pub handle: HandleId,
    pub entries: Vec<EntryBinding>,
    pub(crate) pushed: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum EntryBinding {
    Render {
        handle: HandleId,
        /// Index into the owning group's render items.
        render: usize,
        pushed: Option<(u64, u64, u64)>,
    },
    Group {
        item: usize,
        binding: GroupBinding,
    },
    Repeater {
        item: usize,
        copies: Vec<CopyBinding>,
        pushed: Option<u64>,
    },
}

/// One instance of a repeater's template.
#[derive(Debug, Clone)]
pub struct CopyBinding {
    pub handle: HandleId,
    pub index: usize,
    pub entries: Vec<EntryBinding>,
}

/// Every handle the engine writes to for one document.
#[derive(Debug, Clone)]
pub struct SurfaceBindings {
    pub root: CompositionBinding,
}

impl SurfaceBindings {
    /// Creates the handle tree. Later siblings are created first, so the
    /// first layer or item ends up on top.
    pub fn build<S: TargetSurface>(tree: &CompositionTree, surface: &mut S) -> Self {
        let root = bind_composition(tree.root(), None, surface);
        tracing::debug!(layers = tree.layer_count(), "created surface handles");
        Self { root }
    }

    /// Forgets what was written, so the next push rewrites everything.
    pub fn invalidate(&mut self) {
        fn composition(binding: &mut CompositionBinding) {
            for layer in binding.layers.iter_mut().flatten() {
                layer.pushed = None;
                match &mut layer.content {
                    ContentBinding::Shape(shape) => group(shape),
                    ContentBinding::Precomp(inner) => composition(inner),
                    _ => {}
                }
            }
        }
        fn group(binding: &mut GroupBinding) {
            binding.pushed = None;
            entries(&mut binding.entries);
        }
        fn entries(list: &mut [EntryBinding]) {
            for entry in list {
                match entry {
                    EntryBinding::Render { pushed, .. } => *pushed = None,
                    EntryBinding::Group { binding, .. } => group(binding),
                    EntryBinding::Repeater { copies, pushed, .. } => {
                        *pushed = None;
                        for copy in copies {
                            entries(&mut copy.entries);
                        }
                    }
                }
            }
        }
        composition(&mut self.root);
    }

    /// Every handle, parents before children.
    pub fn handles(&self) -> Vec<HandleId> {
        fn composition(binding: &CompositionBinding, out: &mut Vec<HandleId>) {
            for layer in binding.layers.iter().flatten() {
                out.push(layer.handle);
                match &layer.content {
                    ContentBinding::None => {}
                    ContentBinding::Shape(shape) => group(shape, out),
                    ContentBinding::Precomp(inner) => composition(inner, out),
                    ContentBinding::Solid(h) | ContentBinding::Image(h) | ContentBinding::Text(h) => {
                        out.push(*h)
                    }
                }
            }
        }
        fn group(binding: &GroupBinding, out: &mut Vec<HandleId>) {
            out.push(binding.handle);
            entries(&binding.entries, out);
        }
        fn entries(list: &[EntryBinding], out: &mut Vec<HandleId>) {
            for entry in list {
                match entry {
                    EntryBinding::Render { handle, .. } => out.push(*handle),
                    EntryBinding::Group { binding, .. } => group(binding, out),
                    EntryBinding::Repeater { copies, .. } => {
                        for copy in copies {
                            out.push(copy.handle);
                            entries(&copy.entries, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        composition(&self.root, &mut out);
        out
    }
}

fn bind_composition<S: TargetSurface>(
    composition: &Composition,
    parent: Option<HandleId>,
    surface: &mut S,
) -> CompositionBinding {
    let mut layers: Vec<Option<LayerBinding>> = vec![None; composition.layers().len()];
    for (index, layer) in composition.layers().iter().enumerate().rev() {
        layers[index] = bind_layer(LayerId(index), layer, parent, surface);
    }
    for (index, layer) in composition.layers().iter().enumerate() {
        let Some(matte) = layer.matte else { continue };
        let target = layers[index].as_ref().map(|b| b.handle);
        let source = layers.get(matte.source.0).and_then(|b| b.as_ref()).map(|b| b.handle);
        if let (Some(target), Some(source)) = (target, source) {
            surface.set_matte(target, source, matte.mode);
        }
    }
    CompositionBinding { layers }
}

fn bind_layer<S: TargetSurface>(
    id: LayerId,
    layer: &CompositionLayer,
    parent: Option<HandleId>,
    surface: &mut S,
) -> Option<LayerBinding> {
    if matches!(layer.content, LayerContent::Null) {
        return None;
    }
    let handle = surface.create_handle(parent, HandleRole::Layer, &layer.name);
    let content = match &layer.content {
        LayerContent::Null => ContentBinding::None,
        LayerContent::Shape(group) => ContentBinding::Shape(bind_group(group, handle, surface)),
        LayerContent::Precomp(inner) => {
            ContentBinding::Precomp(bind_composition(inner, Some(handle), surface))
        }
        LayerContent::Solid(_) => {
            ContentBinding::Solid(surface.create_handle(Some(handle), HandleRole::Render, "solid"))
        }
        LayerContent::Image(_) => {
            ContentBinding::Image(surface.create_handle(Some(handle), HandleRole::Render, "image"))
        }
        LayerContent::Text(text) => {
            ContentBinding::Text(surface.create_handle(Some(handle), HandleRole::Render, &text.keypath))
        }
    };
    Some(LayerBinding {
        layer: id,
        handle,
        content,
        pushed: None,
    })
}

fn bind_group<S: TargetSurface>(group: &ShapeGroupNode, parent: HandleId, surface: &mut S) -> GroupBinding {
    let handle = surface.create_handle(Some(parent), HandleRole::Group, &group.name);
    GroupBinding {
        handle,
        entries: bind_entries(group, group.entries(), handle, surface),
        pushed: None,
    }
}

fn bind_entries<S: TargetSurface>(
    group: &ShapeGroupNode,
    entries: &[GroupEntry],
    parent: HandleId,
    surface: &mut S,
) -> Vec<EntryBinding> {
    let mut bound: Vec<Option<EntryBinding>> = vec![None; entries.len()];
    for (index, entry) in entries.iter().enumerate().rev() {
        bound[index] = Some(match entry {
            GroupEntry::Render(render) => EntryBinding::Render {
                handle: surface.create_handle(Some(parent), HandleRole::Render, &group.name),
                render: *render,
                pushed: None,
            },
            GroupEntry::Group(item) => {
                let binding = match group.subgroup(*item) {
                    Some(subgroup) => bind_group(subgroup, parent, surface),
                    None => GroupBinding {
                        handle: surface.create_handle(Some(parent), HandleRole::Group, ""),
                        entries: Vec::new(),
                        pushed: None,
                    },
                };
                EntryBinding::Group {
                    item: *item,
                    binding,
                }
            }
            GroupEntry::Repeater { repeater, template } => EntryBinding::Repeater {
                item: *repeater,
                copies: bind_copies(group, *repeater, template, parent, surface),
                pushed: None,
            },
        });
    }
    bound.into_iter().flatten().collect()
}

fn bind_copies<S: TargetSurface>(
    group: &ShapeGroupNode,
    repeater: usize,
    template: &[GroupEntry],
    parent: HandleId,
    surface: &mut S,
) -> Vec<CopyBinding> {
    let Some(node) = group.repeater(repeater) else {
        return Vec::new();
    };
    let count = node.max_copies();
    let mut copies: Vec<Option<CopyBinding>> = vec![None; count];
    let order: Vec<usize> = if node.stacks_above() {
        (0..count).collect()
    } else {
        (0..count).rev().collect()
    };
    for index in order {
        let handle = surface.create_handle(Some(parent), HandleRole::RepeaterCopy, &group.name);
        copies[index] = Some(CopyBinding {
            handle,
            index,
            entries: bind_entries(group, template, handle, surface),
        });
    }
    copies.into_iter().flatten().collect()
}
