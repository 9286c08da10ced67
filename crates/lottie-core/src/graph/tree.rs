use glam::{Mat3, Vec2};
use lottie_data::model as data;

use super::builder;
use super::layer::{CompositionLayer, LayerContent};
use super::{AnimatorNode, EvaluationStats, LayerId};
use crate::context::EngineContext;
use crate::error::{EngineError, Result};

/// The layers of the root composition or of one precomposition.
#[derive(Debug, Clone)]
pub struct Composition {
    pub name: String,
    pub size: Vec2,
    layers: Vec<CompositionLayer>,
    /// Parents before children.
    order: Vec<LayerId>,
}

impl Composition {
    pub(crate) fn new(name: String, size: Vec2, layers: Vec<CompositionLayer>, order: Vec<LayerId>) -> Self {
        let mut composition = Self {
            name,
            size,
            layers,
            order,
        };
        composition.resolve_globals();
        composition
    }

    /// Layers in document order; the first draws on top.
    pub fn layers(&self) -> &[CompositionLayer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&CompositionLayer> {
        self.layers.get(id.0)
    }

    pub fn evaluation_order(&self) -> &[LayerId] {
        &self.order
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        std::iter::successors(self.layers.get(id.0).and_then(|l| l.parent), move |p| {
            self.layers.get(p.0).and_then(|l| l.parent)
        })
    }

    fn resolve_globals(&mut self) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            let parent = self.layers[id.0].parent.map(|p| self.layers[p.0].transform.global());
            self.layers[id.0].transform.resolve_global(parent);
        }
    }

    /// Global transform of a layer at an arbitrary frame without touching
    /// any cache.
    pub fn global_at(&self, id: LayerId, frame: f32) -> Mat3 {
        let mut matrix = Mat3::IDENTITY;
        for layer_id in std::iter::once(id).chain(self.ancestors(id)) {
            let layer = &self.layers[layer_id.0];
            let local = layer.transform.components_at(frame).matrix();
            matrix = local * matrix;
        }
        matrix
    }

    /// Brings every layer to `frame` of this composition. Returns whether
    /// any output changed.
    pub fn evaluate(&mut self, frame: f32, framerate: f32, stats: &mut EvaluationStats) -> bool {
        let mut moved = vec![false; self.layers.len()];
        for index in 0..self.order.len() {
            let id = self.order[index];
            let parent = self.layers[id.0]
                .parent
                .map(|p| (self.layers[p.0].transform.global(), moved[p.0]));
            let layer = &mut self.layers[id.0];
            if let Some((_, true)) = parent {
                layer.transform.state_mut().has_upstream_updates = true;
            }
            if layer.transform.update(frame, stats) {
                layer.transform.resolve_global(parent.map(|(global, _)| global));
                moved[id.0] = true;
            }
        }

        let mut changed = moved.iter().any(|m| *m);
        for layer in &mut self.layers {
            changed |= layer.update_content(frame, framerate, stats);
        }
        changed
    }
}

/// The node graph of one document, built once.
#[derive(Debug, Clone)]
pub struct CompositionTree {
    root: Composition,
    framerate: f32,
    in_frame: f32,
    out_frame: f32,
}

impl CompositionTree {
    /// Builds the graph. Touches no surface, so it may run on any thread.
    pub fn build(document: &data::LottieJson, context: &EngineContext) -> Result<Self> {
        if document.fr.is_nan() || document.fr <= 0.0 {
            return Err(EngineError::InvalidFramerate(document.fr));
        }
        let root = builder::build_root(document, context);
        tracing::debug!(
            layers = root.layers().len(),
            framerate = document.fr,
            "built composition tree"
        );
        Ok(Self {
            root,
            framerate: document.fr,
            in_frame: document.ip,
            out_frame: document.op,
        })
    }

    pub fn root(&self) -> &Composition {
        &self.root
    }

    pub fn framerate(&self) -> f32 {
        self.framerate
    }

    pub fn in_frame(&self) -> f32 {
        self.in_frame
    }

    pub fn out_frame(&self) -> f32 {
        self.out_frame
    }

    /// Evaluates the whole tree at a root frame and reports the work done.
    pub fn evaluate(&mut self, frame: f32) -> EvaluationStats {
        let mut stats = EvaluationStats::default();
        self.root.evaluate(frame, self.framerate, &mut stats);
        stats
    }

    /// Total number of layers, precompositions included.
    pub fn layer_count(&self) -> usize {
        fn count(composition: &Composition) -> usize {
            composition
                .layers()
                .iter()
                .map(|layer| match &layer.content {
                    LayerContent::Precomp(inner) => 1 + count(inner),
                    _ => 1,
                })
                .sum()
        }
        count(&self.root)
    }
}
