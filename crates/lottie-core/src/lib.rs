//! Evaluation engine for Lottie (Bodymovin) documents.
//!
//! A decoded document becomes a [`graph::CompositionTree`] of cached
//! animator nodes. Two strategies put it on screen through a host's
//! [`surface::TargetSurface`]: [`interpretive::InterpretiveEngine`] pushes
//! changed outputs every frame, while [`compiled::CompiledEngine`] compiles
//! each animated channel into a keyframe timeline once and lets the host
//! clock drive it.

pub mod compiled;
pub mod context;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod interpretive;
pub mod keyframes;
pub mod providers;
pub mod snapshot;
pub mod surface;
pub mod timing;

pub use compiled::{CompatibilityClassifier, CompatibilityReport, CompiledEngine};
pub use context::{AssertionPolicy, Diagnostics, EngineContext};
pub use error::{EngineError, Result};
pub use graph::{CompositionTree, EvaluationStats};
pub use interpretive::InterpretiveEngine;
pub use surface::{RecordingSurface, SurfaceBindings, TargetSurface, TargetSurfaceHandle};
pub use timing::TimingConfiguration;
