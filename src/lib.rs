//! Plays Lottie documents on a host surface.
//!
//! [`AnimationSession`] owns one decoded document, the surface handles it
//! was bound to and the strategy chosen for it by [`EngineConfig`].

pub mod config;
pub mod error;
pub mod session;

pub use config::{EngineConfig, RenderingEngineOption};
pub use error::{Result, SessionError};
pub use session::{select_engine, AnimationSession, EngineKind};

pub use lottie_core::{
    AssertionPolicy, CompatibilityReport, RecordingSurface, TargetSurface, TimingConfiguration,
};
pub use lottie_data::model::LottieJson;
