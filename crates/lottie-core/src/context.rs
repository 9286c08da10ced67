//! Per-session collaborators: diagnostics sink and asset providers.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::providers::{
    DefaultTextResolver, EmbeddedImageProvider, FontProvider, ImageAssetProvider, NoFonts,
    TextResolver,
};

/// What happens when malformed input or an impossible state is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionPolicy {
    /// Panic, as a debug assertion would.
    Panic,
    /// Log through `tracing` and degrade.
    Log,
}

impl Default for AssertionPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            AssertionPolicy::Panic
        } else {
            AssertionPolicy::Log
        }
    }
}

/// Diagnostics sink owned by one session.
///
/// Warnings are forwarded to `tracing` and kept so callers can inspect
/// what was degraded or skipped while building and playing a document.
#[derive(Debug, Default)]
pub struct Diagnostics {
    policy: AssertionPolicy,
    warnings: Mutex<Vec<String>>,
}

impl Diagnostics {
    pub fn new(policy: AssertionPolicy) -> Self {
        Self {
            policy,
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> AssertionPolicy {
        self.policy
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message);
        }
    }

    /// Reports malformed input. Panics under [`AssertionPolicy::Panic`];
    /// otherwise records a warning and returns so the caller can degrade.
    pub fn assert(&self, condition: bool, message: impl FnOnce() -> String) {
        if condition {
            return;
        }
        let message = message();
        match self.policy {
            AssertionPolicy::Panic => panic!("malformed animation: {message}"),
            AssertionPolicy::Log => self.warn(format!("malformed animation: {message}")),
        }
    }

    /// Reports a state the engine should never reach, such as appearing twice.
    pub fn invariant_violation(&self, message: impl Into<String>) -> EngineError {
        let message = message.into();
        match self.policy {
            AssertionPolicy::Panic => panic!("invariant violated: {message}"),
            AssertionPolicy::Log => {
                tracing::error!("invariant violated: {message}");
                if let Ok(mut warnings) = self.warnings.lock() {
                    warnings.push(format!("invariant violated: {message}"));
                }
                EngineError::InvariantViolation(message)
            }
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.clear();
        }
    }
}

/// Everything graph construction needs from the host. One per session,
/// never shared between documents.
pub struct EngineContext {
    pub diagnostics: Diagnostics,
    pub images: Box<dyn ImageAssetProvider + Send>,
    pub fonts: Box<dyn FontProvider + Send>,
    pub text: Box<dyn TextResolver + Send>,
}

impl EngineContext {
    pub fn new(policy: AssertionPolicy) -> Self {
        Self {
            diagnostics: Diagnostics::new(policy),
            images: Box::new(EmbeddedImageProvider),
            fonts: Box::new(NoFonts),
            text: Box::new(DefaultTextResolver),
        }
    }

    pub fn with_images(mut self, images: impl ImageAssetProvider + Send + 'static) -> Self {
        self.images = Box::new(images);
        self
    }

    pub fn with_fonts(mut self, fonts: impl FontProvider + Send + 'static) -> Self {
        self.fonts = Box::new(fonts);
        self
    }

    pub fn with_text_resolver(mut self, text: impl TextResolver + Send + 'static) -> Self {
        self.text = Box::new(text);
        self
    }

    /// Drops cached assets; called when the session swaps documents.
    pub fn reset(&mut self) {
        self.images.clear_cache();
        self.diagnostics.clear();
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(AssertionPolicy::default())
    }
}
