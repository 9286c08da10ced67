//! Session configuration, loadable from JSON.

use serde::{Deserialize, Serialize};

use lottie_core::providers::{CachedImageProvider, EmbeddedImageProvider, ImageAssetProvider};
use lottie_core::{AssertionPolicy, CompatibilityClassifier, EngineContext};

use crate::error::Result;

/// Which strategy a session plays a document with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderingEngineOption {
    /// Compiled when the classifier accepts the document, interpretive
    /// otherwise.
    #[default]
    Automatic,
    Interpretive,
    /// Compiled even for documents the classifier rejects.
    Compiled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Strategy selection
    #[serde(default)]
    pub rendering_engine: RenderingEngineOption,

    /// Decoded images kept per session
    #[serde(default = "default_image_cache_capacity")]
    pub image_cache_capacity: usize,

    /// Reaction to malformed input and impossible lifecycle transitions
    #[serde(default)]
    pub assertions: AssertionPolicy,

    /// Classifier rules to skip, by name (e.g. "time_remapping")
    #[serde(default)]
    pub disabled_compatibility_rules: Vec<String>,
}

fn default_image_cache_capacity() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rendering_engine: RenderingEngineOption::default(),
            image_cache_capacity: default_image_cache_capacity(),
            assertions: AssertionPolicy::default(),
            disabled_compatibility_rules: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_rendering_engine(mut self, option: RenderingEngineOption) -> Self {
        self.rendering_engine = option;
        self
    }

    pub fn with_assertions(mut self, policy: AssertionPolicy) -> Self {
        self.assertions = policy;
        self
    }

    /// The default rule table minus the disabled rules.
    pub fn classifier(&self) -> CompatibilityClassifier {
        self.disabled_compatibility_rules
            .iter()
            .fold(CompatibilityClassifier::default(), |classifier, name| {
                classifier.without(name)
            })
    }

    /// A context decoding embedded images through a bounded cache.
    pub fn context(&self) -> EngineContext {
        self.context_with(EmbeddedImageProvider)
    }

    /// A context loading images from `images`, cached per asset id.
    pub fn context_with(&self, images: impl ImageAssetProvider + Send + 'static) -> EngineContext {
        EngineContext::new(self.assertions)
            .with_images(CachedImageProvider::new(images, self.image_cache_capacity))
    }
}
