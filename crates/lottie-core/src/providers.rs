//! Asset collaborators consulted while the graph is built.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use lottie_data::model as data;
use lru::LruCache;

/// Opaque image resolved for an image layer. The engine never decodes it.
#[derive(Clone)]
pub struct ImageHandle {
    pub asset_id: String,
    pub width: u32,
    pub height: u32,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl ImageHandle {
    pub fn new(
        asset_id: impl Into<String>,
        width: u32,
        height: u32,
        payload: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            width,
            height,
            payload,
        }
    }

    /// Encoded bytes, when the payload came from [`EmbeddedImageProvider`].
    pub fn encoded_bytes(&self) -> Option<&[u8]> {
        self.payload.downcast_ref::<Vec<u8>>().map(Vec::as_slice)
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.asset_id == other.asset_id && Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("asset_id", &self.asset_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Resolves image assets for image layers.
pub trait ImageAssetProvider {
    fn image(&self, asset: &data::Asset) -> Option<ImageHandle>;

    /// Forgets anything cached for the current document.
    fn clear_cache(&self) {}
}

/// Decodes `data:*;base64,` assets embedded in the document. External
/// file references resolve to nothing; hosts that load files supply their
/// own provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedImageProvider;

impl ImageAssetProvider for EmbeddedImageProvider {
    fn image(&self, asset: &data::Asset) -> Option<ImageHandle> {
        let bytes = decode_data_uri(asset.p.as_deref()?)?;
        Some(ImageHandle::new(
            asset.id.clone(),
            asset.w.unwrap_or(0),
            asset.h.unwrap_or(0),
            Arc::new(bytes),
        ))
    }
}

fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    BASE64_STANDARD.decode(payload).ok()
}

/// Bounded LRU in front of another provider, keyed by asset id.
pub struct CachedImageProvider<P> {
    inner: P,
    cache: Mutex<LruCache<String, ImageHandle>>,
}

impl<P: ImageAssetProvider> CachedImageProvider<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl<P: ImageAssetProvider> ImageAssetProvider for CachedImageProvider<P> {
    fn image(&self, asset: &data::Asset) -> Option<ImageHandle> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&asset.id) {
                return Some(hit.clone());
            }
        }
        let image = self.inner.image(asset)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(asset.id.clone(), image.clone());
        }
        Some(image)
    }

    fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.inner.clear_cache();
    }
}

/// Opaque font resolved for a text layer.
#[derive(Clone)]
pub struct FontHandle {
    pub family: String,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl PartialEq for FontHandle {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family && Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for FontHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontHandle")
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

pub trait FontProvider {
    fn font(&self, family: &str) -> Option<FontHandle>;
}

/// Resolves no fonts; surfaces fall back to their default face.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFonts;

impl FontProvider for NoFonts {
    fn font(&self, _family: &str) -> Option<FontHandle> {
        None
    }
}

/// Replaces the authored text of a text layer. `keypath` is the
/// dot-separated chain of layer names leading to the layer.
pub trait TextResolver {
    fn resolve(&self, keypath: &str, source: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTextResolver;

impl TextResolver for DefaultTextResolver {
    fn resolve(&self, _keypath: &str, source: &str) -> String {
        source.to_string()
    }
}

impl<F> TextResolver for F
where
    F: Fn(&str, &str) -> String,
{
    fn resolve(&self, keypath: &str, source: &str) -> String {
        self(keypath, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn asset(id: &str, p: &str) -> data::Asset {
        data::Asset {
            id: id.to_string(),
            nm: None,
            layers: None,
            w: Some(4),
            h: Some(2),
            u: None,
            p: Some(p.to_string()),
            e: Some(1),
        }
    }

    struct Counting<'a>(&'a AtomicUsize);

    impl ImageAssetProvider for Counting<'_> {
        fn image(&self, asset: &data::Asset) -> Option<ImageHandle> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(ImageHandle::new(asset.id.clone(), 1, 1, Arc::new(())))
        }
    }

    #[test]
    fn embedded_provider_decodes_base64() {
        let image = EmbeddedImageProvider
            .image(&asset("img_0", "data:image/png;base64,AQID"))
            .expect("embedded image");
        assert_eq!(image.encoded_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!((image.width, image.height), (4, 2));
        assert!(EmbeddedImageProvider
            .image(&asset("img_1", "images/img_1.png"))
            .is_none());
    }

    #[test]
    fn cache_hits_skip_inner_provider_and_clear_forgets() {
        let calls = AtomicUsize::new(0);
        let cached = CachedImageProvider::new(Counting(&calls), 2);
        let a = asset("a", "");
        cached.image(&a);
        cached.image(&a);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cached.image(&asset("b", ""));
        cached.image(&asset("c", ""));
        assert_eq!(cached.cached_len(), 2, "capacity bounds the cache");

        cached.clear_cache();
        assert_eq!(cached.cached_len(), 0);
        cached.image(&a);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn closures_resolve_text() {
        let resolver = |keypath: &str, source: &str| format!("{keypath}:{source}");
        assert_eq!(resolver.resolve("Comp.Title", "Hi"), "Comp.Title:Hi");
    }
}
