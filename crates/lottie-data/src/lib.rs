//! Decoded Bodymovin document model consumed by `lottie-core`.

pub mod model;
