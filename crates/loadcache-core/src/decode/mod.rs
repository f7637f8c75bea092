//! Kind-specific decoders consumed by cached resources

pub mod bitmap;
pub mod charset;
pub mod font;

pub use bitmap::{AnimationPolicy, ImageDecoder, ImageRect, is_supported_mimetype};
pub use charset::is_acceptable_css_mimetype;
