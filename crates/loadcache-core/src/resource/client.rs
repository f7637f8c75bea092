//! Observer interface for cached resources

use super::ResourceHandle;
use crate::decode::ImageRect;

/// Receives progress and completion notifications for the resources it is
/// registered with
///
/// A client registering with a resource that already has data immediately
/// receives the notifications it would have seen had it registered earlier.
/// Which callbacks fire depends on the kind:
///
/// - stylesheets report `set_style_sheet` on success and `error` on failure
/// - images report `update_image` whenever geometry or pixels change, then
///   `notify_finished` (also after a failure, with a placeholder rectangle)
/// - scripts, audio and fonts report `notify_finished` either way
///
/// Callbacks run with no internal lock held and may call back into the cache.
pub trait ResourceClient: Send + Sync {
    fn notify_finished(&self, _resource: &ResourceHandle) {}

    fn set_style_sheet(&self, _url: &str, _sheet: &str, _charset: &str, _mimetype: &str) {}

    fn update_image(&self, _rect: ImageRect, _resource: &ResourceHandle) {}

    fn error(&self, _code: i32, _message: &str) {}
}
