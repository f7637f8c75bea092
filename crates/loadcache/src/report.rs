//! Per-resource outcome reporting

use loadcache_core::{ImageRect, ResourceClient, ResourceHandle, ResourceKind, Status};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// Client attached to every requested resource; logs completions
#[derive(Default)]
pub struct Reporter {
    finished: Mutex<HashSet<String>>,
}

impl Reporter {
    pub fn finished(&self) -> usize {
        self.finished.lock().len()
    }
}

impl ResourceClient for Reporter {
    fn notify_finished(&self, resource: &ResourceHandle) {
        if self.finished.lock().insert(resource.url().to_string()) {
            info!(
                "Finished {} {} ({} bytes, {:?})",
                resource.kind(),
                resource.url(),
                resource.size(),
                resource.status()
            );
        }
    }

    fn set_style_sheet(&self, url: &str, sheet: &str, charset: &str, _mimetype: &str) {
        info!("Stylesheet {} decoded as {} ({} chars)", url, charset, sheet.len());
    }

    fn update_image(&self, rect: ImageRect, resource: &ResourceHandle) {
        tracing::debug!(
            "Image {} updated {}x{}",
            resource.url(),
            rect.width,
            rect.height
        );
    }

    fn error(&self, code: i32, message: &str) {
        warn!("Load failed with code {}: {}", code, message);
    }
}

#[derive(Debug, Serialize)]
pub struct ResourceOutcome {
    pub url: String,
    pub kind: ResourceKind,
    pub status: Status,
    pub size: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mimetype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceOutcome {
    pub fn of(resource: &ResourceHandle) -> Self {
        Self {
            url: resource.url().to_string(),
            kind: resource.kind(),
            status: resource.status(),
            size: resource.size(),
            mimetype: resource.mimetype(),
            charset: resource.charset(),
            geometry: resource.image_geometry(),
            expires: resource.expires().map(|t| t.to_rfc3339()),
            error: resource.error().map(|e| e.to_string()),
        }
    }

    /// Requested URLs that could not be handed to the cache
    pub fn refused(url: &str, kind: ResourceKind, reason: &str) -> Self {
        Self {
            url: url.to_string(),
            kind,
            status: Status::Error,
            size: 0,
            mimetype: String::new(),
            charset: None,
            geometry: None,
            expires: None,
            error: Some(reason.to_string()),
        }
    }
}
