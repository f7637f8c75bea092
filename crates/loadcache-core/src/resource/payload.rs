//! Kind-specific content and the notifications it produces

use bytes::Bytes;
use std::sync::Arc;

use super::{ResourceInner, ResourceKind, Status};
use crate::decode::{AnimationPolicy, ImageDecoder, ImageRect, charset, font};
use crate::error::{DecodeError, ResourceError};

/// Placeholder area repainted when an image fails
const BROKEN_IMAGE: ImageRect = ImageRect {
    x: 0,
    y: 0,
    width: 16,
    height: 16,
};

pub(crate) enum Payload {
    Stylesheet(Option<Arc<str>>),
    Script(Option<Arc<str>>),
    Image {
        decoder: ImageDecoder,
        suggested_filename: Option<String>,
    },
    Audio(Option<Bytes>),
    Font(Option<Bytes>),
}

impl Payload {
    pub(crate) fn new(kind: ResourceKind, animation: AnimationPolicy) -> Self {
        match kind {
            ResourceKind::Stylesheet => Payload::Stylesheet(None),
            ResourceKind::Script => Payload::Script(None),
            ResourceKind::Image => Payload::Image {
                decoder: ImageDecoder::new(animation),
                suggested_filename: None,
            },
            ResourceKind::Audio => Payload::Audio(None),
            ResourceKind::Font => Payload::Font(None),
        }
    }

    pub(crate) fn text(&self) -> Option<Arc<str>> {
        match self {
            Payload::Stylesheet(text) | Payload::Script(text) => text.clone(),
            _ => None,
        }
    }

    pub(crate) fn bytes(&self) -> Option<Bytes> {
        match self {
            Payload::Audio(bytes) | Payload::Font(bytes) => bytes.clone(),
            _ => None,
        }
    }

    pub(crate) fn decoder(&self) -> Option<&ImageDecoder> {
        match self {
            Payload::Image { decoder, .. } => Some(decoder),
            _ => None,
        }
    }
}

/// A callback to fire on clients once locks are released
#[derive(Debug, Clone)]
pub(crate) enum Notice {
    StyleSheet {
        sheet: Arc<str>,
        charset: String,
        mimetype: String,
    },
    Image(ImageRect),
    Finished,
    Error(ResourceError),
}

/// Side effects of a state change on a resource
#[derive(Debug, Default)]
pub(crate) struct Update {
    pub(crate) notices: Vec<Notice>,
    pub(crate) size: Option<usize>,
}

impl Update {
    fn notify(notices: Vec<Notice>) -> Self {
        Self {
            notices,
            size: None,
        }
    }

    fn sized(notices: Vec<Notice>, size: usize) -> Self {
        Self {
            notices,
            size: Some(size),
        }
    }
}

impl ResourceInner {
    /// Take a chunk of body bytes; `eof` marks the final delivery
    pub(super) fn receive(&mut self, kind: ResourceKind, chunk: &[u8], eof: bool) -> Update {
        match self.status {
            Status::Cached | Status::Persistent | Status::Error => return Update::default(),
            Status::Unknown | Status::Pending => self.status = Status::Loading,
            Status::Loading => {}
        }

        if let Payload::Image { decoder, .. } = &mut self.payload {
            let mut notices = Vec::new();
            if let Some((width, height)) = decoder.feed(chunk) {
                notices.push(Notice::Image(ImageRect::sized(width, height)));
            }
            if !eof {
                return Update::notify(notices);
            }
            return match decoder.finish() {
                Ok((width, height)) => {
                    self.status = Status::Cached;
                    notices.push(Notice::Image(ImageRect::sized(width, height)));
                    notices.push(Notice::Finished);
                    Update::notify(notices)
                }
                Err(e) => self.fail(kind, ResourceError::new(DecodeError::CODE, e.to_string())),
            };
        }

        self.raw.extend_from_slice(chunk);
        if !eof {
            return Update::default();
        }
        let raw = std::mem::take(&mut self.raw);
        self.complete(kind, raw)
    }

    fn complete(&mut self, kind: ResourceKind, raw: Vec<u8>) -> Update {
        let size = raw.len();
        match kind {
            ResourceKind::Stylesheet => {
                let encoding = {
                    let rule = if raw.len() > 12 {
                        charset::css_charset_rule(&raw)
                    } else {
                        None
                    };
                    let candidates = [rule, self.charset.as_deref(), self.charset_hint.as_deref()];
                    charset::resolve(&raw, candidates.into_iter().flatten())
                };
                let sheet: Arc<str> = charset::decode(&raw, encoding).into();
                self.charset = Some(encoding.name().to_string());
                self.payload = Payload::Stylesheet(Some(sheet.clone()));
                self.status = Status::Cached;
                Update::sized(
                    vec![Notice::StyleSheet {
                        sheet,
                        charset: encoding.name().to_string(),
                        mimetype: self.mimetype.clone(),
                    }],
                    size,
                )
            }
            ResourceKind::Script => {
                let encoding = charset::resolve(&raw, self.charset.as_deref());
                self.charset = Some(encoding.name().to_string());
                self.payload = Payload::Script(Some(charset::decode(&raw, encoding).into()));
                self.status = Status::Cached;
                Update::sized(vec![Notice::Finished], size)
            }
            ResourceKind::Audio => {
                self.payload = Payload::Audio(Some(Bytes::from(raw)));
                self.status = Status::Cached;
                Update::sized(vec![Notice::Finished], size)
            }
            ResourceKind::Font => match font::unpack(&raw) {
                Ok(sfnt) => {
                    let size = sfnt.len();
                    self.payload = Payload::Font(Some(Bytes::from(sfnt)));
                    self.status = Status::Cached;
                    Update::sized(vec![Notice::Finished], size)
                }
                Err(e) => self.fail(kind, ResourceError::new(DecodeError::CODE, e.to_string())),
            },
            // Images are decoded incrementally in `receive`
            ResourceKind::Image => Update::default(),
        }
    }

    /// Move to the error state
    pub(super) fn fail(&mut self, kind: ResourceKind, error: ResourceError) -> Update {
        self.status = Status::Error;
        self.error = Some(error.clone());
        self.raw = Vec::new();

        match &mut self.payload {
            Payload::Image { decoder, .. } => {
                decoder.clear();
                Update::sized(vec![Notice::Image(BROKEN_IMAGE), Notice::Finished], 0)
            }
            _ if kind == ResourceKind::Stylesheet => Update::notify(vec![Notice::Error(error)]),
            _ => Update::notify(vec![Notice::Finished]),
        }
    }

    /// Notifications owed to a client registering now
    pub(super) fn replay(&self, kind: ResourceKind, url: &str) -> Vec<Notice> {
        if !self.is_loaded() {
            // A progressively decoding image already has a paintable area
            return match (&self.payload, &self.error) {
                (Payload::Image { decoder, .. }, None) => decoder
                    .geometry()
                    .map(|(width, height)| vec![Notice::Image(ImageRect::sized(width, height))])
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
        }
        match (&self.payload, &self.error) {
            (Payload::Image { .. }, Some(_)) => vec![Notice::Image(BROKEN_IMAGE), Notice::Finished],
            (Payload::Image { decoder, .. }, None) => match decoder.geometry() {
                Some((width, height)) => vec![
                    Notice::Image(ImageRect::sized(width, height)),
                    Notice::Finished,
                ],
                None => vec![Notice::Finished],
            },
            (_, Some(error)) if kind == ResourceKind::Stylesheet => vec![Notice::Error(error.clone())],
            (Payload::Stylesheet(sheet), None) => {
                let Some(sheet) = sheet.clone() else {
                    tracing::debug!("Stylesheet {} is loaded without content", url);
                    return Vec::new();
                };
                vec![Notice::StyleSheet {
                    sheet,
                    charset: self.charset.clone().unwrap_or_default(),
                    mimetype: self.mimetype.clone(),
                }]
            }
            _ => vec![Notice::Finished],
        }
    }

    /// Size accounted once the load has completed
    pub(super) fn final_size(&self) -> Option<usize> {
        match &self.payload {
            Payload::Image { decoder, .. } => Some(
                decoder
                    .geometry()
                    .map_or(0, |(w, h)| w as usize * h as usize * 2),
            ),
            _ => None,
        }
    }

    pub(super) fn set_suggested_filename(&mut self, filename: Option<String>) {
        if let Payload::Image {
            suggested_filename, ..
        } = &mut self.payload
        {
            *suggested_filename = filename;
        }
    }

    pub(super) fn suggested_filename(&self) -> Option<String> {
        match &self.payload {
            Payload::Image {
                suggested_filename, ..
            } => suggested_filename.clone(),
            _ => None,
        }
    }

    pub(super) fn set_animation(&mut self, animation: AnimationPolicy) {
        if let Payload::Image { decoder, .. } = &mut self.payload {
            decoder.set_animation(animation);
        }
    }
}
