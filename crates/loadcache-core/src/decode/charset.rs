//! Text encoding resolution for stylesheets and scripts
//!
//! Resolution order: a byte order mark wins, then (stylesheets only) an
//! initial `@charset "<label>"` rule, then an explicit charset from the
//! transport or the requesting document, else windows-1252.

use encoding_rs::{Encoding, ISO_8859_8, ISO_8859_8_I, WINDOWS_1252};

/// Look up an encoding by label, mapping visually ordered Hebrew to its
/// logical variant
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    if encoding == ISO_8859_8 {
        Some(ISO_8859_8_I)
    } else {
        Some(encoding)
    }
}

/// Label of an initial `@charset "<label>"` rule
pub fn css_charset_rule(buffer: &[u8]) -> Option<&str> {
    const PREFIX: &[u8] = b"@charset \"";
    let rest = buffer.strip_prefix(PREFIX)?;
    let end = rest.iter().position(|&b| b == b'"')?;
    std::str::from_utf8(&rest[..end]).ok()
}

/// Pick the encoding for a buffer
///
/// `candidates` are tried in order; unknown labels are skipped.
pub fn resolve<'a>(
    buffer: &[u8],
    candidates: impl IntoIterator<Item = &'a str>,
) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(buffer) {
        return encoding;
    }
    candidates
        .into_iter()
        .find_map(encoding_for_label)
        .unwrap_or(WINDOWS_1252)
}

/// Decode a buffer, dropping a leading byte order mark
pub fn decode(buffer: &[u8], encoding: &'static Encoding) -> String {
    let (text, _) = encoding.decode_with_bom_removal(buffer);
    if let Some(stripped) = text.strip_prefix('\u{feff}') {
        return stripped.to_string();
    }
    text.into_owned()
}

/// Whether a stylesheet served with this mimetype may be applied
pub fn is_acceptable_css_mimetype(mimetype: &str) -> bool {
    mimetype.is_empty()
        || mimetype == "text/css"
        || mimetype == "application/x-unknown-content-type"
}
