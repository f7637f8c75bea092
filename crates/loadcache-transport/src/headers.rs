//! Response header interpretation

use chrono::{DateTime, Duration, Utc};

/// Split a `Content-Type` value into its lowercased mimetype and charset
/// parameter
pub fn split_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mimetype = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    });
    (mimetype, charset)
}

/// Expiry derived from `Cache-Control` and `Expires`
///
/// `no-cache` and `no-store` expire immediately, `max-age` wins over
/// `Expires`.
pub fn parse_expiry(
    cache_control: Option<&str>,
    expires: Option<&str>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if let Some(cache_control) = cache_control {
        for directive in cache_control.split(',') {
            let directive = directive.trim();
            if directive.eq_ignore_ascii_case("no-cache") || directive.eq_ignore_ascii_case("no-store") {
                return Some(now);
            }
            let Some((name, value)) = directive.split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("max-age") {
                continue;
            }
            if let Ok(seconds) = value.trim().trim_matches('"').parse::<i64>() {
                return Some(now + Duration::seconds(seconds.max(0)));
            }
        }
    }

    let expires = expires?;
    match DateTime::parse_from_rfc2822(expires.trim()) {
        Ok(when) => Some(when.with_timezone(&Utc)),
        // Invalid dates such as "0" mean already expired
        Err(_) => Some(now),
    }
}

/// Suggested filename from a `Content-Disposition` value
pub fn content_disposition_filename(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_split_content_type() {
        assert_eq!(
            split_content_type("Text/CSS; charset=\"UTF-8\""),
            ("text/css".to_string(), Some("UTF-8".to_string()))
        );
        assert_eq!(split_content_type("image/png"), ("image/png".to_string(), None));
        assert_eq!(split_content_type(""), (String::new(), None));
    }

    #[test]
    fn test_max_age_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expiry = parse_expiry(Some("public, max-age=60"), None, now).unwrap();
        assert_eq!(expiry, now + Duration::seconds(60));
    }

    #[test]
    fn test_max_age_beats_expires() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expiry = parse_expiry(
            Some("max-age=10"),
            Some("Wed, 21 Oct 2015 07:28:00 GMT"),
            now,
        )
        .unwrap();
        assert_eq!(expiry, now + Duration::seconds(10));
    }

    #[test]
    fn test_expires_header() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expiry = parse_expiry(None, Some("Wed, 21 Oct 2015 07:28:00 GMT"), now).unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap());
        assert_eq!(parse_expiry(None, Some("0"), now), Some(now));
        assert_eq!(parse_expiry(Some("no-store"), None, now), Some(now));
        assert_eq!(parse_expiry(None, None, now), None);
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition_filename("attachment; filename=\"cat.png\""),
            Some("cat.png".to_string())
        );
        assert_eq!(content_disposition_filename("inline"), None);
    }
}
