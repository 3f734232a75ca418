//! Image references carried in `photoUrl`.

use reqwest::Url;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("data URI is missing the ',' payload separator")]
    MalformedDataUri,

    #[error("data URI payload must be base64 encoded")]
    NotBase64,

    #[error("data URI payload is empty")]
    EmptyPayload,

    #[error("media type '{0}' is not an image")]
    NotAnImage(String),

    #[error("unsupported URL scheme '{0}', expected http, https or data")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// A parsed image reference, ready to be attached to a model prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// Base64 image embedded in a data URI. The payload is passed through as-is.
    Inline { mime_type: String, data: String },

    /// Image hosted at a remote URL.
    Remote { mime_type: String, url: String },
}

impl MediaReference {
    pub fn parse(reference: &str) -> Result<Self, MediaError> {
        let reference = reference.trim();

        if let Some(rest) = strip_prefix_ignore_case(reference, "data:") {
            return parse_data_uri(rest);
        }

        let url = Url::parse(reference).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(MediaError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(MediaError::InvalidUrl("missing host".to_string()));
        }

        Ok(MediaReference::Remote {
            mime_type: mime_type_for_path(url.path()).to_string(),
            url: url.to_string(),
        })
    }

    pub fn mime_type(&self) -> &str {
        match self {
            MediaReference::Inline { mime_type, .. } | MediaReference::Remote { mime_type, .. } => {
                mime_type
            }
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, MediaReference::Inline { .. })
    }
}

fn parse_data_uri(rest: &str) -> Result<MediaReference, MediaError> {
    let (header, payload) = rest.split_once(',').ok_or(MediaError::MalformedDataUri)?;

    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    if !mime_type.starts_with("image/") {
        return Err(MediaError::NotAnImage(mime_type));
    }
    if !is_base64 {
        return Err(MediaError::NotBase64);
    }
    if payload.trim().is_empty() {
        return Err(MediaError::EmptyPayload);
    }

    Ok(MediaReference::Inline {
        mime_type,
        data: payload.trim().to_string(),
    })
}

/// Infer an image MIME type from a URL path, falling back to JPEG.
pub fn mime_type_for_path(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len()
        && value.is_char_boundary(prefix.len())
        && value[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base64_data_uri() {
        let media = MediaReference::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(
            media,
            MediaReference::Inline {
                mime_type: "image/png".to_string(),
                data: "iVBORw0KGgo=".to_string(),
            }
        );
    }

    #[test]
    fn data_uri_mime_type_is_normalised() {
        let media = MediaReference::parse("DATA:Image/JPEG;base64,/9j/4AAQ").unwrap();
        assert_eq!(media.mime_type(), "image/jpeg");
        assert!(media.is_inline());
    }

    #[test]
    fn rejects_non_image_data_uri() {
        let result = MediaReference::parse("data:text/plain;base64,aGVsbG8=");
        assert_eq!(result, Err(MediaError::NotAnImage("text/plain".to_string())));
    }

    #[test]
    fn rejects_data_uri_without_base64_flag() {
        let result = MediaReference::parse("data:image/svg+xml,<svg></svg>");
        assert_eq!(result, Err(MediaError::NotBase64));
    }

    #[test]
    fn rejects_data_uri_without_payload() {
        assert_eq!(
            MediaReference::parse("data:image/png;base64,"),
            Err(MediaError::EmptyPayload)
        );
        assert_eq!(
            MediaReference::parse("data:image/png;base64"),
            Err(MediaError::MalformedDataUri)
        );
    }

    #[test]
    fn remote_url_infers_mime_type_from_extension() {
        let media = MediaReference::parse("https://cdn.example.com/scans/wrist.PNG").unwrap();
        assert_eq!(media.mime_type(), "image/png");
        assert!(!media.is_inline());

        let media = MediaReference::parse("https://cdn.example.com/scans/chest").unwrap();
        assert_eq!(media.mime_type(), "image/jpeg");
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(matches!(
            MediaReference::parse("ftp://example.com/a.png"),
            Err(MediaError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            MediaReference::parse("not an image"),
            Err(MediaError::InvalidUrl(_))
        ));
    }
}
