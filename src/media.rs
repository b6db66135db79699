// ABOUTME: Media classification and source/target format compatibility rules
// ABOUTME: Decides which thumbnail conversions the proxy is willing to perform

use std::fmt;

use crate::error::RequestError;
use crate::request::ThumbRequest;

/// Source extensions rendered with the image rasterizer
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "gif", "jpg", "jpeg", "webp", "svg"];

/// Source extensions handled by the frame extractor
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "ogg", "ogv", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
    Unrecognized,
}

impl MediaType {
    /// Classify a lowercase file extension
    pub fn from_extension(ext: &str) -> Self {
        if IMAGE_EXTENSIONS.contains(&ext) {
            MediaType::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            MediaType::Video
        } else {
            MediaType::Unrecognized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MIME type for a generated thumbnail's extension
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Check that the requested conversion is one we support.
///
/// Upload-time MIME checking happens upstream, so the extension is trusted
/// here. Anything not listed below is rejected.
pub fn validate(req: &ThumbRequest) -> Result<(), RequestError> {
    let source = req.source_ext.as_str();
    let target = req.target_ext.as_str();

    if req.media_type == MediaType::Unrecognized {
        return Err(RequestError::UnsupportedSource(source.to_string()));
    }

    let allowed = !target.is_empty()
        && match (req.media_type, source) {
            // Vector sources are rasterized
            (MediaType::Image, "svg") => target == "png",
            // jpg and jpeg are not mixed
            (MediaType::Image, _) => target == source,
            // Single frame extraction
            (MediaType::Video, _) => target == "jpg",
            (MediaType::Unrecognized, _) => false,
        };

    if allowed {
        Ok(())
    } else {
        Err(RequestError::UnsupportedTarget {
            source_ext: source.to_string(),
            target: target.to_string(),
        })
    }
}
