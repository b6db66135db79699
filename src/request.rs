// ABOUTME: Thumbnail request path parsing
// ABOUTME: Turns /<bucket>/<wiki>/thumb/[archive/|temp/]<file>/<width>px-<name> into a ThumbRequest

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::error::RequestError;
use crate::media::MediaType;

/// Bucket, wiki, archive/temp marker, filename, thumbname and width
static THUMB_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^/([0-9A-Za-z_.\-]+)/([0-9A-Za-z_.\-]+)/thumb/((?:archive|temp)/)?([^/]+)/(([0-9]+)px-.+)$",
    )
    .expect("thumbnail path pattern compiles")
});

/// A parsed thumbnail request. Built once per HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbRequest {
    /// GCS bucket holding both the original and its thumbnails
    pub container: String,
    /// Object key of the original
    pub source_path: String,
    /// Lowercase extension of the original, empty when absent
    pub source_ext: String,
    /// Lowercase extension of the requested thumbnail, empty when absent
    pub target_ext: String,
    /// Object key the thumbnail is stored under
    pub thumb_path: String,
    /// Requested width in pixels, passed through to the tools as-is
    pub width: String,
    pub media_type: MediaType,
}

/// Parse a request path (no query string) into a ThumbRequest
pub fn parse(raw_path: &str) -> Result<ThumbRequest, RequestError> {
    let path = percent_decode_str(raw_path)
        .decode_utf8()
        .map_err(|_| RequestError::BadRequestShape(raw_path.to_string()))?;

    let caps = THUMB_PATH
        .captures(&path)
        .ok_or_else(|| RequestError::BadRequestShape(raw_path.to_string()))?;

    let container = &caps[1];
    let wiki = &caps[2];
    let marker = caps.get(3).map_or("", |m| m.as_str());
    let filename = &caps[4];
    let thumbname = &caps[5];
    let width = &caps[6];

    let source_ext = extension(filename);
    let target_ext = extension(thumbname);
    let media_type = MediaType::from_extension(&source_ext);

    Ok(ThumbRequest {
        container: container.to_string(),
        source_path: format!("{}/{}{}", wiki, marker, filename),
        thumb_path: format!("{}/thumb/{}{}/{}", wiki, marker, filename, thumbname),
        width: width.to_string(),
        source_ext,
        target_ext,
        media_type,
    })
}

fn extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_request() {
        let req = parse("/mywiki/en/thumb/Cat.jpg/100px-Cat.jpg").unwrap();
        assert_eq!(
            req,
            ThumbRequest {
                container: "mywiki".into(),
                source_path: "en/Cat.jpg".into(),
                source_ext: "jpg".into(),
                target_ext: "jpg".into(),
                thumb_path: "en/thumb/Cat.jpg/100px-Cat.jpg".into(),
                width: "100".into(),
                media_type: MediaType::Image,
            }
        );
    }

    #[test]
    fn test_parse_video_request() {
        let req = parse("/mywiki/en/thumb/Movie.webm/320px-seek.jpg").unwrap();
        assert_eq!(req.media_type, MediaType::Video);
        assert_eq!(req.source_ext, "webm");
        assert_eq!(req.target_ext, "jpg");
        assert_eq!(req.width, "320");
        assert_eq!(req.thumb_path, "en/thumb/Movie.webm/320px-seek.jpg");
    }

    #[test]
    fn test_archive_and_temp_prefixes() {
        let req = parse("/media-bucket/commons/thumb/archive/20240101000000!Foo.png/120px-Foo.png").unwrap();
        assert_eq!(req.source_path, "commons/archive/20240101000000!Foo.png");
        assert_eq!(req.thumb_path, "commons/thumb/archive/20240101000000!Foo.png/120px-Foo.png");

        let req = parse("/media-bucket/commons/thumb/temp/abc123.png/120px-abc123.png").unwrap();
        assert_eq!(req.source_path, "commons/temp/abc123.png");
        assert_eq!(req.thumb_path, "commons/thumb/temp/abc123.png/120px-abc123.png");
    }

    #[test]
    fn test_thumb_path_keeps_thumbname_suffix() {
        let req = parse("/mywiki/en/thumb/Foo.png/120px-lossy-Foo.png").unwrap();
        assert_eq!(req.width, "120");
        assert!(req.thumb_path.contains("thumb/"));
        assert!(req.thumb_path.ends_with("/120px-lossy-Foo.png"));
    }

    #[test]
    fn test_thumb_path_mirrors_source() {
        let req = parse("/a/b/thumb/Foo.png/120px-Foo.png").unwrap();
        assert_eq!(req.source_path, "b/Foo.png");
        assert!(req.thumb_path.contains("thumb/"));
        assert!(req.thumb_path.ends_with("120px-Foo.png"));
    }

    #[test]
    fn test_fields_are_substrings_of_path() {
        let paths = [
            "/mywiki/en/thumb/Cat.jpg/100px-Cat.jpg",
            "/my_wiki.v2/de-at/thumb/temp/Some_File.Name.GIF/64px-Some_File.Name.GIF",
            "/bucket/wiki/thumb/Clip.ogv/1280px--Clip.ogv.jpg",
        ];
        for path in paths {
            let req = parse(path).unwrap();
            assert_eq!(path, format!("/{}/{}", req.container, req.thumb_path));
            assert!(path.contains(&format!("/{}px-", req.width)), "{}", path);
            assert!(path.to_lowercase().contains(&req.source_ext), "{}", path);
            assert!(path.to_lowercase().ends_with(&req.target_ext), "{}", path);
        }
    }

    #[test]
    fn test_extensions_are_lowercased() {
        let req = parse("/mywiki/en/thumb/Photo.JPEG/200px-Photo.JPEG").unwrap();
        assert_eq!(req.source_ext, "jpeg");
        assert_eq!(req.target_ext, "jpeg");
        // Keys keep their original case
        assert_eq!(req.source_path, "en/Photo.JPEG");
    }

    #[test]
    fn test_missing_extensions_parse() {
        let req = parse("/mywiki/en/thumb/README/50px-README").unwrap();
        assert_eq!(req.source_ext, "");
        assert_eq!(req.target_ext, "");
        assert_eq!(req.media_type, MediaType::Unrecognized);
    }

    #[test]
    fn test_percent_encoded_path() {
        let req = parse("/mywiki/en/thumb/Caf%C3%A9.jpg/100px-Caf%C3%A9.jpg").unwrap();
        assert_eq!(req.source_path, "en/Café.jpg");
        assert_eq!(req.thumb_path, "en/thumb/Café.jpg/100px-Café.jpg");

        assert!(matches!(
            parse("/mywiki/en/thumb/Bad%FF.jpg/100px-Bad%FF.jpg"),
            Err(RequestError::BadRequestShape(_))
        ));
    }

    #[test]
    fn test_bad_shapes() {
        let bad = [
            "/",
            "",
            "/mywiki/en/Cat.jpg/100px-Cat.jpg",
            "/mywiki/en/thumbs/Cat.jpg/100px-Cat.jpg",
            "/mywiki/en/thumb/Cat.jpg/abcpx-Cat.jpg",
            "/mywiki/en/thumb/Cat.jpg/100-Cat.jpg",
            "/mywiki/en/thumb/Cat.jpg/px-Cat.jpg",
            "/mywiki/en/thumb/Cat.jpg/100px-",
            "/my wiki/en/thumb/Cat.jpg/100px-Cat.jpg",
            "/mywiki/e$n/thumb/Cat.jpg/100px-Cat.jpg",
            "/mywiki/en/extra/thumb/Cat.jpg/100px-Cat.jpg",
            "/mywiki/en/thumb//100px-Cat.jpg",
            "/mywiki/en/thumb/other/Cat.jpg/100px-Cat.jpg",
            "mywiki/en/thumb/Cat.jpg/100px-Cat.jpg",
        ];
        for path in bad {
            assert!(
                matches!(parse(path), Err(RequestError::BadRequestShape(_))),
                "expected rejection for {:?}",
                path
            );
        }
    }
}
