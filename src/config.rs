// ABOUTME: Service configuration read from the environment at startup
// ABOUTME: Port, tool binaries, JPEG quality and which formats are staged through temp files

use std::env;

use tracing::warn;

use crate::tools::ToolSettings;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_JPEG_QUALITY: u8 = 96;

pub struct Config {
    pub port: u16,
    pub tools: ToolSettings,
    /// Source extensions ffmpeg can't reliably read from a pipe (mp4 with a trailing moov atom)
    pub file_input_formats: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let jpeg_quality = match var("JPEG_QUALITY") {
            Some(raw) => match raw.trim().parse::<u8>() {
                Ok(q) if (1..=100).contains(&q) => q,
                _ => {
                    warn!("Ignoring invalid JPEG_QUALITY {:?}, using {}", raw, DEFAULT_JPEG_QUALITY);
                    DEFAULT_JPEG_QUALITY
                }
            },
            None => DEFAULT_JPEG_QUALITY,
        };

        let defaults = ToolSettings::default();
        let tools = ToolSettings {
            vips_bin: var("VIPSTHUMBNAIL_BIN").unwrap_or(defaults.vips_bin),
            ffmpeg_bin: var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            jpeg_quality,
        };

        let file_input_formats = var("FILE_INPUT_FORMATS")
            .unwrap_or_else(|| "mp4".to_string())
            .split(',')
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        Self {
            port,
            tools,
            file_input_formats,
        }
    }
}
