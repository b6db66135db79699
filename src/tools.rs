// ABOUTME: External thumbnailing tools (vipsthumbnail for images, ffmpeg for video)
// ABOUTME: Per-media-type argument builders and a subprocess runner

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::media::MediaType;
use crate::request::ThumbRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Vips,
    Ffmpeg,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Vips => "vipsthumbnail",
            Tool::Ffmpeg => "ffmpeg",
        }
    }
}

/// Tool locations and tuning, taken from the service config
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub vips_bin: String,
    pub ffmpeg_bin: String,
    pub jpeg_quality: u8,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            vips_bin: Tool::Vips.name().to_string(),
            ffmpeg_bin: Tool::Ffmpeg.name().to_string(),
            jpeg_quality: 96,
        }
    }
}

impl ToolSettings {
    fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Vips => &self.vips_bin,
            Tool::Ffmpeg => &self.ffmpeg_bin,
        }
    }
}

/// Where the tool reads the source from
#[derive(Debug, Clone, Copy)]
pub enum ToolInput<'a> {
    Stdin,
    File(&'a Path),
}

/// A fully built command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub program: String,
    pub args: Vec<String>,
}

type ArgBuilder = fn(&ThumbRequest, &ToolSettings, ToolInput<'_>) -> Vec<String>;

/// How one media type is turned into a thumbnail
pub struct Strategy {
    pub media_type: MediaType,
    pub tool: Tool,
    build_args: ArgBuilder,
}

impl Strategy {
    pub fn invocation(
        &self,
        req: &ThumbRequest,
        settings: &ToolSettings,
        input: ToolInput<'_>,
    ) -> Invocation {
        Invocation {
            tool: self.tool,
            program: settings.program(self.tool).to_string(),
            args: (self.build_args)(req, settings, input),
        }
    }
}

static STRATEGIES: &[Strategy] = &[
    Strategy {
        media_type: MediaType::Image,
        tool: Tool::Vips,
        build_args: vips_args,
    },
    Strategy {
        media_type: MediaType::Video,
        tool: Tool::Ffmpeg,
        build_args: ffmpeg_args,
    },
];

/// Look up the strategy for a media type. Unrecognized media has none.
pub fn strategy_for(media_type: MediaType) -> Option<&'static Strategy> {
    STRATEGIES.iter().find(|s| s.media_type == media_type)
}

fn vips_args(req: &ThumbRequest, settings: &ToolSettings, input: ToolInput<'_>) -> Vec<String> {
    let mut options = vec!["strip".to_string()];
    match req.target_ext.as_str() {
        "jpg" | "jpeg" => options.push(format!("Q={}", settings.jpeg_quality)),
        "webp" => options.push("lossless".to_string()),
        _ => {}
    }

    // Load every frame of animated GIF/WebP
    let load_options = match req.source_ext.as_str() {
        "gif" | "webp" => "[n=-1]",
        _ => "",
    };
    let source = match input {
        ToolInput::Stdin => "stdin".to_string(),
        ToolInput::File(path) => path.to_string_lossy().into_owned(),
    };

    vec![
        format!("--output=.{}[{}]", req.target_ext, options.join(",")),
        format!("--size={}x", req.width),
        "--vips-concurrency=1".to_string(),
        format!("{}{}", source, load_options),
    ]
}

// Parameters follow Wikimedia's thumbor video loader
fn ffmpeg_args(req: &ThumbRequest, _settings: &ToolSettings, input: ToolInput<'_>) -> Vec<String> {
    // ffmpeg knows the ogg demuxer but not the ogv alias
    let demuxer = match req.source_ext.as_str() {
        "ogv" => "ogg",
        other => other,
    };
    let source = match input {
        ToolInput::Stdin => "pipe:".to_string(),
        ToolInput::File(path) => path.to_string_lossy().into_owned(),
    };
    let scale = format!("scale={}:-1", req.width);

    [
        "-f", demuxer,
        "-i", source.as_str(),
        "-vframes", "1",
        "-an",
        "-f", "image2pipe",
        "-vf", scale.as_str(),
        "-qscale:v", "1", "-qmin", "1", "-qmax", "1",
        "-nostats",
        "-loglevel", "fatal",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },
    #[error("{tool} exited with status {status:?}: {stderr}")]
    Failed {
        tool: &'static str,
        status: Option<i32>,
        stderr: String,
    },
}

/// Runs an invocation and returns its stdout
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation, stdin: Option<Bytes>) -> Result<Vec<u8>, ToolError>;
}

/// Spawns the tools as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation, stdin: Option<Bytes>) -> Result<Vec<u8>, ToolError> {
        let tool = invocation.tool.name();
        let spawn_err = |source| ToolError::Spawn { tool, source };

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(spawn_err)?;

        // Feed stdin from a separate task so a full stdout pipe can't deadlock us
        let feeder = match (stdin, child.stdin.take()) {
            (Some(data), Some(mut pipe)) => Some(tokio::spawn(async move {
                let written = pipe.write_all(&data).await;
                drop(pipe);
                written
            })),
            _ => None,
        };

        let output = child.wait_with_output().await.map_err(spawn_err)?;

        if let Some(feeder) = feeder {
            // ffmpeg stops reading once it has a frame, so a broken pipe here is expected
            if let Ok(Err(e)) = feeder.await {
                debug!("{} closed stdin early: {}", tool, e);
            }
        }

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
