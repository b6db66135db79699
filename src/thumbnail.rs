// ABOUTME: Thumbnail generation for a validated request
// ABOUTME: Reads the original from the store, runs the tool, uploads the result with the source metadata

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::GenerateError;
use crate::media::content_type_for;
use crate::request::ThumbRequest;
use crate::storage::{BlobStore, ByteStream, StoreError};
use crate::tools::{strategy_for, ToolInput, ToolRunner, ToolSettings};

/// How the original reaches the tool. A temp file is deleted when dropped.
enum SourceInput {
    Pipe(Bytes),
    File(NamedTempFile),
}

impl SourceInput {
    fn tool_input(&self) -> ToolInput<'_> {
        match self {
            SourceInput::Pipe(_) => ToolInput::Stdin,
            SourceInput::File(file) => ToolInput::File(file.path()),
        }
    }

    fn stdin(&self) -> Option<Bytes> {
        match self {
            SourceInput::Pipe(data) => Some(data.clone()),
            SourceInput::File(_) => None,
        }
    }
}

pub struct Thumbnailer {
    store: Arc<dyn BlobStore>,
    runner: Arc<dyn ToolRunner>,
    settings: ToolSettings,
    /// Source extensions the tool must read from a seekable file instead of a pipe
    file_input_formats: Vec<String>,
}

impl Thumbnailer {
    pub fn new(
        store: Arc<dyn BlobStore>,
        runner: Arc<dyn ToolRunner>,
        settings: ToolSettings,
        file_input_formats: Vec<String>,
    ) -> Self {
        Self {
            store,
            runner,
            settings,
            file_input_formats,
        }
    }

    fn reads_from_file(&self, ext: &str) -> bool {
        self.file_input_formats.iter().any(|f| f == ext)
    }

    /// Generate, store and return the thumbnail for `req`.
    ///
    /// An upload failure still hands back the generated bytes inside
    /// `GenerateError::Upload`.
    pub async fn generate(&self, req: &ThumbRequest) -> Result<Bytes, GenerateError> {
        let source_key = &req.source_path;

        let stream = self
            .store
            .open_read(&req.container, source_key)
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    GenerateError::SourceNotFound { key: source_key.clone(), source }
                } else {
                    GenerateError::SourceRead { key: source_key.clone(), source }
                }
            })?;

        let metadata = self
            .store
            .metadata(&req.container, source_key)
            .await
            .map_err(|source| GenerateError::MetadataRead { key: source_key.clone(), source })?;

        let strategy = strategy_for(req.media_type)
            .ok_or(GenerateError::NoHandlerForMediaType(req.media_type))?;

        let input = self.materialize(req, stream).await?;
        let invocation = strategy.invocation(req, &self.settings, input.tool_input());
        debug!("Running {}: {:?}", invocation.program, invocation.args);

        let output = self
            .runner
            .run(&invocation, input.stdin())
            .await
            .map_err(GenerateError::GenerationFailed)?;
        // Remove any temp file before the upload
        drop(input);

        let thumbnail = Bytes::from(output);
        info!(
            "Generated {} byte thumbnail gs://{}/{}",
            thumbnail.len(),
            req.container,
            req.thumb_path
        );

        if let Err(source) = self
            .store
            .write(
                &req.container,
                &req.thumb_path,
                metadata,
                content_type_for(&req.target_ext),
                thumbnail.clone(),
            )
            .await
        {
            return Err(GenerateError::Upload {
                key: req.thumb_path.clone(),
                thumbnail,
                source,
            });
        }

        Ok(thumbnail)
    }

    async fn materialize(
        &self,
        req: &ThumbRequest,
        mut stream: ByteStream,
    ) -> Result<SourceInput, GenerateError> {
        let read_err = |source: StoreError| GenerateError::SourceRead {
            key: req.source_path.clone(),
            source,
        };

        if self.reads_from_file(&req.source_ext) {
            let temp = tempfile::Builder::new()
                .prefix("original")
                .tempfile()
                .map_err(GenerateError::TempFile)?;
            let mut file = tokio::fs::File::from_std(temp.reopen().map_err(GenerateError::TempFile)?);

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(read_err)?;
                file.write_all(&chunk).await.map_err(GenerateError::TempFile)?;
            }
            file.flush().await.map_err(GenerateError::TempFile)?;

            debug!("Staged {} in {:?}", req.source_path, temp.path());
            return Ok(SourceInput::File(temp));
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk.map_err(read_err)?);
        }
        Ok(SourceInput::Pipe(data.freeze()))
    }
}
