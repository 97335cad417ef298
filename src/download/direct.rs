//! Direct HTTP transport: one sequential stream, or parallel byte ranges
//! reassembled in index order.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::chunk::{ChunkPlan, chunk_path};
use super::client::{ByteRange, HttpClient, RemoteMetadata, without_range};
use super::constants::{CHUNK_DIR_SUFFIX, PART_SUFFIX, PROGRESS_INTERVAL};
use super::error::TransportError;
use super::filename::with_suffix;
use super::progress::{ProgressSink, format_rate};
use super::transport::{Transport, TransferJob, TransportConfig};

/// Streams a resource over HTTP into `<dest>.part`, then renames it.
#[derive(Debug, Clone)]
pub struct DirectTransport {
    client: HttpClient,
    chunk_count: usize,
    chunk_threshold_bytes: u64,
    write_buffer_size: usize,
}

impl DirectTransport {
    /// Creates a direct transport using `client` and the chunking settings in
    /// `config`.
    #[must_use]
    pub fn new(client: HttpClient, config: &TransportConfig) -> Self {
        Self {
            client,
            chunk_count: config.chunk_count,
            chunk_threshold_bytes: config.chunk_threshold_bytes,
            write_buffer_size: config.write_buffer_size.max(8 * 1024),
        }
    }

    fn chunk_plan(&self, metadata: RemoteMetadata) -> Option<ChunkPlan> {
        if self.chunk_count < 2 || !metadata.accepts_ranges {
            return None;
        }
        let length = metadata.content_length?;
        if length <= self.chunk_threshold_bytes {
            return None;
        }
        ChunkPlan::new(length, self.chunk_count)
    }

    async fn fetch_sequential(
        &self,
        job: &TransferJob,
        part: &Path,
        counter: &AtomicU64,
    ) -> Result<u64, TransportError> {
        let response = self.client.get_success(&job.url, &job.headers).await?;
        let file = File::create(part)
            .await
            .map_err(|e| TransportError::io(part, e))?;
        let mut writer = BufWriter::with_capacity(self.write_buffer_size, file);
        copy_body(response, &mut writer, &job.url, part, &job.cancel, counter).await
    }

    async fn fetch_chunked(
        &self,
        job: &TransferJob,
        plan: &ChunkPlan,
        part: &Path,
        counter: &Arc<AtomicU64>,
    ) -> Result<u64, TransportError> {
        let chunk_dir = with_suffix(&job.dest, CHUNK_DIR_SUFFIX);
        tokio::fs::create_dir_all(&chunk_dir)
            .await
            .map_err(|e| TransportError::io(&chunk_dir, e))?;

        let result = match self.fetch_chunks(job, plan, &chunk_dir, counter).await {
            Ok(()) => merge_chunks(plan, &chunk_dir, part, self.write_buffer_size).await,
            Err(error) => Err(error),
        };

        if let Err(error) = tokio::fs::remove_dir_all(&chunk_dir).await {
            warn!(path = %chunk_dir.display(), error = %error, "failed to remove chunk directory");
        }
        result
    }

    async fn fetch_chunks(
        &self,
        job: &TransferJob,
        plan: &ChunkPlan,
        chunk_dir: &Path,
        counter: &Arc<AtomicU64>,
    ) -> Result<(), TransportError> {
        let headers = without_range(&job.headers);
        let mut tasks = JoinSet::new();
        let mut indices = HashMap::with_capacity(plan.len());

        for (index, range) in plan.ranges().iter().copied().enumerate() {
            let chunk = ChunkFetch {
                client: self.client.clone(),
                url: job.url.clone(),
                headers: headers.clone(),
                index,
                range,
                path: chunk_path(chunk_dir, index),
                buffer_size: self.write_buffer_size,
                cancel: job.cancel.clone(),
                counter: Arc::clone(counter),
            };
            let handle = tasks.spawn(chunk.run());
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(bytes))) => debug!(bytes, "chunk complete"),
                Ok((_, Err(error))) => {
                    tasks.abort_all();
                    return Err(error);
                }
                Err(join_error) => {
                    tasks.abort_all();
                    let index = indices.get(&join_error.id()).copied().unwrap_or_default();
                    return Err(TransportError::chunk_failed(
                        &job.url,
                        index,
                        join_error.to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[instrument(skip(self, job, sink), fields(url = %job.url, dest = %job.dest.display()))]
    async fn fetch(
        &self,
        job: &TransferJob,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, TransportError> {
        if job.cancel.is_cancelled() {
            return Err(TransportError::canceled(&job.url));
        }

        let metadata = match self.client.head_metadata(&job.url, &job.headers).await {
            Ok(metadata) => metadata,
            Err(error) => {
                debug!(error = %error, "metadata probe failed, chunking disabled");
                RemoteMetadata::default()
            }
        };

        let part = with_suffix(&job.dest, PART_SUFFIX);
        let counter = Arc::new(AtomicU64::new(0));
        let work = async {
            match self.chunk_plan(metadata) {
                Some(plan) => {
                    debug!(chunks = plan.len(), total_bytes = plan.total_bytes(), "chunked transfer");
                    self.fetch_chunked(job, &plan, &part, &counter).await
                }
                None => self.fetch_sequential(job, &part, &counter).await,
            }
        };
        let result = report_speed_while(work, &counter, sink).await;

        let bytes = match result {
            Ok(0) => {
                remove_quietly(&part).await;
                return Err(TransportError::empty_body(&job.url));
            }
            Ok(bytes) => bytes,
            Err(error) => {
                remove_quietly(&part).await;
                return Err(error);
            }
        };

        if let Err(error) = tokio::fs::rename(&part, &job.dest).await {
            remove_quietly(&part).await;
            return Err(TransportError::io(&job.dest, error));
        }

        info!(path = %job.dest.display(), bytes, "direct transfer complete");
        Ok(job.dest.clone())
    }
}

/// Everything one chunk task owns.
struct ChunkFetch {
    client: HttpClient,
    url: String,
    headers: HeaderMap,
    index: usize,
    range: ByteRange,
    path: PathBuf,
    buffer_size: usize,
    cancel: CancellationToken,
    counter: Arc<AtomicU64>,
}

impl ChunkFetch {
    async fn run(self) -> Result<u64, TransportError> {
        let url = self.url.as_str();
        let expected = self.range.len();
        let response = self
            .client
            .get(url, &self.headers, Some(self.range))
            .await
            .map_err(|e| TransportError::chunk_failed(url, self.index, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::chunk_failed(
                url,
                self.index,
                format!("HTTP {}", status.as_u16()),
            ));
        }
        // A 200 means the origin ignored the range and is sending everything.
        if status != StatusCode::PARTIAL_CONTENT
            && let Some(length) = response.content_length()
            && length != expected
        {
            return Err(TransportError::chunk_length(url, self.index, expected, length));
        }

        let file = File::create(&self.path)
            .await
            .map_err(|e| TransportError::io(&self.path, e))?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let written = copy_body(
            response,
            &mut writer,
            url,
            &self.path,
            &self.cancel,
            &self.counter,
        )
        .await
        .map_err(|error| match error {
            TransportError::Network { source, .. } => {
                TransportError::chunk_failed(url, self.index, source.to_string())
            }
            other => other,
        })?;

        if written != expected {
            return Err(TransportError::chunk_length(url, self.index, expected, written));
        }
        Ok(written)
    }
}

/// Concatenates chunk files in index order into `part`.
async fn merge_chunks(
    plan: &ChunkPlan,
    chunk_dir: &Path,
    part: &Path,
    buffer_size: usize,
) -> Result<u64, TransportError> {
    let file = File::create(part)
        .await
        .map_err(|e| TransportError::io(part, e))?;
    let mut writer = BufWriter::with_capacity(buffer_size, file);
    let mut total = 0u64;

    for index in 0..plan.len() {
        let path = chunk_path(chunk_dir, index);
        let mut chunk = File::open(&path)
            .await
            .map_err(|e| TransportError::io(&path, e))?;
        total += tokio::io::copy(&mut chunk, &mut writer)
            .await
            .map_err(|e| TransportError::io(part, e))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransportError::io(part, e))?;
    debug!(path = %part.display(), bytes = total, chunks = plan.len(), "chunks merged");
    Ok(total)
}

/// Streams a response body into `writer`, stopping early on cancellation.
async fn copy_body<W>(
    response: reqwest::Response,
    writer: &mut W,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
    counter: &AtomicU64,
) -> Result<u64, TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::canceled(url)),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| TransportError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransportError::io(path, e))?;

        bytes_written += chunk.len() as u64;
        counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }

    writer
        .flush()
        .await
        .map_err(|e| TransportError::io(path, e))?;
    Ok(bytes_written)
}

/// Drives `work` to completion, publishing throughput from `counter` once per
/// interval.
async fn report_speed_while<F, T>(work: F, counter: &AtomicU64, sink: &dyn ProgressSink) -> T
where
    F: Future<Output = T>,
{
    tokio::pin!(work);
    let mut ticker = interval_at(Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    let mut last_bytes = 0u64;
    let mut last_at = Instant::now();

    loop {
        tokio::select! {
            out = &mut work => return out,
            now = ticker.tick() => {
                let bytes = counter.load(Ordering::Relaxed);
                sink.on_speed(&format_rate(bytes.saturating_sub(last_bytes), now - last_at));
                last_bytes = bytes;
                last_at = now;
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %error, "failed to remove temp file");
    }
}
