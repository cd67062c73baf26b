//! Background rasterization.
//!
//! Jobs run on tokio's blocking pool and report back over an unbounded
//! channel that the render loop drains with `try_recv` once per tick. The
//! loop only ever sees complete results.

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::sync::mpsc;

use super::{ImageOptions, ImageOutput, fallback_text, load_source, render_bytes};
use crate::hash::ContentHash;
use crate::message::MessageId;

/// A request to load and rasterize one image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterRequest {
    pub message_id: MessageId,
    /// Hash of the owning message's markdown when the request was made.
    pub message_hash: ContentHash,
    pub src: String,
    pub alt: String,
    pub base_dir: Option<PathBuf>,
    pub target_width_px: u32,
}

#[derive(Debug)]
pub struct RasterResult {
    pub request: RasterRequest,
    /// Hash of the image bytes; `None` when they could not be read.
    pub content_hash: Option<ContentHash>,
    pub output: ImageOutput,
}

impl RasterResult {
    /// A result for a source that never produced bytes.
    fn unloadable(request: RasterRequest) -> Self {
        let output = ImageOutput::TextFallback(fallback_text(&request.alt));
        Self {
            request,
            content_hash: None,
            output,
        }
    }
}

type JobKey = (String, u32);

#[derive(Debug)]
pub struct RasterWorker {
    handle: tokio::runtime::Handle,
    options: ImageOptions,
    tx: mpsc::UnboundedSender<RasterResult>,
    rx: mpsc::UnboundedReceiver<RasterResult>,
    in_flight: HashSet<JobKey>,
}

impl RasterWorker {
    pub fn new(handle: tokio::runtime::Handle, options: ImageOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle,
            options,
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    /// Queues `request` unless an identical `(src, width)` job is running.
    ///
    /// Returns true if a job was spawned.
    pub fn submit(&mut self, request: RasterRequest) -> bool {
        self.submit_with(request, run_job)
    }

    fn submit_with<F>(&mut self, request: RasterRequest, job: F) -> bool
    where
        F: FnOnce(RasterRequest, &ImageOptions) -> RasterResult + Send + 'static,
    {
        let key = (request.src.clone(), request.target_width_px);
        if !self.in_flight.insert(key) {
            return false;
        }
        tracing::debug!(
            message_id = %request.message_id,
            src = %request.src,
            target_width = request.target_width_px,
            "queued rasterization"
        );

        let tx = self.tx.clone();
        let options = self.options.clone();
        let fallback = request.clone();
        let task = self.handle.spawn_blocking(move || job(request, &options));
        // A panicked job still reports, so its key leaves `in_flight`.
        self.handle.spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(src = %fallback.src, error = %err, "rasterization job failed");
                    RasterResult::unloadable(fallback)
                }
            };
            if tx.send(result).is_err() {
                tracing::trace!("raster result dropped, worker gone");
            }
        });
        true
    }

    /// Drains finished jobs without blocking.
    pub fn poll(&mut self) -> Vec<RasterResult> {
        let mut done = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            self.in_flight
                .remove(&(result.request.src.clone(), result.request.target_width_px));
            done.push(result);
        }
        done
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

fn run_job(request: RasterRequest, options: &ImageOptions) -> RasterResult {
    let bytes = match load_source(&request.src, request.base_dir.as_deref()) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(src = %request.src, error = %err, "image could not be loaded");
            return RasterResult::unloadable(request);
        }
    };
    let output = render_bytes(
        &bytes,
        None,
        &request.alt,
        request.target_width_px,
        options,
    );
    RasterResult {
        request,
        content_hash: Some(ContentHash::of(&bytes)),
        output,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const SVG: &[u8] =
        br#"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="32"><rect width="64" height="32"/></svg>"#;

    fn request(src: &str, base_dir: Option<PathBuf>) -> RasterRequest {
        RasterRequest {
            message_id: MessageId(7),
            message_hash: ContentHash::of(b"msg"),
            src: src.to_string(),
            alt: "chart".to_string(),
            base_dir,
            target_width_px: 64,
        }
    }

    async fn wait_for(worker: &mut RasterWorker, count: usize) -> Vec<RasterResult> {
        let mut results = Vec::new();
        for _ in 0..200 {
            results.extend(worker.poll());
            if results.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        results
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rasterizes_file_in_background() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.svg"), SVG).unwrap();
        let mut worker = RasterWorker::new(tokio::runtime::Handle::current(), ImageOptions::default());

        assert!(worker.submit(request("a.svg", Some(dir.path().to_path_buf()))));
        assert!(!worker.submit(request("a.svg", Some(dir.path().to_path_buf()))));

        let results = wait_for(&mut worker, 1).await;
        assert_eq!(results.len(), 1);
        let ImageOutput::Rendered(image) = &results[0].output else {
            panic!("expected a rendered image");
        };
        assert_eq!((image.width_px, image.height_px), (64, 32));
        assert_eq!(results[0].content_hash, Some(ContentHash::of(SVG)));
        assert_eq!(worker.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_file_reports_without_hash() {
        let mut worker = RasterWorker::new(tokio::runtime::Handle::current(), ImageOptions::default());
        worker.submit(request("/definitely/not/here.png", None));

        let results = wait_for(&mut worker, 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].content_hash.is_none());
        assert_eq!(
            results[0].output,
            ImageOutput::TextFallback("IMAGE: chart".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicked_job_releases_its_key() {
        let mut worker = RasterWorker::new(tokio::runtime::Handle::current(), ImageOptions::default());
        let spawned = worker.submit_with(request("boom.svg", None), |_, _| {
            panic!("rasterizer blew up");
        });
        assert!(spawned);
        assert_eq!(worker.pending(), 1);

        let results = wait_for(&mut worker, 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].content_hash.is_none());
        assert_eq!(worker.pending(), 0);
        assert!(worker.submit(request("boom.svg", None)));
    }
}
