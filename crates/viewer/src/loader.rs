//! Asynchronous asset loading.
//!
//! `AssetLoader::load` resolves the format synchronously, then fetches and
//! decodes on the runtime. Results come back through a channel tagged with a
//! generation number; a newer `load` or a `cancel` aborts the previous task
//! and any outcome that still arrives for an older generation is dropped.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shared::ResultMetadata;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::asset::{AssetFormat, ExternalBuffers, NormalizeOptions, SceneAsset};
use crate::error::LoadError;

/// Where asset bytes come from
pub trait AssetSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, LoadError>> + Send;
}

/// HTTP(S) via reqwest; `file://` URLs and bare paths from the local disk
pub struct HttpAssetSource {
    client: reqwest::Client,
}

impl HttpAssetSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpAssetSource {
    fn default() -> Self {
        Self::new(LoadOptions::default().timeout)
    }
}

impl AssetSource for HttpAssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| LoadError::NetworkFailure(e.to_string()))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| LoadError::NetworkFailure(e.to_string()))?;
            return Ok(bytes.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path)
            .await
            .map_err(|e| LoadError::NetworkFailure(format!("{path}: {e}")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub normalize: NormalizeOptions,
    /// Budget for fetch plus decode
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one `load` call
#[derive(Debug)]
pub struct LoadOutcome {
    pub generation: u64,
    pub url: String,
    pub result: Result<SceneAsset, LoadError>,
}

pub struct AssetLoader<S: AssetSource> {
    source: Arc<S>,
    options: LoadOptions,
    runtime: Handle,
    generation: u64,
    pending: Option<u64>,
    in_flight: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<LoadOutcome>,
    rx: mpsc::UnboundedReceiver<LoadOutcome>,
}

impl<S: AssetSource> AssetLoader<S> {
    pub fn new(source: S, options: LoadOptions, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source: Arc::new(source),
            options,
            runtime,
            generation: 0,
            pending: None,
            in_flight: None,
            tx,
            rx,
        }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Start loading `url`, superseding any load still in flight.
    ///
    /// Fails synchronously with `UnsupportedFormat` when neither the hint nor
    /// the URL names a known format; nothing is fetched in that case.
    pub fn load(
        &mut self,
        url: &str,
        hint: Option<&str>,
        metadata: Option<ResultMetadata>,
    ) -> Result<u64, LoadError> {
        let format = AssetFormat::resolve(url, hint)?;
        self.abort_in_flight();

        self.generation += 1;
        let generation = self.generation;
        self.pending = Some(generation);
        info!(url, ?format, generation, "Loading asset");

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let options = self.options;
        let url = url.to_string();

        let handle = self.runtime.spawn(async move {
            let result = match tokio::time::timeout(
                options.timeout,
                fetch_and_decode(&*source, &url, format, options.normalize),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(LoadError::NetworkFailure(format!(
                    "timed out after {:?}",
                    options.timeout
                ))),
            };
            let result = result.map(|mut asset| {
                asset.metadata = metadata;
                asset
            });
            // Receiver gone means the loader was dropped
            let _ = tx.send(LoadOutcome {
                generation,
                url,
                result,
            });
        });
        self.in_flight = Some(handle);
        Ok(generation)
    }

    /// Abandon the current load; its result will never be delivered.
    pub fn cancel(&mut self) {
        if self.pending.is_some() {
            debug!(generation = self.generation, "Load cancelled");
        }
        self.abort_in_flight();
        self.generation += 1;
        self.pending = None;
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Non-blocking drain for the frame loop. Stale outcomes are discarded.
    pub fn try_recv(&mut self) -> Option<LoadOutcome> {
        while let Ok(outcome) = self.rx.try_recv() {
            if let Some(o) = self.accept(outcome) {
                return Some(o);
            }
        }
        None
    }

    /// Wait for the outcome of the current load.
    pub async fn next_result(&mut self) -> Option<LoadOutcome> {
        self.pending?;
        while let Some(outcome) = self.rx.recv().await {
            if let Some(o) = self.accept(outcome) {
                return Some(o);
            }
        }
        None
    }

    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        if Some(outcome.generation) != self.pending {
            warn!(
                url = %outcome.url,
                generation = outcome.generation,
                current = self.generation,
                "Discarding stale load result"
            );
            return None;
        }
        self.pending = None;
        self.in_flight = None;
        match &outcome.result {
            Ok(asset) => info!(
                url = %outcome.url,
                vertices = asset.vertex_count(),
                faces = asset.face_count(),
                tag = asset.tag.display_name(),
                "Asset loaded"
            ),
            Err(e) => warn!(url = %outcome.url, "Asset load failed: {e}"),
        }
        Some(outcome)
    }

    fn abort_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl<S: AssetSource> Drop for AssetLoader<S> {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}

async fn fetch_and_decode<S: AssetSource>(
    source: &S,
    url: &str,
    format: AssetFormat,
    normalize: NormalizeOptions,
) -> Result<SceneAsset, LoadError> {
    let bytes = source.fetch(url).await?;

    let mut external = ExternalBuffers::new();
    for uri in format.external_references(&bytes)? {
        let resolved = resolve_relative(url, &uri);
        debug!(%resolved, "Fetching external buffer");
        let data = source.fetch(&resolved).await?;
        external.insert(uri, data);
    }

    let url = url.to_string();
    tokio::task::spawn_blocking(move || {
        SceneAsset::decode(&url, format, &bytes, &external, &normalize)
    })
    .await
    .map_err(|e| LoadError::malformed(format!("decoder task failed: {e}")))?
}

/// Resolve a glTF buffer URI against the document URL
pub fn resolve_relative(base: &str, uri: &str) -> String {
    if uri.contains("://") {
        return uri.to_string();
    }
    if let Ok(base_url) = reqwest::Url::parse(base) {
        if let Ok(joined) = base_url.join(uri) {
            return joined.to_string();
        }
    }
    match Path::new(base).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(uri).to_string_lossy().into_owned(),
        _ => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_http() {
        assert_eq!(
            resolve_relative("http://host/models/a/scene.gltf", "scene.bin"),
            "http://host/models/a/scene.bin"
        );
        assert_eq!(
            resolve_relative("http://host/a/scene.gltf", "https://cdn/x.bin"),
            "https://cdn/x.bin"
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        assert_eq!(resolve_relative("data/scene.gltf", "scene.bin"), "data/scene.bin");
        assert_eq!(resolve_relative("scene.gltf", "scene.bin"), "scene.bin");
    }
}
