//! Test data and in-memory collaborators.
//!
//! Minimal assets in every supported format, plus an asset source and a task
//! backend that never touch the network. Used by unit tests, integration
//! tests and the headless harness.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use shared::{
    CreateTaskRequest, ResultDescriptor, TaskId, TaskStatus, TaskStatusResponse,
};
use tokio::sync::Notify;

use crate::error::{LoadError, PollError};
use crate::loader::AssetSource;
use crate::task::TaskBackend;

// ── Assets ──────────────────────────────────────────────────────

/// Four colored points spanning 4 x 2 x 1
pub const PLY_ASCII_POINTS: &str = "ply
format ascii 1.0
comment four colored points
element vertex 4
property float x
property float y
property float z
property uchar red
property uchar green
property uchar blue
end_header
0 0 0 255 0 0
4 0 0 0 255 0
0 2 0 0 0 255
0 0 1 255 255 255
";

/// Cube spanning [-1, 1] on every axis, six quad faces
pub const PLY_ASCII_CUBE: &str = "ply
format ascii 1.0
element vertex 8
property float x
property float y
property float z
element face 6
property list uchar int vertex_indices
end_header
-1 -1 -1
1 -1 -1
1 1 -1
-1 1 -1
-1 -1 1
1 -1 1
1 1 1
-1 1 1
4 0 3 2 1
4 4 5 6 7
4 0 1 5 4
4 2 3 7 6
4 1 2 6 5
4 0 4 7 3
";

/// Cube spanning [0, 2] on every axis
pub const OBJ_CUBE: &str = "# cube
o cube
v 0 0 0
v 2 0 0
v 2 2 0
v 0 2 0
v 0 0 2
v 2 0 2
v 2 2 2
v 0 2 2
vn 0 0 -1
f 1//1 4//1 3//1 2//1
f 5 6 7 8
f 1 2 6 5
f 3 4 8 7
f 2 3 7 6
f 1 5 8 4
";

/// Binary little-endian point cloud with Gaussian-splat color coefficients
pub fn ply_binary_splats(points: &[[f32; 3]]) -> Vec<u8> {
    let header = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\n\
         property float x\nproperty float y\nproperty float z\n\
         property float f_dc_0\nproperty float f_dc_1\nproperty float f_dc_2\n\
         property float opacity\nend_header\n",
        points.len()
    );
    let mut bytes = header.into_bytes();
    for p in points {
        for v in p.iter().chain(&[0.0, 0.0, 0.0, 1.0]) {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    bytes
}

/// The triangle buffer below as a `data:` URI
pub const TRIANGLE_DATA_URI: &str =
    "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAAAAQAAAAAAAAAAAAAAAAAAAAEAAAAAAAAABAAIAAAA=";

/// Positions (0,0,0) (2,0,0) (0,2,0) as f32, then u16 indices 0 1 2 and padding
pub fn triangle_buffer() -> Vec<u8> {
    let mut bytes = floats_to_bytes(&[0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
    for i in [0u16, 1, 2, 0] {
        bytes.extend_from_slice(&i.to_le_bytes());
    }
    bytes
}

/// One-triangle glTF document. `buffer_uri` of `None` means the GLB binary
/// chunk. The node is translated by +1 on X.
fn triangle_document(buffer_uri: Option<&str>) -> String {
    let buffer = match buffer_uri {
        Some(uri) => format!(r#"{{ "byteLength": 44, "uri": "{uri}" }}"#),
        None => r#"{ "byteLength": 44 }"#.to_string(),
    };
    format!(
        r#"{{
  "asset": {{ "version": "2.0", "generator": "recon-viewer fixtures" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0, "translation": [1.0, 0.0, 0.0] }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1 }}] }}],
  "buffers": [{buffer}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [2.0, 2.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#
    )
}

pub fn triangle_gltf(buffer_uri: &str) -> String {
    triangle_document(Some(buffer_uri))
}

pub fn triangle_glb() -> Vec<u8> {
    glb_container(&triangle_document(None), &triangle_buffer())
}

/// GLB magic number: "glTF"
const GLB_MAGIC: u32 = 0x46546C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F534A;
const CHUNK_BIN: u32 = 0x004E4942;

/// Wrap a JSON document and a binary buffer into a GLB container
pub fn glb_container(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json_bytes = json.as_bytes().to_vec();
    // JSON pads with spaces, BIN with zeros
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let mut bin_bytes = bin.to_vec();
    while bin_bytes.len() % 4 != 0 {
        bin_bytes.push(0);
    }

    let total = 12 + 8 + json_bytes.len() + 8 + bin_bytes.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());

    glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(&json_bytes);

    glb.extend_from_slice(&(bin_bytes.len() as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    glb.extend_from_slice(&bin_bytes);
    glb
}

fn floats_to_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Asset sources ───────────────────────────────────────────────

/// Serves bytes registered by URL. Clones share storage and counters.
#[derive(Clone, Default)]
pub struct MemorySource {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fetches: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        lock(&self.files).insert(url.to_string(), bytes.into());
    }

    /// Number of `fetch` calls so far, successful or not
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.files)
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::NetworkFailure(format!("404 Not Found: {url}")))
    }
}

impl AssetSource for MemorySource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.get(url)
    }
}

/// A [`MemorySource`] whose gated URLs block until released, to control the
/// order in which concurrent loads complete.
#[derive(Clone, Default)]
pub struct GatedSource {
    inner: MemorySource,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl GatedSource {
    pub fn new(inner: MemorySource) -> Self {
        Self {
            inner,
            gates: Arc::default(),
        }
    }

    pub fn memory(&self) -> &MemorySource {
        &self.inner
    }

    pub fn gate(&self, url: &str) {
        lock(&self.gates).insert(url.to_string(), Arc::new(Notify::new()));
    }

    /// Let a pending (or the next) fetch of `url` proceed
    pub fn release(&self, url: &str) {
        if let Some(gate) = lock(&self.gates).get(url) {
            gate.notify_one();
        }
    }
}

impl AssetSource for GatedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let gate = lock(&self.gates).get(url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.get(url)
    }
}

// ── Task backend ────────────────────────────────────────────────

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<TaskStatusResponse, PollError>>,
    last: Option<Result<TaskStatusResponse, PollError>>,
    submit: Option<Result<TaskId, PollError>>,
    restart_error: Option<PollError>,
    polled: HashSet<TaskId>,
}

/// Replays queued status responses in order; once the queue is empty the
/// last response repeats.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    status_calls: Arc<AtomicUsize>,
    restart_calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(responses: impl IntoIterator<Item = TaskStatusResponse>) -> Self {
        let backend = Self::default();
        for r in responses {
            backend.push(Ok(r));
        }
        backend
    }

    pub fn push(&self, response: Result<TaskStatusResponse, PollError>) {
        lock(&self.script).responses.push_back(response);
    }

    pub fn set_submit_result(&self, result: Result<TaskId, PollError>) {
        lock(&self.script).submit = Some(result);
    }

    pub fn fail_restart(&self, error: PollError) {
        lock(&self.script).restart_error = Some(error);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn restart_calls(&self) -> usize {
        self.restart_calls.load(Ordering::SeqCst)
    }

    /// Task ids that were polled at least once
    pub fn polled_ids(&self) -> Vec<TaskId> {
        lock(&self.script).polled.iter().cloned().collect()
    }
}

impl TaskBackend for ScriptedBackend {
    async fn fetch_status(&self, task_id: &str) -> Result<TaskStatusResponse, PollError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = lock(&self.script);
        script.polled.insert(task_id.to_string());
        match script.responses.pop_front() {
            Some(next) => {
                script.last = Some(next.clone());
                next
            }
            None => script
                .last
                .clone()
                .unwrap_or_else(|| Err(PollError::Transport("no scripted response".into()))),
        }
    }

    async fn submit(&self, _request: &CreateTaskRequest) -> Result<TaskId, PollError> {
        lock(&self.script)
            .submit
            .clone()
            .unwrap_or_else(|| Ok("task-1".to_string()))
    }

    async fn restart(&self, _task_id: &str) -> Result<(), PollError> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.script).restart_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ── Status responses ────────────────────────────────────────────

pub fn processing(progress: f64) -> TaskStatusResponse {
    TaskStatusResponse::new(TaskStatus::Processing, progress, format!("Training ({progress:.0}%)"))
}

pub fn completed(model_url: &str) -> TaskStatusResponse {
    TaskStatusResponse::new(TaskStatus::Completed, 100.0, "Reconstruction completed")
        .with_result(ResultDescriptor::new(model_url))
}

pub fn failed(message: &str) -> TaskStatusResponse {
    TaskStatusResponse::new(TaskStatus::Failed, 0.0, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_and_external_buffer_agree() {
        use crate::asset::{AssetFormat, ExternalBuffers, NormalizeOptions, SceneAsset};
        let opts = NormalizeOptions::default();
        let embedded = triangle_gltf(TRIANGLE_DATA_URI);
        let a = SceneAsset::decode("a.gltf", AssetFormat::Gltf, embedded.as_bytes(), &ExternalBuffers::new(), &opts)
            .unwrap();
        let mut ext = ExternalBuffers::new();
        ext.insert("t.bin".to_string(), triangle_buffer());
        let linked = triangle_gltf("t.bin");
        let b = SceneAsset::decode("b.gltf", AssetFormat::Gltf, linked.as_bytes(), &ext, &opts).unwrap();
        assert_eq!(a.geometry.positions, b.geometry.positions);
        assert_eq!(triangle_buffer().len(), 44);
    }

    #[test]
    fn test_glb_header() {
        let glb = triangle_glb();
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize, glb.len());
        assert_eq!(glb.len() % 4, 0);
    }

    #[tokio::test]
    async fn test_scripted_backend_repeats_last() {
        let backend = ScriptedBackend::new([processing(10.0), completed("/m.ply")]);
        assert_eq!(backend.fetch_status("t").await.unwrap().status, TaskStatus::Processing);
        assert_eq!(backend.fetch_status("t").await.unwrap().status, TaskStatus::Completed);
        assert_eq!(backend.fetch_status("t").await.unwrap().status, TaskStatus::Completed);
        assert_eq!(backend.status_calls(), 3);
        assert_eq!(backend.polled_ids(), vec!["t".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_source_counts_misses() {
        let source = MemorySource::new().with("mem://a.ply", PLY_ASCII_POINTS);
        assert!(source.fetch("mem://a.ply").await.is_ok());
        assert!(matches!(
            source.fetch("mem://b.ply").await,
            Err(LoadError::NetworkFailure(_))
        ));
        assert_eq!(source.fetch_count(), 2);
    }
}
