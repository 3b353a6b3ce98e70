//! Background load workers and on-disk format dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use crate::error::MeshLoadError;
use crate::events::MeshEvent;
use crate::handles::MeshHandle;
use crate::manager::CacheEntry;
use crate::mesh::MeshData;
use crate::{gltf, obj};

/// Parses a mesh file, choosing the parser by extension: `.obj` goes to the
/// OBJ parser, `.gltf`/`.glb` to the glTF parser, and anything else falls
/// back to the OBJ parser, which rejects incompatible input with a clean
/// parse error.
pub(crate) fn parse_mesh(path: &Path) -> Result<MeshData, MeshLoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("obj") => obj::load_obj_from_path(path),
        Some("gltf") | Some("glb") => gltf::load_gltf_from_path(path),
        Some(other) => {
            warn!(
                "unrecognized mesh extension '{}' for {}, trying OBJ parser",
                other,
                path.display()
            );
            obj::load_obj_from_path(path)
        }
        None => obj::load_obj_from_path(path),
    }
}

/// One unit of background work handed to the pool.
pub(crate) struct LoadRequest {
    pub handle: MeshHandle,
    pub path: PathBuf,
    pub entry: Arc<CacheEntry>,
}

/// Record pushed onto the completion channel when a background parse
/// finishes, successfully or not. Drained only by the owning thread's
/// `poll_completed`.
pub(crate) struct Completion {
    pub handle: MeshHandle,
    pub path: PathBuf,
    pub error: Option<MeshLoadError>,
}

/// Bounded pool of loader threads fed by an unbounded request queue.
/// Workers shut down when the pool (and with it the request sender) is
/// dropped.
pub(crate) struct WorkerPool {
    request_tx: Option<Sender<LoadRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        worker_threads: usize,
        completed_tx: Sender<Completion>,
        events_tx: Sender<MeshEvent>,
    ) -> Self {
        let (request_tx, request_rx) = unbounded::<LoadRequest>();

        let workers = (0..worker_threads.max(1))
            .map(|_| {
                let request_rx = request_rx.clone();
                let completed_tx = completed_tx.clone();
                let events_tx = events_tx.clone();
                std::thread::spawn(move || worker_loop(request_rx, completed_tx, events_tx))
            })
            .collect();

        Self {
            request_tx: Some(request_tx),
            workers,
        }
    }

    pub fn dispatch(&self, request: LoadRequest) {
        if let Some(tx) = &self.request_tx {
            if tx.send(request).is_err() {
                warn!("loader pool is shut down, dropping load request");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker's receive loop.
        self.request_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    request_rx: Receiver<LoadRequest>,
    completed_tx: Sender<Completion>,
    events_tx: Sender<MeshEvent>,
) {
    for request in request_rx {
        let LoadRequest {
            handle,
            path,
            entry,
        } = request;

        if entry.is_loaded() {
            // A synchronous load got there first; still report completion so
            // registered callbacks fire on the next poll.
            let _ = completed_tx.send(Completion {
                handle,
                path,
                error: None,
            });
            continue;
        }

        debug!("loading mesh {} (handle {})", path.display(), handle.raw());
        match parse_mesh(&path) {
            Ok(mesh) => {
                let won = entry.publish(mesh);
                let _ = completed_tx.send(Completion {
                    handle,
                    path: path.clone(),
                    error: None,
                });
                if won {
                    // The entry may have been released while the parse ran;
                    // the event still goes out and consumers re-resolve the
                    // handle through the registry.
                    let _ = events_tx.send(MeshEvent::Loaded { path, handle });
                }
            }
            Err(error) => {
                warn!("failed to load mesh {}: {}", path.display(), error);
                let reason = error.to_string();
                let _ = completed_tx.send(Completion {
                    handle,
                    path: path.clone(),
                    error: Some(error),
                });
                let _ = events_tx.send(MeshEvent::LoadFailed { path, reason });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_prefers_extension() {
        // Unknown extension routes through the OBJ parser, which cleanly
        // rejects a file that is not OBJ-shaped.
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strange.mesh");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").expect("write");
        let mesh = parse_mesh(&path).expect("OBJ fallback should parse");
        assert_eq!(mesh.vertices.len(), 3);
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upper.OBJ");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").expect("write");
        assert!(parse_mesh(&path).is_ok());
    }

    #[test]
    fn missing_file_fails_cleanly() {
        assert!(parse_mesh(Path::new("/nope/missing.obj")).is_err());
    }
}
