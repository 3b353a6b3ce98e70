//! Handle-based cache of 3D mesh assets.
//!
//! A [`MeshManager`] interns file paths into opaque, refcounted
//! [`MeshHandle`]s and loads the geometry behind them either synchronously
//! or on a pool of background threads. Two on-disk formats are supported —
//! OBJ (with MTL sidecars) and glTF/GLB — both reconciled into the same
//! in-memory [`MeshData`] representation: a deduplicated vertex buffer plus
//! either a flat index list or per-material submeshes.
//!
//! Asynchronous completions cross back to the owning thread through a queue
//! drained by [`MeshManager::poll_completed`], which also runs any
//! continuations registered with [`MeshManager::register_load_callback`].
//! Load outcomes are additionally published on the manager's event channel.
//!
//! ```no_run
//! use meshbank::MeshManager;
//!
//! let manager = MeshManager::new();
//! let handle = manager.load_mesh_async("assets/rock.obj");
//! manager.register_load_callback(handle, |h| println!("mesh {} ready", h.raw()));
//!
//! // Once per frame on the owning thread:
//! manager.poll_completed();
//! if let Some(mesh) = manager.get_mesh(handle) {
//!     println!("{} triangles", mesh.triangle_count());
//! }
//! ```

mod error;
mod events;
mod gltf;
mod handles;
mod loader;
mod manager;
mod mesh;
mod obj;
mod primitives;

pub use crate::error::MeshLoadError;
pub use crate::events::MeshEvent;
pub use crate::gltf::load_gltf_from_path;
pub use crate::handles::MeshHandle;
pub use crate::manager::{MeshManager, MeshManagerConfig, MeshRef};
pub use crate::mesh::{Material, MeshData, SubMesh, TextureSource, Vertex};
pub use crate::obj::{load_obj_from_path, load_obj_from_str};
pub use crate::primitives::unit_cube;
