use std::path::PathBuf;

use crate::handles::MeshHandle;

/// Notification published on the manager's event channel.
///
/// Both the synchronous and asynchronous load paths emit exactly one event
/// per load attempt. Consumers subscribe by draining the receiver returned
/// from [`MeshManager::events`].
///
/// [`MeshManager::events`]: crate::MeshManager::events
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    Loaded { path: PathBuf, handle: MeshHandle },
    LoadFailed { path: PathBuf, reason: String },
}
