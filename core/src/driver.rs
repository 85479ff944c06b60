//! The resource driver: one instance per configured base path.
//!
//! Operations live in [`files`](crate::files), [`archive`](crate::archive)
//! and [`http`](crate::http) as `impl Driver` blocks; this module owns
//! construction, resource factories and descriptor resolution.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::DriverConfig;
use crate::errors::DriverError;
use crate::http::transport::{HttpTransport, ReqwestTransport};
use crate::permission::Permission;
use crate::registry::HandleRegistry;
use crate::resource::{Directory, File, FileId, Resource, ResourceDescriptor, Url};

pub struct Driver {
    config: DriverConfig,
    registry: HandleRegistry,
    next_id: AtomicU64,
    transport: Arc<dyn HttpTransport>,
}

impl Driver {
    /// Create a driver that performs HTTP through [`ReqwestTransport`].
    pub fn new(config: DriverConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a driver with an injected HTTP transport.
    pub fn with_transport(config: DriverConfig, transport: Arc<dyn HttpTransport>) -> Self {
        debug!(
            "Driver '{}' rooted at {} ({})",
            config.name,
            config.path.display(),
            config.permissions.as_str()
        );
        Self {
            config,
            registry: HandleRegistry::new(),
            next_id: AtomicU64::new(1),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn base_path(&self) -> &Path {
        &self.config.path
    }

    pub fn permissions(&self) -> Permission {
        self.config.permissions
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub(crate) fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    pub(crate) fn check_mutation(&self, operation: &str) -> Result<(), DriverError> {
        self.config.permissions.check_mutation(operation)
    }

    /// A new file reference with a freshly assigned id.
    pub fn file(&self, path: &str) -> Result<File, DriverError> {
        self.file_with_id(path, None)
    }

    /// A file reference with a caller-supplied id, or a fresh one when
    /// `id` is `None`.
    pub fn file_with_id(&self, path: &str, id: Option<FileId>) -> Result<File, DriverError> {
        let id = match id {
            Some(id) => {
                // Keep assigned ids clear of caller-supplied ones.
                self.next_id
                    .fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
                id
            }
            None => self
                .next_id
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
                .map(FileId)
                .map_err(|_| DriverError::invalid("No file ids left on this driver"))?,
        };
        File::new(id, path, self.base_path())
    }

    pub fn directory(&self, path: &str) -> Result<Directory, DriverError> {
        Directory::new(path, self.base_path())
    }

    pub fn url(&self, url: &str) -> Url {
        Url::new(url)
    }

    /// Turn a caller's descriptor into a resource.
    ///
    /// A file descriptor whose id is open yields the registered [`File`];
    /// any other descriptor yields a freshly constructed resource.
    pub async fn resolve_descriptor(
        &self,
        descriptor: ResourceDescriptor,
    ) -> Result<Resource, DriverError> {
        match descriptor {
            ResourceDescriptor::File { path, id, encoding } => {
                if let Some(id) = id {
                    if let Some(open) = self.registry.get(id).await {
                        return Ok(Resource::File(open.file().clone()));
                    }
                }
                let file = self.file_with_id(&path, id)?.with_encoding(encoding);
                Ok(Resource::File(file))
            }
            ResourceDescriptor::Directory { path } => {
                Ok(Resource::Directory(self.directory(&path)?))
            }
            ResourceDescriptor::Url { url } => Ok(Resource::Url(self.url(&url))),
        }
    }

    /// Close every open handle.
    pub async fn shutdown(&self) {
        self.registry.close_all().await;
    }
}
