//! In-memory storage backend for testing.

use super::{Body, Connector, ObjectInfoStream, is_direct_child};
use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, ObjectInfo, StorageBackend, md5_hex, validate_name};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

/// One recorded call to [`StorageBackend::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub container: String,
    pub name: String,
    pub content_type: Option<String>,
}

type UploadHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    uploads: Vec<Upload>,
    failing: HashSet<String>,
    reject_auth: bool,
    sessions: usize,
    on_upload: Option<UploadHook>,
}

/// In-memory storage backend for testing.
///
/// Objects are stored in a map behind a [`Mutex`]. Clones share the same
/// state, so a `MockBackend` can act as its own [`Connector`]: every session
/// it hands out sees (and mutates) the same objects, like separate
/// connections to one real service would.
///
/// # Examples
///
/// ```
/// use swiftsync_storage::{Body, StorageBackend, backend::MockBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_containers(["photos"]);
/// backend.upload("photos", "2023/a.jpg", Body::from(b"jpeg".to_vec()), Some("image/jpeg")).await?;
/// assert_eq!(backend.list("photos", Some("2023")).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    state: Arc<Mutex<State>>,
}

impl MockBackend {
    /// Create a mock backend with empty containers.
    pub fn with_containers(containers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let state = State {
            containers: containers.into_iter().map(|c| (c.into(), BTreeMap::new())).collect(),
            ..State::default()
        };
        Self { name: "mock".to_string(), state: Arc::new(Mutex::new(state)) }
    }

    /// Pre-populate objects.
    ///
    /// Panics if the container is unknown or a name fails validation. If
    /// test setup is wrong, then test should not pass.
    pub fn with_objects(
        self,
        container: &str,
        objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        {
            let mut state = self.lock();
            let Some(stored) = state.containers.get_mut(container) else {
                panic!("MockBackend::with_objects: unknown container {container}");
            };
            for (name, data) in objects {
                let name = name.into();
                if validate_name(&name).is_err() {
                    panic!("MockBackend::with_objects: invalid name {name}");
                }
                stored.insert(name, data.into());
            }
        }
        self
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every upload of `name` (in any container) fail with a network
    /// error until [`clear_failures`](Self::clear_failures) is called.
    pub fn fail_uploads_of(&self, name: impl Into<String>) {
        self.lock().failing.insert(name.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Call `hook(container, name)` at the start of every upload, before the
    /// body is read. Lets tests change the filesystem mid-scan.
    pub fn on_upload(&self, hook: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.lock().on_upload = Some(Arc::new(hook));
    }

    /// Make [`connect`](Connector::connect) fail as if credentials were wrong.
    pub fn reject_authentication(&self) {
        self.lock().reject_auth = true;
    }

    /// Every upload attempted so far (failed ones included), in order.
    pub fn uploads(&self) -> Vec<Upload> {
        self.lock().uploads.clone()
    }

    /// Number of sessions handed out by [`connect`](Connector::connect).
    pub fn sessions(&self) -> usize {
        self.lock().sessions
    }

    /// Current content of an object.
    pub fn object(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.lock().containers.get(container).and_then(|objects| objects.get(name)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let containers: [&str; 0] = [];
        Self::with_containers(containers)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_containers(&self) -> Result<BTreeSet<String>> {
        Ok(self.lock().containers.keys().cloned().collect())
    }

    fn list_stream<'a>(&'a self, container: &'a str, pseudofolder: Option<&'a str>) -> ObjectInfoStream<'a> {
        // Snapshot matching entries under the lock, then drop it before
        // yielding to avoid holding the lock across yield points.
        let snapshot: Result<Vec<ObjectInfo>> = match self.lock().containers.get(container) {
            Some(objects) => Ok(objects
                .iter()
                .filter(|(name, _)| is_direct_child(name, pseudofolder))
                .map(|(name, data)| ObjectInfo::new(name.clone(), md5_hex(data)))
                .collect()),
            None => Err(exn::Exn::from(ErrorKind::UnknownContainer(container.to_string()))),
        };
        Box::pin(stream! {
            match snapshot {
                Ok(objects) => {
                    for object in objects {
                        yield Ok(object);
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn upload(&self, container: &str, name: &str, body: Body, content_type: Option<&str>) -> Result<()> {
        let name = validate_name(name)?;
        let hook = self.lock().on_upload.clone();
        if let Some(hook) = hook {
            hook(container, name);
        }
        let data = body.into_bytes().await.map_err(ErrorKind::Io)?;
        let mut state = self.lock();
        state.uploads.push(Upload {
            container: container.to_string(),
            name: name.to_string(),
            content_type: content_type.map(str::to_string),
        });
        if state.failing.contains(name) {
            exn::bail!(ErrorKind::Network(format!("injected failure for {name}")));
        }
        let objects = state
            .containers
            .get_mut(container)
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnknownContainer(container.to_string())))?;
        objects.insert(name.to_string(), data);
        Ok(())
    }

    async fn delete(&self, container: &str, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        let mut state = self.lock();
        let objects = state
            .containers
            .get_mut(container)
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnknownContainer(container.to_string())))?;
        objects.remove(name).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(name.to_string())))
    }
}

#[async_trait]
impl Connector for MockBackend {
    async fn connect(&self) -> Result<BackendHandle> {
        let mut state = self.lock();
        if state.reject_auth {
            exn::bail!(ErrorKind::Authentication("mock credentials rejected".to_string()));
        }
        state.sessions += 1;
        Ok(Arc::new(self.clone()))
    }
}
