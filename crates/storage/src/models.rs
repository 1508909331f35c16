//! Storage models.

/// Object metadata returned by storage backends.
///
/// Obtained fresh from the backend on every listing; never cached across
/// runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object name within its container (pseudofolder included)
    pub name: String,
    /// Hex-encoded MD5 of the object content, as reported by the backend
    pub hash: String,
}
impl ObjectInfo {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self { name: name.into(), hash: hash.into() }
    }
}
