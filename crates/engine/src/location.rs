//! Mapping between local directories and container/pseudofolder pairs.
//!
//! For a sync root `/data`, the directory `/data/photos/2023/summer` maps to
//! container `photos` and pseudofolder `2023/summer`; the directory
//! `/data/photos` maps to container `photos` with no pseudofolder.

use std::path::{Component, Path, PathBuf};

/// A local directory and where its files go in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub path: PathBuf,
    pub container: String,
    pub pseudofolder: Option<String>,
}

/// Why a path could not be mapped to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unmappable {
    /// The path is the root itself, or not below it.
    OutsideRoot,
    /// A path component is not valid UTF-8 (object names must be).
    NonUtf8,
}

impl Directory {
    /// Work out the container and pseudofolder of `path` relative to `root`.
    pub fn locate(root: &Path, path: &Path) -> Result<Self, Unmappable> {
        let relative = path.strip_prefix(root).map_err(|_| Unmappable::OutsideRoot)?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str().ok_or(Unmappable::NonUtf8)?),
                Component::CurDir => {},
                _ => return Err(Unmappable::OutsideRoot),
            }
        }
        let Some((container, rest)) = segments.split_first() else {
            return Err(Unmappable::OutsideRoot);
        };
        Ok(Self {
            path: path.to_path_buf(),
            container: container.to_string(),
            pseudofolder: (!rest.is_empty()).then(|| rest.join("/")),
        })
    }

    /// Object name of a file directly inside this directory.
    pub fn object_name(&self, file_name: &str) -> String {
        match &self.pseudofolder {
            Some(folder) => format!("{folder}/{file_name}"),
            None => file_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/data/photos", "photos", None)]
    #[case("/data/photos/2023", "photos", Some("2023"))]
    #[case("/data/photos/2023/summer/beach", "photos", Some("2023/summer/beach"))]
    fn test_locate(#[case] path: &str, #[case] container: &str, #[case] pseudofolder: Option<&str>) {
        let directory = Directory::locate(Path::new("/data"), Path::new(path)).unwrap();
        assert_eq!(directory.container, container);
        assert_eq!(directory.pseudofolder.as_deref(), pseudofolder);
        assert_eq!(directory.path, PathBuf::from(path));
    }

    #[test]
    fn test_trailing_slash_on_root() {
        let directory = Directory::locate(Path::new("/data/"), Path::new("/data/photos/2023")).unwrap();
        assert_eq!(directory.container, "photos");
        assert_eq!(directory.pseudofolder.as_deref(), Some("2023"));
    }

    #[rstest]
    #[case("/data")]
    #[case("/elsewhere/photos")]
    fn test_outside_root(#[case] path: &str) {
        assert_eq!(Directory::locate(Path::new("/data"), Path::new(path)), Err(Unmappable::OutsideRoot));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let path = Path::new("/data/photos").join(OsStr::from_bytes(b"bad\xff"));
        assert_eq!(Directory::locate(Path::new("/data"), &path), Err(Unmappable::NonUtf8));
    }

    #[test]
    fn test_object_name() {
        let root = Path::new("/data");
        let top = Directory::locate(root, Path::new("/data/photos")).unwrap();
        assert_eq!(top.object_name("a.jpg"), "a.jpg");
        let nested = Directory::locate(root, Path::new("/data/photos/2023/summer")).unwrap();
        assert_eq!(nested.object_name("a.jpg"), "2023/summer/a.jpg");
    }
}
