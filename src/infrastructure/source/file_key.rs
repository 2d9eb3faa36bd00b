//! Request keys for images on the local filesystem.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::ports::{HandleFactory, OrderKey, RequestKey, SourceHandle};

/// Extensions whose containers may carry EXIF orientation.
const ORIENTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "webp", "tif", "tiff"];

/// Image identified by its path. Files support repeatable random access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    path: Arc<Path>,
}

impl FileKey {
    /// Creates a key for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::from(path.into()),
        }
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl OrderKey for FileKey {
    fn is_blank(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

struct FileHandles {
    path: Arc<Path>,
}

impl HandleFactory for FileHandles {
    fn open(&self) -> io::Result<SourceHandle> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }
}

impl RequestKey for FileKey {
    fn handle_factory(&self) -> io::Result<Option<Arc<dyn HandleFactory>>> {
        Ok(Some(Arc::new(FileHandles {
            path: self.path.clone(),
        })))
    }

    fn open_stream(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }

    fn has_orientation_metadata(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ORIENTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
    }
}
