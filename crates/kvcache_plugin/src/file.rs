//! File-based metadata store for persistent metadata.

use crate::error::{PluginError, PluginResult};
use crate::metadata::MetadataStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const DOC_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";

/// A directory-backed metadata store.
///
/// Each key is stored as one JSON file whose name is the percent-encoded
/// key. Documents survive process restarts.
///
/// # Durability
///
/// `set` writes a temporary file, syncs it and renames it over the target,
/// so a crash leaves either the old or the new document, never a torn one.
///
/// # Example
///
/// ```no_run
/// use kvcache_plugin::{FileMetadataStore, MetadataStore};
/// use serde_json::json;
/// use std::path::Path;
///
/// let store = FileMetadataStore::open(Path::new("/var/lib/kvcache")).unwrap();
/// store.set("segments/s1", &json!({"capacity": 1024})).unwrap();
/// ```
#[derive(Debug)]
pub struct FileMetadataStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMetadataStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> PluginResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the directory holding the documents.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}{}", encode_key(key), DOC_SUFFIX))
    }
}

impl MetadataStore for FileMetadataStore {
    fn get(&self, key: &str) -> PluginResult<Option<Value>> {
        match fs::read(self.doc_path(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &Value) -> PluginResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let target = self.doc_path(key);
        let mut tmp = target.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        let _guard = self.write_lock.lock();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PluginResult<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.doc_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> PluginResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(encoded) = name.strip_suffix(DOC_SUFFIX) else {
                continue;
            };
            let key = decode_key(encoded).ok_or_else(|| {
                PluginError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("undecodable metadata file name: {name}"),
                ))
            })?;
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Percent-encodes everything but unreserved URL characters, so the name
/// holds no path separator.
fn encode_key(key: &str) -> Cow<'_, str> {
    urlencoding::encode(key)
}

fn decode_key(encoded: &str) -> Option<String> {
    urlencoding::decode(encoded).ok().map(Cow::into_owned)
}
