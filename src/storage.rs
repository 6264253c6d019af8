use crate::error::CoreError;
use crate::file_bindings::FileBindingSet;
use std::fs;
use tracing::{debug, error};

/// Boundary to the persistence collaborator. A file is addressed by its
/// symbolic id within an entity's binding set; whether the bytes live at
/// an external path or inside a stored session is the binding's
/// `embedded` flag, which implementations are free to honor differently.
/// Failures are reported to the caller, never swallowed.
pub trait PersistenceLayer: Send + Sync {
    fn load(&self, file_id: &str, filenames: &FileBindingSet) -> Result<Vec<u8>, CoreError>;
    fn store(
        &self,
        file_id: &str,
        filenames: &FileBindingSet,
        data: &[u8],
    ) -> Result<(), CoreError>;
}

/// Plain filesystem persistence: every binding resolves to a local path.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl PersistenceLayer for LocalStorage {
    fn load(&self, file_id: &str, filenames: &FileBindingSet) -> Result<Vec<u8>, CoreError> {
        let path = filenames.full_path(file_id).ok_or_else(|| {
            CoreError::not_found(format!("no file binding for id '{file_id}'"))
        })?;
        debug!("loading '{file_id}' from {}", path.display());
        fs::read(&path).map_err(|e| {
            error!("could not read {}: {e}", path.display());
            CoreError::io(format!("could not read '{}': {e}", path.display()))
        })
    }

    fn store(
        &self,
        file_id: &str,
        filenames: &FileBindingSet,
        data: &[u8],
    ) -> Result<(), CoreError> {
        let path = filenames.full_path(file_id).ok_or_else(|| {
            CoreError::not_found(format!("no file binding for id '{file_id}'"))
        })?;
        debug!("storing '{file_id}' to {}", path.display());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoreError::io(format!("could not create '{}': {e}", parent.display()))
                })?;
            }
        }
        fs::write(&path, data).map_err(|e| {
            error!("could not write {}: {e}", path.display());
            CoreError::io(format!("could not write '{}': {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_round_trip_through_binding() {
        let dir = tempfile::tempdir().unwrap();
        let mut filenames = FileBindingSet::new();
        filenames.set_full_path("x", dir.path().join("sub").join("x.bin"));
        let storage = LocalStorage;
        storage.store("x", &filenames, b"payload").unwrap();
        assert_eq!(storage.load("x", &filenames).unwrap(), b"payload");
    }

    #[test]
    fn test_missing_binding_is_not_found() {
        let storage = LocalStorage;
        let err = storage.load("nope", &FileBindingSet::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut filenames = FileBindingSet::new();
        filenames.set_full_path("x", "/no/such/dir/x.bin");
        let err = LocalStorage.load("x", &filenames).unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
