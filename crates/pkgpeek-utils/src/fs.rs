use std::{
    fs::{self, File},
    io::Read,
    path::Path,
};

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory and its parents if it doesn't exist yet.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Writes `contents` to `path`, replacing any existing file.
pub fn write_file<P: AsRef<Path>>(path: P, contents: &[u8]) -> FileSystemResult<()> {
    let path = path.as_ref();
    fs::write(path, contents).map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "write",
            source: err,
        }
    })
}

/// Reads up to `size` leading bytes of a file.
///
/// Returns fewer bytes than requested when the file is shorter.
pub fn read_file_signature<P: AsRef<Path>>(path: P, size: usize) -> FileSystemResult<Vec<u8>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "open",
            source: err,
        }
    })?;

    let mut signature = Vec::with_capacity(size);
    file.take(size as u64)
        .read_to_end(&mut signature)
        .map_err(|err| {
            FileSystemError::File {
                path: path.to_path_buf(),
                action: "read",
                source: err,
            }
        })?;

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_ensure_dir_exists_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_rejects_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file");
        fs::write(&file_path, "x").unwrap();
        let result = ensure_dir_exists(&file_path);
        assert!(matches!(result, Err(FileSystemError::NotADirectory { .. })));
    }

    #[test]
    fn test_write_file_and_read_signature() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("blob");
        write_file(&file_path, b"!<arch>\nrest").unwrap();

        assert_eq!(read_file_signature(&file_path, 8).unwrap(), b"!<arch>\n");
        assert_eq!(read_file_signature(&file_path, 64).unwrap().len(), 12);
    }

    #[test]
    fn test_read_signature_missing_file() {
        let dir = tempdir().unwrap();
        let result = read_file_signature(dir.path().join("missing"), 4);
        assert!(matches!(
            result,
            Err(FileSystemError::File { action: "open", .. })
        ));
    }
}
