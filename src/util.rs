//! Small filesystem helpers: `must_have_dir`, `is_writable_dir`,
//! `can_delete_file`, `to_abs_path`, `get_dir_size`.

use std::env;
use std::error::Error;
use std::ffi::CString;
use std::fs::create_dir_all;
use std::os::linux::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::error::RepositoryError;

/// Make sure `path` exists as a directory, creating it (and parents) if
/// needed.
pub fn must_have_dir(path: &Path) -> Result<(), RepositoryError> {
    match path.try_exists() {
        Ok(true) => {
            if !path.is_dir() {
                return Err(RepositoryError::CantMakeDirectory(path.to_path_buf()));
            }
            Ok(())
        }
        Ok(false) => create_dir_all(path)
            .map_err(|_| RepositoryError::CantMakeDirectory(path.to_path_buf())),
        Err(_) => Err(RepositoryError::CantMakeDirectory(path.to_path_buf())),
    }
}

/// `access(2)`-based writability check. Uses the process's real uid, so a
/// sudo invocation can still be refused here.
pub fn is_writable_dir(path: &Path) -> bool {
    let dir_location = match path.to_str() {
        Some(v) => v,
        None => return false,
    };
    let path_cstr = match CString::new(dir_location) {
        Ok(v) => v,
        Err(_) => return false,
    };

    let writable = unsafe { libc::access(path_cstr.as_ptr(), libc::R_OK | libc::W_OK | libc::X_OK) };
    writable == 0
}

/// Whether the calling user can delete `file_path`: needs rwx on the parent
/// directory and rw on the file itself.
pub fn can_delete_file(file_path: &Path) -> bool {
    let parent = match file_path.parent() {
        Some(v) => v,
        None => return false,
    };

    if !is_writable_dir(parent) {
        return false;
    }

    let location = match file_path.to_str() {
        Some(v) => v,
        None => return false,
    };
    let path_cstr = match CString::new(location) {
        Ok(v) => v,
        Err(_) => return false,
    };

    let writable = unsafe { libc::access(path_cstr.as_ptr(), libc::R_OK | libc::W_OK) };
    writable == 0
}

/// Resolve `path` to an absolute form without requiring it to exist (unlike
/// `fs::canonicalize`, which also resolves symlinks).
pub fn to_abs_path(path: impl AsRef<Path>) -> Result<PathBuf, Box<dyn Error>> {
    let path = path.as_ref();
    let abs_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    Ok(abs_path)
}

/// Disk usage of `path`, symlinks excluded, same units as `du -B1`.
pub fn get_dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total_size: u64 = 0;
    if path.is_dir() {
        let block_count = path.metadata()?.st_blocks();
        total_size += block_count * 512;

        for child in std::fs::read_dir(path)? {
            let child = child?;
            let child_path = child.path();
            if child_path.is_dir() {
                total_size += get_dir_size(&child_path)?;
            } else if child_path.is_file() && !child_path.is_symlink() {
                total_size += child_path.metadata()?.st_blocks() * 512;
            }
        }
    }

    Ok(total_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, remove_dir_all, File};
    use std::io::Write;
    use std::time::SystemTime;

    #[test]
    fn test_get_dir_size() {
        let time_now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let temp_test_dir = env::temp_dir()
            .join("trash-rs-tests")
            .join(format!("size-{time_now}"));
        let test_dir_1 = temp_test_dir.join("test-1");
        create_dir_all(&test_dir_1).unwrap();

        let test_file = test_dir_1.join("test_file");
        let mut f = File::create(test_file).unwrap();
        f.write_all(&vec![0u8; 4096]).unwrap();

        let size = get_dir_size(&temp_test_dir).unwrap();
        assert!(size > 0);

        remove_dir_all(temp_test_dir).unwrap();
    }

    #[test]
    fn test_to_abs_path_keeps_absolute() {
        let p = to_abs_path("/tmp/foo").unwrap();
        assert_eq!(p, PathBuf::from("/tmp/foo"));
    }
}
