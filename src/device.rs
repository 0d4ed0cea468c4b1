//! Device and mount-point resolution for the Router's device-top fallback.

use std::os::linux::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Walk upward from `path`'s directory until the device changes; the last
/// directory still on the source device is the mount root.
pub fn device_top_directory(path: &Path) -> std::io::Result<PathBuf> {
    let start_dev = path
        .parent()
        .unwrap_or(path)
        .metadata()?
        .st_dev();

    let mut current = path.parent().unwrap_or(path).to_path_buf();
    let mut last_on_device = current.clone();
    loop {
        match current.metadata() {
            Ok(meta) if meta.st_dev() == start_dev => last_on_device = current.clone(),
            _ => break,
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    Ok(last_on_device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_top_directory_of_root_is_root() {
        let top = device_top_directory(Path::new("/tmp")).unwrap();
        assert!(top.starts_with("/"));
    }
}
