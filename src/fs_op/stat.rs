use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// What sits at a fixture root path, as far as setup and teardown care.
///
/// Symbolic links are not followed: a link is reported as `Other` so teardown
/// refuses it instead of walking into its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    /// The path does not exist.
    NotFound,
    /// The path exists and is a directory.
    Directory,
    /// The path exists but is not a directory (file, symlink, socket, ...).
    Other,
}

impl PathType {
    /// Classify `path` and return its `PathType`.
    pub fn of<P: AsRef<Path>>(path: P) -> Self {
        match fs::symlink_metadata(path.as_ref()) {
            Err(_) => PathType::NotFound,
            Ok(meta) if meta.file_type().is_dir() => PathType::Directory,
            Ok(_) => PathType::Other,
        }
    }
}

/// Return `true` if `path` is a block device, following symlinks
/// (`/dev/disk/by-*` entries and `/dev/mapper` names are links).
pub fn is_block_device<P: AsRef<Path>>(path: P) -> bool {
    fs::metadata(path.as_ref())
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn path_type_nonexistent() {
        let tmp = tempdir().unwrap();
        let p = tmp.path().join("no_such_file_hopefully");
        assert_eq!(PathType::of(&p), PathType::NotFound);
        assert!(!is_block_device(&p));
    }

    #[test]
    fn path_type_file_dir_and_link() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        assert_eq!(PathType::of(&file), PathType::Other);
        assert!(!is_block_device(&file));

        let dir = tmp.path().join("subdir");
        fs::create_dir(&dir).unwrap();
        assert_eq!(PathType::of(&dir), PathType::Directory);

        let link = tmp.path().join("dir_link");
        std::os::unix::fs::symlink(&dir, &link).unwrap();
        assert_eq!(PathType::of(&link), PathType::Other);

        let dangling = tmp.path().join("dangling");
        std::os::unix::fs::symlink(tmp.path().join("gone"), &dangling).unwrap();
        assert_eq!(PathType::of(&dangling), PathType::Other);
    }
}
