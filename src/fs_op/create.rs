use std::fmt;
use std::fs::{self, OpenOptions, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid, Uid};

/// Errors returned when materialising a fixture entry.
#[derive(Debug)]
pub enum CreateError {
    Io(PathBuf, std::io::Error),
    AlreadyExists(PathBuf),
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::Io(p, e) => write!(f, "{}: {}", p.display(), e),
            CreateError::AlreadyExists(p) => write!(f, "already exists: {}", p.display()),
        }
    }
}

impl std::error::Error for CreateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CreateError::Io(_, e) => Some(e),
            _ => None,
        }
    }
}

impl From<CreateError> for crate::errors::HarnessError {
    fn from(e: CreateError) -> Self {
        crate::errors::HarnessError::Configuration(format!("fixture setup failed: {}", e))
    }
}

fn io_err(p: &Path) -> impl FnOnce(std::io::Error) -> CreateError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            CreateError::AlreadyExists(p.to_path_buf())
        } else {
            CreateError::Io(p.to_path_buf(), e)
        }
    }
}

/// Create an empty regular file at `path`. Fails if anything already exists.
pub fn create_file<P: AsRef<Path>>(path: P) -> Result<(), CreateError> {
    let p = path.as_ref();
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(p)
        .map_err(io_err(p))?;
    Ok(())
}

/// Create a single directory at `path`; the parent must already exist.
pub fn create_dir<P: AsRef<Path>>(path: P) -> Result<(), CreateError> {
    let p = path.as_ref();
    fs::create_dir(p).map_err(io_err(p))
}

/// Apply `mode` then ownership to `path`.
///
/// Mode goes first: chown to an unprivileged owner can strip bits the caller
/// would otherwise still be allowed to set.
pub fn apply_mode_and_owner<P: AsRef<Path>>(
    path: P,
    mode: u32,
    uid: Uid,
    gid: Gid,
) -> Result<(), CreateError> {
    let p = path.as_ref();
    fs::set_permissions(p, Permissions::from_mode(mode)).map_err(io_err(p))?;
    chown(p, Some(uid), Some(gid)).map_err(|e| CreateError::Io(p.to_path_buf(), e.into()))?;
    Ok(())
}
