//! The filesystem layout fixture: a throwaway directory tree with exact
//! owners and modes, created before each scenario and removed after it.
//!
//! Layout grammar, one entry per line; a trailing `/` makes a directory and
//! `/` alone is the fixture root:
//!
//! ```text
//! /            0755 alice staff
//! /dir/        0750 alice staff
//! /dir/file    0640 alice staff
//! ```

use std::env;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::passwd::IdentityRegistry;
use crate::fixture::read_lines;
use crate::fs_op::create::{apply_mode_and_owner, create_dir, create_file};
use crate::fs_op::mount::MountResolution;
use crate::fs_op::remove::remove_tree;
use crate::fs_op::stat::PathType;

static ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/[/\w-]*)\s+([0-7]+)\s+(\w+)\s+(\w+)$").unwrap());

/// One declared path of the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// Absolute within the fixture root; a trailing `/` marks a directory.
    pub path: String,
    pub mode: u32,
    pub user: String,
    pub group: String,
}

impl FsEntry {
    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Whether the entry names the fixture root itself.
    pub fn is_root(&self) -> bool {
        self.path.trim_matches('/').is_empty()
    }
}

/// Parse one layout line. `None` when it matches no entry form.
pub fn parse_entry(line: &str) -> Option<FsEntry> {
    let c = ENTRY_RE.captures(line.trim())?;
    let mode = u32::from_str_radix(&c[2], 8).ok()?;
    Some(FsEntry {
        path: c[1].to_string(),
        mode,
        user: c[3].to_string(),
        group: c[4].to_string(),
    })
}

/// Validate the name of the fixture root directory.
///
/// It must be a single, non-empty path component: anything that could point
/// elsewhere is refused before any destructive walk can start.
pub fn validate_root_name(name: &str) -> HarnessResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('.') {
        return Err(HarnessError::Configuration(format!(
            "fixture root `{}` must be a plain directory name without `.` or `/`",
            name
        )));
    }
    Ok(())
}

/// Declared layout plus the live directory it is materialised in.
#[derive(Debug, Clone)]
pub struct FilesystemFixture {
    base: PathBuf,
    directory: String,
    entries: Vec<FsEntry>,
    mount: OnceCell<MountResolution>,
}

impl FilesystemFixture {
    /// Load the layout at `path`, rooted at `root_dir` under the current
    /// working directory.
    pub fn load(path: &Path, root_dir: &str) -> HarnessResult<Self> {
        let base = env::current_dir()?;
        Self::load_in(path, root_dir, base)
    }

    /// Load the layout at `path`, rooted at `base/root_dir`.
    pub fn load_in(path: &Path, root_dir: &str, base: impl Into<PathBuf>) -> HarnessResult<Self> {
        validate_root_name(root_dir)?;
        let mut entries = Vec::new();
        for line in read_lines(path)? {
            match parse_entry(&line.text) {
                Some(entry) => entries.push(entry),
                None => {
                    return Err(HarnessError::parse(
                        path,
                        line.number,
                        format!("expected `<path> <mode> <user> <group>`, got `{}`", line.text),
                    ))
                }
            }
        }
        Ok(FilesystemFixture {
            base: base.into(),
            directory: root_dir.to_string(),
            entries,
            mount: OnceCell::new(),
        })
    }

    /// Use a known mount resolution instead of querying `df`.
    pub fn with_mount_resolution(self, resolution: MountResolution) -> Self {
        let mount = OnceCell::new();
        let _ = mount.set(resolution);
        FilesystemFixture { mount, ..self }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn entries(&self) -> &[FsEntry] {
        &self.entries
    }

    /// Absolute path of the fixture root.
    pub fn root(&self) -> PathBuf {
        self.base.join(&self.directory)
    }

    /// Turn a fixture-relative path into a real filesystem target.
    pub fn make_absolute(&self, relative: &str) -> PathBuf {
        self.root().join(relative.trim_start_matches('/'))
    }

    /// Device and device-relative root, resolved once per fixture.
    pub fn mount_resolve(&self) -> HarnessResult<&MountResolution> {
        self.mount
            .get_or_try_init(|| MountResolution::query(&self.base, &self.directory))
    }

    /// Create the root and every declared entry, in declaration order.
    pub fn setup(&self, registry: &IdentityRegistry) -> HarnessResult<()> {
        let root = self.root();
        if PathType::of(&root) != PathType::NotFound {
            return Err(HarnessError::Configuration(format!(
                "something already exists at {}",
                root.display()
            )));
        }
        info!("setting up {}", root.display());
        create_dir(&root)?;

        // Roll back a half-built tree so the next scenario starts clean.
        if let Err(e) = self.create_entries(registry) {
            if let Err(te) = self.teardown() {
                warn!("rollback after failed setup: {}", te);
            }
            return Err(e);
        }
        Ok(())
    }

    fn create_entries(&self, registry: &IdentityRegistry) -> HarnessResult<()> {
        for entry in &self.entries {
            let target = self.make_absolute(&entry.path);
            let uid = registry.require_uid(&entry.user)?;
            let gid = registry.require_gid(&entry.group)?;
            if !entry.is_root() {
                if entry.is_dir() {
                    create_dir(&target)?;
                } else {
                    create_file(&target)?;
                }
            }
            apply_mode_and_owner(&target, entry.mode, uid, gid)?;
            debug!("created {} {:o} {}:{}", target.display(), entry.mode, entry.user, entry.group);
        }
        Ok(())
    }

    /// Remove the fixture root and everything found below it.
    ///
    /// A missing root is a no-op. A root that exists but is not a directory
    /// is reported without touching it; failures to remove individual paths
    /// are logged and skipped.
    pub fn teardown(&self) -> HarnessResult<()> {
        let root = self.root();
        match PathType::of(&root) {
            PathType::NotFound => return Ok(()),
            PathType::Directory => {}
            PathType::Other => {
                return Err(HarnessError::Configuration(format!(
                    "something exists at {} but it isn't a directory",
                    root.display()
                )))
            }
        }
        debug!("tearing down {}", root.display());
        for failure in remove_tree(&root) {
            warn!("teardown: {}", failure);
        }
        Ok(())
    }
}
