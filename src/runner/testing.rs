//! Test doubles shared by the runner's unit tests.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use tempfile::{tempdir, TempDir};

use crate::enforcer::Enforcer;
use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::passwd::IdentityRegistry;
use crate::fs_op::{FilesystemFixture, MountResolution};
use crate::identity::{Credentials, IdentityState};
use crate::runner::scenario::{ACL_FILE, SCENARIO_FILE};

/// Records uid switches without touching the real process identity.
pub(crate) struct RecordingCredentials {
    pub state: RefCell<IdentityState>,
    pub switches: RefCell<Vec<Uid>>,
    /// Switching to this uid fails.
    pub refuse_uid: Option<Uid>,
}

impl RecordingCredentials {
    pub fn new() -> Self {
        RecordingCredentials {
            state: RefCell::new(IdentityState {
                euid: Uid::effective(),
                groups: vec![Gid::effective()],
            }),
            switches: RefCell::new(Vec::new()),
            refuse_uid: None,
        }
    }
}

impl Credentials for RecordingCredentials {
    fn current(&self) -> HarnessResult<IdentityState> {
        Ok(self.state.borrow().clone())
    }
    fn set_groups(&self, groups: &[Gid]) -> HarnessResult<()> {
        self.state.borrow_mut().groups = groups.to_vec();
        Ok(())
    }
    fn set_effective_uid(&self, uid: Uid) -> HarnessResult<()> {
        if Some(uid) == self.refuse_uid {
            return Err(HarnessError::Configuration("EPERM".into()));
        }
        self.switches.borrow_mut().push(uid);
        self.state.borrow_mut().euid = uid;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingEnforcer {
    pub lines: Vec<String>,
    pub resets: usize,
    /// `check` fails, as for a missing binary.
    pub missing: bool,
}

impl Enforcer for RecordingEnforcer {
    fn check(&self) -> HarnessResult<()> {
        if self.missing {
            return Err(HarnessError::Configuration("settrustees does not exist".into()));
        }
        Ok(())
    }
    fn load_rules(&mut self, lines: &[String]) -> HarnessResult<()> {
        self.lines.extend_from_slice(lines);
        Ok(())
    }
    fn reset(&mut self) -> HarnessResult<()> {
        self.resets += 1;
        self.lines.clear();
        Ok(())
    }
}

/// Fixtures for one test: `alice:staff`, an empty layout (so setup needs
/// no chown) and a preset mount resolution.
pub(crate) struct World {
    pub dir: TempDir,
    pub registry: IdentityRegistry,
    pub filesystem: FilesystemFixture,
}

pub(crate) fn world() -> World {
    let dir = tempdir().unwrap();
    let passwd = dir.path().join("passwd");
    fs::write(&passwd, "alice:staff\n").unwrap();
    let layout = dir.path().join("filesystem");
    fs::write(&layout, "").unwrap();
    let registry = IdentityRegistry::load_default(&passwd).unwrap();
    let filesystem = FilesystemFixture::load_in(&layout, "fsroot", dir.path())
        .unwrap()
        .with_mount_resolution(MountResolution::new("/dev/sda1", "/", "/t/fsroot"));
    World {
        dir,
        registry,
        filesystem,
    }
}

/// Write a scenario directory `dir/name`.
pub(crate) fn write_scenario(dir: &Path, name: &str, config: &str, script: &str) {
    let sdir = dir.join(name);
    fs::create_dir_all(&sdir).unwrap();
    fs::write(sdir.join(ACL_FILE), config).unwrap();
    fs::write(sdir.join(SCENARIO_FILE), script).unwrap();
}
