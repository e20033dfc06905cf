//! Doubles for the process credentials and the enforcer, so scenarios can
//! run without switching the test process identity or loading a kernel
//! module.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use trustee_harness::identity::IdentityState;
use trustee_harness::{Credentials, Enforcer, HarnessResult};

pub struct FakeCredentials {
    pub state: RefCell<IdentityState>,
    pub switched_to: RefCell<Vec<Uid>>,
}

impl FakeCredentials {
    pub fn new() -> Self {
        FakeCredentials {
            state: RefCell::new(IdentityState {
                euid: Uid::effective(),
                groups: vec![Gid::effective()],
            }),
            switched_to: RefCell::new(Vec::new()),
        }
    }
}

impl Credentials for FakeCredentials {
    fn current(&self) -> HarnessResult<IdentityState> {
        Ok(self.state.borrow().clone())
    }

    fn set_groups(&self, groups: &[Gid]) -> HarnessResult<()> {
        self.state.borrow_mut().groups = groups.to_vec();
        Ok(())
    }

    fn set_effective_uid(&self, uid: Uid) -> HarnessResult<()> {
        self.switched_to.borrow_mut().push(uid);
        self.state.borrow_mut().euid = uid;
        Ok(())
    }
}

/// Keeps every batch it was sent.
#[derive(Default)]
pub struct FakeEnforcer {
    pub batches: Vec<Vec<String>>,
    pub resets: usize,
}

impl Enforcer for FakeEnforcer {
    fn load_rules(&mut self, lines: &[String]) -> HarnessResult<()> {
        self.batches.push(lines.to_vec());
        Ok(())
    }

    fn reset(&mut self) -> HarnessResult<()> {
        self.resets += 1;
        Ok(())
    }
}

pub fn running_as_root() -> bool {
    Uid::effective().is_root()
}

pub fn write_scenario(dir: &Path, name: &str, config: &str, script: &str) {
    let sdir = dir.join(name);
    fs::create_dir_all(&sdir).unwrap();
    fs::write(sdir.join("config"), config).unwrap();
    fs::write(sdir.join("scenario"), script).unwrap();
}
