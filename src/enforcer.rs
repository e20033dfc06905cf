//! Boundary to the external enforcer under test.
//!
//! The enforcer is a command-line tool. Rules are loaded by spawning it with
//! `-f -` and writing one rule line per ACL entry to its stdin; all rules are
//! dropped by spawning it with `-D`. There is no acknowledgement: a rule that
//! the enforcer rejects only shows up as a step whose outcome is wrong.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::errors::{HarnessError, HarnessResult};

/// Something that accepts ACL rule lines and can forget all of them.
pub trait Enforcer {
    /// Transmit `lines`, in order, as one batch.
    fn load_rules(&mut self, lines: &[String]) -> HarnessResult<()>;

    /// Clear every loaded rule.
    fn reset(&mut self) -> HarnessResult<()>;

    /// Verify the enforcer can be invoked at all.
    fn check(&self) -> HarnessResult<()> {
        Ok(())
    }
}

/// The `settrustees` command-line tool.
#[derive(Debug, Clone)]
pub struct SettrusteesEnforcer {
    binary: PathBuf,
}

impl SettrusteesEnforcer {
    pub const LOAD_ARGS: [&'static str; 2] = ["-f", "-"];
    pub const RESET_ARGS: [&'static str; 1] = ["-D"];

    pub fn new(binary: impl Into<PathBuf>) -> Self {
        SettrusteesEnforcer {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Fail unless the binary exists and has an execute bit set.
    pub fn check_executable(&self) -> HarnessResult<()> {
        let meta = fs::metadata(&self.binary).map_err(|_| {
            HarnessError::Configuration(format!("{} does not exist", self.binary.display()))
        })?;
        if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
            return Err(HarnessError::Configuration(format!(
                "{} is not executable",
                self.binary.display()
            )));
        }
        Ok(())
    }
}

/// Write one rule per line; `stdin` is dropped, closing the pipe, on return.
fn write_rules(mut stdin: impl Write, lines: &[String]) -> HarnessResult<()> {
    for line in lines {
        debug!("rule: {}", line);
        writeln!(stdin, "{}", line)?;
    }
    stdin.flush()?;
    Ok(())
}

impl Enforcer for SettrusteesEnforcer {
    fn check(&self) -> HarnessResult<()> {
        self.check_executable()
    }

    fn load_rules(&mut self, lines: &[String]) -> HarnessResult<()> {
        let mut child = Command::new(&self.binary)
            .args(Self::LOAD_ARGS)
            .stdin(Stdio::piped())
            // Keep stdout free for the run summary.
            .stdout(Stdio::from(std::io::stderr()))
            .spawn()?;
        let written = match child.stdin.take() {
            Some(stdin) => write_rules(stdin, lines),
            None => Err(HarnessError::Configuration(
                "enforcer stdin was not captured".into(),
            )),
        };
        // stdin is closed by now, so the enforcer sees end of input and exits.
        let status = child.wait()?;
        if !status.success() {
            warn!("{} exited with {}", self.binary.display(), status);
        }
        written
    }

    fn reset(&mut self) -> HarnessResult<()> {
        let status = Command::new(&self.binary)
            .args(Self::RESET_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            warn!("{} -D exited with {}", self.binary.display(), status);
        }
        Ok(())
    }
}
