//! Resolution of the block device and device-relative path of the fixture.
//!
//! The enforcer addresses files as `[<device>]<path below the mount point>`,
//! so the harness asks `df -P .` which filesystem holds the working
//! directory and rewrites the fixture root relative to that mount point.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{HarnessError, HarnessResult};
use crate::fs_op::stat::is_block_device;

fn confused(what: &str) -> HarnessError {
    HarnessError::Configuration(format!("confused by `df -P .` output ({})", what))
}

/// Extract `(device, mount point)` from `df -P` output.
///
/// The output must be exactly a header line plus one data row of six
/// whitespace-separated fields.
pub fn parse_df_output(output: &str) -> HarnessResult<(String, String)> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() != 2 {
        return Err(confused(&format!("{} lines, expected 2", lines.len())));
    }
    let fields: Vec<&str> = lines[1].split_whitespace().collect();
    if fields.len() != 6 {
        return Err(confused(&format!("{} fields, expected 6", fields.len())));
    }
    Ok((fields[0].to_string(), fields[5].to_string()))
}

/// Where the fixture root lives from the enforcer's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountResolution {
    pub device: PathBuf,
    pub mount_point: PathBuf,
    /// Fixture root relative to `mount_point`, always starting with `/`.
    pub relative_path: String,
}

impl MountResolution {
    pub fn new(
        device: impl Into<PathBuf>,
        mount_point: impl Into<PathBuf>,
        relative_path: impl Into<String>,
    ) -> Self {
        MountResolution {
            device: device.into(),
            mount_point: mount_point.into(),
            relative_path: relative_path.into(),
        }
    }

    /// Compute the device-relative fixture path for `cwd` on `mount_point`.
    ///
    /// Does not inspect the device; see [`MountResolution::query`].
    pub fn compute(
        device: &str,
        mount_point: &str,
        cwd: &Path,
        root_dir: &str,
    ) -> HarnessResult<Self> {
        let cwd = cwd.to_string_lossy();
        if !cwd.starts_with(mount_point) {
            return Err(confused(&format!(
                "{} is not below mount point {}",
                cwd, mount_point
            )));
        }
        // A mount point of `/` contributes nothing to strip.
        let cutoff = if mount_point.len() == 1 { 0 } else { mount_point.len() };
        let relative = &cwd[cutoff..];
        if !relative.starts_with('/') || relative.len() <= 1 {
            return Err(HarnessError::Configuration(format!(
                "{} is not a proper subdirectory of mount point {}",
                cwd, mount_point
            )));
        }
        Ok(MountResolution::new(
            device,
            mount_point,
            format!("{}/{}", relative.trim_end_matches('/'), root_dir),
        ))
    }

    /// Run `df -P .` in `cwd` and resolve the fixture root `root_dir`.
    pub fn query(cwd: &Path, root_dir: &str) -> HarnessResult<Self> {
        let output = Command::new("df")
            .arg("-P")
            .arg(".")
            .current_dir(cwd)
            .output()
            .map_err(|e| HarnessError::Configuration(format!("failed to run `df -P .`: {}", e)))?;
        if !output.status.success() {
            return Err(confused(&format!("exit status {}", output.status)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let (device, mount_point) = parse_df_output(&stdout)?;
        let resolution = Self::compute(&device, &mount_point, cwd, root_dir)?;
        if !is_block_device(&resolution.device) {
            return Err(HarnessError::Configuration(format!(
                "{} is not a block device",
                resolution.device.display()
            )));
        }
        Ok(resolution)
    }

    /// Join a fixture-absolute rule path onto the device-relative root.
    pub fn enforcer_path(&self, rule_path: &str) -> String {
        format!(
            "{}/{}",
            self.relative_path.trim_end_matches('/'),
            rule_path.trim_start_matches('/')
        )
    }
}
