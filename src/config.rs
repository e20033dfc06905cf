//! Run configuration, read from an optional TOML file.
//!
//! ```toml
//! passwd = "passwd"
//! filesystem = "filesystem"
//! root_dir = "filesystem_root"
//! enforcer = "../src/settrustees"
//! isolate_scenarios = true
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::passwd::DEFAULT_START_ID;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "trustee-harness.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub passwd: PathBuf,
    pub filesystem: PathBuf,
    /// Name of the fixture root, a single component under the working directory.
    pub root_dir: String,
    pub enforcer: PathBuf,
    pub scenarios_dir: PathBuf,
    pub start_uid: u32,
    pub start_gid: u32,
    /// Reset the enforcer before each scenario's rules are loaded.
    pub isolate_scenarios: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            passwd: PathBuf::from("passwd"),
            filesystem: PathBuf::from("filesystem"),
            root_dir: "filesystem_root".to_string(),
            enforcer: PathBuf::from("../src/settrustees"),
            scenarios_dir: PathBuf::from("."),
            start_uid: DEFAULT_START_ID,
            start_gid: DEFAULT_START_ID,
            isolate_scenarios: true,
            log_file: None,
        }
    }
}

impl HarnessConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Read `path`; with `required == false` a missing file yields defaults.
    pub fn load(path: &Path, required: bool) -> HarnessResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self::default())
            }
            Err(e) => {
                return Err(HarnessError::Configuration(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Self::from_toml(&text)
            .map_err(|e| HarnessError::Configuration(format!("{}: {}", path.display(), e)))
    }
}
