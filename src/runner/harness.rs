//! Run orchestration: preconditions, fixture loading, scenario selection and
//! the final cleanup.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{error, info, warn};

use crate::config::HarnessConfig;
use crate::enforcer::Enforcer;
use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::passwd::IdentityRegistry;
use crate::fs_op::FilesystemFixture;
use crate::identity::Credentials;
use crate::runner::interrupt;
use crate::runner::scenario::{Executor, Scenario};

/// Subdirectories of `dir` holding both scenario files, sorted by name.
pub fn discover_scenarios(dir: &Path) -> HarnessResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if Scenario::is_scenario_dir(&entry.path()) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Per-scenario verdicts, in run order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    results: Vec<(String, bool)>,
    /// Set when a fatal error stopped the run early.
    pub aborted: Option<String>,
}

impl Summary {
    pub fn record(&mut self, name: &str, passed: bool) {
        self.results.push((name.to_string(), passed));
    }

    pub fn results(&self) -> &[(String, bool)] {
        &self.results
    }

    pub fn passed(&self, name: &str) -> Option<bool> {
        self.results.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
    }

    pub fn all_passed(&self) -> bool {
        self.aborted.is_none() && self.results.iter().all(|(_, p)| *p)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, passed) in &self.results {
            writeln!(f, "{}: {}", name, if *passed { "passed" } else { "failed" })?;
        }
        Ok(())
    }
}

/// Owns everything a run shares: identities, the fixture, the process
/// credentials and the enforcer.
///
/// Dropping the harness clears the enforcer and removes the fixture tree,
/// whatever state the run ended in.
pub struct Harness<C: Credentials, E: Enforcer> {
    config: HarnessConfig,
    registry: IdentityRegistry,
    filesystem: FilesystemFixture,
    credentials: C,
    enforcer: E,
}

impl<C: Credentials, E: Enforcer> Harness<C, E> {
    /// Check preconditions and load the shared fixtures named by `config`.
    pub fn prepare(config: HarnessConfig, credentials: C, enforcer: E) -> HarnessResult<Self> {
        if !credentials.current()?.euid.is_root() {
            return Err(HarnessError::Configuration(
                "the test suite must be run as root".into(),
            ));
        }
        enforcer.check()?;

        info!("Loading users and groups from {}", config.passwd.display());
        let registry = IdentityRegistry::load(&config.passwd, config.start_uid, config.start_gid)?;
        info!("Loading filesystem layout from {}", config.filesystem.display());
        let filesystem = FilesystemFixture::load(&config.filesystem, &config.root_dir)?;
        Self::from_parts(config, registry, filesystem, credentials, enforcer)
    }

    /// Assemble a harness from already loaded fixtures.
    ///
    /// Mount resolution happens here so a bad mount fails before any
    /// scenario runs.
    pub fn from_parts(
        config: HarnessConfig,
        registry: IdentityRegistry,
        filesystem: FilesystemFixture,
        credentials: C,
        enforcer: E,
    ) -> HarnessResult<Self> {
        for line in registry.to_string().lines() {
            info!("{}", line);
        }
        let mount = filesystem.mount_resolve()?;
        info!("Mount point: {}", mount.mount_point.display());
        info!("Relative path: {}", mount.relative_path);
        info!("Device: {}", mount.device.display());
        Ok(Harness {
            config,
            registry,
            filesystem,
            credentials,
            enforcer,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn filesystem(&self) -> &FilesystemFixture {
        &self.filesystem
    }

    pub fn enforcer(&self) -> &E {
        &self.enforcer
    }

    /// `requested` as given, or every discovered scenario when empty.
    pub fn select(&self, requested: &[String]) -> HarnessResult<Vec<String>> {
        if requested.is_empty() {
            discover_scenarios(&self.config.scenarios_dir)
        } else {
            Ok(requested.to_vec())
        }
    }

    /// Load every named scenario, then run them in order.
    ///
    /// A scenario that fails to load aborts the run before anything
    /// executes. Failures while running are recorded against that scenario
    /// only, unless they are fatal.
    pub fn run(&mut self, names: &[String]) -> HarnessResult<Summary> {
        let scenarios = names
            .iter()
            .map(|name| Scenario::load(&self.config.scenarios_dir.join(name), name))
            .collect::<HarnessResult<Vec<_>>>()?;

        let mut summary = Summary::default();
        let mut pending = scenarios.iter();
        while let Some(scenario) = pending.next() {
            match self.run_one(scenario) {
                Ok(()) => summary.record(scenario.name(), true),
                Err(e) => {
                    error!("{}", e);
                    summary.record(scenario.name(), false);
                    if e.is_fatal() {
                        for rest in pending.by_ref() {
                            warn!("{}: not run", rest.name());
                            summary.record(rest.name(), false);
                        }
                        summary.aborted = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        Ok(summary)
    }

    fn run_one(&mut self, scenario: &Scenario) -> HarnessResult<()> {
        interrupt::check()?;
        if self.config.isolate_scenarios {
            self.enforcer.reset()?;
        }
        let executor = Executor::new(&self.registry, &self.filesystem, &self.credentials);
        scenario.run(&executor, &mut self.enforcer)
    }
}

impl<C: Credentials, E: Enforcer> Drop for Harness<C, E> {
    fn drop(&mut self) {
        if let Err(e) = self.enforcer.reset() {
            warn!("enforcer reset: {}", e);
        }
        if let Err(e) = self.filesystem.teardown() {
            warn!("teardown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::{
        world, write_scenario, RecordingCredentials, RecordingEnforcer, World,
    };
    use nix::unistd::Uid;
    use tempfile::tempdir;

    fn harness(
        w: &World,
        creds: RecordingCredentials,
        isolate: bool,
    ) -> Harness<RecordingCredentials, RecordingEnforcer> {
        let config = HarnessConfig {
            scenarios_dir: w.dir.path().to_path_buf(),
            isolate_scenarios: isolate,
            ..HarnessConfig::default()
        };
        Harness::from_parts(
            config,
            w.registry.clone(),
            w.filesystem.clone(),
            creds,
            RecordingEnforcer::default(),
        )
        .unwrap()
    }

    #[test]
    fn discovery_requires_both_files_and_sorts() -> HarnessResult<()> {
        let td = tempdir()?;
        write_scenario(td.path(), "t002", "", "");
        write_scenario(td.path(), "t001", "", "");
        fs::create_dir(td.path().join("half"))?;
        fs::write(td.path().join("half").join("config"), "")?;
        fs::write(td.path().join("passwd"), "")?;
        assert_eq!(discover_scenarios(td.path())?, vec!["t001", "t002"]);
        Ok(())
    }

    #[test]
    fn summary_lists_verdicts_in_order() {
        let mut s = Summary::default();
        s.record("t001", true);
        s.record("t002", false);
        assert_eq!(s.to_string(), "t001: passed\nt002: failed\n");
        assert!(!s.all_passed());
        assert_eq!(s.passed("t001"), Some(true));
        assert_eq!(s.passed("t003"), None);
    }

    #[test]
    fn prepare_refuses_unprivileged_run() {
        let mut creds = RecordingCredentials::new();
        creds.state.get_mut().euid = Uid::from_raw(1000);
        let res = Harness::prepare(HarnessConfig::default(), creds, RecordingEnforcer::default());
        assert!(matches!(res, Err(HarnessError::Configuration(_))));
    }

    #[test]
    fn prepare_checks_enforcer_before_loading_fixtures() {
        let mut creds = RecordingCredentials::new();
        creds.state.get_mut().euid = Uid::from_raw(0);
        let enforcer = RecordingEnforcer {
            missing: true,
            ..RecordingEnforcer::default()
        };
        let config = HarnessConfig {
            passwd: "/nonexistent/passwd".into(),
            ..HarnessConfig::default()
        };
        match Harness::prepare(config, creds, enforcer) {
            Err(HarnessError::Configuration(msg)) => {
                assert!(msg.contains("does not exist"), "{}", msg)
            }
            Err(other) => panic!("unexpected: {:?}", other),
            Ok(_) => panic!("prepare accepted a missing enforcer"),
        }
    }

    #[test]
    fn failing_scenario_does_not_stop_the_next() -> HarnessResult<()> {
        let w = world();
        write_scenario(w.dir.path(), "t001", "", "should_pass alice read missing\n");
        write_scenario(w.dir.path(), "t002", "/:alice:7\n", "should_pass alice mkdir d\n");
        let mut h = harness(&w, RecordingCredentials::new(), true);

        let names = h.select(&[])?;
        let summary = h.run(&names)?;
        assert_eq!(summary.to_string(), "t001: failed\nt002: passed\n");
        assert_eq!(h.enforcer().resets, 2, "one reset per scenario");
        assert!(!w.filesystem.root().exists());
        Ok(())
    }

    #[test]
    fn accumulate_mode_keeps_earlier_rules() -> HarnessResult<()> {
        let w = world();
        write_scenario(w.dir.path(), "t001", "/:alice:7\n", "");
        write_scenario(w.dir.path(), "t002", "/:*:0\n", "");
        let mut h = harness(&w, RecordingCredentials::new(), false);
        let summary = h.run(&["t001".to_string(), "t002".to_string()])?;
        assert!(summary.all_passed());
        assert_eq!(h.enforcer().resets, 0);
        assert_eq!(h.enforcer().lines.len(), 2);
        Ok(())
    }

    #[test]
    fn load_error_aborts_before_any_scenario_runs() {
        let w = world();
        write_scenario(w.dir.path(), "t001", "", "should_pass alice mkdir d\n");
        write_scenario(w.dir.path(), "t002", "", "should_pass alice explode d\n");
        let creds = RecordingCredentials::new();
        let mut h = harness(&w, creds, true);
        assert!(h.run(&["t001".to_string(), "t002".to_string()]).is_err());
        assert!(h.credentials.switches.borrow().is_empty());
    }

    #[test]
    fn failed_restore_aborts_remaining_scenarios() -> HarnessResult<()> {
        let w = world();
        write_scenario(w.dir.path(), "t001", "", "should_pass alice mkdir d\n");
        write_scenario(w.dir.path(), "t002", "", "should_pass alice mkdir e\n");
        let mut creds = RecordingCredentials::new();
        creds.refuse_uid = Some(Uid::effective());
        let mut h = harness(&w, creds, true);

        let summary = h.run(&["t001".to_string(), "t002".to_string()])?;
        assert_eq!(summary.passed("t001"), Some(false));
        assert_eq!(summary.passed("t002"), Some(false));
        assert!(summary.aborted.is_some());
        assert_eq!(h.enforcer().resets, 1, "t002 must not start");
        Ok(())
    }
}
