//! Scenario scripts and their execution.
//!
//! A scenario directory holds a `config` (ACL rules) and a `scenario`
//! script, one step per line:
//!
//! ```text
//! should_pass alice mkdir dir/sub
//! should_fail bob   rename dir/sub dir/other
//! ```
//!
//! Steps run strictly in file order; later steps may depend on what earlier
//! ones created.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::enforcer::Enforcer;
use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::acl::AclConfig;
use crate::fixture::passwd::IdentityRegistry;
use crate::fixture::read_lines;
use crate::fs_op::ops::{Handler, Operation};
use crate::fs_op::FilesystemFixture;
use crate::identity::{impersonate, Credentials};
use crate::runner::interrupt;

pub const ACL_FILE: &str = "config";
pub const SCENARIO_FILE: &str = "scenario";

static STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^should_(pass|fail)\s+(\w+)\s+(\w+)\s+(.*)$").unwrap());

/// One line of a scenario script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub expect_pass: bool,
    pub user: String,
    pub operation: Operation,
    /// Paths relative to the fixture root.
    pub args: Vec<String>,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "should_{} {} {} {}",
            if self.expect_pass { "pass" } else { "fail" },
            self.user,
            self.operation,
            self.args.join(" ")
        )
    }
}

/// Outcome of parsing one scenario line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepLine {
    Step(Step),
    Malformed,
    UnknownOperation(String),
    WrongArity { operation: Operation, got: usize },
}

/// Parse one line of the scenario grammar.
pub fn parse_step(line: &str) -> StepLine {
    let Some(c) = STEP_RE.captures(line.trim()) else {
        return StepLine::Malformed;
    };
    let Some(operation) = Operation::from_name(&c[3]) else {
        return StepLine::UnknownOperation(c[3].to_string());
    };
    let args: Vec<String> = c[4].split_whitespace().map(str::to_string).collect();
    if args.len() != operation.arity() {
        return StepLine::WrongArity {
            operation,
            got: args.len(),
        };
    }
    StepLine::Step(Step {
        expect_pass: &c[1] == "pass",
        user: c[2].to_string(),
        operation,
        args,
    })
}

/// Load the steps of a scenario script.
pub fn load_steps(path: &Path) -> HarnessResult<Vec<Step>> {
    let mut steps = Vec::new();
    for line in read_lines(path)? {
        match parse_step(&line.text) {
            StepLine::Step(step) => steps.push(step),
            StepLine::Malformed => {
                return Err(HarnessError::parse(
                    path,
                    line.number,
                    format!(
                        "expected `should_(pass|fail) <user> <operation> <args>`, got `{}`",
                        line.text
                    ),
                ))
            }
            StepLine::UnknownOperation(op) => {
                return Err(HarnessError::Configuration(format!(
                    "{}:{}: operation `{}` not found",
                    path.display(),
                    line.number,
                    op
                )))
            }
            StepLine::WrongArity { operation, got } => {
                return Err(HarnessError::parse(
                    path,
                    line.number,
                    format!("{} takes {} path(s), got {}", operation, operation.arity(), got),
                ))
            }
        }
    }
    Ok(steps)
}

/// Runs single steps against the shared fixture as the step's identity.
pub struct Executor<'a, C: Credentials + ?Sized> {
    pub registry: &'a IdentityRegistry,
    pub filesystem: &'a FilesystemFixture,
    pub credentials: &'a C,
}

impl<'a, C: Credentials + ?Sized> Executor<'a, C> {
    pub fn new(
        registry: &'a IdentityRegistry,
        filesystem: &'a FilesystemFixture,
        credentials: &'a C,
    ) -> Self {
        Executor {
            registry,
            filesystem,
            credentials,
        }
    }

    /// Attempt the step's operation once; any OS error counts as `false`.
    pub fn perform(&self, step: &Step) -> bool {
        let paths: Vec<PathBuf> = step
            .args
            .iter()
            .map(|a| self.filesystem.make_absolute(a))
            .collect();
        let shown: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        debug!("{} {} as {}", step.operation, shown.join(" "), step.user);

        let res = match (step.operation.handler(), paths.as_slice()) {
            (Handler::One(f), [p]) => f(p),
            (Handler::Two(f), [a, b]) => f(a, b),
            _ => {
                warn!("{}: wrong number of paths", step);
                return false;
            }
        };
        match res {
            Ok(()) => true,
            Err(e) => {
                debug!("{} failed: {}", step.operation, e);
                false
            }
        }
    }

    /// Run `step` as its identity and report whether the outcome matched.
    ///
    /// The privileged identity is back in place when this returns, whatever
    /// the outcome.
    pub fn handle_entry(&self, step: &Step) -> HarnessResult<bool> {
        let uid = self.registry.require_uid(&step.user)?;
        let gids = self.registry.gids_for_user(&step.user)?;
        let groups = self.registry.groups_for_user(&step.user).unwrap_or_default();
        info!("Switching to {}:{}", step.user, groups.join(","));
        info!("Test: {}", step);

        let outcome = impersonate(self.credentials, uid, &gids, || self.perform(step))?;
        Ok(outcome == step.expect_pass)
    }
}

/// Tears the fixture down when dropped unless [`FixtureGuard::finish`] ran.
struct FixtureGuard<'a> {
    filesystem: &'a FilesystemFixture,
    armed: bool,
}

impl FixtureGuard<'_> {
    fn finish(mut self) -> HarnessResult<()> {
        self.armed = false;
        self.filesystem.teardown()
    }
}

impl Drop for FixtureGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.filesystem.teardown() {
                warn!("teardown: {}", e);
            }
        }
    }
}

/// A loaded scenario directory.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    script: PathBuf,
    acl: AclConfig,
    steps: Vec<Step>,
}

impl Scenario {
    /// Whether `dir` holds both scenario files.
    pub fn is_scenario_dir(dir: &Path) -> bool {
        dir.is_dir() && dir.join(ACL_FILE).is_file() && dir.join(SCENARIO_FILE).is_file()
    }

    pub fn load(dir: &Path, name: &str) -> HarnessResult<Self> {
        if !Self::is_scenario_dir(dir) {
            return Err(HarnessError::Configuration(format!(
                "{} is not a test directory",
                dir.display()
            )));
        }
        let script = dir.join(SCENARIO_FILE);
        Ok(Scenario {
            name: name.to_string(),
            acl: AclConfig::load(&dir.join(ACL_FILE))?,
            steps: load_steps(&script)?,
            script,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn acl(&self) -> &AclConfig {
        &self.acl
    }

    /// Set up the fixture, load this scenario's rules and run every step.
    ///
    /// Stops at the first step whose outcome differs from its expectation.
    /// The fixture is torn down on every exit path once setup succeeded.
    pub fn run<C: Credentials + ?Sized>(
        &self,
        executor: &Executor<'_, C>,
        enforcer: &mut dyn Enforcer,
    ) -> HarnessResult<()> {
        info!("{}", "-".repeat(72));
        info!("Test: {}", self.name);
        executor.filesystem.setup(executor.registry)?;
        let guard = FixtureGuard {
            filesystem: executor.filesystem,
            armed: true,
        };

        let body = self.run_steps(executor, enforcer);
        match body {
            Ok(()) => guard.finish(),
            Err(e) => {
                drop(guard);
                Err(e)
            }
        }
    }

    fn run_steps<C: Credentials + ?Sized>(
        &self,
        executor: &Executor<'_, C>,
        enforcer: &mut dyn Enforcer,
    ) -> HarnessResult<()> {
        info!("sending {} rule(s) to the enforcer", self.acl.rules().len());
        self.acl
            .send_to_enforcer(executor.registry, executor.filesystem, enforcer)?;

        for (index, step) in self.steps.iter().enumerate() {
            interrupt::check()?;
            if !executor.handle_entry(step)? {
                return Err(HarnessError::StepFailed {
                    scenario: self.script.display().to_string(),
                    step: index + 1,
                    line: step.to_string(),
                });
            }
        }
        Ok(())
    }
}
