//! Per-scenario ACL rules and their translation to enforcer rule lines.
//!
//! Fixture grammar:
//!
//! ```text
//! /dir:alice:RWBE:*:D
//! /dir/file:+staff:R
//! ```
//!
//! A principal is `*` (anyone), `+group`, or a user name. Modes are passed
//! through untouched; their meaning belongs to the enforcer.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::enforcer::Enforcer;
use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::passwd::IdentityRegistry;
use crate::fixture::read_lines;
use crate::fs_op::mount::MountResolution;
use crate::fs_op::FilesystemFixture;

static RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(/[/\w-]*):(.*)$").unwrap());

pub const WILDCARD: &str = "*";
pub const GROUP_PREFIX: char = '+';

/// Who a rule entry applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Any,
    User(String),
    Group(String),
}

impl Principal {
    pub fn parse(token: &str) -> Self {
        if token == WILDCARD {
            Principal::Any
        } else if let Some(group) = token.strip_prefix(GROUP_PREFIX) {
            Principal::Group(group.to_string())
        } else {
            Principal::User(token.to_string())
        }
    }

    /// Numeric form understood by the enforcer.
    pub fn resolve(&self, registry: &IdentityRegistry) -> HarnessResult<String> {
        Ok(match self {
            Principal::Any => WILDCARD.to_string(),
            Principal::Group(g) => format!("{}{}", GROUP_PREFIX, registry.require_gid(g)?),
            Principal::User(u) => registry.require_uid(u)?.to_string(),
        })
    }
}

/// One fixture line: a path and its ordered `(principal, mode)` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRule {
    pub path: String,
    pub entries: Vec<(Principal, String)>,
}

/// Outcome of parsing one ACL fixture line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLine {
    Rule(AclRule),
    /// The path part did not match.
    Malformed,
    /// Principals and modes do not pair up.
    OddEntries,
}

/// Parse one line of the ACL grammar.
pub fn parse_rule(line: &str) -> RuleLine {
    let Some(c) = RULE_RE.captures(line.trim()) else {
        return RuleLine::Malformed;
    };
    let rest: String = c[2].chars().filter(|ch| !ch.is_whitespace()).collect();
    let mut tokens: Vec<&str> = rest.split(':').collect();
    while tokens.last() == Some(&"") {
        tokens.pop();
    }
    if tokens.len() % 2 != 0 {
        return RuleLine::OddEntries;
    }
    let entries = tokens
        .chunks(2)
        .map(|pair| (Principal::parse(pair[0]), pair[1].to_string()))
        .collect();
    RuleLine::Rule(AclRule {
        path: c[1].to_string(),
        entries,
    })
}

/// The ACL rules of one scenario, in file order.
#[derive(Debug, Clone, Default)]
pub struct AclConfig {
    source: PathBuf,
    rules: Vec<AclRule>,
}

impl AclConfig {
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let mut rules = Vec::new();
        for line in read_lines(path)? {
            match parse_rule(&line.text) {
                RuleLine::Rule(rule) => rules.push(rule),
                RuleLine::Malformed => {
                    return Err(HarnessError::parse(
                        path,
                        line.number,
                        format!("expected `<path>:<principal>:<mode>...`, got `{}`", line.text),
                    ))
                }
                RuleLine::OddEntries => {
                    return Err(HarnessError::parse(
                        path,
                        line.number,
                        "principal without a mode",
                    ))
                }
            }
        }
        Ok(AclConfig {
            source: path.to_path_buf(),
            rules,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    /// Render every rule as an enforcer line:
    /// `[<device>]<relative root>/<path>:<principal>:<mode>...`.
    pub fn render(
        &self,
        registry: &IdentityRegistry,
        mount: &MountResolution,
    ) -> HarnessResult<Vec<String>> {
        self.rules
            .iter()
            .map(|rule| {
                let perms = rule
                    .entries
                    .iter()
                    .map(|(who, mode)| Ok(format!("{}:{}", who.resolve(registry)?, mode)))
                    .collect::<HarnessResult<Vec<String>>>()?;
                Ok(format!(
                    "[{}]{}:{}",
                    mount.device.display(),
                    mount.enforcer_path(&rule.path),
                    perms.join(":")
                ))
            })
            .collect()
    }

    /// Translate the rules for `filesystem` and hand them to `enforcer`.
    pub fn send_to_enforcer(
        &self,
        registry: &IdentityRegistry,
        filesystem: &FilesystemFixture,
        enforcer: &mut dyn Enforcer,
    ) -> HarnessResult<()> {
        let lines = self.render(registry, filesystem.mount_resolve()?)?;
        enforcer.load_rules(&lines)
    }
}
