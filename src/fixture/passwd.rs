//! Identity registry loaded from the `passwd` fixture.
//!
//! Grammar (whitespace inside a line is ignored): a bare user (`alice`),
//! groups without members (`:staff,wheel`), or a user followed by the groups
//! it belongs to (`bob:staff,wheel`).
//!
//! Users and groups receive synthetic ids in first-declaration order from two
//! independent counters starting one above the configured floor.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{HarnessError, HarnessResult};
use crate::fixture::{is_comment, read_lines};

/// Default floor for synthetic user and group ids.
pub const DEFAULT_START_ID: u32 = 100_000;

static USER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)$").unwrap());
static GROUPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:([\w,]+)$").unwrap());
static USER_GROUPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+):([\w,]+)$").unwrap());

/// Classification of a single `passwd` fixture line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Comment,
    UserDecl(String),
    GroupDecl(Vec<String>),
    UserGroupDecl(String, Vec<String>),
    Error,
}

/// First id above `floor`. `u32::MAX` is `(uid_t)-1`, which the
/// credential syscalls read as "leave unchanged", so it is never handed out.
fn first_id(floor: u32, kind: &str) -> HarnessResult<u32> {
    floor
        .checked_add(1)
        .filter(|&id| id != u32::MAX)
        .ok_or_else(|| {
            HarnessError::Configuration(format!("{} floor {} leaves no ids", kind, floor))
        })
}

/// Hand out `*next` and advance it, refusing to reach `u32::MAX`.
fn allocate(next: &mut u32, kind: &str) -> HarnessResult<u32> {
    if *next == u32::MAX {
        return Err(HarnessError::Configuration(format!("ran out of {}s", kind)));
    }
    let id = *next;
    *next += 1;
    Ok(id)
}

fn split_groups(list: &str) -> Vec<String> {
    list.split(',')
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse one line of the `passwd` grammar.
pub fn parse_line(raw: &str) -> ParsedLine {
    if is_comment(raw) {
        return ParsedLine::Comment;
    }
    let line: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(c) = USER_RE.captures(&line) {
        ParsedLine::UserDecl(c[1].to_string())
    } else if let Some(c) = GROUPS_RE.captures(&line) {
        ParsedLine::GroupDecl(split_groups(&c[1]))
    } else if let Some(c) = USER_GROUPS_RE.captures(&line) {
        ParsedLine::UserGroupDecl(c[1].to_string(), split_groups(&c[2]))
    } else {
        ParsedLine::Error
    }
}

#[derive(Debug, Clone)]
struct UserEntry {
    name: String,
    uid: Uid,
    groups: Vec<String>,
}

/// Synthetic users and groups with their allocated ids.
///
/// Fully populated by [`IdentityRegistry::load`] and immutable afterwards.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    users: Vec<UserEntry>,
    user_index: HashMap<String, usize>,
    groups: Vec<(String, Gid)>,
    group_index: HashMap<String, usize>,
    next_uid: u32,
    next_gid: u32,
}

impl IdentityRegistry {
    fn new(start_uid: u32, start_gid: u32) -> HarnessResult<Self> {
        Ok(IdentityRegistry {
            users: Vec::new(),
            user_index: HashMap::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
            next_uid: first_id(start_uid, "uid")?,
            next_gid: first_id(start_gid, "gid")?,
        })
    }

    /// Load the fixture at `path`, allocating ids above the given floors.
    pub fn load(path: &Path, start_uid: u32, start_gid: u32) -> HarnessResult<Self> {
        let mut registry = IdentityRegistry::new(start_uid, start_gid)?;
        for line in read_lines(path)? {
            match parse_line(&line.text) {
                ParsedLine::Comment => {}
                ParsedLine::UserDecl(user) => {
                    registry.add_user(&user)?;
                }
                ParsedLine::GroupDecl(groups) => {
                    for g in &groups {
                        registry.add_group(g)?;
                    }
                }
                ParsedLine::UserGroupDecl(user, groups) => {
                    registry.add_user(&user)?;
                    for g in &groups {
                        registry.add_user_to_group(&user, g)?;
                    }
                }
                ParsedLine::Error => {
                    return Err(HarnessError::parse(
                        path,
                        line.number,
                        format!("not a user or group declaration: `{}`", line.text),
                    ))
                }
            }
        }
        Ok(registry)
    }

    /// Load with the default id floors.
    pub fn load_default(path: &Path) -> HarnessResult<Self> {
        Self::load(path, DEFAULT_START_ID, DEFAULT_START_ID)
    }

    fn add_user(&mut self, user: &str) -> HarnessResult<usize> {
        if let Some(&idx) = self.user_index.get(user) {
            return Ok(idx);
        }
        let uid = Uid::from_raw(allocate(&mut self.next_uid, "uid")?);
        let idx = self.users.len();
        self.users.push(UserEntry {
            name: user.to_string(),
            uid,
            groups: Vec::new(),
        });
        self.user_index.insert(user.to_string(), idx);
        Ok(idx)
    }

    fn add_group(&mut self, group: &str) -> HarnessResult<Gid> {
        if let Some(&idx) = self.group_index.get(group) {
            return Ok(self.groups[idx].1);
        }
        let gid = Gid::from_raw(allocate(&mut self.next_gid, "gid")?);
        self.group_index.insert(group.to_string(), self.groups.len());
        self.groups.push((group.to_string(), gid));
        Ok(gid)
    }

    fn add_user_to_group(&mut self, user: &str, group: &str) -> HarnessResult<()> {
        let idx = self.add_user(user)?;
        self.add_group(group)?;
        let groups = &mut self.users[idx].groups;
        if !groups.iter().any(|g| g == group) {
            groups.push(group.to_string());
        }
        Ok(())
    }

    pub fn uid_for_user(&self, user: &str) -> Option<Uid> {
        self.user_index.get(user).map(|&i| self.users[i].uid)
    }

    pub fn gid_for_group(&self, group: &str) -> Option<Gid> {
        self.group_index.get(group).map(|&i| self.groups[i].1)
    }

    pub fn user_for_uid(&self, uid: Uid) -> Option<&str> {
        self.users.iter().find(|u| u.uid == uid).map(|u| u.name.as_str())
    }

    pub fn group_for_gid(&self, gid: Gid) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, g)| *g == gid)
            .map(|(name, _)| name.as_str())
    }

    /// Groups `user` belongs to, in declaration order.
    pub fn groups_for_user(&self, user: &str) -> Option<&[String]> {
        self.user_index
            .get(user)
            .map(|&i| self.users[i].groups.as_slice())
    }

    /// Resolve a user name, failing with a configuration error when unknown.
    pub fn require_uid(&self, user: &str) -> HarnessResult<Uid> {
        self.uid_for_user(user)
            .ok_or_else(|| HarnessError::Configuration(format!("unknown user `{}`", user)))
    }

    /// Resolve a group name, failing with a configuration error when unknown.
    pub fn require_gid(&self, group: &str) -> HarnessResult<Gid> {
        self.gid_for_group(group)
            .ok_or_else(|| HarnessError::Configuration(format!("unknown group `{}`", group)))
    }

    /// Supplementary group ids for `user`.
    pub fn gids_for_user(&self, user: &str) -> HarnessResult<Vec<Gid>> {
        let groups = self
            .groups_for_user(user)
            .ok_or_else(|| HarnessError::Configuration(format!("unknown user `{}`", user)))?;
        groups.iter().map(|g| self.require_gid(g)).collect()
    }

    pub fn users(&self) -> Vec<&str> {
        self.users.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn groups(&self) -> Vec<&str> {
        self.groups.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl fmt::Display for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users = self.users();
        users.sort_unstable();
        let mut groups = self.groups();
        groups.sort_unstable();
        writeln!(f, "Users: {}", users.join(", "))?;
        write!(f, "Groups: {}", groups.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn load_str(content: &str) -> HarnessResult<IdentityRegistry> {
        let td = tempdir()?;
        let p = td.path().join("passwd");
        fs::write(&p, content)?;
        IdentityRegistry::load_default(&p)
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(parse_line("# users"), ParsedLine::Comment);
        assert_eq!(parse_line("alice"), ParsedLine::UserDecl("alice".into()));
        assert_eq!(
            parse_line(":staff, wheel"),
            ParsedLine::GroupDecl(vec!["staff".into(), "wheel".into()])
        );
        assert_eq!(
            parse_line("bob : staff,,wheel"),
            ParsedLine::UserGroupDecl("bob".into(), vec!["staff".into(), "wheel".into()])
        );
        assert_eq!(parse_line("###bad###user!!"), ParsedLine::Error);
        assert_eq!(parse_line("a:b:c"), ParsedLine::Error);
    }

    #[test]
    fn ids_allocated_in_declaration_order_above_floor() -> HarnessResult<()> {
        let reg = load_str("alice\n:staff\nbob:wheel,staff\nalice:wheel\n")?;
        assert_eq!(reg.uid_for_user("alice"), Some(Uid::from_raw(100_001)));
        assert_eq!(reg.uid_for_user("bob"), Some(Uid::from_raw(100_002)));
        assert_eq!(reg.gid_for_group("staff"), Some(Gid::from_raw(100_001)));
        assert_eq!(reg.gid_for_group("wheel"), Some(Gid::from_raw(100_002)));
        assert_eq!(reg.users(), vec!["alice", "bob"]);
        assert_eq!(reg.groups(), vec!["staff", "wheel"]);
        assert_eq!(
            reg.groups_for_user("bob"),
            Some(&["wheel".to_string(), "staff".to_string()][..])
        );
        assert_eq!(reg.groups_for_user("alice"), Some(&["wheel".to_string()][..]));
        Ok(())
    }

    #[test]
    fn counters_are_independent_and_respect_custom_floors() -> HarnessResult<()> {
        let td = tempdir()?;
        let p = td.path().join("passwd");
        fs::write(&p, ":a,b,c\ncarol\n")?;
        let reg = IdentityRegistry::load(&p, 500, 9000)?;
        assert_eq!(reg.uid_for_user("carol"), Some(Uid::from_raw(501)));
        assert_eq!(reg.gid_for_group("c"), Some(Gid::from_raw(9003)));
        Ok(())
    }

    #[test]
    fn id_space_exhaustion_is_configuration_error() -> HarnessResult<()> {
        let td = tempdir()?;
        let p = td.path().join("passwd");
        fs::write(&p, "alice\nbob\n")?;

        // alice gets MAX - 1; bob would get (uid_t)-1.
        let err = IdentityRegistry::load(&p, u32::MAX - 2, 0).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)), "{:?}", err);

        for floor in [u32::MAX - 1, u32::MAX] {
            assert!(matches!(
                IdentityRegistry::load(&p, floor, 0),
                Err(HarnessError::Configuration(_))
            ));
            assert!(matches!(
                IdentityRegistry::load(&p, 0, floor),
                Err(HarnessError::Configuration(_))
            ));
        }

        let reg = IdentityRegistry::load(&p, u32::MAX - 3, 0)?;
        assert_eq!(reg.uid_for_user("bob"), Some(Uid::from_raw(u32::MAX - 1)));
        Ok(())
    }

    #[test]
    fn reverse_lookups() -> HarnessResult<()> {
        let reg = load_str("alice:staff\n")?;
        assert_eq!(reg.user_for_uid(Uid::from_raw(100_001)), Some("alice"));
        assert_eq!(reg.group_for_gid(Gid::from_raw(100_001)), Some("staff"));
        assert_eq!(reg.user_for_uid(Uid::from_raw(0)), None);
        assert_eq!(reg.group_for_gid(Gid::from_raw(42)), None);
        assert!(reg.require_uid("mallory").is_err());
        assert_eq!(reg.gids_for_user("alice")?, vec![Gid::from_raw(100_001)]);
        Ok(())
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = load_str("alice\n\n###bad###user!!\n").unwrap_err();
        match err {
            HarnessError::FixtureParse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn display_lists_sorted_names() -> HarnessResult<()> {
        let reg = load_str("zed:staff\nalice:admin\n")?;
        assert_eq!(reg.to_string(), "Users: alice, zed\nGroups: admin, staff");
        Ok(())
    }
}
