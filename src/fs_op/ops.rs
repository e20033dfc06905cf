//! The fixed set of filesystem operations a scenario step may perform.
//!
//! Every operation is attempted exactly once; its `io::Result` is what the
//! step compares against the declared expectation.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// One of the eight operations scenario steps can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Opendir,
    Write,
    Mkdir,
    Rmdir,
    Unlink,
    Rename,
    Link,
}

/// Typed handler for an operation, by arity.
#[derive(Clone, Copy)]
pub enum Handler {
    One(fn(&Path) -> io::Result<()>),
    Two(fn(&Path, &Path) -> io::Result<()>),
}

/// Scenario keyword for each operation.
pub const OPERATIONS: &[(&str, Operation)] = &[
    ("read", Operation::Read),
    ("opendir", Operation::Opendir),
    ("write", Operation::Write),
    ("mkdir", Operation::Mkdir),
    ("rmdir", Operation::Rmdir),
    ("unlink", Operation::Unlink),
    ("rename", Operation::Rename),
    ("link", Operation::Link),
];

impl Operation {
    /// Look up an operation by its scenario keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        OPERATIONS.iter().find(|(n, _)| *n == name).map(|(_, op)| *op)
    }

    pub fn name(self) -> &'static str {
        OPERATIONS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    pub fn handler(self) -> Handler {
        match self {
            Operation::Read => Handler::One(read),
            Operation::Opendir => Handler::One(opendir),
            Operation::Write => Handler::One(write),
            Operation::Mkdir => Handler::One(mkdir),
            Operation::Rmdir => Handler::One(rmdir),
            Operation::Unlink => Handler::One(unlink),
            Operation::Rename => Handler::Two(rename),
            Operation::Link => Handler::Two(link),
        }
    }

    /// Number of path arguments the operation takes.
    pub fn arity(self) -> usize {
        match self.handler() {
            Handler::One(_) => 1,
            Handler::Two(_) => 2,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Open an existing file for reading.
pub fn read(path: &Path) -> io::Result<()> {
    File::open(path).map(drop)
}

/// Open an existing directory for listing.
pub fn opendir(path: &Path) -> io::Result<()> {
    fs::read_dir(path).map(drop)
}

/// Create or truncate a file.
pub fn write(path: &Path) -> io::Result<()> {
    File::create(path).map(drop)
}

pub fn mkdir(path: &Path) -> io::Result<()> {
    fs::create_dir(path)
}

pub fn rmdir(path: &Path) -> io::Result<()> {
    fs::remove_dir(path)
}

pub fn unlink(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

pub fn rename(old: &Path, new: &Path) -> io::Result<()> {
    fs::rename(old, new)
}

/// Create a hard link `new` pointing at `old`.
pub fn link(old: &Path, new: &Path) -> io::Result<()> {
    fs::hard_link(old, new)
}
