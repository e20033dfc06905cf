//! Process identity switching.
//!
//! The effective uid and supplementary group list are process-wide state.
//! Steps only ever touch them through [`Impersonation`], which records the
//! privileged state, switches, and puts everything back when it is dropped,
//! including during unwinding.

use nix::unistd::{self, Gid, Uid};
use tracing::error;

use crate::errors::{HarnessError, HarnessResult};

/// Effective uid plus supplementary groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub euid: Uid,
    pub groups: Vec<Gid>,
}

/// Access to the credentials of the running process.
pub trait Credentials {
    fn current(&self) -> HarnessResult<IdentityState>;
    fn set_groups(&self, groups: &[Gid]) -> HarnessResult<()>;
    fn set_effective_uid(&self, uid: Uid) -> HarnessResult<()>;
}

/// The real process credentials, via `getgroups`/`setgroups`/`seteuid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCredentials;

impl Credentials for ProcessCredentials {
    fn current(&self) -> HarnessResult<IdentityState> {
        let groups = unistd::getgroups().map_err(std::io::Error::from)?;
        Ok(IdentityState {
            euid: Uid::effective(),
            groups,
        })
    }

    fn set_groups(&self, groups: &[Gid]) -> HarnessResult<()> {
        unistd::setgroups(groups).map_err(|e| {
            HarnessError::Configuration(format!(
                "setgroups failed for {} groups: {}",
                groups.len(),
                e
            ))
        })
    }

    fn set_effective_uid(&self, uid: Uid) -> HarnessResult<()> {
        unistd::seteuid(uid)
            .map_err(|e| HarnessError::Configuration(format!("seteuid({}) failed: {}", uid, e)))
    }
}

/// Scope guard holding a switched identity.
///
/// Group set is changed before the uid, and restored after it, because
/// `setgroups` needs the privilege the uid switch gives up.
#[must_use = "the identity is restored as soon as the guard is dropped"]
pub struct Impersonation<'c, C: Credentials + ?Sized> {
    creds: &'c C,
    saved: Option<IdentityState>,
}

impl<'c, C: Credentials + ?Sized> Impersonation<'c, C> {
    /// Switch to `uid` with supplementary `groups`.
    ///
    /// On failure nothing stays switched.
    pub fn enter(creds: &'c C, uid: Uid, groups: &[Gid]) -> HarnessResult<Self> {
        let saved = creds.current()?;
        creds.set_groups(groups)?;
        if let Err(e) = creds.set_effective_uid(uid) {
            if let Err(re) = creds.set_groups(&saved.groups) {
                return Err(HarnessError::PrivilegeRestore(re.to_string()));
            }
            return Err(e);
        }
        Ok(Impersonation {
            creds,
            saved: Some(saved),
        })
    }

    /// Restore the recorded identity and report whether that worked.
    pub fn restore(mut self) -> HarnessResult<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> HarnessResult<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        self.creds
            .set_effective_uid(saved.euid)
            .map_err(|e| HarnessError::PrivilegeRestore(e.to_string()))?;
        self.creds
            .set_groups(&saved.groups)
            .map_err(|e| HarnessError::PrivilegeRestore(e.to_string()))
    }
}

impl<C: Credentials + ?Sized> Drop for Impersonation<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            error!("{}", e);
        }
    }
}

/// Run `action` as `uid`/`groups`, restoring the prior identity afterwards.
///
/// A failed restore wins over the action's result: the caller must not keep
/// running with an unknown identity.
pub fn impersonate<C, R>(
    creds: &C,
    uid: Uid,
    groups: &[Gid],
    action: impl FnOnce() -> R,
) -> HarnessResult<R>
where
    C: Credentials + ?Sized,
{
    let guard = Impersonation::enter(creds, uid, groups)?;
    let out = action();
    guard.restore()?;
    Ok(out)
}
