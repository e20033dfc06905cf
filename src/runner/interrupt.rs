//! Ctrl-C and termination handling.
//!
//! SIGINT, SIGTERM and SIGHUP only raise a flag. The executor polls it
//! between steps and scenarios so an interrupted run still leaves through
//! the normal identity-restore and teardown paths. A blocked enforcer call
//! is not interrupted: the flag is only seen once it returns.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{HarnessError, HarnessResult};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide handler for SIGINT, SIGTERM and SIGHUP.
pub fn install() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
}

fn check_flag(flag: &AtomicBool) -> HarnessResult<()> {
    if flag.load(Ordering::SeqCst) {
        Err(HarnessError::Interrupted)
    } else {
        Ok(())
    }
}

/// `Err(Interrupted)` once one of the handled signals arrived.
pub fn check() -> HarnessResult<()> {
    check_flag(&INTERRUPTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_flag_reports_interrupt() {
        let flag = AtomicBool::new(false);
        assert!(check_flag(&flag).is_ok());
        flag.store(true, Ordering::SeqCst);
        assert!(matches!(check_flag(&flag), Err(HarnessError::Interrupted)));
    }
}
