//! Exit notification handles for child processes.
//!
//! On Linux a pidfd becomes readable exactly when its process terminates, so
//! it can sit in a `poll(2)` set next to other descriptors. A pidfd opened
//! while we still hold the unreaped [`Child`] always refers to that child:
//! the pid cannot be recycled until we wait on it.

// pidfd_open has no libc wrapper on older glibc; the raw syscall is the only way in.
#![allow(unsafe_code)]

use std::io;
use std::os::fd::OwnedFd;
use std::process::Child;
use std::sync::OnceLock;

/// Name of the primitive, used in diagnostics when it is missing.
pub const MECHANISM: &str = "pidfd_open";

/// Source of exit notification handles.
pub trait ExitWatch {
    /// Whether [`ExitWatch::watch`] can work at all on this system.
    fn is_available(&self) -> bool;

    /// Open a handle that becomes readable when `child` exits.
    fn watch(&self, child: &Child) -> io::Result<OwnedFd>;
}

/// Linux pidfd-backed exit notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pidfd;

impl ExitWatch for Pidfd {
    fn is_available(&self) -> bool {
        static SUPPORTED: OnceLock<bool> = OnceLock::new();
        *SUPPORTED.get_or_init(|| pidfd_open(std::process::id()).is_ok())
    }

    fn watch(&self, child: &Child) -> io::Result<OwnedFd> {
        pidfd_open(child.id())
    }
}

#[cfg(target_os = "linux")]
fn pidfd_open(pid: u32) -> io::Result<OwnedFd> {
    use std::os::fd::{FromRawFd, RawFd};

    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: pidfd_open takes no pointers.
    let ret = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0 as libc::c_uint) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = RawFd::try_from(ret)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "fd out of range"))?;
    // SAFETY: a non-negative return is a fresh descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

#[cfg(not(target_os = "linux"))]
fn pidfd_open(_pid: u32) -> io::Result<OwnedFd> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "pidfd_open is only available on Linux",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::os::fd::AsRawFd;
    use std::process::Command;

    use super::*;

    #[test]
    fn watch_opens_descriptor_for_live_child() {
        if !Pidfd.is_available() {
            return;
        }
        let mut child = Command::new("/bin/sleep").arg("0").spawn().expect("spawn");
        let fd = Pidfd.watch(&child).expect("pidfd");
        assert!(fd.as_raw_fd() >= 0);
        child.wait().expect("wait");
    }

    #[test]
    fn availability_is_stable() {
        assert_eq!(Pidfd.is_available(), Pidfd.is_available());
    }
}
