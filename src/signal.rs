//! Fatal-signal emergency flush.
//!
//! The data log and the index publish their active file descriptors here so
//! that a SIGINT or SIGSEGV handler can sync and close them without touching
//! the store itself. The handler allocates nothing and takes no locks; it is
//! restricted to fsync, close, write and _exit.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::Result;

static DATA_FD: AtomicI32 = AtomicI32::new(-1);
static INDEX_FD: AtomicI32 = AtomicI32::new(-1);

pub(crate) fn register_data_fd(file: &impl AsRawFd) {
    DATA_FD.store(file.as_raw_fd(), Ordering::SeqCst);
}

pub(crate) fn register_index_fd(file: &impl AsRawFd) {
    INDEX_FD.store(file.as_raw_fd(), Ordering::SeqCst);
}

/// Installs the SIGINT and SIGSEGV handlers. Call once, after the store is
/// open.
pub fn install() -> Result<()> {
    intercept(libc::SIGINT)?;
    intercept(libc::SIGSEGV)?;
    Ok(())
}

fn intercept(signo: libc::c_int) -> Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        if libc::sigaction(signo, &action, std::ptr::null_mut()) == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

extern "C" fn handler(signo: libc::c_int) {
    flush_slot(&DATA_FD);
    flush_slot(&INDEX_FD);

    const MSG: &[u8] = b"\nfatal signal: flushed index and data\n";
    unsafe {
        libc::write(2, MSG.as_ptr() as *const libc::c_void, MSG.len());
        libc::_exit(128 + signo);
    }
}

fn flush_slot(slot: &AtomicI32) {
    let fd: RawFd = slot.swap(-1, Ordering::SeqCst);
    if fd >= 0 {
        unsafe {
            libc::fsync(fd);
            libc::close(fd);
        }
    }
}
