//! Fire-and-forget process launch.
//!
//! The reporter must outlive the process that launches it and must never
//! become its zombie. [`fork_exec_detached`] double-forks: the intermediate
//! child starts a new session, forks the reporter, reports its pid over a
//! close-on-exec pipe and exits. The caller only reaps the intermediate.
//!
//! Everything between `fork` and `exec` is async-signal-safe: no allocation,
//! no locks, no logging.

use std::os::raw::c_int;

use nix::errno::Errno;

use crate::reporter::PreparedLaunch;

/// Pid of a launched process. Holds no resources and waits for nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedChild {
    pub pid: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("pipe failed: {0}")]
    Pipe(Errno),
    #[error("fork failed: {0}")]
    Fork(Errno),
    #[error("reporter pid was not handed back by the intermediate child")]
    Handoff,
}

pub trait DetachedSpawner: Send + Sync {
    fn spawn_detached(&self, launch: &PreparedLaunch) -> Result<DetachedChild, SpawnError>;
}

/// Production spawner: double fork + exec.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkExecSpawner;

impl DetachedSpawner for ForkExecSpawner {
    fn spawn_detached(&self, launch: &PreparedLaunch) -> Result<DetachedChild, SpawnError> {
        let pid = unsafe { fork_exec_detached(launch) }?;
        Ok(DetachedChild { pid })
    }
}

/// Launch `launch` detached and return the reporter's pid.
///
/// # Safety
///
/// Forks the calling process. Safe to call from a signal handler; the caller
/// must not rely on any other thread's state in the children.
pub unsafe fn fork_exec_detached(launch: &PreparedLaunch) -> Result<i32, SpawnError> {
    let mut fds: [c_int; 2] = [-1, -1];
    if libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) != 0 {
        return Err(SpawnError::Pipe(Errno::last()));
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let intermediate = libc::fork();
    if intermediate < 0 {
        let errno = Errno::last();
        libc::close(read_fd);
        libc::close(write_fd);
        return Err(SpawnError::Fork(errno));
    }

    if intermediate == 0 {
        libc::close(read_fd);
        libc::setsid();

        // A signal handler runs with its signal blocked; the reporter must
        // not inherit that mask.
        let mut empty: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut empty);
        libc::sigprocmask(libc::SIG_SETMASK, &empty, std::ptr::null_mut());

        let reporter = libc::fork();
        if reporter == 0 {
            libc::execv(launch.path_ptr(), launch.argv_ptr());
            let msg = launch.exec_failure_message();
            libc::write(2, msg.as_ptr().cast(), msg.len());
            // No atexit handlers, no destructors: they belong to the parent.
            libc::_exit(127);
        }

        let bytes = reporter.to_ne_bytes();
        libc::write(write_fd, bytes.as_ptr().cast(), bytes.len());
        libc::_exit(if reporter > 0 { 0 } else { 1 });
    }

    libc::close(write_fd);

    // The intermediate exits right after its fork; this wait is short.
    let mut status: c_int = 0;
    loop {
        let rc = libc::waitpid(intermediate, &mut status, 0);
        if rc == intermediate || (rc < 0 && Errno::last() != Errno::EINTR) {
            break;
        }
    }

    let mut buf = [0u8; std::mem::size_of::<libc::pid_t>()];
    let n = libc::read(read_fd, buf.as_mut_ptr().cast(), buf.len());
    libc::close(read_fd);

    if n != buf.len() as isize {
        return Err(SpawnError::Handoff);
    }
    let pid = libc::pid_t::from_ne_bytes(buf);
    if pid <= 0 {
        return Err(SpawnError::Fork(Errno::EAGAIN));
    }
    Ok(pid)
}
