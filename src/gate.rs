//! The State File Gate: owns the shared-file advisory lock and the idle
//! counter, and performs the one observable side effect this whole crate
//! exists to produce.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;

use crate::error::LibidleError;

pub struct Gate {
    file: File,
    locked: bool,
    times_idle: u64,
}

impl Gate {
    /// Open (creating if absent, truncating) the state file at `path`.
    /// Does not acquire the lock — callers perform the initial busy
    /// transition explicitly, once startup has registered the initial
    /// thread.
    pub fn open(path: &str) -> Result<Self, LibidleError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| LibidleError::StateFile {
                path: path.to_string(),
                source,
            })?;
        Ok(Self {
            file,
            locked: false,
            times_idle: 0,
        })
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn times_idle(&self) -> u64 {
        self.times_idle
    }

    /// Busy transition: acquire the exclusive advisory lock. May block the
    /// calling thread if an external harness holds it — that stall is the
    /// barrier doing its job.
    pub fn go_busy(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: fd is a valid, open file descriptor owned by `self.file`.
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
        debug_assert_eq!(rc, 0, "flock(LOCK_EX) failed");
        self.locked = true;
    }

    /// Idle transition: rewind+truncate, publish `times_idle + 1`,
    /// increment, release the lock. The increment and the publish happen
    /// strictly inside the locked region, so any observer that acquires
    /// the lock sees a consistent counter.
    pub fn go_idle(&mut self) {
        self.times_idle += 1;
        let _ = self.file.seek(SeekFrom::Start(0));
        let fd = self.file.as_raw_fd();
        unsafe {
            libc::ftruncate(fd, 0);
        }
        let _ = write!(self.file, "{}\n", self.times_idle);
        let _ = self.file.flush();
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
        self.locked = false;
    }
}
