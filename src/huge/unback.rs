use super::pages::HugeRange;

/// Tells the operating system to drop physical backing for a range.
///
/// The cache stores this by mutable reference and calls it while the caller's
/// page-heap lock is held; implementations issue a syscall and must not block
/// on anything else. Returning `false` means the kernel refused (typically
/// memory pressure); the cache then keeps the range as backed and retries on
/// a later release pass.
pub trait MemoryUnback {
    fn unback(&mut self, r: HugeRange) -> bool;
}

#[cfg(unix)]
pub use self::unix::{MadviseUnback, UnbackError};

#[cfg(unix)]
mod unix {
    use std::fmt;
    use std::io;

    use log::warn;

    use super::MemoryUnback;
    use crate::huge::pages::HugeRange;

    #[derive(Debug)]
    pub enum UnbackError {
        MadviseFailed(io::Error),
    }

    impl fmt::Display for UnbackError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                UnbackError::MadviseFailed(e) => write!(f, "madvise failed: {e}"),
            }
        }
    }

    impl std::error::Error for UnbackError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                UnbackError::MadviseFailed(e) => Some(e),
            }
        }
    }

    /// Production unbacker: `madvise(MADV_DONTNEED)` over the range.
    ///
    /// MADV_DONTNEED synchronously drops the backing pages; the address range
    /// stays reserved and refaults as zero-fill on next touch, which is
    /// exactly the backed→unbacked transition the cache needs.
    pub struct MadviseUnback;

    impl MadviseUnback {
        fn try_unback(r: HugeRange) -> Result<(), UnbackError> {
            let addr = r.start().address() as *mut libc::c_void;
            let len = r.len().in_bytes();
            // Safety: the caller guarantees `r` describes a mapping it owns;
            // the cache only ever passes ranges previously handed out by the
            // upstream allocator.
            let rc = unsafe { libc::madvise(addr, len, libc::MADV_DONTNEED) };
            if rc == 0 {
                Ok(())
            } else {
                Err(UnbackError::MadviseFailed(io::Error::last_os_error()))
            }
        }
    }

    impl MemoryUnback for MadviseUnback {
        fn unback(&mut self, r: HugeRange) -> bool {
            match Self::try_unback(r) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "failed to unback {} hugepage(s) at {:#x}: {e}",
                        r.len().raw(),
                        r.start().address()
                    );
                    false
                }
            }
        }
    }
}
