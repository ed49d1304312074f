//! Process- and file-level hardening that sits alongside the cryptographic
//! core: core-dump suppression, restrictive file permissions, constant-time
//! comparison, and best-effort buffer wiping.

use crate::error::{KryptorError, Result};

/// Disable core dumps for the current process so secrets never land on disk
/// via a crash dump.
pub fn disable_core_dumps() -> Result<()> {
    #[cfg(unix)]
    {
        use libc::{rlimit, setrlimit, RLIMIT_CORE};
        let rlim = rlimit { rlim_cur: 0, rlim_max: 0 };
        let result = unsafe { setrlimit(RLIMIT_CORE, &rlim) };
        if result == 0 {
            Ok(())
        } else {
            Err(KryptorError::Internal("failed to disable core dumps".into()))
        }
    }
    #[cfg(not(unix))]
    {
        Ok(())
    }
}

/// Restrict a freshly created file to owner read/write only.
pub fn set_secure_permissions(path: &std::path::Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms).map_err(|e| KryptorError::io(path, e))?;
    }
    #[cfg(not(unix))]
    {
        let mut perms = std::fs::metadata(path)
            .map_err(|e| KryptorError::io(path, e))?
            .permissions();
        perms.set_readonly(false);
        std::fs::set_permissions(path, perms).map_err(|e| KryptorError::io(path, e))?;
    }
    Ok(())
}

/// Constant-time equality, used wherever two secret-derived byte strings are
/// compared (tag comparisons are handled by the AEAD implementation itself;
/// this is for header fields such as `format_version`/`magic` that are
/// public but should still not branch on attacker-controlled length).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Best-effort wipe that the optimizer cannot elide.
pub fn zero(buf: &mut [u8]) {
    use zeroize::Zeroize;
    buf.zeroize();
}
