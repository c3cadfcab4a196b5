use std::{ffi::CString, fs, os::unix::ffi::OsStrExt, path::Path};

use rcb_core::{
    errors::Error,
    ports::{DiskUsage, MemoryUsage, SystemProbe},
    Result,
};

/// Reads process memory from `/proc/self/status` and disk usage via `statvfs(3)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn memory_usage(&self) -> Result<MemoryUsage> {
        let status = fs::read_to_string("/proc/self/status")?;
        parse_proc_status(&status)
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| Error::External(format!("invalid path {}: {e}", path.display())))?;

        // SAFETY: `st` is plain old data and `c_path` is a valid NUL-terminated string.
        let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
        if rc != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let block = st.f_frsize as u64;
        Ok(DiskUsage {
            path: path.to_path_buf(),
            total_bytes: st.f_blocks as u64 * block,
            free_bytes: st.f_bavail as u64 * block,
        })
    }
}

fn parse_proc_status(status: &str) -> Result<MemoryUsage> {
    let kib = |key: &str| -> Option<u64> {
        status
            .lines()
            .find_map(|l| l.strip_prefix(key))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse::<u64>().ok())
            .map(|n| n * 1024)
    };

    match (kib("VmRSS:"), kib("VmSize:")) {
        (Some(resident_bytes), Some(virtual_bytes)) => Ok(MemoryUsage {
            resident_bytes,
            virtual_bytes,
        }),
        _ => Err(Error::External(
            "VmRSS/VmSize missing from /proc/self/status".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proc_status() {
        let sample = "Name:\trcb\nVmSize:\t  20480 kB\nVmRSS:\t    1024 kB\nThreads:\t4\n";
        assert_eq!(
            parse_proc_status(sample).unwrap(),
            MemoryUsage {
                resident_bytes: 1024 * 1024,
                virtual_bytes: 20480 * 1024,
            }
        );
        assert!(parse_proc_status("Name:\trcb\n").is_err());
    }

    #[test]
    fn root_filesystem_has_a_size() {
        let usage = HostProbe.disk_usage(Path::new("/")).unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.free_bytes <= usage.total_bytes);
    }

    #[test]
    fn missing_mount_point_is_an_error() {
        assert!(HostProbe
            .disk_usage(Path::new("/definitely/not/mounted/here"))
            .is_err());
    }
}
