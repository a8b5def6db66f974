//! Per-descriptor socket setup, applied before any transfer starts.

use socket2::Socket;
use std::io;
use thiserror::Error;
use tracing::{debug, warn};

/// Options applied to a socket at setup time and never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketOptions {
    pub nonblocking: bool,
    /// Pacing rate in bytes per second; 0 leaves the socket unpaced.
    pub rate_limit: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("invalid CPU list entry '{0}'")]
    InvalidCpu(String),
    #[error("CPU list is empty")]
    EmptyCpuList,
}

/// Parse a CPU list such as `"0,2-4"` into sorted, de-duplicated ids.
pub fn parse_cpu_list(list: &str) -> Result<Vec<usize>, SetupError> {
    let mut cpus = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid = || SetupError::InvalidCpu(entry.to_string());
        match entry.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().map_err(|_| invalid())?;
                let end: usize = end.trim().parse().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                cpus.extend(start..=end);
            }
            None => cpus.push(entry.parse().map_err(|_| invalid())?),
        }
    }

    if cpus.is_empty() {
        return Err(SetupError::EmptyCpuList);
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// Pin the calling thread to `cpus`.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpus: &[usize]) -> io::Result<()> {
    // SAFETY: cpu_set_t is plain data; zeroed is the empty set.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    for &cpu in cpus {
        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("CPU {cpu} out of range"),
            ));
        }
        // SAFETY: cpu is below CPU_SETSIZE.
        unsafe { libc::CPU_SET(cpu, &mut set) };
    }

    // SAFETY: set is a valid cpu_set_t and its size is passed alongside.
    let ret = unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    debug!(?cpus, "Pinned thread");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(cpus: &[usize]) -> io::Result<()> {
    tracing::warn!(?cpus, "CPU affinity is not supported on this platform, ignoring");
    Ok(())
}

/// Cap the socket's transmit rate.
#[cfg(target_os = "linux")]
pub fn apply_rate_limit(socket: &Socket, bytes_per_sec: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    if bytes_per_sec == 0 {
        return Ok(());
    }
    let rate = pacing_rate(bytes_per_sec);

    // SAFETY: rate outlives the call and its size is passed alongside.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_MAX_PACING_RATE,
            &rate as *const u32 as *const libc::c_void,
            std::mem::size_of::<u32>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    debug!(rate, "Applied pacing rate");
    Ok(())
}

/// The kernel takes a 32-bit pacing rate; anything above is capped.
#[cfg(target_os = "linux")]
fn pacing_rate(bytes_per_sec: u64) -> u32 {
    u32::try_from(bytes_per_sec).unwrap_or_else(|_| {
        warn!(
            requested = bytes_per_sec,
            applied = u32::MAX,
            "Rate limit exceeds what the kernel accepts, capping"
        );
        u32::MAX
    })
}

#[cfg(not(target_os = "linux"))]
pub fn apply_rate_limit(_socket: &Socket, bytes_per_sec: u64) -> io::Result<()> {
    if bytes_per_sec != 0 {
        warn!(bytes_per_sec, "Rate limiting is not supported on this platform, ignoring");
    }
    Ok(())
}

/// Apply `options` to a freshly created or accepted socket.
pub fn prepare_socket(socket: &Socket, options: &SocketOptions) -> io::Result<()> {
    socket.set_nonblocking(options.nonblocking)?;
    apply_rate_limit(socket, options.rate_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::{Domain, Type};

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
        assert_eq!(parse_cpu_list("3,0-2").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list(" 1 , 1-2 ,").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_parse_cpu_list_errors() {
        assert_eq!(parse_cpu_list(""), Err(SetupError::EmptyCpuList));
        assert_eq!(
            parse_cpu_list("a"),
            Err(SetupError::InvalidCpu("a".to_string()))
        );
        assert_eq!(
            parse_cpu_list("4-2"),
            Err(SetupError::InvalidCpu("4-2".to_string()))
        );
    }

    #[test]
    fn test_prepare_socket() {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        prepare_socket(
            &socket,
            &SocketOptions {
                nonblocking: true,
                rate_limit: 0,
            },
        )
        .unwrap();
        assert!(socket.nonblocking().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pacing_rate_is_capped() {
        assert_eq!(pacing_rate(1_000_000), 1_000_000);
        assert_eq!(pacing_rate(u64::from(u32::MAX)), u32::MAX);
        assert_eq!(pacing_rate(u64::from(u32::MAX) + 1), u32::MAX);
        assert_eq!(pacing_rate(u64::MAX), u32::MAX);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_oversized_rate_still_applies() {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).unwrap();
        apply_rate_limit(&socket, u64::MAX).unwrap();
    }
}
