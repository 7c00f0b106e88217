//! Live thread count of the current process.
//!
//! Only used for diagnostics: exec in a multi-threaded process fails on some
//! platforms, and the count makes such failures recognisable.

/// Number of live threads, or `None` where it cannot be determined.
pub fn live_thread_count() -> Option<usize> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        status
            .lines()
            .find_map(|line| line.strip_prefix("Threads:"))
            .and_then(|count| count.trim().parse().ok())
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
