//! Resident memory sampling for the `limit_memory` budget.

/// Resident set size of this process in MB; `None` where it cannot be measured.
pub(crate) fn resident_mb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

/// `VmRSS` is reported in kB regardless of the kernel page size.
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find_map(|line| line.strip_prefix("VmRSS:"))?;
    let mut parts = line.split_whitespace();
    let amount: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => Some(amount / 1024),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_resident_kilobytes() {
        let status = "Name:\tcargo\nVmPeak:\t  900000 kB\nVmRSS:\t  204800 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(200));
        assert_eq!(parse_vm_rss("VmRSS:\t1048575 kB\n"), Some(1023));
        assert_eq!(parse_vm_rss("Name:\tx\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\tlots kB\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\t12 pages\n"), None);
    }
}
