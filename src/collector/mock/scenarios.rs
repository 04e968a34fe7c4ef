//! Pre-built `/proc` states for testing.

use super::filesystem::MockFs;

/// Formats a `/proc/[pid]/stat` line with the fields the sampler reads filled in.
fn stat_line(pid: u32, state: char, utime: u64, stime: u64, rss_pages: u64) -> String {
    format!(
        "{pid} (agent) {state} 1 {pid} {pid} 0 -1 4194304 1200 0 3 0 {utime} {stime} 0 0 20 0 4 0 \
         5000 250000000 {rss_pages} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0 0 0 \
         0 0 0 0 0 0"
    )
}

impl MockFs {
    /// A single live process.
    ///
    /// CPU times are in clock ticks (1/100 s), resident memory in kB.
    pub fn running_process(
        pid: u32,
        utime: u64,
        stime: u64,
        rss_kb: u64,
        read_bytes: u64,
        write_bytes: u64,
    ) -> Self {
        let mut fs = Self::new();
        fs.add_process(
            pid,
            &stat_line(pid, 'S', utime, stime, rss_kb / 4),
            &format!(
                "Name:\tagent\nState:\tS (sleeping)\nPid:\t{pid}\nPPid:\t1\n\
                 VmSize:\t  244140 kB\nVmRSS:\t{rss_kb:>8} kB\nThreads:\t4\n"
            ),
            &format!(
                "rchar: {}\nwchar: {}\nsyscr: 120\nsyscw: 80\nread_bytes: {read_bytes}\n\
                 write_bytes: {write_bytes}\ncancelled_write_bytes: 0\n",
                read_bytes * 2,
                write_bytes * 2
            ),
        );
        fs
    }

    /// A process that has exited but not been reaped yet.
    ///
    /// Zombies keep their stat entry but report no memory and no readable I/O.
    pub fn zombie_process(pid: u32, utime: u64, stime: u64) -> Self {
        let mut fs = Self::new();
        fs.add_process(
            pid,
            &stat_line(pid, 'Z', utime, stime, 0),
            &format!("Name:\tagent\nState:\tZ (zombie)\nPid:\t{pid}\nPPid:\t1\nThreads:\t1\n"),
            "",
        );
        fs
    }
}
