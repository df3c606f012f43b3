//! User/system CPU load from the aggregate `cpu` line of `/proc/stat`.

/// Cumulative jiffies of the aggregate `cpu` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    fn user_jiffies(&self) -> u64 {
        self.user + self.nice
    }

    fn system_jiffies(&self) -> u64 {
        self.system + self.irq + self.softirq
    }
}

/// Parses the aggregate `cpu` line out of `/proc/stat` content.
pub fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))?;
    let mut fields = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>().ok());
    let mut next = || fields.next().flatten();

    Some(CpuTimes {
        user: next()?,
        nice: next()?,
        system: next()?,
        idle: next()?,
        // Older kernels stop after `idle`.
        iowait: next().unwrap_or(0),
        irq: next().unwrap_or(0),
        softirq: next().unwrap_or(0),
        steal: next().unwrap_or(0),
    })
}

/// Returns `(user_percent, system_percent)` between two readings.
///
/// With no previous reading the load since boot is returned.
pub fn load_between(previous: Option<&CpuTimes>, current: &CpuTimes) -> (f64, f64) {
    let base = previous.copied().unwrap_or_default();
    let total = current.total().saturating_sub(base.total());
    if total == 0 {
        return (0.0, 0.0);
    }
    let user = current.user_jiffies().saturating_sub(base.user_jiffies());
    let system = current.system_jiffies().saturating_sub(base.system_jiffies());
    (
        user as f64 * 100.0 / total as f64,
        system as f64 * 100.0 / total as f64,
    )
}
