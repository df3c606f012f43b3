//! Host-wide disk I/O counters.
//!
//! On Linux these come from `/proc/diskstats`, which keeps counting after the
//! process that caused the I/O has exited. Elsewhere the per-process deltas
//! reported by `sysinfo` are folded into a running total instead.

/// `/proc/diskstats` counts in 512-byte sectors regardless of the device.
const SECTOR_BYTES: u64 = 512;

// Virtual devices that either never touch a disk or re-count I/O already seen
// on the physical device underneath.
const VIRTUAL_DEVICE_PREFIXES: [&str; 5] = ["loop", "ram", "zram", "dm-", "md"];

/// Cumulative bytes read and written across all physical disks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskTotals {
    pub read_bytes: u64,
    pub written_bytes: u64,
}

struct DiskLine<'a> {
    device: &'a str,
    read_sectors: u64,
    write_sectors: u64,
}

fn parse_line(line: &str) -> Option<DiskLine<'_>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 14 {
        return None;
    }
    Some(DiskLine {
        device: parts[2],
        read_sectors: parts[5].parse().ok()?,
        write_sectors: parts[9].parse().ok()?,
    })
}

// `sda1` of `sda`, `nvme0n1p2` of `nvme0n1`, `mmcblk0p1` of `mmcblk0`.
fn is_partition_of(device: &str, disk: &str) -> bool {
    let Some(suffix) = device.strip_prefix(disk) else {
        return false;
    };
    let digits = suffix.strip_prefix('p').unwrap_or(suffix);
    !suffix.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Sums whole-disk counters out of `/proc/diskstats` content.
///
/// Partitions are skipped when their parent disk is listed, as are virtual
/// devices. Returns `None` if no line could be parsed.
pub fn parse_diskstats(content: &str) -> Option<DiskTotals> {
    let lines: Vec<DiskLine> = content.lines().filter_map(parse_line).collect();
    if lines.is_empty() {
        return None;
    }

    let totals = lines
        .iter()
        .filter(|line| {
            !VIRTUAL_DEVICE_PREFIXES
                .iter()
                .any(|prefix| line.device.starts_with(prefix))
        })
        .filter(|line| {
            !lines
                .iter()
                .any(|other| is_partition_of(line.device, other.device))
        })
        .fold(DiskTotals::default(), |acc, line| DiskTotals {
            read_bytes: acc.read_bytes + line.read_sectors * SECTOR_BYTES,
            written_bytes: acc.written_bytes + line.write_sectors * SECTOR_BYTES,
        });
    Some(totals)
}

/// Running total of per-process I/O deltas.
///
/// Each refresh of the process table reports what every live process moved
/// since the previous refresh. Adding those deltas keeps the total growing
/// when a process exits, which a sum of per-process lifetime counters does not.
#[derive(Debug, Default)]
pub struct ProcessIoTotals {
    totals: DiskTotals,
}

impl ProcessIoTotals {
    /// Adds one refresh worth of `(read, written)` deltas and returns the total.
    pub fn record<I>(&mut self, deltas: I) -> DiskTotals
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        for (read, written) in deltas {
            self.totals.read_bytes = self.totals.read_bytes.saturating_add(read);
            self.totals.written_bytes = self.totals.written_bytes.saturating_add(written);
        }
        self.totals
    }

    pub fn totals(&self) -> DiskTotals {
        self.totals
    }
}
