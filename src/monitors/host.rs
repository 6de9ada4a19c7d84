//! Host and process statistics read through sysinfo
//!
//! [`HostStats`] is a plain snapshot of everything the agent reports. The
//! mapping from metric names to values lives in [`GAUGE_TABLE`], one
//! extractor function per gauge, so each entry can be tested on its own.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{trace, warn};

/// Statistics of the agent's own process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    pub memory: u64,
    pub virtual_memory: u64,
    pub cpu_usage: f32,
    pub run_time: u64,
    pub disk_read: u64,
    pub disk_written: u64,
}

/// One reading of host statistics
///
/// Fields are `None` when the platform could not provide them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostStats {
    pub total_memory: Option<u64>,
    pub free_memory: Option<u64>,
    pub available_memory: Option<u64>,
    pub used_memory: Option<u64>,
    pub total_swap: Option<u64>,
    pub used_swap: Option<u64>,
    pub free_swap: Option<u64>,
    pub cpu_usage: Option<f32>,
    pub cpu_count: Option<usize>,
    pub load_one: Option<f64>,
    pub load_five: Option<f64>,
    pub load_fifteen: Option<f64>,
    pub uptime: Option<u64>,
    pub process: Option<ProcessStats>,
}

/// A named gauge and how to read it from [`HostStats`]
#[derive(Debug, Clone, Copy)]
pub struct GaugeSource {
    pub name: &'static str,
    pub extract: fn(&HostStats) -> Option<f64>,
}

/// Every host gauge the agent reports, in name order
pub static GAUGE_TABLE: &[GaugeSource] = &[
    GaugeSource {
        name: "AvailableMemory",
        extract: |s| s.available_memory.map(|v| v as f64),
    },
    GaugeSource {
        name: "CPUutilization1",
        extract: |s| s.cpu_usage.map(f64::from),
    },
    GaugeSource {
        name: "CpuCount",
        extract: |s| s.cpu_count.map(|v| v as f64),
    },
    GaugeSource {
        name: "FreeMemory",
        extract: |s| s.free_memory.map(|v| v as f64),
    },
    GaugeSource {
        name: "FreeSwap",
        extract: |s| s.free_swap.map(|v| v as f64),
    },
    GaugeSource {
        name: "LoadAverage1",
        extract: |s| s.load_one,
    },
    GaugeSource {
        name: "LoadAverage15",
        extract: |s| s.load_fifteen,
    },
    GaugeSource {
        name: "LoadAverage5",
        extract: |s| s.load_five,
    },
    GaugeSource {
        name: "ProcessCpuUsage",
        extract: |s| s.process.map(|p| f64::from(p.cpu_usage)),
    },
    GaugeSource {
        name: "ProcessDiskRead",
        extract: |s| s.process.map(|p| p.disk_read as f64),
    },
    GaugeSource {
        name: "ProcessDiskWritten",
        extract: |s| s.process.map(|p| p.disk_written as f64),
    },
    GaugeSource {
        name: "ProcessMemory",
        extract: |s| s.process.map(|p| p.memory as f64),
    },
    GaugeSource {
        name: "ProcessRunTime",
        extract: |s| s.process.map(|p| p.run_time as f64),
    },
    GaugeSource {
        name: "ProcessVirtualMemory",
        extract: |s| s.process.map(|p| p.virtual_memory as f64),
    },
    GaugeSource {
        name: "TotalMemory",
        extract: |s| s.total_memory.map(|v| v as f64),
    },
    GaugeSource {
        name: "TotalSwap",
        extract: |s| s.total_swap.map(|v| v as f64),
    },
    GaugeSource {
        name: "Uptime",
        extract: |s| s.uptime.map(|v| v as f64),
    },
    GaugeSource {
        name: "UsedMemory",
        extract: |s| s.used_memory.map(|v| v as f64),
    },
    GaugeSource {
        name: "UsedSwap",
        extract: |s| s.used_swap.map(|v| v as f64),
    },
];

/// Gauge refreshed with a uniform random value in `[0, 1)` on every poll
pub const RANDOM_VALUE: &str = "RandomValue";

/// Counter incremented by one on every poll
pub const POLL_COUNT: &str = "PollCount";

/// Something that can produce a [`HostStats`] reading
///
/// The collector owns its source, so implementations may keep state between
/// reads (sysinfo needs two CPU refreshes to compute usage).
pub trait StatsSource: Send + 'static {
    fn read(&mut self) -> HostStats;
}

/// [`StatsSource`] backed by sysinfo
pub struct SysinfoSource {
    system: System,
    pid: Option<Pid>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("process statistics unavailable: {e}");
                None
            }
        };

        Self {
            system: System::new(),
            pid,
        }
    }

    fn read_process(&mut self) -> Option<ProcessStats> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_cpu()
                .with_disk_usage(),
        );

        let process = self.system.process(pid)?;
        let disk = process.disk_usage();

        Some(ProcessStats {
            memory: process.memory(),
            virtual_memory: process.virtual_memory(),
            cpu_usage: process.cpu_usage(),
            run_time: process.run_time(),
            disk_read: disk.total_read_bytes,
            disk_written: disk.total_written_bytes,
        })
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSource for SysinfoSource {
    fn read(&mut self) -> HostStats {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let cpu_count = self.system.cpus().len();
        let load = System::load_average();
        let process = self.read_process();

        trace!("read host statistics ({cpu_count} cpus)");

        HostStats {
            total_memory: Some(self.system.total_memory()),
            free_memory: Some(self.system.free_memory()),
            available_memory: Some(self.system.available_memory()),
            used_memory: Some(self.system.used_memory()),
            total_swap: Some(self.system.total_swap()),
            used_swap: Some(self.system.used_swap()),
            free_swap: Some(self.system.free_swap()),
            cpu_usage: (cpu_count > 0).then(|| self.system.global_cpu_usage()),
            cpu_count: (cpu_count > 0).then_some(cpu_count),
            load_one: Some(load.one),
            load_five: Some(load.five),
            load_fifteen: Some(load.fifteen),
            uptime: Some(System::uptime()),
            process,
        }
    }
}
