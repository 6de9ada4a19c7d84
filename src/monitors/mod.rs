//! Host statistics sources for the agent

pub mod host;

pub use host::{GAUGE_TABLE, GaugeSource, HostStats, StatsSource, SysinfoSource};
