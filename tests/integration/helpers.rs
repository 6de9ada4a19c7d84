//! Helper functions for integration tests

#![allow(dead_code)]

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use sysmonitor::config::AgentConfig;
use sysmonitor::monitors::host::{HostStats, ProcessStats, StatsSource};
use wiremock::MockServer;

pub const TOTAL_MEMORY: u64 = 16_000_000_000;

/// Statistics source with fixed readings
pub struct FakeSource;

impl StatsSource for FakeSource {
    fn read(&mut self) -> HostStats {
        HostStats {
            total_memory: Some(TOTAL_MEMORY),
            free_memory: Some(4_000_000_000),
            available_memory: Some(6_000_000_000),
            used_memory: Some(10_000_000_000),
            total_swap: Some(0),
            used_swap: Some(0),
            free_swap: Some(0),
            cpu_usage: Some(42.5),
            cpu_count: Some(8),
            load_one: Some(0.5),
            load_five: Some(0.25),
            load_fifteen: Some(0.125),
            uptime: Some(3_600),
            process: Some(ProcessStats {
                memory: 1_024,
                virtual_memory: 4_096,
                cpu_usage: 1.0,
                run_time: 60,
                disk_read: 0,
                disk_written: 0,
            }),
        }
    }
}

/// `host:port` of a wiremock server
pub fn address_of(server: &MockServer) -> String {
    let uri = url::Url::parse(&server.uri()).unwrap();
    format!("{}:{}", uri.host_str().unwrap(), uri.port().unwrap())
}

/// Agent configuration with short intervals
pub fn fast_agent_config(address: String, key: Option<&str>) -> AgentConfig {
    AgentConfig {
        address,
        poll_interval: Duration::from_millis(20),
        report_interval: Duration::from_millis(50),
        key: key.map(str::to_string),
        rate_limit: 2,
    }
}

pub fn gunzip(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(body).read_to_end(&mut out).unwrap();
    out
}
