//! Process and system resource sampling.
//!
//! Samples are process-wide and therefore only indicative: concurrent tool
//! runs share the same counters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};

/// Memory counters of the server process at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

/// Signed difference between two memory snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDelta {
    pub rss_bytes: i64,
    pub virtual_bytes: i64,
}

impl MemorySnapshot {
    pub fn delta_since(&self, start: &MemorySnapshot) -> MemoryDelta {
        MemoryDelta {
            rss_bytes: signed_diff(self.rss_bytes, start.rss_bytes),
            virtual_bytes: signed_diff(self.virtual_bytes, start.virtual_bytes),
        }
    }
}

fn signed_diff(end: u64, start: u64) -> i64 {
    let diff = i128::from(end) - i128::from(start);
    i64::try_from(diff).unwrap_or(if diff > 0 { i64::MAX } else { i64::MIN })
}

/// Sampler bound to the current process.
#[derive(Debug)]
pub struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("process sampling unavailable: {}", e);
                None
            }
        };
        let mut sampler = Self {
            system: System::new(),
            pid,
        };
        // Prime the CPU counter so the next refresh measures a window.
        sampler.refresh();
        sampler
    }

    fn refresh(&mut self) -> bool {
        match self.pid {
            Some(pid) => self.system.refresh_process(pid),
            None => false,
        }
    }

    /// Refresh and read memory counters.
    pub fn memory(&mut self) -> Option<MemorySnapshot> {
        if !self.refresh() {
            return None;
        }
        let process = self.system.process(self.pid?)?;
        Some(MemorySnapshot {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }

    /// Refresh and read CPU usage (percent of one core) since the previous
    /// refresh.
    pub fn cpu_percent(&mut self) -> Option<f32> {
        if !self.refresh() {
            return None;
        }
        Some(self.system.process(self.pid?)?.cpu_usage())
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// One system-wide sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSample {
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

/// Sampler for host-level CPU and memory.
#[derive(Debug)]
pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self { system }
    }

    pub fn sample(&mut self) -> SystemSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        SystemSample {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            memory_used_bytes: self.system.used_memory(),
            memory_total_bytes: self.system.total_memory(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate of system samples taken during a monitoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsageSummary {
    pub samples: u32,
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub avg_memory_used_bytes: u64,
    pub max_memory_used_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
}

impl ResourceUsageSummary {
    pub fn from_samples(samples: &[SystemSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len();
        let cpu_sum: f64 = samples.iter().map(|s| f64::from(s.cpu_percent)).sum();
        let cpu_max = samples
            .iter()
            .map(|s| f64::from(s.cpu_percent))
            .fold(0.0_f64, f64::max);
        let mem_sum: u128 = samples.iter().map(|s| u128::from(s.memory_used_bytes)).sum();
        let mem_max = samples.iter().map(|s| s.memory_used_bytes).max().unwrap_or(0);
        let avg_mem = u64::try_from(mem_sum / n as u128).unwrap_or(u64::MAX);

        Some(Self {
            samples: u32::try_from(n).unwrap_or(u32::MAX),
            avg_cpu_percent: round2(cpu_sum / n as f64),
            max_cpu_percent: round2(cpu_max),
            avg_memory_used_bytes: avg_mem,
            max_memory_used_bytes: mem_max,
            memory_total_bytes: samples.last().map(|s| s.memory_total_bytes),
        })
    }
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
