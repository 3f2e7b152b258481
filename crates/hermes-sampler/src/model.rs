//! The `ProcessSample` data model: one row per live process at one
//! sampling instant.

use serde::{Deserialize, Serialize};

/// A snapshot of one process's state, classification, and (when a prior
/// sample for the same process exists) hourly-normalized rate deltas.
///
/// `long_pid` is the join key across samples (`host:pid:createTimeMs`,
/// resistant to PID reuse because `createTime` participates). IO-counter
/// fields are `None` rather than zero on platforms/processes where the OS
/// refuses to report them; their `*_1h_diff` counterparts are populated
/// only when both the current and previous IO counters were present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub long_pid: String,
    pub pid: i32,
    pub ppid: i32,
    pub create_time: f64,
    pub status: String,
    pub username: Option<String>,
    pub cwd: Option<String>,
    pub name: String,
    pub exe: Option<String>,
    pub cmdline: Vec<String>,

    pub own_tags: Vec<String>,
    pub all_tags: Vec<String>,

    pub cpu_user: f64,
    pub cpu_system: f64,
    pub cpu_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_user_1h_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_system_1h_diff: Option<f64>,

    pub memory_resident: u64,
    pub memory_virtual: u64,
    pub memory_shared: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_read_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_write_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_read_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_write_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_read_count_1h_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_write_count_1h_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_read_bytes_1h_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_write_bytes_1h_diff: Option<f64>,

    pub threads_num: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_descriptors_num: Option<u64>,

    pub ctx_switches_voluntary: u64,
    pub ctx_switches_involuntary: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx_switches_voluntary_1h_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx_switches_involuntary_1h_diff: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_time_diff: Option<f64>,

    pub utc_timestamp: f64,
    pub host: String,
}

impl ProcessSample {
    /// Builds the `host:pid:createTimeMs` composite identifier.
    pub fn make_long_pid(host: &str, pid: i32, create_time: f64) -> String {
        format!("{host}:{pid}:{}", (create_time * 1000.0) as i64)
    }
}
