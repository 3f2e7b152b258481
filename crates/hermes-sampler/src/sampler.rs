//! The process sampler: one `sample()` scrape builds a fresh
//! `Vec<ProcessSample>`, joining live OS processes against the service
//! catalog and the previous scrape's snapshot.

use crate::error::SamplerError;
use crate::events::ScrapeEvent;
use crate::model::ProcessSample;
use crate::passwd;
use crate::proc_reader::{self, ProcessDraft};
use hashbrown::HashMap;
use hermes_catalog::ServiceResolver;
use hermes_core::events::EventListeners;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

/// PIDs excluded from ancestor tag contribution: the common root
/// processes every process tree eventually reaches.
const ROOT_PIDS: [i32; 3] = [0, 1, 2];

/// Builds `Vec<ProcessSample>` snapshots, keeping the previous scrape's
/// results in memory to compute hourly-normalized deltas.
///
/// Scrapes are serialized: the previous-snapshot map doubles as the lock
/// held for the whole scrape, so two concurrent calls to [`Self::sample`]
/// never race — the design assumes one scrape at a time per node.
pub struct ProcessSampler {
    name: String,
    host: String,
    resolver: ServiceResolver,
    boot_time_secs: u64,
    ticks_per_second: f64,
    passwd: HashMap<u32, String>,
    previous: Arc<Mutex<HashMap<String, ProcessSample>>>,
    listeners: EventListeners<ScrapeEvent>,
}

impl ProcessSampler {
    /// Creates a sampler for `host` (this node's private IP), backed by
    /// `resolver` for service-catalog discovery.
    pub fn new(host: impl Into<String>, resolver: ServiceResolver) -> Result<Self, SamplerError> {
        let boot_time_secs = procfs::boot_time_secs().map_err(SamplerError::BootTime)?;
        let ticks_per_second =
            procfs::ticks_per_second().map_err(SamplerError::TicksPerSecond)? as f64;
        Ok(Self {
            name: "processes".to_string(),
            host: host.into(),
            resolver,
            boot_time_secs,
            ticks_per_second,
            passwd: passwd::load_passwd_table(),
            previous: Arc::new(Mutex::new(HashMap::new())),
            listeners: EventListeners::new(),
        })
    }

    /// Returns a sampler sharing this one's previous-snapshot state with
    /// an additional event listener attached.
    pub fn with_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&ScrapeEvent) + Send + Sync + 'static,
    {
        self.listeners.add(hermes_core::events::FnListener::new(f));
        self
    }

    /// Runs one scrape, returning a fresh sample per live process.
    pub async fn sample(&self) -> Vec<ProcessSample> {
        let start = Instant::now();
        let start_wall = wall_clock_now();

        let catalog = self.resolver.resolve().await;

        let mut previous = self.previous.lock().await;

        let drafts = self.read_all_processes();
        let mut samples: Vec<ProcessSample> = Vec::with_capacity(drafts.len());
        let mut pid_index: HashMap<i32, usize> = HashMap::with_capacity(drafts.len());

        for (idx, draft) in drafts.iter().enumerate() {
            let own_tags = catalog
                .get(&draft.pid)
                .cloned()
                .unwrap_or_else(|| vec![draft.name.clone()]);
            let long_pid = ProcessSample::make_long_pid(&self.host, draft.pid, draft.create_time);

            let prev = previous.get(&long_pid);
            let (cpu_user_1h_diff, cpu_system_1h_diff, io_diffs, ctx_diffs, cpu_percent) =
                compute_rates(draft, prev, start_wall);

            pid_index.insert(draft.pid, idx);

            samples.push(ProcessSample {
                long_pid,
                pid: draft.pid,
                ppid: draft.ppid,
                create_time: draft.create_time,
                status: draft.status.clone(),
                username: draft.username.clone(),
                cwd: draft.cwd.clone(),
                name: draft.name.clone(),
                exe: draft.exe.clone(),
                cmdline: draft.cmdline.clone(),
                all_tags: own_tags.clone(),
                own_tags,
                cpu_user: draft.cpu_user,
                cpu_system: draft.cpu_system,
                cpu_percent,
                cpu_user_1h_diff,
                cpu_system_1h_diff,
                memory_resident: draft.memory_resident,
                memory_virtual: draft.memory_virtual,
                memory_shared: draft.memory_shared,
                disk_io_read_count: draft.disk_io_read_count,
                disk_io_write_count: draft.disk_io_write_count,
                disk_io_read_bytes: draft.disk_io_read_bytes,
                disk_io_write_bytes: draft.disk_io_write_bytes,
                disk_io_read_count_1h_diff: io_diffs.0,
                disk_io_write_count_1h_diff: io_diffs.1,
                disk_io_read_bytes_1h_diff: io_diffs.2,
                disk_io_write_bytes_1h_diff: io_diffs.3,
                threads_num: draft.threads_num,
                file_descriptors_num: draft.file_descriptors_num,
                ctx_switches_voluntary: draft.ctx_switches_voluntary,
                ctx_switches_involuntary: draft.ctx_switches_involuntary,
                ctx_switches_voluntary_1h_diff: ctx_diffs.0,
                ctx_switches_involuntary_1h_diff: ctx_diffs.1,
                sample_time_diff: None,
                utc_timestamp: start_wall,
                host: self.host.clone(),
            });
        }

        // Ancestor tag traversal runs only after every PID is indexed, so
        // it sees a fully consistent snapshot.
        for idx in 0..samples.len() {
            let ppid = samples[idx].ppid;
            let ancestor_tags = collect_ancestor_tags(&samples, &pid_index, ppid);
            samples[idx].all_tags.extend(ancestor_tags);
        }

        previous.clear();
        for sample in &samples {
            previous.insert(sample.long_pid.clone(), sample.clone());
        }
        drop(previous);

        #[cfg(feature = "tracing")]
        info!(processes = samples.len(), elapsed_ms = start.elapsed().as_millis(), "scrape complete");
        #[cfg(not(feature = "tracing"))]
        let _ = start;

        self.listeners.emit(&ScrapeEvent::Completed {
            name: self.name.clone(),
            timestamp: Instant::now(),
            processes: samples.len(),
            elapsed: start.elapsed(),
        });

        samples
    }

    fn read_all_processes(&self) -> Vec<ProcessDraft> {
        let iter = match procfs::process::all_processes() {
            Ok(iter) => iter,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                debug!(error = %_err, "failed to enumerate /proc");
                return Vec::new();
            }
        };

        iter.filter_map(|proc| proc.ok())
            .filter_map(|proc| {
                proc_reader::read_process(&proc, &self.passwd, self.ticks_per_second, self.boot_time_secs)
            })
            .collect()
    }
}

fn wall_clock_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Ancestor tag traversal: given the current process's `ppid`, look up
/// the parent in this scrape's
/// pid-indexed samples. A missing parent contributes nothing. A parent
/// whose own `ppid` is root-adjacent contributes its own_tags and stops;
/// otherwise its own_tags are prepended and traversal continues one level
/// further up.
fn collect_ancestor_tags(
    samples: &[ProcessSample],
    pid_index: &HashMap<i32, usize>,
    ppid: i32,
) -> Vec<String> {
    let Some(&idx) = pid_index.get(&ppid) else {
        return Vec::new();
    };
    let parent = &samples[idx];
    if ROOT_PIDS.contains(&parent.ppid) {
        parent.own_tags.clone()
    } else {
        let mut tags = parent.own_tags.clone();
        tags.extend(collect_ancestor_tags(samples, pid_index, parent.ppid));
        tags
    }
}

type IoDiffs = (Option<f64>, Option<f64>, Option<f64>, Option<f64>);
type CtxDiffs = (Option<f64>, Option<f64>);

/// Computes `*_1h_diff` fields and `cpu_percent` against `prev`, or all
/// `None`/`0.0` when there is no previous sample for this `long_pid` or
/// the elapsed time is non-positive (clock skew, duplicate call).
fn compute_rates(
    draft: &ProcessDraft,
    prev: Option<&ProcessSample>,
    now: f64,
) -> (Option<f64>, Option<f64>, IoDiffs, CtxDiffs, f64) {
    let Some(prev) = prev else {
        return (None, None, (None, None, None, None), (None, None), 0.0);
    };

    let elapsed = now - prev.utc_timestamp;
    if elapsed <= 0.0 {
        return (None, None, (None, None, None, None), (None, None), 0.0);
    }

    let cpu_percent =
        (((draft.cpu_user + draft.cpu_system) - (prev.cpu_user + prev.cpu_system)) / elapsed * 100.0)
            .max(0.0);

    let diff_coef = 3600.0 / elapsed;
    let cpu_user_1h_diff = Some((draft.cpu_user - prev.cpu_user) * diff_coef);
    let cpu_system_1h_diff = Some((draft.cpu_system - prev.cpu_system) * diff_coef);

    let io_diffs = match (
        draft.disk_io_read_count,
        draft.disk_io_write_count,
        draft.disk_io_read_bytes,
        draft.disk_io_write_bytes,
        prev.disk_io_read_count,
        prev.disk_io_write_count,
        prev.disk_io_read_bytes,
        prev.disk_io_write_bytes,
    ) {
        (Some(rc), Some(wc), Some(rb), Some(wb), Some(prc), Some(pwc), Some(prb), Some(pwb)) => (
            Some((rc as f64 - prc as f64) * diff_coef),
            Some((wc as f64 - pwc as f64) * diff_coef),
            Some((rb as f64 - prb as f64) * diff_coef),
            Some((wb as f64 - pwb as f64) * diff_coef),
        ),
        _ => (None, None, None, None),
    };

    let ctx_diffs = (
        Some((draft.ctx_switches_voluntary as f64 - prev.ctx_switches_voluntary as f64) * diff_coef),
        Some(
            (draft.ctx_switches_involuntary as f64 - prev.ctx_switches_involuntary as f64)
                * diff_coef,
        ),
    );

    (cpu_user_1h_diff, cpu_system_1h_diff, io_diffs, ctx_diffs, cpu_percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(long_pid: &str, pid: i32, ppid: i32, own_tags: Vec<&str>) -> ProcessSample {
        ProcessSample {
            long_pid: long_pid.to_string(),
            pid,
            ppid,
            create_time: 0.0,
            status: "running".to_string(),
            username: None,
            cwd: None,
            name: "proc".to_string(),
            exe: None,
            cmdline: vec![],
            own_tags: own_tags.iter().map(|s| s.to_string()).collect(),
            all_tags: own_tags.iter().map(|s| s.to_string()).collect(),
            cpu_user: 0.0,
            cpu_system: 0.0,
            cpu_percent: 0.0,
            cpu_user_1h_diff: None,
            cpu_system_1h_diff: None,
            memory_resident: 0,
            memory_virtual: 0,
            memory_shared: 0,
            disk_io_read_count: None,
            disk_io_write_count: None,
            disk_io_read_bytes: None,
            disk_io_write_bytes: None,
            disk_io_read_count_1h_diff: None,
            disk_io_write_count_1h_diff: None,
            disk_io_read_bytes_1h_diff: None,
            disk_io_write_bytes_1h_diff: None,
            threads_num: 1,
            file_descriptors_num: None,
            ctx_switches_voluntary: 0,
            ctx_switches_involuntary: 0,
            ctx_switches_voluntary_1h_diff: None,
            ctx_switches_involuntary_1h_diff: None,
            sample_time_diff: None,
            utc_timestamp: 0.0,
            host: "10.0.0.1".to_string(),
        }
    }

    #[test]
    fn ancestor_traversal_matches_the_worked_example() {
        // pid=100 ppid=50 own_tags=[appscale,a]; pid=50 ppid=1 own_tags=[appscale,b]
        let samples = vec![
            sample_with("h:100:0", 100, 50, vec!["appscale", "a"]),
            sample_with("h:50:0", 50, 1, vec!["appscale", "b"]),
        ];
        let mut pid_index = HashMap::new();
        pid_index.insert(100, 0);
        pid_index.insert(50, 1);

        let tags = collect_ancestor_tags(&samples, &pid_index, 50);
        assert_eq!(tags, vec!["appscale", "b"]);
    }

    #[test]
    fn missing_ancestor_contributes_nothing() {
        let samples = vec![sample_with("h:100:0", 100, 999, vec!["appscale", "a"])];
        let pid_index = HashMap::from_iter([(100, 0)]);
        let tags = collect_ancestor_tags(&samples, &pid_index, 999);
        assert!(tags.is_empty());
    }

    #[test]
    fn rates_are_absent_without_a_previous_sample() {
        let draft = ProcessDraft {
            pid: 1,
            ppid: 0,
            create_time: 0.0,
            status: "running".to_string(),
            username: None,
            cwd: None,
            name: "x".to_string(),
            exe: None,
            cmdline: vec![],
            cpu_user: 10.0,
            cpu_system: 5.0,
            memory_resident: 0,
            memory_virtual: 0,
            memory_shared: 0,
            disk_io_read_count: Some(1),
            disk_io_write_count: Some(1),
            disk_io_read_bytes: Some(1),
            disk_io_write_bytes: Some(1),
            threads_num: 1,
            file_descriptors_num: None,
            ctx_switches_voluntary: 1,
            ctx_switches_involuntary: 1,
        };
        let (cu, cs, io, ctx, pct) = compute_rates(&draft, None, 100.0);
        assert!(cu.is_none() && cs.is_none());
        assert_eq!(io, (None, None, None, None));
        assert_eq!(ctx, (None, None));
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn rates_compute_against_a_previous_sample() {
        let draft = ProcessDraft {
            pid: 1,
            ppid: 0,
            create_time: 0.0,
            status: "running".to_string(),
            username: None,
            cwd: None,
            name: "x".to_string(),
            exe: None,
            cmdline: vec![],
            cpu_user: 20.0,
            cpu_system: 10.0,
            memory_resident: 0,
            memory_virtual: 0,
            memory_shared: 0,
            disk_io_read_count: Some(200),
            disk_io_write_count: Some(100),
            disk_io_read_bytes: Some(2000),
            disk_io_write_bytes: Some(1000),
            threads_num: 1,
            file_descriptors_num: None,
            ctx_switches_voluntary: 20,
            ctx_switches_involuntary: 10,
        };
        let mut prev = sample_with("h:1:0", 1, 0, vec!["appscale"]);
        prev.cpu_user = 10.0;
        prev.cpu_system = 5.0;
        prev.disk_io_read_count = Some(100);
        prev.disk_io_write_count = Some(50);
        prev.disk_io_read_bytes = Some(1000);
        prev.disk_io_write_bytes = Some(500);
        prev.ctx_switches_voluntary = 10;
        prev.ctx_switches_involuntary = 5;
        prev.utc_timestamp = 0.0;

        // elapsed = 1s => diff_coef = 3600
        let (cu, cs, io, ctx, pct) = compute_rates(&draft, Some(&prev), 1.0);
        assert_eq!(cu, Some((20.0 - 10.0) * 3600.0));
        assert_eq!(cs, Some((10.0 - 5.0) * 3600.0));
        assert_eq!(io.0, Some((200.0 - 100.0) * 3600.0));
        assert_eq!(ctx.0, Some((20.0 - 10.0) * 3600.0));
        // (20-10 cpu_user delta + 10-5 cpu_system delta) over 1s => 1500%
        assert_eq!(pct, 1500.0);
    }

    #[test]
    fn elapsed_non_positive_suppresses_all_diffs() {
        let draft = ProcessDraft {
            pid: 1,
            ppid: 0,
            create_time: 0.0,
            status: "running".to_string(),
            username: None,
            cwd: None,
            name: "x".to_string(),
            exe: None,
            cmdline: vec![],
            cpu_user: 20.0,
            cpu_system: 10.0,
            memory_resident: 0,
            memory_virtual: 0,
            memory_shared: 0,
            disk_io_read_count: None,
            disk_io_write_count: None,
            disk_io_read_bytes: None,
            disk_io_write_bytes: None,
            threads_num: 1,
            file_descriptors_num: None,
            ctx_switches_voluntary: 1,
            ctx_switches_involuntary: 1,
        };
        let mut prev = sample_with("h:1:0", 1, 0, vec!["appscale"]);
        prev.utc_timestamp = 5.0;
        let (cu, cs, _, _, pct) = compute_rates(&draft, Some(&prev), 5.0);
        assert!(cu.is_none() && cs.is_none());
        assert_eq!(pct, 0.0);
    }
}
