//! Reads one process's raw attributes from `/proc` via the `procfs` crate.
//!
//! Mirrors the attribute set the agent asks the OS for: pid, ppid,
//! name, cwd, exe, cmdline, status, username, cpu times,
//! memory info, io counters, thread/fd counts, context switches, and
//! create time. A process that disappears mid-read yields `None` from
//! [`read_process`] so the caller can skip it silently; IO counters are
//! the one field group the OS may refuse to report even for a process
//! that otherwise reads fine, so they're `Option` independently.
use hashbrown::HashMap;
use procfs::process::Process;

/// Everything read directly from `/proc/<pid>` for one process, before
/// tag classification or rate computation.
#[derive(Debug, Clone)]
pub struct ProcessDraft {
    pub pid: i32,
    pub ppid: i32,
    pub create_time: f64,
    pub status: String,
    pub username: Option<String>,
    pub cwd: Option<String>,
    pub name: String,
    pub exe: Option<String>,
    pub cmdline: Vec<String>,

    pub cpu_user: f64,
    pub cpu_system: f64,

    pub memory_resident: u64,
    pub memory_virtual: u64,
    pub memory_shared: u64,

    pub disk_io_read_count: Option<u64>,
    pub disk_io_write_count: Option<u64>,
    pub disk_io_read_bytes: Option<u64>,
    pub disk_io_write_bytes: Option<u64>,

    pub threads_num: u64,
    pub file_descriptors_num: Option<u64>,

    pub ctx_switches_voluntary: u64,
    pub ctx_switches_involuntary: u64,
}

/// Maps a `/proc/<pid>/stat` state character to a psutil-style name.
fn status_name(state: char) -> &'static str {
    match state {
        'R' => "running",
        'S' => "sleeping",
        'D' => "disk-sleep",
        'Z' => "zombie",
        'T' | 't' => "stopped",
        'X' | 'x' => "dead",
        'I' => "idle",
        'W' => "paging",
        _ => "unknown",
    }
}

/// Reads one process's attributes, or `None` if it exited before (or
/// during) the read — processes that disappear mid-enumeration are
/// silently skipped.
pub fn read_process(proc: &Process, passwd: &HashMap<u32, String>, ticks_per_second: f64, boot_time_secs: u64) -> Option<ProcessDraft> {
    let stat = proc.stat().ok()?;
    let status = proc.status().ok();

    let pid = stat.pid;
    let ppid = stat.ppid;
    let create_time = boot_time_secs as f64 + (stat.starttime as f64 / ticks_per_second);
    let cpu_user = stat.utime as f64 / ticks_per_second;
    let cpu_system = stat.stime as f64 / ticks_per_second;
    let page_size = procfs::page_size();

    let memory_virtual = stat.vsize;
    let memory_resident = (stat.rss as u64).saturating_mul(page_size);
    let memory_shared = proc
        .statm()
        .map(|statm| statm.shared.saturating_mul(page_size))
        .unwrap_or(0);

    let username = status
        .as_ref()
        .and_then(|s| s.ruid)
        .and_then(|uid| passwd.get(&uid).cloned())
        .or_else(|| status.as_ref().and_then(|s| s.ruid).map(|uid| uid.to_string()));

    let (ctx_voluntary, ctx_involuntary) = status
        .as_ref()
        .map(|s| {
            (
                s.voluntary_ctxt_switches.unwrap_or(0),
                s.nonvoluntary_ctxt_switches.unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));

    let io = proc.io().ok();
    let (read_count, write_count, read_bytes, write_bytes) = match io {
        Some(io) => (
            Some(io.syscr),
            Some(io.syscw),
            Some(io.read_bytes),
            Some(io.write_bytes),
        ),
        None => (None, None, None, None),
    };

    Some(ProcessDraft {
        pid,
        ppid,
        create_time,
        status: status_name(stat.state).to_string(),
        username,
        cwd: proc.cwd().ok().and_then(|p| p.to_str().map(str::to_string)),
        name: stat.comm.clone(),
        exe: proc.exe().ok().and_then(|p| p.to_str().map(str::to_string)),
        cmdline: proc.cmdline().unwrap_or_default(),
        cpu_user,
        cpu_system,
        memory_resident,
        memory_virtual,
        memory_shared,
        disk_io_read_count: read_count,
        disk_io_write_count: write_count,
        disk_io_read_bytes: read_bytes,
        disk_io_write_bytes: write_bytes,
        threads_num: stat.num_threads.max(0) as u64,
        file_descriptors_num: proc.fd_count().ok().map(|n| n as u64),
        ctx_switches_voluntary: ctx_voluntary,
        ctx_switches_involuntary: ctx_involuntary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_name_maps_documented_states() {
        assert_eq!(status_name('R'), "running");
        assert_eq!(status_name('S'), "sleeping");
        assert_eq!(status_name('Z'), "zombie");
        assert_eq!(status_name('?'), "unknown");
    }
}
