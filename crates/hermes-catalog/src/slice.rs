//! Parsing for cgroup-slice discovery output.
//!
//! The host-side shell snippet prints one `<pid> <slicePath>` line per PID
//! under each matching slice directory; `parse_pid_slice_line` extracts the
//! PID and slice name from a single line.

use regex::Regex;
use std::sync::LazyLock;

/// Matches a line like
/// `11038 /sys/fs/cgroup/systemd/appscale.slice/appscale-datastore.slice/`,
/// capturing the PID and the slice's short name (`datastore` above).
static PID_SLICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<pid>\d+)\s+/sys/fs/cgroup/systemd/appscale\.slice/appscale-(?P<name>[^./]+)\.slice/?\s*$")
        .expect("static regex is valid")
});

/// A single parsed `cgroup.procs` enumeration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceEntry {
    pub pid: i32,
    pub slice_name: String,
}

/// Parses one line of slice-enumeration output, or `None` if it doesn't
/// match the expected shape.
pub fn parse_pid_slice_line(line: &str) -> Option<SliceEntry> {
    let caps = PID_SLICE_LINE.captures(line.trim_end())?;
    let pid = caps["pid"].parse().ok()?;
    Some(SliceEntry {
        pid,
        slice_name: caps["name"].to_string(),
    })
}

/// Builds the tag list for a slice entry: `["appscale", slice_name]`.
pub fn tags_for(entry: &SliceEntry) -> Vec<String> {
    vec!["appscale".to_string(), entry.slice_name.clone()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_datastore_and_search_slices() {
        let a = parse_pid_slice_line(
            "11038 /sys/fs/cgroup/systemd/appscale.slice/appscale-datastore.slice/",
        )
        .unwrap();
        assert_eq!(a.pid, 11038);
        assert_eq!(a.slice_name, "datastore");
        assert_eq!(tags_for(&a), vec!["appscale", "datastore"]);

        let b = parse_pid_slice_line(
            "11040 /sys/fs/cgroup/systemd/appscale.slice/appscale-search.slice/",
        )
        .unwrap();
        assert_eq!(b.pid, 11040);
        assert_eq!(b.slice_name, "search");
    }

    #[test]
    fn rejects_unmatched_lines() {
        assert!(parse_pid_slice_line("not a pid line").is_none());
        assert!(parse_pid_slice_line("").is_none());
    }
}
