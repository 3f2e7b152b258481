//! Merges unit-based and cgroup-slice-based discovery into a single
//! `pid -> tags` service catalog.

use crate::subprocess::run_shell;
use crate::{slice, unit};
use hashbrown::HashMap;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::warn;

/// `pid -> tag list`, tag list always starting with `"appscale"`.
pub type ServiceCatalog = HashMap<i32, Vec<String>>;

/// Fixed timeout every discovery subprocess is held to.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Shell commands and path patterns the resolver depends on. Defaults
/// match a standard systemd/cgroup layout; overridable so tests can
/// point at fixtures instead of a live host.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Prints `After=...service` lines from appscale target files.
    pub dependency_units_cmd: String,
    /// Lists loaded `appscale-*.service` units.
    pub managed_units_cmd: String,
    /// `{unit}` is substituted with the unit name to query.
    pub main_pid_cmd_template: String,
    /// Iterates appscale slice directories and prints `<pid> <sliceDir>`.
    pub slice_enumeration_cmd: String,
    /// Prefix stripped from unit names before parsing.
    pub unit_prefix: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dependency_units_cmd: r#"cat /lib/systemd/system/appscale-*.target | grep -E "^After=.*\.service$" | cut -d "=" -f 2"#.to_string(),
            managed_units_cmd: r#"systemctl --no-legend list-units "appscale-*.service" | cut -d " " -f 1"#.to_string(),
            main_pid_cmd_template: "systemctl show --property MainPID --value {unit}".to_string(),
            slice_enumeration_cmd: r#"for slice in /sys/fs/cgroup/systemd/appscale.slice/appscale-*.slice/; do sed -e "s|$| ${slice}|" ${slice}/cgroup.procs; done"#.to_string(),
            unit_prefix: "appscale-".to_string(),
        }
    }
}

/// Discovers managed-service PID mappings from the host.
#[derive(Debug, Clone, Default)]
pub struct ServiceResolver {
    config: CatalogConfig,
}

impl ServiceResolver {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    /// Builds the merged catalog. Never fails: a failing pass logs a
    /// warning and contributes nothing, so the sampler can always proceed.
    pub async fn resolve(&self) -> ServiceCatalog {
        let mut catalog = self.discover_units().await;
        let slice_catalog = self.discover_slices().await;
        // Cgroup-slice discovery runs second and wins on PID collision.
        catalog.extend(slice_catalog);
        catalog
    }

    async fn list_unit_names(&self) -> Vec<String> {
        let mut units = Vec::new();

        match run_shell(&self.config.dependency_units_cmd, COMMAND_TIMEOUT).await {
            Ok((stdout, _)) => units.extend(non_empty_lines(&stdout)),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "failed to detect appscale dependency services");
            }
        }

        match run_shell(&self.config.managed_units_cmd, COMMAND_TIMEOUT).await {
            Ok((stdout, _)) => units.extend(non_empty_lines(&stdout)),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "failed to detect appscale own services");
            }
        }

        units
    }

    async fn main_pid_of(&self, unit_name: &str) -> Option<i32> {
        let cmd = self
            .config
            .main_pid_cmd_template
            .replace("{unit}", unit_name);
        let (stdout, _) = run_shell(&cmd, COMMAND_TIMEOUT).await.ok()?;
        let trimmed = stdout.trim();
        let pid: i32 = trimmed.parse().ok()?;
        if pid == 0 {
            return None;
        }
        Some(pid)
    }

    async fn discover_units(&self) -> ServiceCatalog {
        let mut catalog = ServiceCatalog::new();
        for unit_name in self.list_unit_names().await {
            let Some(pid) = self.main_pid_of(&unit_name).await else {
                continue;
            };
            let Some(parsed) = unit::parse_unit_name(&unit_name, &self.config.unit_prefix) else {
                #[cfg(feature = "tracing")]
                warn!(unit = %unit_name, "could not parse service name");
                continue;
            };
            catalog.insert(pid, unit::tags_for(&parsed));
        }
        catalog
    }

    async fn discover_slices(&self) -> ServiceCatalog {
        let mut catalog = ServiceCatalog::new();
        let (stdout, _) = match run_shell(&self.config.slice_enumeration_cmd, COMMAND_TIMEOUT).await
        {
            Ok(output) => output,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "failed to detect appscale-slice processes");
                return catalog;
            }
        };
        for line in stdout.trim().lines() {
            let Some(entry) = slice::parse_pid_slice_line(line) else {
                #[cfg(feature = "tracing")]
                warn!(line, "could not parse PID-slice line");
                continue;
            };
            catalog.insert(entry.pid, slice::tags_for(&entry));
        }
        catalog
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.trim()
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for_fixtures() -> CatalogConfig {
        CatalogConfig {
            dependency_units_cmd: "true".to_string(),
            managed_units_cmd: "printf 'appscale-haproxy@app.service\\nappscale-instance-run@testapp_mod1_v1_1570022208920-20000.service\\n'".to_string(),
            main_pid_cmd_template: "case '{unit}' in \
                'appscale-haproxy@app.service') echo 10029 ;; \
                'appscale-instance-run@testapp_mod1_v1_1570022208920-20000.service') echo 10034 ;; \
                *) echo 0 ;; \
                esac".to_string(),
            slice_enumeration_cmd: "printf '11038 /sys/fs/cgroup/systemd/appscale.slice/appscale-datastore.slice/\\n11040 /sys/fs/cgroup/systemd/appscale.slice/appscale-search.slice/\\n'".to_string(),
            unit_prefix: "appscale-".to_string(),
        }
    }

    #[tokio::test]
    async fn resolves_service_tags_from_unit_listing() {
        let resolver = ServiceResolver::new(CatalogConfig {
            slice_enumeration_cmd: "true".to_string(),
            ..config_for_fixtures()
        });
        let catalog = resolver.resolve().await;
        assert_eq!(
            catalog.get(&10029),
            Some(&vec!["appscale".to_string(), "haproxy".to_string(), "_app".to_string()])
        );
        assert_eq!(
            catalog.get(&10034),
            Some(&vec![
                "appscale".to_string(),
                "instance-run".to_string(),
                "_testapp".to_string(),
                "_mod1".to_string(),
                "_v1".to_string(),
                "_1570022208920-20000".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn resolves_slice_tags_and_merges_over_unit_tags() {
        let resolver = ServiceResolver::new(config_for_fixtures());
        let catalog = resolver.resolve().await;
        assert_eq!(
            catalog.get(&11038),
            Some(&vec!["appscale".to_string(), "datastore".to_string()])
        );
        assert_eq!(
            catalog.get(&11040),
            Some(&vec!["appscale".to_string(), "search".to_string()])
        );
        // Unit-discovered PIDs survive when not also present in a slice.
        assert!(catalog.contains_key(&10029));
    }

    #[tokio::test]
    async fn a_failing_pass_degrades_gracefully_rather_than_erroring() {
        let resolver = ServiceResolver::new(CatalogConfig {
            dependency_units_cmd: "false".to_string(),
            managed_units_cmd: "false".to_string(),
            slice_enumeration_cmd: "false".to_string(),
            ..CatalogConfig::default()
        });
        let catalog = resolver.resolve().await;
        assert!(catalog.is_empty());
    }
}
