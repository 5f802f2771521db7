//! Config for the runner behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive, set the value to `"true"` to enable one.
//!
//! - `RUNNER_LOG` — Enable logging to a file (default: `false`)
//! - `RUNNER_CONTAIN_AGENTS` — Launch command-line agents inside cgroups (default: `false`)
//! - `RUNNER_ALLOW_UNCONTAINED` — Fall back to plain processes when cgroups are unavailable (default: `false`)
//! - `RUNNER_DEBUG_AGENT_STDERR` — Echo agent stderr into the log (default: `false`)
//! - `RUNNER_HEADER_TIMEOUT_MS` — Timeout for a referee frame header (default: `1500`)
//! - `RUNNER_BODY_TIMEOUT_MS` — Timeout for a referee frame body (default: `500`)
//! - `RUNNER_BOOTSTRAP_GRACE_MS` — Delay between player launch and input forwarding (default: `300`)
//! - `RUNNER_QUEUE_CAPACITY` — Capacity of each player input queue (default: `1024`)
//! - `RUNNER_AGENT_RAM_MB` — Memory limit of a contained agent, in MB (default: unlimited)
//! - `RUNNER_CPU_LIST` — CPUs a contained agent may run on, e.g. `"0-3,6"` (default: any)

use std::{collections::BTreeSet, env, time::Duration};

use anyhow::{bail, Context};

/// Configuration for runner behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) log: bool,
    pub(crate) contain_agents: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) debug_agent_stderr: bool,
    pub(crate) header_timeout: Duration,
    pub(crate) body_timeout: Duration,
    pub(crate) bootstrap_grace: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) agent_ram: Option<usize>,
    pub(crate) cpu_list: Option<String>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Logging to file is disabled.
    /// - Agents run as plain processes.
    /// - Referee headers must arrive within 1500ms, bodies within 500ms.
    /// - Players get 300ms to boot before their input is forwarded.
    /// - Each player input queue holds up to 1024 pending inputs.
    pub fn new() -> Self {
        Self {
            log: false,
            contain_agents: false,
            allow_uncontained: false,
            debug_agent_stderr: false,
            header_timeout: Duration::from_millis(1500),
            body_timeout: Duration::from_millis(500),
            bootstrap_grace: Duration::from_millis(300),
            queue_capacity: 1024,
            agent_ram: None,
            cpu_list: None,
        }
    }

    /// Create configuration from environment variables (see module documentation).
    ///
    /// Any unset or unparsable value falls back to its default.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn parse_usize(var: &str) -> Option<usize> {
            env::var(var).ok()?.parse().ok()
        }

        fn parse_duration_millis(var: &str) -> Option<Duration> {
            env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_millis)
        }

        let default = Self::new();
        Self {
            log: get_env_flag("RUNNER_LOG", default.log),
            contain_agents: get_env_flag("RUNNER_CONTAIN_AGENTS", default.contain_agents),
            allow_uncontained: get_env_flag("RUNNER_ALLOW_UNCONTAINED", default.allow_uncontained),
            debug_agent_stderr: get_env_flag(
                "RUNNER_DEBUG_AGENT_STDERR",
                default.debug_agent_stderr,
            ),
            header_timeout: parse_duration_millis("RUNNER_HEADER_TIMEOUT_MS")
                .unwrap_or(default.header_timeout),
            body_timeout: parse_duration_millis("RUNNER_BODY_TIMEOUT_MS")
                .unwrap_or(default.body_timeout),
            bootstrap_grace: parse_duration_millis("RUNNER_BOOTSTRAP_GRACE_MS")
                .unwrap_or(default.bootstrap_grace),
            queue_capacity: parse_usize("RUNNER_QUEUE_CAPACITY").unwrap_or(default.queue_capacity),
            agent_ram: parse_usize("RUNNER_AGENT_RAM_MB"),
            cpu_list: env::var("RUNNER_CPU_LIST").ok(),
        }
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable cgroup containment of command-line agents.
    pub fn with_contain_agents(mut self, value: bool) -> Self {
        self.contain_agents = value;
        self
    }

    /// Enable or disable the uncontained fallback.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Enable or disable agent stderr echo (debug purposes only).
    pub fn with_debug_agent_stderr(mut self, value: bool) -> Self {
        self.debug_agent_stderr = value;
        self
    }

    /// Maximum wait for a referee frame header.
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Maximum wait for a referee frame body.
    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    /// Delay between launching the players and starting their input forwarders.
    ///
    /// This is a timing heuristic, not a readiness handshake.
    pub fn with_bootstrap_grace(mut self, grace: Duration) -> Self {
        self.bootstrap_grace = grace;
        self
    }

    /// Capacity of each player input queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Memory limit (in MB) of a contained agent.
    pub fn with_agent_ram(mut self, megabytes: usize) -> Self {
        self.agent_ram = Some(megabytes);
        self
    }

    /// CPUs a contained agent may run on.
    ///
    /// Format follows the pattern: `"0-3,6,8"` (inclusive ranges and individual IDs).
    pub fn with_cpu_list(mut self, cpus: &str) -> Self {
        self.cpu_list = Some(cpus.to_string());
        self
    }

    /// Check that the configuration can be honored on this machine.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue capacity is zero, when the cpu list cannot be parsed,
    /// or when the agent RAM is greater than the available memory.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_capacity == 0 {
            bail!("player input queue capacity must be positive");
        }
        if let Some(cpus) = &self.cpu_list {
            cpu_list_to_set(cpus).context("error parsing cpu list")?;
        }
        if let Some(agent_ram) = self.agent_ram {
            let mut sys = sysinfo::System::new();
            sys.refresh_memory();
            let available = sys.available_memory() as usize;
            if agent_ram.saturating_mul(1_000_000) > available {
                bail!(
                    "Agent RAM size ({agent_ram}MB) is greater than available RAM ({}MB)",
                    available / 1_000_000
                );
            }
        }
        Ok(())
    }

    /// Agent memory limit in bytes, non-positive meaning unlimited.
    pub(crate) fn max_memory_bytes(&self) -> i64 {
        self.agent_ram.map(|mb| mb as i64 * 1_000_000).unwrap_or(0)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn cpu_list_to_set(s: &str) -> anyhow::Result<BTreeSet<u8>> {
    if s.is_empty() {
        bail!("Empty string");
    }
    let mut set = BTreeSet::new();
    for item in s.split(',') {
        let bounds = item.split('-').collect::<Vec<_>>();
        let parse = |value: &str| -> anyhow::Result<u8> {
            value
                .trim()
                .parse()
                .with_context(|| format!("could not parse {value}"))
        };
        match bounds.as_slice() {
            [value] => {
                set.insert(parse(value)?);
            }
            [start, end] => {
                let (start, end) = (parse(start)?, parse(end)?);
                set.extend(start.min(end)..=start.max(end));
            }
            _ => bail!(
                "each comma-separated item must be a number or a range (e.g. '0-3'), got '{item}'"
            ),
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timeouts() {
        let config = Configuration::default();
        assert_eq!(config.header_timeout, Duration::from_millis(1500));
        assert_eq!(config.body_timeout, Duration::from_millis(500));
        assert_eq!(config.bootstrap_grace, Duration::from_millis(300));
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.max_memory_bytes(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cpu_list_accepts_ranges() {
        let set = cpu_list_to_set("3-1,6").unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 6]);
        assert!(cpu_list_to_set("").is_err());
        assert!(cpu_list_to_set("1-2-3").is_err());
        assert!(cpu_list_to_set("a").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(Configuration::new().with_queue_capacity(0).validate().is_err());
        assert!(Configuration::new().with_cpu_list("x-1").validate().is_err());
        assert!(Configuration::new()
            .with_agent_ram(usize::MAX / 2_000_000)
            .validate()
            .is_err());
    }
}
