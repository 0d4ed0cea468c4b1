//! Crate-wide tunables, with FreeDesktop trash spec defaults baked in. Every
//! field can be overridden from the environment, read once per
//! [`Config::from_env`] call.

use std::time::Duration;

/// A port range the Peer Transport picks a random listen port from before
/// retrying on bind failure.
#[derive(Debug, Clone, Copy)]
pub struct PortRange {
    pub low: u16,
    pub high: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        // matches the range used by the original tool's `rand() % 5000 + 15000`
        PortRange {
            low: 15000,
            high: 20000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Job Scheduler worker count.
    pub max_threads: usize,
    /// `select()` timeout for the Peer Transport's network threads.
    pub select_timeout: Duration,
    /// Minimum interval between successive rendezvous-directory scans for
    /// the same base.
    pub discovery_throttle: Duration,
    /// Delay between dispatch-thread parse-retry attempts.
    pub parse_retry_backoff: Duration,
    /// Number of parse retries before the dispatch thread gives up on a
    /// buffer.
    pub parse_retry_attempts: u32,
    /// Range to pick a random listen port from.
    pub port_range: PortRange,
    /// Number of bind attempts before giving up.
    pub bind_attempts: u32,
    /// Whether the Peer Transport runs its read and write loops on separate
    /// threads (two-thread mode) or a single combined loop.
    pub one_network_thread: bool,
    /// Size of each buffer-pool chunk used by the read loop.
    pub buffer_size: usize,
    /// Number of buffer chunks allocated per pool page.
    pub buffers_per_page: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_threads: 2,
            select_timeout: Duration::from_millis(100),
            discovery_throttle: Duration::from_secs(2),
            parse_retry_backoff: Duration::from_secs(1),
            parse_retry_attempts: 3,
            port_range: PortRange::default(),
            bind_attempts: 100,
            one_network_thread: true,
            buffer_size: 128,
            buffers_per_page: 16,
        }
    }
}

impl Config {
    /// Build a [`Config`], letting a handful of environment variables
    /// override the defaults. Unset or unparsable variables are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Some(v) = env_usize("TRASH_RS_MAX_THREADS") {
            cfg.max_threads = v.max(1);
        }
        if let Some(v) = env_usize("TRASH_RS_SELECT_TIMEOUT_MS") {
            cfg.select_timeout = Duration::from_millis(v as u64);
        }
        if let Some(v) = env_usize("TRASH_RS_DISCOVERY_THROTTLE_SECS") {
            cfg.discovery_throttle = Duration::from_secs(v as u64);
        }
        if std::env::var("TRASH_RS_TWO_THREAD_NETWORK").is_ok() {
            cfg.one_network_thread = false;
        }

        cfg
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.max_threads, 2);
        assert_eq!(cfg.select_timeout, Duration::from_millis(100));
        assert_eq!(cfg.discovery_throttle, Duration::from_secs(2));
        assert_eq!(cfg.bind_attempts, 100);
    }
}
