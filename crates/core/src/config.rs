use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

/// All chargecapd settings.
///
/// Every field has a default; values come from an optional `key = value`
/// config file, overridden by `CHARGECAP_*` environment variables
/// (`CHARGECAP_TICK_MS=500` overrides `tick_ms`). Unparseable values fall
/// back to the default for that field.
#[derive(Debug, Clone)]
pub struct LimiterCfg {
    // tick intervals (ms)
    pub tick_ms: u64,
    pub fault_backoff_ms: u64,
    pub debounce_ms: u64,

    // charge band (percent), sanitized again on load
    pub lower_threshold: u32,
    pub upper_threshold: u32,

    /// Raw `enabled` tunable applied at boot; nonzero starts the loop.
    pub enabled: u32,

    // power supply names and sysfs location
    pub battery_name: String,
    pub usb_name: String,
    pub sysfs_root: String,

    // control socket
    pub socket_path: String,
}

impl Default for LimiterCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            fault_backoff_ms: 5000,
            debounce_ms: 10_000,
            lower_threshold: 95,
            upper_threshold: 100,
            enabled: 0,
            battery_name: "battery".into(),
            usb_name: "usb".into(),
            sysfs_root: crate::power::DEFAULT_SYSFS_ROOT.into(),
            socket_path: "/run/chargecap.sock".into(),
        }
    }
}

impl LimiterCfg {
    /// Load from an optional config file, then apply environment overrides.
    /// A missing path means defaults plus environment only.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut map = HashMap::new();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            parse_into(&text, &mut map);
        }
        for (key, value) in std::env::vars() {
            if let Some(stripped) = key.strip_prefix("CHARGECAP_") {
                map.insert(stripped.to_ascii_lowercase(), value);
            }
        }
        Ok(Self::from_map(&map))
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            tick_ms: get_or(m, "tick_ms", d.tick_ms),
            fault_backoff_ms: get_or(m, "fault_backoff_ms", d.fault_backoff_ms),
            debounce_ms: get_or(m, "debounce_ms", d.debounce_ms),
            lower_threshold: get_or(m, "lower_threshold", d.lower_threshold),
            upper_threshold: get_or(m, "upper_threshold", d.upper_threshold),
            enabled: get_or(m, "enabled", d.enabled),
            battery_name: m.get("battery_name").cloned().unwrap_or(d.battery_name),
            usb_name: m.get("usb_name").cloned().unwrap_or(d.usb_name),
            sysfs_root: m.get("sysfs_root").cloned().unwrap_or(d.sysfs_root),
            socket_path: m.get("socket_path").cloned().unwrap_or(d.socket_path),
        }
    }
}

/// Parse `key = value` lines; `#` starts a comment, blank lines are skipped.
fn parse_into(text: &str, map: &mut HashMap<String, String>) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LimiterCfg::default();
        assert_eq!(cfg.tick_ms, 1000);
        assert_eq!(cfg.fault_backoff_ms, 5000);
        assert_eq!(cfg.debounce_ms, 10_000);
        assert_eq!(cfg.lower_threshold, 95);
        assert_eq!(cfg.upper_threshold, 100);
        assert_eq!(cfg.enabled, 0);
        assert_eq!(cfg.battery_name, "battery");
    }

    #[test]
    fn file_values_override_defaults() {
        let mut map = HashMap::new();
        parse_into(
            "# chargecap config\n\
             tick_ms = 250\n\
             lower_threshold = 60\n\
             battery_name = BAT0\n\
             \n\
             not a key value line\n",
            &mut map,
        );
        let cfg = LimiterCfg::from_map(&map);
        assert_eq!(cfg.tick_ms, 250);
        assert_eq!(cfg.lower_threshold, 60);
        assert_eq!(cfg.battery_name, "BAT0");
        // untouched fields keep their defaults
        assert_eq!(cfg.debounce_ms, 10_000);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let mut map = HashMap::new();
        map.insert("tick_ms".to_owned(), "soon".to_owned());
        let cfg = LimiterCfg::from_map(&map);
        assert_eq!(cfg.tick_ms, 1000);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.conf");
        assert!(LimiterCfg::load(Some(&missing)).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chargecap.conf");
        std::fs::write(&path, "usb_name = AC\nenabled = 1\n").unwrap();
        let cfg = LimiterCfg::load(Some(&path)).unwrap();
        assert_eq!(cfg.usb_name, "AC");
        assert_eq!(cfg.enabled, 1);
    }
}
