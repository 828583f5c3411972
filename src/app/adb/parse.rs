use std::collections::BTreeMap;

use crate::app::models::{DeviceEntry, PackageEntry};

pub fn parse_adb_devices(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('*'))
        .filter(|line| !line.to_lowercase().starts_with("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?.to_string();
            let state = tokens.next()?.to_string();
            let mut entry = DeviceEntry {
                serial,
                state,
                model: None,
                product: None,
                transport_id: None,
            };
            for token in tokens {
                let Some((key, value)) = token.split_once(':') else {
                    continue;
                };
                let value = Some(value.to_string()).filter(|v| !v.is_empty());
                match key {
                    "model" => entry.model = value,
                    "product" => entry.product = value,
                    "transport_id" => entry.transport_id = value,
                    _ => {}
                }
            }
            Some(entry)
        })
        .collect()
}

fn is_system_path(path: &str) -> bool {
    ["/system/", "/product/", "/vendor/", "/system_ext/", "/apex/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Parses `pm list packages [-f]`. Output is sorted by package name and deduplicated.
pub fn parse_pm_list_packages(output: &str) -> Vec<PackageEntry> {
    let mut by_name: BTreeMap<String, PackageEntry> = BTreeMap::new();
    for line in output.lines() {
        let Some(payload) = line.trim().strip_prefix("package:") else {
            continue;
        };
        // With -f the payload is `<apk path>=<package>`; the path itself may contain '='.
        let (apk_path, package_name) = match payload.rsplit_once('=') {
            Some((path, name)) => (Some(path.trim().to_string()), name.trim()),
            None => (None, payload.trim()),
        };
        if package_name.is_empty() {
            continue;
        }
        let is_system = apk_path.as_deref().map(is_system_path).unwrap_or(false);
        by_name
            .entry(package_name.to_string())
            .or_insert(PackageEntry {
                package_name: package_name.to_string(),
                apk_path,
                is_system,
            });
    }
    by_name.into_values().collect()
}

/// First pid printed by `pidof <name>`.
pub fn parse_pidof(output: &str) -> Option<u32> {
    output
        .split_whitespace()
        .find_map(|token| token.parse::<u32>().ok())
}

/// Finds the pid of `process_name` in a `ps -A` table (PID in column 2, NAME last).
pub fn parse_pid_from_ps(output: &str, process_name: &str) -> Option<u32> {
    output.lines().skip(1).find_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return None;
        }
        if tokens.last().copied() != Some(process_name) {
            return None;
        }
        tokens[1].parse::<u32>().ok()
    })
}

pub fn parse_settings_bool(output: &str) -> Option<bool> {
    let value = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    if let Ok(number) = value.parse::<f64>() {
        return Some(number != 0.0);
    }
    match value.to_lowercase().as_str() {
        "true" | "on" | "enabled" | "show" | "visual_bars" => Some(true),
        "false" | "off" | "disabled" | "null" => Some(false),
        _ => None,
    }
}
