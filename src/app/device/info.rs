use tracing::{debug, warn};

use super::cpuinfo::{cpuinfo_sections, parse_cpuinfo};
use super::getprop::{categorize_getprop, parse_get_prop};
use crate::app::adb::runner::ShellGateway;
use crate::app::error::AppError;
use crate::app::models::{DeviceInfo, DeviceInfoItem, DeviceInfoSection};

pub const SECTION_DISPLAY_MEMORY: &str = "显示与内存";

/// Raw command outputs that make up the device-info page.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfoSources {
    pub getprop: String,
    pub cpuinfo: String,
    pub wm_size: String,
    pub wm_density: String,
    pub meminfo: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

fn parse_dims(value: &str) -> Option<ScreenSize> {
    let (width, height) = value.trim().split_once('x')?;
    Some(ScreenSize {
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}

/// `wm size` → (physical, override).
pub fn parse_wm_size(output: &str) -> (Option<ScreenSize>, Option<ScreenSize>) {
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Physical size" => physical = parse_dims(value),
            "Override size" => overridden = parse_dims(value),
            _ => {}
        }
    }
    (physical, overridden)
}

/// `wm density` → (physical, override).
pub fn parse_wm_density(output: &str) -> (Option<u32>, Option<u32>) {
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Physical density" => physical = value.trim().parse().ok(),
            "Override density" => overridden = value.trim().parse().ok(),
            _ => {}
        }
    }
    (physical, overridden)
}

/// `MemTotal` from `/proc/meminfo`, in kB.
pub fn parse_mem_total_kb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let key = parts.next()?.trim_end_matches(':');
        if key != "MemTotal" {
            return None;
        }
        parts.next()?.parse::<u64>().ok()
    })
}

fn format_kb(kb: u64) -> String {
    let gb = kb as f64 / (1024.0 * 1024.0);
    if gb >= 1.0 {
        format!("{gb:.2} GB")
    } else {
        format!("{:.0} MB", kb as f64 / 1024.0)
    }
}

fn display_memory_section(sources: &DeviceInfoSources) -> Option<DeviceInfoSection> {
    let mut section = DeviceInfoSection::new(SECTION_DISPLAY_MEMORY);
    let (physical, overridden) = parse_wm_size(&sources.wm_size);
    if let Some(size) = physical {
        section
            .items
            .push(DeviceInfoItem::new("屏幕分辨率", format!("{}x{}", size.width, size.height)));
    }
    if let Some(size) = overridden {
        section
            .items
            .push(DeviceInfoItem::new("覆盖分辨率", format!("{}x{}", size.width, size.height)));
    }
    let (density, density_override) = parse_wm_density(&sources.wm_density);
    if let Some(dpi) = density {
        section
            .items
            .push(DeviceInfoItem::new("屏幕密度", format!("{dpi} dpi")));
    }
    if let Some(dpi) = density_override {
        section
            .items
            .push(DeviceInfoItem::new("覆盖密度", format!("{dpi} dpi")));
    }
    if let Some(kb) = parse_mem_total_kb(&sources.meminfo) {
        section.items.push(DeviceInfoItem::new("总内存", format_kb(kb)));
    }
    if section.items.is_empty() {
        None
    } else {
        Some(section)
    }
}

/// Curated getprop sections, then display and memory, then CPU.
pub fn build_device_info(serial: &str, sources: &DeviceInfoSources) -> DeviceInfo {
    let mut sections = parse_get_prop(&sources.getprop);
    sections.extend(display_memory_section(sources));
    if !sources.cpuinfo.trim().is_empty() {
        sections.extend(cpuinfo_sections(&parse_cpuinfo(&sources.cpuinfo)));
    }
    DeviceInfo {
        serial: serial.to_string(),
        sections,
    }
}

/// Runs the device-info commands one after another. A failed command leaves its part empty.
pub fn fetch_device_info(gateway: &dyn ShellGateway, serial: &str, trace_id: &str) -> DeviceInfo {
    let run = |command: &str| match gateway.shell(command, trace_id) {
        Ok(output) => output,
        Err(err) => {
            warn!(trace_id = %trace_id, command, error = %err, "device info command failed");
            String::new()
        }
    };
    let sources = DeviceInfoSources {
        getprop: run("getprop"),
        cpuinfo: run("cat /proc/cpuinfo"),
        wm_size: run("wm size"),
        wm_density: run("wm density"),
        meminfo: run("cat /proc/meminfo"),
    };
    let info = build_device_info(serial, &sources);
    debug!(trace_id = %trace_id, sections = info.sections.len(), "device info collected");
    info
}

/// Every system property, grouped by key prefix with leftovers last.
pub fn fetch_all_properties(
    gateway: &dyn ShellGateway,
    serial: &str,
    trace_id: &str,
) -> Result<DeviceInfo, AppError> {
    let output = gateway.shell("getprop", trace_id)?;
    let sections = categorize_getprop(&output);
    debug!(trace_id = %trace_id, sections = sections.len(), "getprop categorized");
    ensure_device_info(
        DeviceInfo {
            serial: serial.to_string(),
            sections,
        },
        trace_id,
    )
}

/// Fails when every command came back empty, which usually means the device is gone.
pub fn ensure_device_info(info: DeviceInfo, trace_id: &str) -> Result<DeviceInfo, AppError> {
    if info.sections.is_empty() {
        return Err(AppError::dependency(
            "Device returned no property or hardware information",
            trace_id,
        ));
    }
    Ok(info)
}
