use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub transport_id: Option<String>,
}

impl DeviceEntry {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageEntry {
    pub package_name: String,
    pub apk_path: Option<String>,
    pub is_system: bool,
}

/// One row of `ps -T -p <pid>`. Values are kept verbatim; the header row uses the column names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadInfo {
    pub user: String,
    pub pid: String,
    pub tid: String,
    pub ppid: String,
    pub vsz: String,
    pub rss: String,
    pub wchan: String,
    pub addr: String,
    pub state: String,
    pub cmd: String,
}

impl ThreadInfo {
    pub fn is_running(&self) -> bool {
        self.state == "R"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub total: usize,
    pub by_state: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub package_name: String,
    pub pid: Option<u32>,
    /// Header row first, then data rows with running threads ahead of the rest.
    pub threads: Vec<ThreadInfo>,
    pub summary: ThreadSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfoItem {
    pub label: String,
    pub value: String,
}

impl DeviceInfoItem {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfoSection {
    pub title: String,
    pub items: Vec<DeviceInfoItem>,
}

impl DeviceInfoSection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.label == label)
            .map(|item| item.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub sections: Vec<DeviceInfoSection>,
}

impl DeviceInfo {
    pub fn section(&self, title: &str) -> Option<&DeviceInfoSection> {
        self.sections.iter().find(|section| section.title == title)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuCore {
    pub processor: u32,
    pub implementer: Option<String>,
    pub vendor: String,
    pub architecture: Option<String>,
    pub variant: Option<String>,
    pub part: Option<String>,
    pub core_name: String,
    pub revision: Option<String>,
    pub bogomips: Option<String>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuInfo {
    pub processors: Vec<CpuCore>,
    pub hardware: Option<String>,
    /// Non-processor stanza keys (`Hardware`, `Serial`, ...) in input order.
    pub extra: Vec<DeviceInfoItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GfxFrameStats {
    pub total_frames: u64,
    pub janky_frames: u64,
    pub janky_percent: f64,
    pub p50_ms: u32,
    pub p90_ms: u32,
    pub p95_ms: u32,
    pub p99_ms: u32,
    pub missed_vsync: u64,
    pub high_input_latency: u64,
    pub slow_ui_thread: u64,
    pub slow_bitmap_uploads: u64,
    pub slow_draw_commands: u64,
    pub frame_deadline_missed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GfxWindowStats {
    pub name: String,
    pub stats: GfxFrameStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GfxInfo {
    pub package_name: String,
    pub pid: Option<u32>,
    pub summary: GfxFrameStats,
    pub windows: Vec<GfxWindowStats>,
    pub view_root_count: u32,
    pub total_views: u32,
    pub gpu_memory_bytes: u64,
}
