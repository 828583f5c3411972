use std::collections::BTreeMap;

use regex::Regex;

use crate::app::models::{DeviceInfoItem, DeviceInfoSection};

pub const SECTION_BASIC: &str = "基本信息";
pub const SECTION_SYSTEM: &str = "系统版本";
pub const SECTION_HARDWARE: &str = "硬件信息";
pub const SECTION_LOCALE: &str = "区域与网络";
pub const SECTION_OTHER: &str = "其他";

/// Curated getprop keys: (section, key, label). Order here is display order.
const CURATED_PROPS: &[(&str, &str, &str)] = &[
    (SECTION_BASIC, "ro.product.brand", "设备品牌"),
    (SECTION_BASIC, "ro.product.model", "设备型号"),
    (SECTION_BASIC, "ro.product.manufacturer", "制造商"),
    (SECTION_BASIC, "ro.product.name", "产品名称"),
    (SECTION_BASIC, "ro.product.device", "设备代号"),
    (SECTION_BASIC, "ro.serialno", "序列号"),
    (SECTION_SYSTEM, "ro.build.version.release", "Android 版本"),
    (SECTION_SYSTEM, "ro.build.version.sdk", "SDK 版本"),
    (SECTION_SYSTEM, "ro.build.version.security_patch", "安全补丁"),
    (SECTION_SYSTEM, "ro.build.display.id", "版本号"),
    (SECTION_SYSTEM, "ro.build.type", "构建类型"),
    (SECTION_SYSTEM, "ro.build.fingerprint", "构建指纹"),
    (SECTION_HARDWARE, "ro.hardware", "硬件平台"),
    (SECTION_HARDWARE, "ro.board.platform", "主板平台"),
    (SECTION_HARDWARE, "ro.soc.manufacturer", "SoC 厂商"),
    (SECTION_HARDWARE, "ro.soc.model", "SoC 型号"),
    (SECTION_HARDWARE, "ro.product.cpu.abi", "CPU ABI"),
    (SECTION_HARDWARE, "ro.product.cpu.abilist", "支持的 ABI"),
    (SECTION_HARDWARE, "ro.sf.lcd_density", "屏幕密度"),
    (SECTION_LOCALE, "persist.sys.locale", "系统语言"),
    (SECTION_LOCALE, "persist.sys.timezone", "时区"),
    (SECTION_LOCALE, "gsm.operator.alpha", "运营商"),
    (SECTION_LOCALE, "gsm.network.type", "网络类型"),
];

/// Prefix groups for the full property dump. First match wins.
const PREFIX_GROUPS: &[(&str, &[&str])] = &[
    ("产品", &["ro.product."]),
    ("构建", &["ro.build.", "ro.system.build.", "ro.vendor.build."]),
    ("启动", &["ro.boot.", "ro.bootloader", "ro.bootmode", "ro.bootimage."]),
    ("硬件", &["ro.hardware", "ro.board.", "ro.soc.", "ro.chipname", "ro.revision"]),
    ("虚拟机", &["dalvik.", "ro.dalvik.", "persist.sys.dalvik."]),
    ("显示", &["ro.sf.", "debug.hwui.", "ro.surface_flinger.", "debug.sf."]),
    ("网络", &["gsm.", "net.", "wifi.", "ro.telephony.", "ro.wifi."]),
    ("系统服务", &["init.svc.", "ro.boottime."]),
    ("持久化属性", &["persist."]),
    ("系统状态", &["sys.", "ro.sys.", "vold."]),
];

pub struct GetpropParser {
    re_line: Regex,
}

impl Default for GetpropParser {
    fn default() -> Self {
        Self {
            re_line: Regex::new(r"^\s*\[([^\]]+)\]\s*:\s*\[(.*)\]\s*$").unwrap(),
        }
    }
}

impl GetpropParser {
    /// `[key]: [value]` lines into a sorted map. Lines in any other shape are ignored;
    /// multi-line values keep only their first line.
    pub fn parse_map(&self, raw: &str) -> BTreeMap<String, String> {
        raw.lines()
            .filter_map(|line| self.re_line.captures(line))
            .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect()
    }
}

pub fn parse_getprop_map(raw: &str) -> BTreeMap<String, String> {
    GetpropParser::default().parse_map(raw)
}

/// Curated device-info sections. Keys outside the curated table are dropped, and sections
/// with no known key are omitted.
pub fn parse_get_prop(raw: &str) -> Vec<DeviceInfoSection> {
    let props = parse_getprop_map(raw);
    curated_sections(&props)
}

pub fn curated_sections(props: &BTreeMap<String, String>) -> Vec<DeviceInfoSection> {
    let mut sections: Vec<DeviceInfoSection> = Vec::new();
    for (title, key, label) in CURATED_PROPS {
        let Some(value) = props.get(*key).filter(|value| !value.is_empty()) else {
            continue;
        };
        let index = match sections.iter().position(|section| section.title == *title) {
            Some(index) => index,
            None => {
                sections.push(DeviceInfoSection::new(*title));
                sections.len() - 1
            }
        };
        sections[index].items.push(DeviceInfoItem::new(*label, value.clone()));
    }
    sections
}

fn group_of(key: &str) -> &'static str {
    PREFIX_GROUPS
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|prefix| key.starts_with(prefix)))
        .map(|(title, _)| *title)
        .unwrap_or(SECTION_OTHER)
}

/// Every property grouped by key prefix, leftovers under `其他`. Items use the raw key as label.
pub fn categorize_getprop(raw: &str) -> Vec<DeviceInfoSection> {
    let props = parse_getprop_map(raw);
    let mut grouped: BTreeMap<&'static str, Vec<DeviceInfoItem>> = BTreeMap::new();
    for (key, value) in &props {
        grouped
            .entry(group_of(key))
            .or_default()
            .push(DeviceInfoItem::new(key.clone(), value.clone()));
    }

    let order = PREFIX_GROUPS
        .iter()
        .map(|(title, _)| *title)
        .chain(std::iter::once(SECTION_OTHER));
    order
        .filter_map(|title| {
            grouped.remove(title).map(|items| DeviceInfoSection {
                title: title.to_string(),
                items,
            })
        })
        .collect()
}
