use std::collections::BTreeMap;

use crate::app::models::{CpuCore, CpuInfo, DeviceInfoItem, DeviceInfoSection};

pub const UNKNOWN: &str = "未知";
pub const SECTION_CPU: &str = "CPU 信息";
pub const SECTION_CORES: &str = "CPU 核心";

fn parse_hex(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).ok()
}

/// Vendor behind a `CPU implementer` code.
pub fn implementer_name(code: &str) -> Option<&'static str> {
    let name = match parse_hex(code)? {
        0x41 => "ARM",
        0x42 => "Broadcom",
        0x43 => "Cavium",
        0x44 => "DEC",
        0x46 => "Fujitsu",
        0x48 => "HiSilicon",
        0x4e => "NVIDIA",
        0x50 => "APM",
        0x51 => "Qualcomm",
        0x53 => "Samsung",
        0x56 => "Marvell",
        0x61 => "Apple",
        0x66 => "Faraday",
        0x69 => "Intel",
        0x6d => "Microsoft",
        0xc0 => "Ampere",
        _ => return None,
    };
    Some(name)
}

/// Core name for an `(implementer, part)` pair.
pub fn core_part_name(implementer: &str, part: &str) -> Option<&'static str> {
    let name = match (parse_hex(implementer)?, parse_hex(part)?) {
        (0x41, 0xd01) => "Cortex-A32",
        (0x41, 0xd03) => "Cortex-A53",
        (0x41, 0xd04) => "Cortex-A35",
        (0x41, 0xd05) => "Cortex-A55",
        (0x41, 0xd07) => "Cortex-A57",
        (0x41, 0xd08) => "Cortex-A72",
        (0x41, 0xd09) => "Cortex-A73",
        (0x41, 0xd0a) => "Cortex-A75",
        (0x41, 0xd0b) => "Cortex-A76",
        (0x41, 0xd0c) => "Neoverse-N1",
        (0x41, 0xd0d) => "Cortex-A77",
        (0x41, 0xd41) => "Cortex-A78",
        (0x41, 0xd44) => "Cortex-X1",
        (0x41, 0xd46) => "Cortex-A510",
        (0x41, 0xd47) => "Cortex-A710",
        (0x41, 0xd48) => "Cortex-X2",
        (0x41, 0xd4d) => "Cortex-A715",
        (0x41, 0xd4e) => "Cortex-X3",
        (0x41, 0xd80) => "Cortex-A520",
        (0x41, 0xd81) => "Cortex-A720",
        (0x41, 0xd82) => "Cortex-X4",
        (0x51, 0x201 | 0x205 | 0x211) => "Kryo",
        (0x51, 0x800) => "Kryo 2XX Gold",
        (0x51, 0x801) => "Kryo 2XX Silver",
        (0x51, 0x802) => "Kryo 3XX Gold",
        (0x51, 0x803) => "Kryo 3XX Silver",
        (0x51, 0x804) => "Kryo 4XX Gold",
        (0x51, 0x805) => "Kryo 4XX Silver",
        (0x53, 0x001) => "Exynos M1",
        (0x53, 0x002) => "Exynos M3",
        (0x53, 0x003) => "Exynos M4",
        (0x53, 0x004) => "Exynos M5",
        _ => return None,
    };
    Some(name)
}

fn finish_core(fields: &BTreeMap<String, String>) -> Option<CpuCore> {
    let processor = fields.get("processor")?.parse::<u32>().ok()?;
    let get = |key: &str| fields.get(key).cloned().filter(|value| !value.is_empty());

    let implementer = get("CPU implementer");
    let part = get("CPU part");
    let vendor = implementer
        .as_deref()
        .and_then(implementer_name)
        .unwrap_or(UNKNOWN)
        .to_string();
    let core_name = match (implementer.as_deref(), part.as_deref()) {
        (Some(implementer), Some(part)) => core_part_name(implementer, part),
        _ => None,
    }
    .unwrap_or(UNKNOWN)
    .to_string();

    Some(CpuCore {
        processor,
        implementer,
        vendor,
        architecture: get("CPU architecture"),
        variant: get("CPU variant"),
        part,
        core_name,
        revision: get("CPU revision"),
        bogomips: get("BogoMIPS").or_else(|| get("bogomips")),
        features: fields
            .get("Features")
            .map(|features| features.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

fn flush_stanza(stanza: &mut BTreeMap<String, String>, info: &mut CpuInfo) {
    if stanza.is_empty() {
        return;
    }
    if let Some(core) = finish_core(stanza) {
        info.processors.push(core);
    } else if !stanza.contains_key("processor") {
        for (key, value) in stanza.iter() {
            if key == "Hardware" {
                info.hardware = Some(value.clone());
            }
            info.extra.push(DeviceInfoItem::new(key.clone(), value.clone()));
        }
    }
    stanza.clear();
}

/// Parses `/proc/cpuinfo`. Stanzas with a `processor` key become cores; every other key
/// is kept in `extra`, and `Hardware` is also surfaced on its own.
pub fn parse_cpuinfo(raw: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut stanza: BTreeMap<String, String> = BTreeMap::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            flush_stanza(&mut stanza, &mut info);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        // Some kernels print one stanza per core without blank lines in between.
        if key == "processor" && stanza.contains_key("processor") {
            flush_stanza(&mut stanza, &mut info);
        }
        stanza.insert(key.to_string(), value.trim().to_string());
    }
    flush_stanza(&mut stanza, &mut info);
    info
}

fn revision_text(core: &CpuCore) -> Option<String> {
    let variant = parse_hex(core.variant.as_deref()?)?;
    let revision = core.revision.as_deref()?.trim().parse::<u32>().ok()?;
    Some(format!("r{variant}p{revision}"))
}

/// `4 × Cortex-A55, 3 × Cortex-A78, 1 × Cortex-X1` in first-seen order.
pub fn core_layout(cores: &[CpuCore]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for core in cores {
        match counts.iter_mut().find(|(name, _)| *name == core.core_name) {
            Some((_, count)) => *count += 1,
            None => counts.push((core.core_name.as_str(), 1)),
        }
    }
    counts
        .iter()
        .map(|(name, count)| format!("{count} × {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn cpuinfo_sections(info: &CpuInfo) -> Vec<DeviceInfoSection> {
    let mut overview = DeviceInfoSection::new(SECTION_CPU);
    overview
        .items
        .push(DeviceInfoItem::new("核心数", info.processors.len().to_string()));
    overview.items.push(DeviceInfoItem::new(
        "硬件",
        info.hardware.clone().unwrap_or_else(|| UNKNOWN.to_string()),
    ));
    if !info.processors.is_empty() {
        overview
            .items
            .push(DeviceInfoItem::new("核心组成", core_layout(&info.processors)));
    }
    for item in info.extra.iter().filter(|item| item.label != "Hardware") {
        overview.items.push(item.clone());
    }

    let mut cores = DeviceInfoSection::new(SECTION_CORES);
    for core in &info.processors {
        let mut value = format!("{} {}", core.vendor, core.core_name);
        if let Some(revision) = revision_text(core) {
            value.push_str(&format!(" ({revision})"));
        }
        if let Some(bogomips) = &core.bogomips {
            value.push_str(&format!(", BogoMIPS {bogomips}"));
        }
        cores
            .items
            .push(DeviceInfoItem::new(format!("CPU {}", core.processor), value));
    }

    if cores.items.is_empty() {
        vec![overview]
    } else {
        vec![overview, cores]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "processor\t: 0
BogoMIPS\t: 38.40
Features\t: fp asimd evtstrm aes pmull sha1 sha2 crc32 atomics
CPU implementer\t: 0x41
CPU architecture: 8
CPU variant\t: 0x2
CPU part\t: 0xd05
CPU revision\t: 0

processor\t: 1
BogoMIPS\t: 38.40
CPU implementer\t: 0x41
CPU architecture: 8
CPU variant\t: 0x2
CPU part\t: 0xd05
CPU revision\t: 0

processor\t: 2
BogoMIPS\t: 38.40
CPU implementer\t: 0x41
CPU architecture: 8
CPU variant\t: 0x1
CPU part\t: 0xd41
CPU revision\t: 1

processor\t: 3
CPU implementer\t: 0x99
CPU part\t: 0x123

Hardware\t: Qualcomm Technologies, Inc SM8250
Serial\t\t: 0000000000000000
";

    #[test]
    fn parses_cores_and_hardware() {
        let info = parse_cpuinfo(CPUINFO);
        assert_eq!(info.processors.len(), 4);
        assert_eq!(
            info.hardware.as_deref(),
            Some("Qualcomm Technologies, Inc SM8250")
        );

        let first = &info.processors[0];
        assert_eq!(first.vendor, "ARM");
        assert_eq!(first.core_name, "Cortex-A55");
        assert_eq!(first.features.len(), 9);
        assert_eq!(first.bogomips.as_deref(), Some("38.40"));
        assert_eq!(info.processors[2].core_name, "Cortex-A78");

        let unknown = &info.processors[3];
        assert_eq!(unknown.vendor, UNKNOWN);
        assert_eq!(unknown.core_name, UNKNOWN);

        assert_eq!(info.extra.len(), 2);
    }

    #[test]
    fn lookup_tables() {
        assert_eq!(implementer_name("0x51"), Some("Qualcomm"));
        assert_eq!(implementer_name("0x53"), Some("Samsung"));
        assert_eq!(implementer_name("0xzz"), None);
        assert_eq!(core_part_name("0x41", "0xd05"), Some("Cortex-A55"));
        assert_eq!(core_part_name("0x51", "0x804"), Some("Kryo 4XX Gold"));
        assert_eq!(core_part_name("0x41", "0xfff"), None);
    }

    #[test]
    fn stanzas_without_blank_lines_still_split() {
        let raw = "processor : 0\nCPU implementer : 0x41\nCPU part : 0xd03\nprocessor : 1\nCPU implementer : 0x41\nCPU part : 0xd09\n";
        let info = parse_cpuinfo(raw);
        let names: Vec<&str> = info.processors.iter().map(|c| c.core_name.as_str()).collect();
        assert_eq!(names, vec!["Cortex-A53", "Cortex-A73"]);
        assert_eq!(core_layout(&info.processors), "1 × Cortex-A53, 1 × Cortex-A73");
    }

    #[test]
    fn sections_summarize_layout() {
        let sections = cpuinfo_sections(&parse_cpuinfo(CPUINFO));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].get("核心数"), Some("4"));
        assert_eq!(
            sections[0].get("核心组成"),
            Some("2 × Cortex-A55, 1 × Cortex-A78, 1 × 未知")
        );
        assert_eq!(sections[0].get("Serial"), Some("0000000000000000"));
        assert_eq!(
            sections[1].get("CPU 0"),
            Some("ARM Cortex-A55 (r2p0), BogoMIPS 38.40")
        );
        assert_eq!(sections[1].get("CPU 3"), Some("未知 未知"));
    }

    #[test]
    fn empty_input_is_harmless() {
        let info = parse_cpuinfo("");
        assert!(info.processors.is_empty());
        assert_eq!(core_layout(&info.processors), "");
        let sections = cpuinfo_sections(&info);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].get("硬件"), Some(UNKNOWN));
    }
}
