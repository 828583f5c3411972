use tracing::warn;

use crate::app::error::AppError;
use crate::app::models::{GfxFrameStats, GfxInfo, GfxWindowStats};

const WINDOW_PREFIX: &str = "Window:";

/// Parses `dumpsys gfxinfo <package>`. Never fails: unreadable input yields the default value.
pub fn parse_gfxinfo(raw: &str, trace_id: &str) -> GfxInfo {
    match try_parse_gfxinfo(raw, trace_id) {
        Ok(info) => info,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to parse gfxinfo");
            GfxInfo::default()
        }
    }
}

fn try_parse_gfxinfo(raw: &str, trace_id: &str) -> Result<GfxInfo, AppError> {
    let mut info = GfxInfo::default();
    if raw.trim().is_empty() {
        return Ok(info);
    }

    let mut header_lines: Vec<&str> = Vec::new();
    let mut windows: Vec<(String, Vec<&str>)> = Vec::new();
    let mut gpu_memory_pending = false;

    for line in raw.lines() {
        let trimmed = line.trim();

        if gpu_memory_pending {
            if !trimmed.is_empty() {
                info.gpu_memory_bytes = leading_number(trimmed).unwrap_or(0);
                gpu_memory_pending = false;
            }
            continue;
        }

        if let Some((pid, package_name)) = parse_process_header(trimmed) {
            info.pid = Some(pid);
            info.package_name = package_name;
            continue;
        }
        if let Some(name) = trimmed.strip_prefix(WINDOW_PREFIX) {
            windows.push((name.trim().to_string(), Vec::new()));
            continue;
        }
        if trimmed.starts_with("Total GPU memory usage:") {
            gpu_memory_pending = true;
            continue;
        }
        if let Some(value) = field_value(trimmed, "Total ViewRootImpl") {
            info.view_root_count = leading_number(value).unwrap_or(0) as u32;
            continue;
        }
        if let Some(value) = field_value(trimmed, "Total attached Views") {
            info.total_views = leading_number(value).unwrap_or(0) as u32;
            continue;
        }

        match windows.last_mut() {
            Some((_, lines)) => lines.push(trimmed),
            None => header_lines.push(trimmed),
        }
    }

    if info.package_name.is_empty() && info.pid.is_none() && header_lines.iter().all(|l| l.is_empty()) {
        return Err(AppError::parse("gfxinfo output has no graphics section", trace_id));
    }

    info.summary = parse_frame_stats(&header_lines);
    info.windows = windows
        .into_iter()
        .map(|(name, lines)| GfxWindowStats {
            name,
            stats: parse_frame_stats(&lines),
        })
        .collect();
    Ok(info)
}

/// `** Graphics info for pid 12345 [com.example] **`
fn parse_process_header(line: &str) -> Option<(u32, String)> {
    let rest = line.strip_prefix("** Graphics info for pid ")?;
    let (pid, rest) = rest.split_once(' ')?;
    let pid = pid.parse::<u32>().ok()?;
    let start = rest.find('[')?;
    let end = rest[start..].find(']')? + start;
    Some((pid, rest[start + 1..end].to_string()))
}

fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (name, value) = line.split_once(':')?;
    if name.trim() == key {
        Some(value.trim())
    } else {
        None
    }
}

fn leading_number(value: &str) -> Option<u64> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse::<u64>().ok()
}

/// `60 (5.00%)` → 5.0
fn parenthesized_percent(value: &str) -> f64 {
    let Some(start) = value.find('(') else {
        return 0.0;
    };
    value[start + 1..]
        .trim_end_matches(')')
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0)
}

fn parse_frame_stats(lines: &[&str]) -> GfxFrameStats {
    let mut stats = GfxFrameStats::default();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let count = leading_number(value).unwrap_or(0);
        match name.trim() {
            "Total frames rendered" => stats.total_frames = count,
            "Janky frames" => {
                stats.janky_frames = count;
                stats.janky_percent = parenthesized_percent(value);
            }
            "50th percentile" => stats.p50_ms = count as u32,
            "90th percentile" => stats.p90_ms = count as u32,
            "95th percentile" => stats.p95_ms = count as u32,
            "99th percentile" => stats.p99_ms = count as u32,
            "Number Missed Vsync" => stats.missed_vsync = count,
            "Number High input latency" => stats.high_input_latency = count,
            "Number Slow UI thread" => stats.slow_ui_thread = count,
            "Number Slow bitmap uploads" => stats.slow_bitmap_uploads = count,
            "Number Slow issue draw commands" => stats.slow_draw_commands = count,
            "Number Frame deadline missed" => stats.frame_deadline_missed = count,
            _ => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    const GFXINFO: &str = "Applications Graphics Acceleration Info:
Uptime: 3520194 Realtime: 3520194

** Graphics info for pid 12345 [com.example] **

Stats since: 3452190813052ns
Total frames rendered: 1200
Janky frames: 60 (5.00%)
Janky frames (legacy): 41 (3.42%)
50th percentile: 8ms
90th percentile: 13ms
95th percentile: 17ms
99th percentile: 33ms
Number Missed Vsync: 5
Number High input latency: 2
Number Slow UI thread: 10
Number Slow bitmap uploads: 1
Number Slow issue draw commands: 3
Number Frame deadline missed: 20
HISTOGRAM: 5ms=100 6ms=200 7ms=300

Window: com.example/com.example.MainActivity
Stats since: 3452190813052ns
Total frames rendered: 1000
Janky frames: 50 (5.00%)
50th percentile: 8ms
90th percentile: 12ms
95th percentile: 16ms
99th percentile: 30ms
Number Missed Vsync: 4

Window: PopupWindow:4a5b6c
Total frames rendered: 200
Janky frames: 10 (5.00%)

Total GPU memory usage:
  12345678 bytes, 11.77 MB (2.00 MB is purgeable)

Pipeline=Skia (Vulkan)
Profile data in ms:

View hierarchy:

  com.example/com.example.MainActivity/android.view.ViewRootImpl@8f2a1b3
  151 views, 150.55 kB of render nodes

Total ViewRootImpl: 1
Total attached Views: 151
Total RenderNode: 150.55 kB (used) / 300.00 kB (capacity)
";

    #[test]
    fn parses_aggregate_and_windows() {
        let info = parse_gfxinfo(GFXINFO, "trace");
        assert_eq!(info.package_name, "com.example");
        assert_eq!(info.pid, Some(12345));

        let summary = &info.summary;
        assert_eq!(summary.total_frames, 1200);
        assert_eq!(summary.janky_frames, 60);
        assert!((summary.janky_percent - 5.0).abs() < f64::EPSILON);
        assert_eq!(summary.p50_ms, 8);
        assert_eq!(summary.p99_ms, 33);
        assert_eq!(summary.missed_vsync, 5);
        assert_eq!(summary.slow_bitmap_uploads, 1);
        assert_eq!(summary.slow_draw_commands, 3);
        assert_eq!(summary.frame_deadline_missed, 20);

        assert_eq!(info.windows.len(), 2);
        assert_eq!(info.windows[0].name, "com.example/com.example.MainActivity");
        assert_eq!(info.windows[0].stats.total_frames, 1000);
        assert_eq!(info.windows[0].stats.missed_vsync, 4);
        assert_eq!(info.windows[0].stats.slow_ui_thread, 0);
        assert_eq!(info.windows[1].name, "PopupWindow:4a5b6c");
        assert_eq!(info.windows[1].stats.janky_frames, 10);

        assert_eq!(info.gpu_memory_bytes, 12_345_678);
        assert_eq!(info.view_root_count, 1);
        assert_eq!(info.total_views, 151);
    }

    #[test]
    fn legacy_layout_without_windows_uses_summary_only() {
        let raw = "** Graphics info for pid 77 [org.app] **\nTotal frames rendered: 12\nJanky frames: 3 (25.00%)\n";
        let info = parse_gfxinfo(raw, "trace");
        assert_eq!(info.pid, Some(77));
        assert!(info.windows.is_empty());
        assert_eq!(info.summary.total_frames, 12);
        assert!((info.summary.janky_percent - 25.0).abs() < f64::EPSILON);
        assert_eq!(info.summary.p90_ms, 0);
    }

    #[test]
    fn empty_or_unrelated_input_is_default() {
        assert_eq!(parse_gfxinfo("", "trace"), GfxInfo::default());
        assert_eq!(parse_gfxinfo("   \n\n", "trace"), GfxInfo::default());
    }

    #[test]
    fn process_header_parsing() {
        assert_eq!(
            parse_process_header("** Graphics info for pid 9 [a.b] **"),
            Some((9, "a.b".to_string()))
        );
        assert_eq!(parse_process_header("Graphics info"), None);
    }
}
