use regex::Regex;
use tracing::warn;

use crate::app::error::AppError;

use super::fps::{stream_key, FpsTracker};
use super::models::{
    format_name, CameraClientInfo, CameraData, CameraDeviceInfo, CameraEventLog, CameraEventType,
    CameraStream, FrameStats, StreamConfig, StreamDirection,
};

const PREVIOUS_SESSION: &str = "previous open session";

/// Removes every `*** ... previous open session ... ***` block, delimiters included.
///
/// A start marker without a matching end marker strips everything after it. Text with
/// no start marker is returned unchanged, so applying the filter twice is a no-op.
pub fn strip_previous_sessions(text: &str) -> String {
    let is_marker = |line: &str| {
        let trimmed = line.trim();
        trimmed.starts_with("***") && trimmed.to_lowercase().contains(PREVIOUS_SESSION)
    };
    let is_end = |line: &str| is_marker(line) && line.to_lowercase().contains("end");

    if !text.lines().any(|line| is_marker(line) && !is_end(line)) {
        return text.to_string();
    }

    let mut kept = String::with_capacity(text.len());
    let mut skipping = false;
    for line in text.split_inclusive('\n') {
        if skipping {
            if is_end(line) {
                skipping = false;
            }
            continue;
        }
        if is_marker(line) && !is_end(line) {
            skipping = true;
            continue;
        }
        kept.push_str(line);
    }
    kept
}

fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse::<u64>().ok(),
    }
}

fn normalize_fps(value: f64) -> f64 {
    // Camera1 parameters report fps ranges scaled by 1000.
    if value >= 1000.0 {
        value / 1000.0
    } else {
        value
    }
}

pub struct CameraParser {
    tracker: FpsTracker,
    re_connect: Regex,
    re_died: Regex,
    re_device_marker: Regex,
    re_device_count: Regex,
    re_stream_marker: Regex,
    re_client_pid: Regex,
    re_client_package: Regex,
    re_client_priority: Regex,
    re_camera_state: Regex,
    re_device_status: Regex,
    re_preview_size: Regex,
    re_picture_size: Regex,
    re_video_size: Regex,
    re_fps_range: Regex,
    re_consumer: Regex,
    re_dims: Regex,
    re_format: Regex,
    re_dataspace: Regex,
    re_rotation: Regex,
    re_usage: Regex,
    re_frames: Regex,
}

impl Default for CameraParser {
    fn default() -> Self {
        Self::new(10)
    }
}

impl CameraParser {
    pub fn new(max_idle_polls: u32) -> Self {
        Self {
            tracker: FpsTracker::new(max_idle_polls),
            re_connect: Regex::new(
                r"(\d{2}-\d{2} \d{2}:\d{2}:\d{2})(?:\.\d+)?\s*:\s*(CONNECT|DISCONNECT) device (\S+) client for package (\S+) \(PID (\d+)\)",
            )
            .unwrap(),
            re_died: Regex::new(
                r"(\d{2}-\d{2} \d{2}:\d{2}:\d{2})(?:\.\d+)?\s*:\s*DIED client\(s\) with PID (\d+), reason: \((.*)\)",
            )
            .unwrap(),
            re_device_marker: Regex::new(r"== Camera device (\S+) dynamic info: ==").unwrap(),
            re_device_count: Regex::new(r"Number of camera devices:\s*(\d+)").unwrap(),
            re_stream_marker: Regex::new(r"Stream\[(\d+)\]:\s*(\w+)").unwrap(),
            re_client_pid: Regex::new(r"Client PID:\s*(\d+)").unwrap(),
            re_client_package: Regex::new(r"Client package:\s*(\S+)").unwrap(),
            re_client_priority: Regex::new(
                r"Client priority score:\s*(-?\d+)(?:\s+state:\s*(-?\d+))?",
            )
            .unwrap(),
            re_camera_state: Regex::new(
                r"(?m)^\s*(?:Camera state|Current state|State):\s*([A-Z][A-Z_]*)\s*$",
            )
            .unwrap(),
            re_device_status: Regex::new(r"Device status:\s*(\S+)").unwrap(),
            re_preview_size: Regex::new(r"(?i)preview[ _-]?size\s*[:=]\s*(\d+)\s*x\s*(\d+)")
                .unwrap(),
            re_picture_size: Regex::new(
                r"(?i)(?:picture|capture|still)[ _-]?size\s*[:=]\s*(\d+)\s*x\s*(\d+)",
            )
            .unwrap(),
            re_video_size: Regex::new(r"(?i)video[ _-]?size\s*[:=]\s*(\d+)\s*x\s*(\d+)").unwrap(),
            re_fps_range: Regex::new(
                r"(?i)fps[ _-]?range\s*[:=]\s*[\[(]?\s*(\d+)\s*[-,]\s*(\d+)",
            )
            .unwrap(),
            re_consumer: Regex::new(r"Consumer name:\s*([^\r\n]*)").unwrap(),
            re_dims: Regex::new(r"Dims:\s*(\d+)\s*x\s*(\d+)").unwrap(),
            re_format: Regex::new(r"format\s+(0[xX][0-9a-fA-F]+|\d+)").unwrap(),
            re_dataspace: Regex::new(r"dataspace\s+(0[xX][0-9a-fA-F]+|\d+)").unwrap(),
            re_rotation: Regex::new(r"(?i)rotation:\s*(-?\d+)").unwrap(),
            re_usage: Regex::new(r"(?i)usage:\s*(0[xX][0-9a-fA-F]+|\d+)").unwrap(),
            re_frames: Regex::new(r"Frames produced:\s*(\d+),\s*last timestamp:\s*(\d+)\s*ns")
                .unwrap(),
        }
    }

    pub fn tracker(&self) -> &FpsTracker {
        &self.tracker
    }

    /// Parses `dumpsys media.camera` using the wall clock for FPS deltas.
    pub fn parse(&mut self, raw: &str, trace_id: &str) -> CameraData {
        self.parse_at(raw, chrono::Utc::now().timestamp_millis(), trace_id)
    }

    /// Best-effort parse: any failure is logged and yields an empty `CameraData`.
    pub fn parse_at(&mut self, raw: &str, now_ms: i64, trace_id: &str) -> CameraData {
        self.tracker.begin_poll();
        let data = match self.try_parse(raw, now_ms, trace_id) {
            Ok(data) => data,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to parse dumpsys media.camera");
                CameraData::default()
            }
        };
        self.tracker.evict_idle();
        data
    }

    fn try_parse(&mut self, raw: &str, now_ms: i64, trace_id: &str) -> Result<CameraData, AppError> {
        let event_logs = self.parse_event_logs(raw);
        let text = strip_previous_sessions(raw);
        let device_count = self
            .re_device_count
            .captures(&text)
            .and_then(|caps| caps[1].parse::<u32>().ok());

        let markers: Vec<(usize, usize, String)> = self
            .re_device_marker
            .captures_iter(&text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), caps[1].to_string()))
            })
            .collect();

        let mut device_info_list = Vec::with_capacity(markers.len());
        for (index, (_, body_start, device_id)) in markers.iter().enumerate() {
            let body_end = markers
                .get(index + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(text.len());
            let block = text.get(*body_start..body_end).ok_or_else(|| {
                AppError::parse(format!("camera device {device_id} block out of range"), trace_id)
            })?;
            device_info_list.push(self.parse_device(device_id, block, now_ms));
        }

        Ok(CameraData {
            device_count,
            event_logs,
            device_info_list,
        })
    }

    fn parse_event_logs(&self, raw: &str) -> Vec<CameraEventLog> {
        let mut logs = Vec::new();
        for line in raw.lines() {
            if let Some(caps) = self.re_connect.captures(line) {
                logs.push(CameraEventLog {
                    timestamp: caps[1].to_string(),
                    event_type: CameraEventType::from_keyword(&caps[2]),
                    device_id: Some(caps[3].to_string()),
                    package_name: caps[4].to_string(),
                    pid: caps[5].parse::<u32>().ok(),
                    reason: String::new(),
                });
            } else if let Some(caps) = self.re_died.captures(line) {
                logs.push(CameraEventLog {
                    timestamp: caps[1].to_string(),
                    event_type: CameraEventType::Died,
                    device_id: None,
                    package_name: String::new(),
                    pid: caps[2].parse::<u32>().ok(),
                    reason: caps[3].trim().to_string(),
                });
            }
        }
        logs
    }

    fn parse_device(&mut self, device_id: &str, block: &str, now_ms: i64) -> CameraDeviceInfo {
        if block.contains(&format!("Device {device_id} is closed")) {
            return CameraDeviceInfo {
                device_id: device_id.to_string(),
                is_open: false,
                ..CameraDeviceInfo::default()
            };
        }

        let client_info = self.parse_client(block);
        let camera_state = self
            .re_camera_state
            .captures(block)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        let device_status = self
            .re_device_status
            .captures(block)
            .map(|caps| caps[1].trim_end_matches(',').to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let stream_list = self.parse_streams(device_id, block, now_ms);
        let total_frames = stream_list
            .iter()
            .fold(0u64, |acc, stream| acc.saturating_add(stream.frames_produced));
        let current_fps = if stream_list.is_empty() {
            0.0
        } else {
            stream_list.iter().map(|s| s.calculated_fps).sum::<f64>() / stream_list.len() as f64
        };

        let fps_range = self.re_fps_range.captures(block).map(|caps| {
            let low = caps[1].parse::<f64>().map(normalize_fps).unwrap_or(0.0);
            let high = caps[2].parse::<f64>().map(normalize_fps).unwrap_or(0.0);
            (low, high)
        });
        let sized = |re: &Regex, fps: Option<(f64, f64)>| {
            re.captures(block).map(|caps| {
                let (fps_min, fps_max) = fps.unwrap_or((0.0, 0.0));
                StreamConfig {
                    width: caps[1].parse().unwrap_or(0),
                    height: caps[2].parse().unwrap_or(0),
                    fps_min,
                    fps_max,
                }
            })
        };
        let preview_config = sized(&self.re_preview_size, fps_range)
            .or_else(|| infer_config(&stream_list, is_preview_stream));
        let capture_config = sized(&self.re_picture_size, None)
            .or_else(|| infer_config(&stream_list, is_capture_stream));
        let video_config = sized(&self.re_video_size, fps_range)
            .or_else(|| infer_config(&stream_list, is_video_stream));

        CameraDeviceInfo {
            device_id: device_id.to_string(),
            is_open: true,
            client_info,
            camera_state,
            preview_config,
            capture_config,
            video_config,
            stream_list,
            frame_stats: FrameStats {
                total_frames,
                current_fps,
                device_status,
            },
        }
    }

    fn parse_client(&self, block: &str) -> Option<CameraClientInfo> {
        let pid = self
            .re_client_pid
            .captures(block)
            .and_then(|caps| caps[1].parse::<u32>().ok());
        let package_name = self
            .re_client_package
            .captures(block)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        let priority = self.re_client_priority.captures(block);
        let priority_score = priority
            .as_ref()
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse::<i32>().ok());
        let state = priority
            .as_ref()
            .and_then(|caps| caps.get(2))
            .and_then(|value| value.as_str().parse::<i32>().ok());

        if pid.is_none() && package_name.is_empty() && priority_score.is_none() {
            return None;
        }
        Some(CameraClientInfo {
            pid,
            package_name,
            priority_score,
            state,
        })
    }

    fn parse_streams(&mut self, device_id: &str, block: &str, now_ms: i64) -> Vec<CameraStream> {
        let markers: Vec<(usize, u32, StreamDirection)> = self
            .re_stream_marker
            .captures_iter(block)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let stream_id = caps[1].parse::<u32>().ok()?;
                Some((start, stream_id, StreamDirection::from_label(&caps[2])))
            })
            .collect();

        let mut streams = Vec::with_capacity(markers.len());
        for (index, (start, stream_id, direction)) in markers.iter().enumerate() {
            let end = markers
                .get(index + 1)
                .map(|(next, _, _)| *next)
                .unwrap_or(block.len());
            let Some(section) = block.get(*start..end) else {
                continue;
            };
            let mut stream = self.parse_stream(*stream_id, *direction, section);
            stream.calculated_fps =
                self.tracker
                    .observe(&stream_key(device_id, *stream_id), stream.frames_produced, now_ms);
            streams.push(stream);
        }
        streams
    }

    fn parse_stream(&self, stream_id: u32, direction: StreamDirection, section: &str) -> CameraStream {
        let consumer_name = self
            .re_consumer
            .captures(section)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_default();
        let (width, height) = self
            .re_dims
            .captures(section)
            .map(|caps| (caps[1].parse().unwrap_or(0), caps[2].parse().unwrap_or(0)))
            .unwrap_or((0, 0));
        let hex_field = |re: &Regex| {
            re.captures(section)
                .and_then(|caps| parse_number(&caps[1]))
                .unwrap_or(0)
        };
        let format = hex_field(&self.re_format) as u32;
        let data_space = hex_field(&self.re_dataspace) as u32;
        let usage = hex_field(&self.re_usage);
        let rotation = self
            .re_rotation
            .captures(section)
            .and_then(|caps| caps[1].parse::<i32>().ok())
            .unwrap_or(0);
        let (frames_produced, last_timestamp) = self
            .re_frames
            .captures(section)
            .map(|caps| (caps[1].parse().unwrap_or(0), caps[2].parse().unwrap_or(0)))
            .unwrap_or((0, 0));

        CameraStream {
            stream_id,
            direction,
            consumer_name,
            width,
            height,
            format,
            format_name: format_name(format),
            data_space,
            rotation,
            usage,
            frames_produced,
            last_timestamp,
            calculated_fps: 0.0,
        }
    }
}

fn is_preview_stream(stream: &CameraStream) -> bool {
    stream.format == 0x22 && !is_video_stream(stream)
}

fn is_capture_stream(stream: &CameraStream) -> bool {
    stream.format == 0x21
}

fn is_video_stream(stream: &CameraStream) -> bool {
    let consumer = stream.consumer_name.to_lowercase();
    consumer.contains("encoder") || consumer.contains("mediacodec") || consumer.contains("video")
}

fn infer_config(streams: &[CameraStream], matches: fn(&CameraStream) -> bool) -> Option<StreamConfig> {
    streams
        .iter()
        .filter(|stream| stream.direction == StreamDirection::Output)
        .find(|stream| matches(stream))
        .map(|stream| StreamConfig {
            width: stream.width,
            height: stream.height,
            fps_min: 0.0,
            fps_max: stream.calculated_fps,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump(preview_frames: u64, capture_frames: u64) -> String {
        format!(
            "== Service global info: ==\n\
\n\
Number of camera devices: 2\n\
Number of normal camera devices: 2\n\
\n\
== Camera service events log (most recent at top): ==\n\
  01-15 10:23:45 : CONNECT device 0 client for package com.example.camera (PID 12345)\n\
  01-15 10:20:11 : DISCONNECT device 1 client for package com.other.app (PID 11000)\n\
  01-15 10:19:00 : DIED client(s) with PID 10999, reason: (Binder died unexpectedly)\n\
  01-15 10:18:00 : USER_SWITCH previous allowed user IDs: <None>, current: 0\n\
\n\
== Camera device 0 dynamic info: ==\n\
  Device 0 is open. Client instance dump:\n\
    Client priority score: 0 state: 2\n\
    Client PID: 12345\n\
    Client package: com.example.camera\n\
    State: PREVIEW\n\
  Device dump:\n\
    Device status: ACTIVE\n\
    Stream configuration:\n\
    Stream[0]: Output\n\
      Consumer name: SurfaceView - com.example.camera/.MainActivity\n\
      State: 4\n\
      Dims: 1920 x 1080, format 0x22, dataspace 0x0\n\
      Max size: 0\n\
      Combined usage: 0x20900, max HAL buffers: 8\n\
      Frames produced: {preview_frames}, last timestamp: 987654321 ns\n\
    Stream[1]: Output\n\
      Consumer name: ImageReader-4000x3000f100m2-12345-0\n\
      Dims: 4000 x 3000, format 0x21, dataspace 0x8c20000\n\
      Rotation: 90\n\
      Frames produced: {capture_frames}, last timestamp: 987654000 ns\n\
    ***** Dumpsys of previous open session *****\n\
    Stream[7]: Output\n\
      Frames produced: 99999, last timestamp: 1 ns\n\
    ***** End of dumpsys of previous open session *****\n\
== Camera device 1 dynamic info: ==\n\
  Device 1 is closed, no client instance\n"
        )
    }

    #[test]
    fn parses_events_devices_and_streams() {
        let mut parser = CameraParser::default();
        let data = parser.parse_at(&dump(300, 2), 10_000, "t");

        assert_eq!(data.device_count, Some(2));
        assert_eq!(data.event_logs.len(), 3);
        assert_eq!(data.event_logs[0].event_type, CameraEventType::Connect);
        assert_eq!(data.event_logs[0].device_id.as_deref(), Some("0"));
        assert_eq!(data.event_logs[0].pid, Some(12345));
        assert_eq!(data.event_logs[1].event_type, CameraEventType::Disconnect);
        assert_eq!(data.event_logs[2].event_type, CameraEventType::Died);
        assert_eq!(data.event_logs[2].reason, "Binder died unexpectedly");
        assert_eq!(data.event_logs[2].timestamp, "01-15 10:19:00");

        assert_eq!(data.device_info_list.len(), 2);
        let open = &data.device_info_list[0];
        assert!(open.is_open);
        assert_eq!(open.camera_state, "PREVIEW");
        let client = open.client_info.as_ref().expect("client");
        assert_eq!(client.pid, Some(12345));
        assert_eq!(client.package_name, "com.example.camera");
        assert_eq!(client.priority_score, Some(0));
        assert_eq!(client.state, Some(2));

        // The previous-session stream must not surface.
        let ids: Vec<u32> = open.stream_list.iter().map(|s| s.stream_id).collect();
        assert_eq!(ids, vec![0, 1]);
        let preview = &open.stream_list[0];
        assert_eq!(preview.direction, StreamDirection::Output);
        assert_eq!((preview.width, preview.height), (1920, 1080));
        assert_eq!(preview.format_name, "IMPLEMENTATION_DEFINED");
        assert_eq!(preview.usage, 0x20900);
        assert_eq!(preview.frames_produced, 300);
        assert_eq!(preview.last_timestamp, 987654321);
        let capture = &open.stream_list[1];
        assert_eq!(capture.rotation, 90);
        assert_eq!(capture.data_space, 0x8c20000);
        assert_eq!(open.frame_stats.total_frames, 302);
        assert_eq!(open.frame_stats.device_status, "ACTIVE");

        let closed = &data.device_info_list[1];
        assert!(!closed.is_open);
        assert!(closed.stream_list.is_empty());
        assert!(closed.client_info.is_none());
    }

    #[test]
    fn fps_is_derived_across_polls() {
        let mut parser = CameraParser::default();
        let first = parser.parse_at(&dump(300, 2), 10_000, "t");
        assert_eq!(first.device_info_list[0].stream_list[0].calculated_fps, 0.0);

        let second = parser.parse_at(&dump(390, 2), 13_000, "t");
        let device = &second.device_info_list[0];
        assert_eq!(device.stream_list[0].calculated_fps, 30.0);
        assert_eq!(device.stream_list[1].calculated_fps, 0.0);
        assert_eq!(device.frame_stats.current_fps, 15.0);

        // Preview config is inferred from the IMPLEMENTATION_DEFINED stream.
        let preview = device.preview_config.expect("preview");
        assert_eq!((preview.width, preview.height), (1920, 1080));
        assert_eq!(preview.fps_max, 30.0);
        let capture = device.capture_config.expect("capture");
        assert_eq!((capture.width, capture.height), (4000, 3000));
        assert!(device.video_config.is_none());

        let reset = parser.parse_at(&dump(5, 2), 16_000, "t");
        assert_eq!(reset.device_info_list[0].stream_list[0].calculated_fps, 0.0);
    }

    #[test]
    fn explicit_sizes_and_fps_range_win() {
        let mut parser = CameraParser::default();
        let raw = "== Camera device 0 dynamic info: ==\n  Device 0 is open.\n    Preview size: 1280 x 720\n    FPS range: 15000 - 30000\n    Picture size: 4032 x 3024\n    Video size: 1920 x 1080\n";
        let data = parser.parse_at(raw, 0, "t");
        let device = &data.device_info_list[0];
        let preview = device.preview_config.expect("preview");
        assert_eq!((preview.width, preview.height), (1280, 720));
        assert_eq!((preview.fps_min, preview.fps_max), (15.0, 30.0));
        let capture = device.capture_config.expect("capture");
        assert_eq!((capture.width, capture.fps_max), (4032, 0.0));
        let video = device.video_config.expect("video");
        assert_eq!((video.height, video.fps_max), (1080, 30.0));
        assert!(device.client_info.is_none());
        assert_eq!(device.frame_stats.device_status, "UNKNOWN");
    }

    #[test]
    fn previous_session_filter_is_idempotent() {
        let text = "keep 1\n*** previous open session ***\ndrop\n*** End of previous open session ***\nkeep 2\n";
        let once = strip_previous_sessions(text);
        assert_eq!(once, "keep 1\nkeep 2\n");
        assert_eq!(strip_previous_sessions(&once), once);

        let untouched = "no markers here\n*** End of previous open session ***\n";
        assert_eq!(strip_previous_sessions(untouched), untouched);

        let unterminated = "keep\n*** previous open session ***\nstale\n";
        assert_eq!(strip_previous_sessions(unterminated), "keep\n");
    }

    #[test]
    fn empty_or_garbage_input_yields_empty_data() {
        let mut parser = CameraParser::default();
        assert_eq!(parser.parse_at("", 0, "t"), CameraData::default());
        let garbage = parser.parse_at("Can't find service: media.camera\n", 0, "t");
        assert!(garbage.device_info_list.is_empty());
        assert!(garbage.event_logs.is_empty());
    }

    #[test]
    fn stale_streams_are_evicted_from_the_tracker() {
        let mut parser = CameraParser::new(1);
        parser.parse_at(&dump(1, 1), 0, "t");
        assert!(parser.tracker().contains("device_0_stream_1"));
        parser.parse_at("", 1000, "t");
        parser.parse_at("", 2000, "t");
        assert!(parser.tracker().is_empty());
    }
}
