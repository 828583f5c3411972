use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraEventType {
    Connect,
    Disconnect,
    Died,
    Unknown,
}

impl CameraEventType {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "CONNECT" => Self::Connect,
            "DISCONNECT" => Self::Disconnect,
            "DIED" => Self::Died,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraEventLog {
    /// `MM-DD HH:MM:SS` as printed by the camera service.
    pub timestamp: String,
    pub event_type: CameraEventType,
    pub device_id: Option<String>,
    pub package_name: String,
    pub pid: Option<u32>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraClientInfo {
    pub pid: Option<u32>,
    pub package_name: String,
    pub priority_score: Option<i32>,
    pub state: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps_min: f64,
    pub fps_max: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamDirection {
    Output,
    Input,
    #[default]
    Unknown,
}

impl StreamDirection {
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "output" => Self::Output,
            "input" => Self::Input,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CameraStream {
    pub stream_id: u32,
    #[serde(rename = "type")]
    pub direction: StreamDirection,
    pub consumer_name: String,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub format_name: String,
    pub data_space: u32,
    pub rotation: i32,
    pub usage: u64,
    pub frames_produced: u64,
    pub last_timestamp: u64,
    /// Derived across polls, never scraped.
    pub calculated_fps: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FrameStats {
    pub total_frames: u64,
    pub current_fps: f64,
    pub device_status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CameraDeviceInfo {
    pub device_id: String,
    pub is_open: bool,
    pub client_info: Option<CameraClientInfo>,
    pub camera_state: String,
    pub preview_config: Option<StreamConfig>,
    pub capture_config: Option<StreamConfig>,
    pub video_config: Option<StreamConfig>,
    pub stream_list: Vec<CameraStream>,
    pub frame_stats: FrameStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CameraData {
    pub device_count: Option<u32>,
    pub event_logs: Vec<CameraEventLog>,
    pub device_info_list: Vec<CameraDeviceInfo>,
}

/// Human name of an Android `HAL_PIXEL_FORMAT_*` code.
pub fn format_name(code: u32) -> String {
    let name = match code {
        0x1 => "RGBA_8888",
        0x2 => "RGBX_8888",
        0x3 => "RGB_888",
        0x4 => "RGB_565",
        0x5 => "BGRA_8888",
        0x10 => "YCbCr_422_SP",
        0x11 => "YCrCb_420_SP",
        0x14 => "YCbCr_422_I",
        0x16 => "RGBA_FP16",
        0x20 => "RAW16",
        0x21 => "BLOB",
        0x22 => "IMPLEMENTATION_DEFINED",
        0x23 => "YCbCr_420_888",
        0x24 => "RAW_OPAQUE",
        0x25 => "RAW10",
        0x26 => "RAW12",
        0x2b => "RGBA_1010102",
        0x36 => "YCBCR_P010",
        0x20203859 => "Y8",
        0x32315659 => "YV12",
        0x44363159 => "DEPTH16",
        _ => return format!("UNKNOWN(0x{code:x})"),
    };
    name.to_string()
}
