use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::adb::parse::parse_settings_bool;
use crate::app::adb::runner::ShellGateway;
use crate::app::error::AppError;

/// `IBinder.SYSPROPS_TRANSACTION`, asks every app to re-read `debug.*` properties.
pub const SYSPROPS_POKE_COMMAND: &str = "service call activity 1599295570";

const ANIMATION_SCALES: [&str; 3] = [
    "window_animation_scale",
    "transition_animation_scale",
    "animator_duration_scale",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DevToggle {
    ShowLayoutBounds,
    GpuOverdraw,
    ProfileGpuRendering,
    PointerLocation,
    ShowTaps,
    StayAwake,
    AnimationsOff,
}

impl DevToggle {
    pub const ALL: [DevToggle; 7] = [
        Self::ShowLayoutBounds,
        Self::GpuOverdraw,
        Self::ProfileGpuRendering,
        Self::PointerLocation,
        Self::ShowTaps,
        Self::StayAwake,
        Self::AnimationsOff,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::ShowLayoutBounds => "show_layout_bounds",
            Self::GpuOverdraw => "gpu_overdraw",
            Self::ProfileGpuRendering => "profile_gpu_rendering",
            Self::PointerLocation => "pointer_location",
            Self::ShowTaps => "show_taps",
            Self::StayAwake => "stay_awake",
            Self::AnimationsOff => "animations_off",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().replace('-', "_");
        Self::ALL.into_iter().find(|toggle| toggle.key() == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ShowLayoutBounds => "显示布局边界",
            Self::GpuOverdraw => "调试 GPU 过度绘制",
            Self::ProfileGpuRendering => "GPU 呈现模式分析",
            Self::PointerLocation => "指针位置",
            Self::ShowTaps => "显示点按操作反馈",
            Self::StayAwake => "充电时不锁定屏幕",
            Self::AnimationsOff => "关闭动画",
        }
    }

    /// Toggles backed by `debug.*` system properties need the sysprops poke to take effect.
    pub fn uses_sysprop(&self) -> bool {
        matches!(
            self,
            Self::ShowLayoutBounds | Self::GpuOverdraw | Self::ProfileGpuRendering
        )
    }

    pub fn read_command(&self) -> String {
        match self {
            Self::ShowLayoutBounds => "getprop debug.layout".to_string(),
            Self::GpuOverdraw => "getprop debug.hwui.overdraw".to_string(),
            Self::ProfileGpuRendering => "getprop debug.hwui.profile".to_string(),
            Self::PointerLocation => "settings get system pointer_location".to_string(),
            Self::ShowTaps => "settings get system show_touches".to_string(),
            Self::StayAwake => "settings get global stay_on_while_plugged_in".to_string(),
            Self::AnimationsOff => format!("settings get global {}", ANIMATION_SCALES[0]),
        }
    }

    pub fn write_commands(&self, enabled: bool) -> Vec<String> {
        let flag = if enabled { "1" } else { "0" };
        let mut commands = match self {
            Self::ShowLayoutBounds => vec![format!("setprop debug.layout {enabled}")],
            Self::GpuOverdraw => vec![format!(
                "setprop debug.hwui.overdraw {}",
                if enabled { "show" } else { "false" }
            )],
            Self::ProfileGpuRendering => vec![format!(
                "setprop debug.hwui.profile {}",
                if enabled { "visual_bars" } else { "false" }
            )],
            Self::PointerLocation => vec![format!("settings put system pointer_location {flag}")],
            Self::ShowTaps => vec![format!("settings put system show_touches {flag}")],
            // 7 = AC | USB | wireless.
            Self::StayAwake => vec![format!(
                "settings put global stay_on_while_plugged_in {}",
                if enabled { "7" } else { "0" }
            )],
            Self::AnimationsOff => {
                let scale = if enabled { "0" } else { "1" };
                ANIMATION_SCALES
                    .iter()
                    .map(|name| format!("settings put global {name} {scale}"))
                    .collect()
            }
        };
        if self.uses_sysprop() {
            commands.push(SYSPROPS_POKE_COMMAND.to_string());
        }
        commands
    }
}

/// Interprets the output of [`DevToggle::read_command`]. Unset values read as off.
pub fn parse_toggle_state(toggle: DevToggle, output: &str) -> bool {
    let value = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    match toggle {
        DevToggle::AnimationsOff => value
            .parse::<f64>()
            .map(|scale| scale == 0.0)
            .unwrap_or(false),
        _ => parse_settings_bool(value).unwrap_or(false),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleState {
    pub toggle: DevToggle,
    pub label: String,
    pub enabled: bool,
}

pub fn read_toggles(gateway: &dyn ShellGateway, trace_id: &str) -> Result<Vec<ToggleState>, AppError> {
    DevToggle::ALL
        .iter()
        .map(|toggle| {
            let output = gateway.shell(&toggle.read_command(), trace_id)?;
            Ok(ToggleState {
                toggle: *toggle,
                label: toggle.label().to_string(),
                enabled: parse_toggle_state(*toggle, &output),
            })
        })
        .collect()
}

pub fn apply_toggle(
    gateway: &dyn ShellGateway,
    toggle: DevToggle,
    enabled: bool,
    trace_id: &str,
) -> Result<(), AppError> {
    for command in toggle.write_commands(enabled) {
        let output = gateway.shell(&command, trace_id)?;
        if output.contains("Permission denial") || output.contains("SecurityException") {
            warn!(trace_id = %trace_id, command = %command, "developer option write rejected");
            return Err(AppError::dependency(
                format!("Device rejected {command}: {}", output.trim()),
                trace_id,
            ));
        }
    }
    info!(trace_id = %trace_id, toggle = ?toggle, enabled, "developer option updated");
    Ok(())
}
