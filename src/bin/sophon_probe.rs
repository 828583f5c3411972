use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sophon_lib::app::adb::locator::resolve_adb_program_from_env;
use sophon_lib::app::adb::parse::{parse_adb_devices, parse_pm_list_packages};
use sophon_lib::app::adb::runner::{AdbShell, ShellGateway};
use sophon_lib::app::camera::parser::CameraParser;
use sophon_lib::app::companion::{ensure_forward, CompanionClient};
use sophon_lib::app::config::{load_config, AppConfig};
use sophon_lib::app::deeplink::open_deeplink;
use sophon_lib::app::dev_options::{apply_toggle, read_toggles, DevToggle};
use sophon_lib::app::device::info::{ensure_device_info, fetch_all_properties, fetch_device_info};
use sophon_lib::app::error::AppError;
use sophon_lib::app::lifecycle::models::lifecycle_roots;
use sophon_lib::app::logging::init_logging;
use sophon_lib::app::models::DeviceInfo;
use sophon_lib::app::monitor::{
    poll_once, start_monitor, stop_all_monitors, stop_monitor, MonitorEmitter,
    MonitorEvent, MonitorRequest, MonitorSnapshot, MonitorTarget,
};
use sophon_lib::app::state::AppState;
use sophon_lib::app::threads::parse::thread_state_label;
use uuid::Uuid;

const USAGE: &str = "Usage: sophon_probe [--serial SERIAL] [--package PKG] [--json] [--raw] [--watch N] <command>
Commands:
  devices | packages | device-info [--raw: every property]
  threads | camera | lifecycle | gfx
  toggles | toggle <name> <on|off>
  deeplink <uri>
  companion <request>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subcommand {
    Devices,
    Threads,
    Camera,
    Lifecycle,
    Gfx,
    DeviceInfo,
    Packages,
    Toggles,
    Toggle,
    Deeplink,
    Companion,
}

impl Subcommand {
    fn parse(value: &str) -> Option<Self> {
        let command = match value {
            "devices" => Self::Devices,
            "threads" => Self::Threads,
            "camera" => Self::Camera,
            "lifecycle" => Self::Lifecycle,
            "gfx" => Self::Gfx,
            "device-info" => Self::DeviceInfo,
            "packages" => Self::Packages,
            "toggles" => Self::Toggles,
            "toggle" => Self::Toggle,
            "deeplink" => Self::Deeplink,
            "companion" => Self::Companion,
            _ => return None,
        };
        Some(command)
    }

    fn is_monitor(self) -> bool {
        matches!(self, Self::Threads | Self::Camera | Self::Lifecycle | Self::Gfx)
    }
}

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    package: Option<String>,
    json: bool,
    raw: bool,
    watch: Option<u32>,
    command: Subcommand,
    rest: Vec<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut package: Option<String> = None;
    let mut json = false;
    let mut raw = false;
    let mut watch: Option<u32> = None;
    let mut command: Option<Subcommand> = None;
    let mut rest: Vec<String> = Vec::new();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--package" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--package requires a value".to_string())?;
                package = Some(value.trim().to_string());
            }
            "--json" => {
                json = true;
            }
            "--raw" => {
                raw = true;
            }
            "--watch" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--watch requires a value".to_string())?;
                let count = value
                    .parse::<u32>()
                    .map_err(|_| format!("--watch expects a poll count, got {value}"))?;
                watch = Some(count.max(1));
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if command.is_some() => rest.push(other.to_string()),
            other => match Subcommand::parse(other) {
                Some(parsed) => command = Some(parsed),
                None => return Err(format!("Unknown arg: {other}\n{USAGE}")),
            },
        }
    }

    let command = command.ok_or_else(|| USAGE.to_string())?;
    let expected = match command {
        Subcommand::Toggle => 2,
        Subcommand::Deeplink | Subcommand::Companion => 1,
        _ => 0,
    };
    if rest.len() != expected {
        return Err(format!("Unexpected arguments: {}\n{USAGE}", rest.join(" ")));
    }
    Ok(Args {
        serial,
        package,
        json,
        raw,
        watch,
        command,
        rest,
    })
}

fn pick_single_device(adb_program: &str, timeout: Duration, trace_id: &str) -> Result<String, AppError> {
    let shell = AdbShell::new(adb_program, None, timeout);
    let out = shell.host(&["devices", "-l"], trace_id)?;
    let online: Vec<_> = parse_adb_devices(&out.stdout)
        .into_iter()
        .filter(|d| d.is_online())
        .collect();
    match online.len() {
        0 => Err(AppError::dependency("No online adb devices found.", trace_id)),
        1 => Ok(online[0].serial.clone()),
        _ => {
            let serials = online
                .into_iter()
                .map(|d| d.serial)
                .collect::<Vec<_>>()
                .join(", ");
            Err(AppError::validation(
                format!("Multiple online devices found ({serials}). Set ANDROID_SERIAL or pass --serial."),
                trace_id,
            ))
        }
    }
}

fn target_for(args: &Args, trace_id: &str) -> Result<MonitorTarget, AppError> {
    let require_package = || {
        args.package
            .clone()
            .ok_or_else(|| AppError::validation("--package is required for this subcommand", trace_id))
    };
    let target = match args.command {
        Subcommand::Threads => MonitorTarget::Threads {
            package: require_package()?,
        },
        Subcommand::Camera => MonitorTarget::Camera,
        Subcommand::Lifecycle => MonitorTarget::Lifecycle {
            package: args.package.clone(),
        },
        Subcommand::Gfx => MonitorTarget::Gfx {
            package: require_package()?,
        },
        _ => return Err(AppError::validation("Subcommand is not a monitor", trace_id)),
    };
    Ok(target)
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn render_snapshot(snapshot: &MonitorSnapshot) {
    match snapshot {
        MonitorSnapshot::Threads(threads) => {
            let states = threads
                .summary
                .by_state
                .iter()
                .map(|(state, count)| format!("{}: {count}", thread_state_label(state)))
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "{} pid {} - {} threads ({states})",
                threads.package_name,
                threads.pid.map(|pid| pid.to_string()).unwrap_or_default(),
                threads.summary.total
            );
            for thread in threads.threads.iter().skip(1) {
                println!("  {:>6} {:<2} {}", thread.tid, thread.state, thread.cmd);
            }
        }
        MonitorSnapshot::Camera(camera) => {
            if let Some(count) = camera.device_count {
                println!("camera devices: {count}");
            }
            for device in &camera.device_info_list {
                let client = device
                    .client_info
                    .as_ref()
                    .map(|client| client.package_name.as_str())
                    .unwrap_or("-");
                println!(
                    "camera {}: {} client={} streams={} frames={} fps={:.1}",
                    device.device_id,
                    if device.is_open { "open" } else { "closed" },
                    client,
                    device.stream_list.len(),
                    device.frame_stats.total_frames,
                    device.frame_stats.current_fps
                );
                for stream in &device.stream_list {
                    println!(
                        "  stream {} {}x{} {} fps={:.1}",
                        stream.stream_id,
                        stream.width,
                        stream.height,
                        stream.format_name,
                        stream.calculated_fps
                    );
                }
            }
            for event in camera.event_logs.iter().rev().take(5) {
                println!(
                    "  {} {:?} {} {}",
                    event.timestamp,
                    event.event_type,
                    event.device_id.as_deref().unwrap_or("-"),
                    event.package_name
                );
            }
        }
        MonitorSnapshot::Lifecycle(activities) => {
            for root in lifecycle_roots(activities) {
                for node in root.walk() {
                    let marker = if node.is_running() { "*" } else { " " };
                    println!(
                        "{}{marker} {} [{}]",
                        "  ".repeat(node.level() as usize),
                        node.name(),
                        node.state_text()
                    );
                }
            }
        }
        MonitorSnapshot::Gfx(gfx) => {
            let summary = &gfx.summary;
            println!(
                "{} frames={} janky={} ({:.2}%) p50={}ms p90={}ms p95={}ms p99={}ms",
                gfx.package_name,
                summary.total_frames,
                summary.janky_frames,
                summary.janky_percent,
                summary.p50_ms,
                summary.p90_ms,
                summary.p95_ms,
                summary.p99_ms
            );
            for window in &gfx.windows {
                println!(
                    "  {} frames={} janky={} ({:.2}%)",
                    window.name, window.stats.total_frames, window.stats.janky_frames, window.stats.janky_percent
                );
            }
        }
    }
}

fn render_event(event: &MonitorEvent, json: bool) {
    if json {
        print_json(event);
        return;
    }
    match (&event.snapshot, &event.error) {
        (Some(snapshot), _) => render_snapshot(snapshot),
        (None, Some(err)) => eprintln!("[{}] {err}", event.captured_at),
        (None, None) => {}
    }
}

fn render_device_info(info: &DeviceInfo) {
    println!("device {}", info.serial);
    for section in &info.sections {
        println!("[{}]", section.title);
        for item in &section.items {
            println!("  {}: {}", item.label, item.value);
        }
    }
}

fn run_once(args: &Args, shell: &AdbShell, config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    match args.command {
        Subcommand::Devices => {
            let out = shell.host(&["devices", "-l"], trace_id)?;
            let devices = parse_adb_devices(&out.stdout);
            if args.json {
                print_json(&devices);
            } else {
                for device in &devices {
                    println!(
                        "{}\t{}\t{}",
                        device.serial,
                        device.state,
                        device.model.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Subcommand::Packages => {
            let output = shell.shell("pm list packages -f", trace_id)?;
            let packages = parse_pm_list_packages(&output);
            if args.json {
                print_json(&packages);
            } else {
                for package in &packages {
                    let kind = if package.is_system { "system" } else { "user" };
                    println!("{}\t{kind}", package.package_name);
                }
            }
        }
        Subcommand::DeviceInfo => {
            let serial = shell.serial.clone().unwrap_or_default();
            let info = if args.raw {
                fetch_all_properties(shell, &serial, trace_id)?
            } else {
                ensure_device_info(fetch_device_info(shell, &serial, trace_id), trace_id)?
            };
            if args.json {
                print_json(&info);
            } else {
                render_device_info(&info);
            }
        }
        Subcommand::Toggles => {
            let toggles = read_toggles(shell, trace_id)?;
            if args.json {
                print_json(&toggles);
            } else {
                for toggle in &toggles {
                    let flag = if toggle.enabled { "on" } else { "off" };
                    println!("{:<24}{flag}\t{}", toggle.toggle.key(), toggle.label);
                }
            }
        }
        Subcommand::Toggle => {
            let toggle = DevToggle::from_key(&args.rest[0]).ok_or_else(|| {
                AppError::validation(format!("Unknown toggle: {}", args.rest[0]), trace_id)
            })?;
            let enabled = match args.rest[1].as_str() {
                "on" | "1" | "true" => true,
                "off" | "0" | "false" => false,
                other => {
                    return Err(AppError::validation(
                        format!("Toggle value must be on or off, got {other}"),
                        trace_id,
                    ))
                }
            };
            apply_toggle(shell, toggle, enabled, trace_id)?;
            if !args.json {
                println!("{} -> {}", toggle.label(), if enabled { "on" } else { "off" });
            }
        }
        Subcommand::Deeplink => {
            let result = open_deeplink(shell, &args.rest[0], args.package.as_deref(), trace_id)?;
            if args.json {
                print_json(&result);
            } else {
                println!(
                    "{} {} total={}ms",
                    result.status.as_deref().unwrap_or("-"),
                    result.activity.as_deref().unwrap_or("-"),
                    result.total_time_ms.unwrap_or_default()
                );
            }
            if let Some(error) = result.error {
                return Err(AppError::dependency(error, trace_id));
            }
        }
        Subcommand::Companion => {
            ensure_forward(shell, config.companion.port, trace_id)?;
            let mut client = CompanionClient::connect_local(&config.companion, trace_id)?;
            let response = client.request(&args.rest[0])?;
            if args.json {
                print_json(&serde_json::json!({ "request": args.rest[0], "response": response }));
            } else {
                println!("{response}");
            }
        }
        _ => {
            let target = target_for(args, trace_id)?;
            let mut camera_parser = CameraParser::new(config.monitor.fps_cache_max_idle_polls);
            let snapshot = poll_once(&target, shell, &mut camera_parser, trace_id)?;
            if args.json {
                print_json(&snapshot);
            } else {
                render_snapshot(&snapshot);
            }
        }
    }
    Ok(())
}

/// Runs the background monitor and prints the next `polls` snapshots from the store.
fn run_watch(
    args: &Args,
    shell: AdbShell,
    config: &AppConfig,
    polls: u32,
    trace_id: &str,
) -> Result<(), AppError> {
    let target = target_for(args, trace_id)?;
    let serial = shell.serial.clone().unwrap_or_default();
    let state = AppState::new();
    let emitter: MonitorEmitter = Arc::new(|_event: MonitorEvent| {});
    let request = MonitorRequest {
        serial,
        interval: target.interval(&config.monitor),
        max_idle_polls: config.monitor.fps_cache_max_idle_polls,
        target,
    };
    let gateway: Arc<dyn ShellGateway> = Arc::new(shell);
    let key = start_monitor(&state, request, gateway, emitter, trace_id)?;

    let wait = Duration::from_millis(config.adb.command_timeout_ms).saturating_mul(3) + longest_interval(config);
    let mut seen = 0;
    for _ in 0..polls {
        match state.snapshots.wait_newer(&key, seen, wait) {
            Some((version, event)) => {
                seen = version;
                render_event(&event, args.json);
            }
            None => {
                stop_all_monitors(&state, trace_id)?;
                return Err(AppError::timeout("Monitor produced no snapshot in time", trace_id));
            }
        }
    }
    stop_monitor(&state, &key, trace_id)
}

fn longest_interval(config: &AppConfig) -> Duration {
    let monitor = &config.monitor;
    let longest = [
        monitor.thread_interval_ms,
        monitor.camera_interval_ms,
        monitor.lifecycle_interval_ms,
        monitor.gfx_interval_ms,
    ]
    .into_iter()
    .max()
    .unwrap_or_default();
    Duration::from_millis(longest)
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match load_config(&trace_id) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);

    let adb_program = resolve_adb_program_from_env(&config.adb.command_path);
    let timeout = Duration::from_millis(config.adb.command_timeout_ms);

    let serial = match (&args.serial, args.command) {
        (Some(serial), _) => Some(serial.clone()),
        (None, Subcommand::Devices) => None,
        (None, _) => match pick_single_device(&adb_program, timeout, &trace_id) {
            Ok(serial) => Some(serial),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },
    };
    let shell = AdbShell::new(adb_program, serial, timeout);

    let result = match args.watch {
        Some(polls) if args.command.is_monitor() => run_watch(&args, shell, &config, polls, &trace_id),
        _ => run_once(&args, &shell, &config, &trace_id),
    };
    if let Err(err) = result {
        if args.json {
            print_json(&err);
        } else {
            eprintln!("{err} [trace {}]", err.trace_id);
        }
        std::process::exit(1);
    }
}
