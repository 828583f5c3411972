use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::adb::parse::{parse_pid_from_ps, parse_pidof};
use crate::app::adb::runner::ShellGateway;
use crate::app::adb::validate::{ensure_non_empty, validate_package_name, validate_serial};
use crate::app::camera::models::CameraData;
use crate::app::camera::parser::CameraParser;
use crate::app::config::MonitorSettings;
use crate::app::error::AppError;
use crate::app::gfx::parse::parse_gfxinfo;
use crate::app::lifecycle::models::ActivityRecord;
use crate::app::lifecycle::parser::LifecycleParser;
use crate::app::models::{GfxInfo, ThreadSnapshot};
use crate::app::state::{AppState, MonitorHandle, SnapshotStore};
use crate::app::threads::parse::{parse_thread_table, summarize_threads};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTarget {
    Threads { package: String },
    Camera,
    Lifecycle { package: Option<String> },
    Gfx { package: String },
}

impl MonitorTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Threads { .. } => "threads",
            Self::Camera => "camera",
            Self::Lifecycle { .. } => "lifecycle",
            Self::Gfx { .. } => "gfx",
        }
    }

    pub fn interval(&self, settings: &MonitorSettings) -> Duration {
        let ms = match self {
            Self::Threads { .. } => settings.thread_interval_ms,
            Self::Camera => settings.camera_interval_ms,
            Self::Lifecycle { .. } => settings.lifecycle_interval_ms,
            Self::Gfx { .. } => settings.gfx_interval_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn validate(&self, trace_id: &str) -> Result<(), AppError> {
        let checked = match self {
            Self::Threads { package } | Self::Gfx { package } => validate_package_name(package),
            Self::Lifecycle { package: Some(package) } => validate_package_name(package),
            Self::Lifecycle { package: None } | Self::Camera => Ok(()),
        };
        checked.map_err(|err| AppError::validation(err, trace_id))
    }
}

pub fn monitor_key(serial: &str, target: &MonitorTarget) -> String {
    format!("{serial}:{}", target.kind())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MonitorSnapshot {
    Threads(ThreadSnapshot),
    Camera(CameraData),
    Lifecycle(Vec<ActivityRecord>),
    Gfx(GfxInfo),
}

/// One poll result as published to observers. Exactly one of `snapshot` and `error` is set.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    pub serial: String,
    pub kind: String,
    pub trace_id: String,
    pub captured_at: String,
    pub snapshot: Option<MonitorSnapshot>,
    pub error: Option<AppError>,
}

pub type MonitorEmitter = Arc<dyn Fn(MonitorEvent) + Send + Sync>;

fn lifecycle_parser() -> &'static LifecycleParser {
    static PARSER: OnceLock<LifecycleParser> = OnceLock::new();
    PARSER.get_or_init(LifecycleParser::default)
}

/// `pidof`, falling back to a full `ps -A` scan on devices without it.
pub fn resolve_pid(gateway: &dyn ShellGateway, package: &str, trace_id: &str) -> Result<u32, AppError> {
    let pidof = gateway.shell(&format!("pidof {package}"), trace_id)?;
    if let Some(pid) = parse_pidof(&pidof) {
        return Ok(pid);
    }
    let table = gateway.shell("ps -A", trace_id)?;
    parse_pid_from_ps(&table, package)
        .ok_or_else(|| AppError::dependency(format!("{package} is not running"), trace_id))
}

fn poll_threads(gateway: &dyn ShellGateway, package: &str, trace_id: &str) -> Result<ThreadSnapshot, AppError> {
    let pid = resolve_pid(gateway, package, trace_id)?;
    let output = gateway.shell(&format!("ps -T -p {pid}"), trace_id)?;
    let threads = parse_thread_table(&output);
    let summary = summarize_threads(&threads);
    Ok(ThreadSnapshot {
        package_name: package.to_string(),
        pid: Some(pid),
        threads,
        summary,
    })
}

fn poll_lifecycle(
    gateway: &dyn ShellGateway,
    package: Option<&str>,
    trace_id: &str,
) -> Result<Vec<ActivityRecord>, AppError> {
    let parser = lifecycle_parser();
    let package = match package {
        Some(package) => package.to_string(),
        None => {
            let activities = gateway.shell("dumpsys activity activities", trace_id)?;
            let (package, activity) = parser
                .parse_resumed_activity(&activities)
                .ok_or_else(|| AppError::dependency("No resumed activity found", trace_id))?;
            debug!(trace_id = %trace_id, package = %package, activity = %activity, "resolved foreground app");
            package
        }
    };
    let output = gateway.shell(&format!("dumpsys activity {package}"), trace_id)?;
    Ok(parser.parse(&output))
}

/// Runs one tick for `target`. Steps inside a tick are strictly sequential since each
/// command depends on the previous one's output.
pub fn poll_once(
    target: &MonitorTarget,
    gateway: &dyn ShellGateway,
    camera_parser: &mut CameraParser,
    trace_id: &str,
) -> Result<MonitorSnapshot, AppError> {
    target.validate(trace_id)?;
    match target {
        MonitorTarget::Threads { package } => {
            poll_threads(gateway, package, trace_id).map(MonitorSnapshot::Threads)
        }
        MonitorTarget::Camera => {
            let output = gateway.shell("dumpsys media.camera", trace_id)?;
            Ok(MonitorSnapshot::Camera(camera_parser.parse(&output, trace_id)))
        }
        MonitorTarget::Lifecycle { package } => {
            poll_lifecycle(gateway, package.as_deref(), trace_id).map(MonitorSnapshot::Lifecycle)
        }
        MonitorTarget::Gfx { package } => {
            let output = gateway.shell(&format!("dumpsys gfxinfo {package}"), trace_id)?;
            Ok(MonitorSnapshot::Gfx(parse_gfxinfo(&output, trace_id)))
        }
    }
}

pub fn build_event(
    serial: &str,
    target: &MonitorTarget,
    trace_id: &str,
    result: Result<MonitorSnapshot, AppError>,
) -> MonitorEvent {
    let (snapshot, error) = match result {
        Ok(snapshot) => (Some(snapshot), None),
        Err(err) => (None, Some(err)),
    };
    MonitorEvent {
        serial: serial.to_string(),
        kind: target.kind().to_string(),
        trace_id: trace_id.to_string(),
        captured_at: chrono::Utc::now().to_rfc3339(),
        snapshot,
        error,
    }
}

pub fn sleep_with_stop(duration: Duration, stop_flag: &Arc<AtomicBool>) {
    let mut remaining = duration;
    let chunk = Duration::from_millis(50);
    while remaining > Duration::from_millis(0) {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let step = if remaining > chunk { chunk } else { remaining };
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

pub struct MonitorRequest {
    pub serial: String,
    pub target: MonitorTarget,
    pub interval: Duration,
    pub max_idle_polls: u32,
}

fn run_monitor_loop(
    request: MonitorRequest,
    gateway: Arc<dyn ShellGateway>,
    store: Arc<SnapshotStore>,
    emitter: MonitorEmitter,
    stop_flag: Arc<AtomicBool>,
    trace_id: String,
) {
    let key = monitor_key(&request.serial, &request.target);
    let mut camera_parser = CameraParser::new(request.max_idle_polls);
    info!(trace_id = %trace_id, key = %key, "monitor started");

    while !stop_flag.load(Ordering::Relaxed) {
        let start = Instant::now();
        let result = poll_once(&request.target, gateway.as_ref(), &mut camera_parser, &trace_id);
        if let Err(err) = &result {
            warn!(trace_id = %trace_id, key = %key, error = %err, "monitor poll failed");
        }
        // A stop request that arrived mid-poll drops the stale result.
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let event = build_event(&request.serial, &request.target, &trace_id, result);
        store.publish(&key, event.clone());
        emitter(event);

        let elapsed = start.elapsed();
        if elapsed < request.interval {
            sleep_with_stop(request.interval - elapsed, &stop_flag);
        }
    }
    info!(trace_id = %trace_id, key = %key, "monitor stopped");
}

/// Starts a poll loop for `(serial, target kind)`. Returns the monitor key.
pub fn start_monitor(
    state: &AppState,
    request: MonitorRequest,
    gateway: Arc<dyn ShellGateway>,
    emitter: MonitorEmitter,
    trace_id: &str,
) -> Result<String, AppError> {
    validate_serial(&request.serial).map_err(|err| AppError::validation(err, trace_id))?;
    request.target.validate(trace_id)?;
    let key = monitor_key(&request.serial, &request.target);

    let mut guard = state
        .monitors
        .lock()
        .map_err(|_| AppError::system("Monitor registry locked", trace_id))?;
    if guard.contains_key(&key) {
        return Err(AppError::validation(
            format!("Monitor already running: {key}"),
            trace_id,
        ));
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let loop_stop = Arc::clone(&stop_flag);
    let store = Arc::clone(&state.snapshots);
    let loop_trace = trace_id.to_string();
    let join = std::thread::Builder::new()
        .name(format!("monitor-{key}"))
        .spawn(move || run_monitor_loop(request, gateway, store, emitter, loop_stop, loop_trace))
        .map_err(|err| AppError::system(format!("Failed to spawn monitor thread: {err}"), trace_id))?;
    guard.insert(key.clone(), MonitorHandle { stop_flag, join });
    Ok(key)
}

pub fn stop_monitor(state: &AppState, key: &str, trace_id: &str) -> Result<(), AppError> {
    ensure_non_empty(key, "key", trace_id)?;
    let handle = {
        let mut guard = state
            .monitors
            .lock()
            .map_err(|_| AppError::system("Monitor registry locked", trace_id))?;
        match guard.remove(key) {
            Some(handle) => handle,
            None => return Err(AppError::validation("Monitor not running", trace_id)),
        }
    };

    handle.stop_flag.store(true, Ordering::Relaxed);
    handle
        .join
        .join()
        .map_err(|_| AppError::system("Monitor thread panicked", trace_id))?;
    state.snapshots.remove(key);
    Ok(())
}

/// Stops every running monitor, returning the keys that were stopped.
pub fn stop_all_monitors(state: &AppState, trace_id: &str) -> Result<Vec<String>, AppError> {
    let mut keys: Vec<String> = {
        let guard = state
            .monitors
            .lock()
            .map_err(|_| AppError::system("Monitor registry locked", trace_id))?;
        guard.keys().cloned().collect()
    };
    keys.sort();
    for key in &keys {
        stop_monitor(state, key, trace_id)?;
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::mpsc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeGateway {
        outputs: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn with(mut self, command: &str, output: &str) -> Self {
            self.outputs.insert(command.to_string(), output.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl ShellGateway for FakeGateway {
        fn shell(&self, command: &str, trace_id: &str) -> Result<String, AppError> {
            self.calls.lock().expect("calls").push(command.to_string());
            self.outputs
                .get(command)
                .cloned()
                .ok_or_else(|| AppError::dependency(format!("device offline: {command}"), trace_id))
        }
    }

    const PS_T: &str = "USER PID TID PPID VSZ RSS WCHAN ADDR S CMD
u0_a123 4321 4321 700 15000 9000 SyS_epoll 0 S com.example
u0_a123 4321 4330 700 15000 9000 0 0 R RenderThread
";

    #[test]
    fn threads_poll_runs_steps_in_order() {
        let gateway = FakeGateway::default()
            .with("pidof com.example", "")
            .with("ps -A", "USER PID PPID VSZ RSS WCHAN ADDR S NAME\nu0_a123 4321 700 1 1 0 0 S com.example\n")
            .with("ps -T -p 4321", PS_T);
        let mut camera = CameraParser::default();
        let target = MonitorTarget::Threads {
            package: "com.example".to_string(),
        };
        let snapshot = poll_once(&target, &gateway, &mut camera, "trace").expect("poll");
        let MonitorSnapshot::Threads(threads) = snapshot else {
            panic!("expected thread snapshot");
        };
        assert_eq!(threads.pid, Some(4321));
        assert_eq!(threads.threads.len(), 3);
        assert_eq!(threads.threads[1].cmd, "RenderThread");
        assert_eq!(
            gateway.calls(),
            vec!["pidof com.example", "ps -A", "ps -T -p 4321"]
        );
    }

    #[test]
    fn lifecycle_poll_resolves_foreground_package() {
        let gateway = FakeGateway::default()
            .with(
                "dumpsys activity activities",
                "  mResumedActivity: ActivityRecord{1 u0 com.example/.MainActivity t9}\n",
            )
            .with(
                "dumpsys activity com.example",
                "ACTIVITY com.example/.MainActivity 1 pid=4321\n  mResumed=true mStopped=false mFinished=false\n",
            );
        let mut camera = CameraParser::default();
        let target = MonitorTarget::Lifecycle { package: None };
        let snapshot = poll_once(&target, &gateway, &mut camera, "trace").expect("poll");
        let MonitorSnapshot::Lifecycle(activities) = snapshot else {
            panic!("expected lifecycle snapshot");
        };
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].class_name, "com.example.MainActivity");
    }

    #[test]
    fn failures_surface_as_errors() {
        let gateway = FakeGateway::default();
        let mut camera = CameraParser::default();
        let err = poll_once(&MonitorTarget::Camera, &gateway, &mut camera, "trace")
            .expect_err("offline");
        assert_eq!(err.code, "ERR_DEPENDENCY");

        let bad = MonitorTarget::Gfx {
            package: "com.example; reboot".to_string(),
        };
        let err = poll_once(&bad, &gateway, &mut camera, "trace").expect_err("invalid");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert_eq!(gateway.calls(), vec!["dumpsys media.camera"]);
    }

    #[test]
    fn event_carries_snapshot_or_error() {
        let target = MonitorTarget::Camera;
        let ok = build_event("s1", &target, "t", Ok(MonitorSnapshot::Camera(CameraData::default())));
        assert!(ok.snapshot.is_some() && ok.error.is_none());
        let json = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(json["snapshot"]["kind"], "camera");
        assert_eq!(json["kind"], "camera");

        let failed = build_event("s1", &target, "t", Err(AppError::timeout("adb hung", "t")));
        assert!(failed.snapshot.is_none());
        assert_eq!(failed.error.map(|e| e.code), Some("ERR_TIMEOUT".to_string()));
    }

    #[test]
    fn monitor_lifecycle_start_reject_stop() {
        let state = AppState::new();
        let gateway: Arc<dyn ShellGateway> = Arc::new(
            FakeGateway::default().with("dumpsys gfxinfo com.example", "** Graphics info for pid 1 [com.example] **\nTotal frames rendered: 10\n"),
        );
        let (tx, rx) = mpsc::channel::<MonitorEvent>();
        let tx = Mutex::new(tx);
        let emitter: MonitorEmitter = Arc::new(move |event: MonitorEvent| {
            let _ = tx.lock().expect("sender").send(event);
        });
        let request = || MonitorRequest {
            serial: "emulator-5554".to_string(),
            target: MonitorTarget::Gfx {
                package: "com.example".to_string(),
            },
            interval: Duration::from_millis(500),
            max_idle_polls: 10,
        };

        let key = start_monitor(&state, request(), Arc::clone(&gateway), Arc::clone(&emitter), "trace")
            .expect("start");
        assert_eq!(key, "emulator-5554:gfx");
        let err = start_monitor(&state, request(), Arc::clone(&gateway), Arc::clone(&emitter), "trace")
            .expect_err("duplicate");
        assert_eq!(err.code, "ERR_VALIDATION");

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("first event");
        match event.snapshot {
            Some(MonitorSnapshot::Gfx(info)) => assert_eq!(info.summary.total_frames, 10),
            other => panic!("unexpected snapshot: {other:?}"),
        }
        assert!(state.snapshots.latest(&key).is_some());

        let stopped_at = Instant::now();
        stop_monitor(&state, &key, "trace").expect("stop");
        assert!(stopped_at.elapsed() < Duration::from_millis(400));
        assert!(state.snapshots.latest(&key).is_none());
        let err = stop_monitor(&state, &key, "trace").expect_err("not running");
        assert_eq!(err.code, "ERR_VALIDATION");
    }

    #[test]
    fn sleep_with_stop_returns_early() {
        let stop = Arc::new(AtomicBool::new(true));
        let start = Instant::now();
        sleep_with_stop(Duration::from_secs(5), &stop);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn intervals_follow_settings() {
        let settings = MonitorSettings::default();
        assert_eq!(
            MonitorTarget::Camera.interval(&settings),
            Duration::from_millis(settings.camera_interval_ms)
        );
        assert_eq!(
            monitor_key("abc", &MonitorTarget::Lifecycle { package: None }),
            "abc:lifecycle"
        );
    }
}
