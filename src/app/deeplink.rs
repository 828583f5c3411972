use serde::{Deserialize, Serialize};

use crate::app::adb::runner::ShellGateway;
use crate::app::adb::validate::validate_package_name;
use crate::app::error::AppError;

/// Result block printed by `am start -W`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmStartResult {
    pub status: Option<String>,
    pub launch_state: Option<String>,
    pub activity: Option<String>,
    pub total_time_ms: Option<u64>,
    pub wait_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl AmStartResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.status.as_deref() == Some("ok")
    }
}

fn valid_scheme(uri: &str) -> bool {
    let Some((scheme, rest)) = uri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().map(|ch| ch.is_ascii_alphabetic()).unwrap_or(false);
    starts_alpha
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
        && !rest.is_empty()
}

/// Wraps `value` in single quotes for `sh`, closing and reopening around embedded quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `am start -W -a android.intent.action.VIEW -d '<uri>' [<package>]`
pub fn build_deeplink_command(uri: &str, package: Option<&str>, trace_id: &str) -> Result<String, AppError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(AppError::validation("uri is required", trace_id));
    }
    if uri.chars().any(|ch| ch.is_control()) {
        return Err(AppError::validation("uri contains control characters", trace_id));
    }
    if !valid_scheme(uri) {
        return Err(AppError::validation(
            format!("uri must start with a scheme such as https: or myapp: ({uri})"),
            trace_id,
        ));
    }

    let mut command = format!(
        "am start -W -a android.intent.action.VIEW -d {}",
        shell_quote(uri)
    );
    if let Some(package) = package.map(str::trim).filter(|package| !package.is_empty()) {
        validate_package_name(package).map_err(|err| AppError::validation(err, trace_id))?;
        command.push(' ');
        command.push_str(package);
    }
    Ok(command)
}

pub fn parse_am_start_result(output: &str) -> AmStartResult {
    let mut result = AmStartResult::default();
    for line in output.lines() {
        let line = line.trim();
        if let Some(error) = line.strip_prefix("Error:") {
            // Several error lines may follow each other; keep them all.
            let error = error.trim().to_string();
            result.error = Some(match result.error.take() {
                Some(previous) => format!("{previous}\n{error}"),
                None => error,
            });
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Status" => result.status = Some(value.to_string()),
            "LaunchState" => result.launch_state = Some(value.to_string()),
            "Activity" => result.activity = Some(value.to_string()),
            "TotalTime" => result.total_time_ms = value.parse().ok(),
            "WaitTime" => result.wait_time_ms = value.parse().ok(),
            _ => {}
        }
    }
    result
}

pub fn open_deeplink(
    gateway: &dyn ShellGateway,
    uri: &str,
    package: Option<&str>,
    trace_id: &str,
) -> Result<AmStartResult, AppError> {
    let command = build_deeplink_command(uri, package, trace_id)?;
    let output = gateway.shell(&command, trace_id)?;
    Ok(parse_am_start_result(&output))
}
