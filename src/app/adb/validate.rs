use crate::app::error::AppError;

pub fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

/// Package names end up inside `adb shell` command strings.
pub fn validate_package_name(package: &str) -> Result<(), String> {
    let trimmed = package.trim();
    if trimmed.is_empty() {
        return Err("package is required".to_string());
    }
    if trimmed != package {
        return Err("package must not contain surrounding whitespace".to_string());
    }
    if trimmed.starts_with('.') || trimmed.ends_with('.') {
        return Err(format!("package {package} must not start or end with '.'"));
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '_')
    {
        return Err(format!("package {package} contains invalid characters"));
    }
    Ok(())
}

/// adb serials are host:port pairs, emulator names or hardware ids.
pub fn validate_serial(serial: &str) -> Result<(), String> {
    let trimmed = serial.trim();
    if trimmed.is_empty() {
        return Err("serial is required".to_string());
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-' | ':' | '[' | ']'))
    {
        return Err(format!("serial {serial} contains invalid characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_names() {
        assert!(validate_package_name("com.example.app").is_ok());
        assert!(validate_package_name("com.example_2").is_ok());
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name(" com.example").is_err());
        assert!(validate_package_name("com.example;reboot").is_err());
        assert!(validate_package_name("com.example'").is_err());
        assert!(validate_package_name(".com").is_err());
    }

    #[test]
    fn serials() {
        assert!(validate_serial("emulator-5554").is_ok());
        assert!(validate_serial("192.168.1.20:5555").is_ok());
        assert!(validate_serial("R5CR10ABCDE").is_ok());
        assert!(validate_serial("abc def").is_err());
        assert!(validate_serial("").is_err());
    }

    #[test]
    fn non_empty_reports_field() {
        let err = ensure_non_empty("  ", "serial", "trace").expect_err("empty");
        assert_eq!(err.error, "serial is required");
        assert_eq!(err.code, "ERR_VALIDATION");
    }
}
