use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEPENDENCY", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    /// Dumpsys text had a shape the parser could not make sense of.
    pub fn parse(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_PARSE", message, trace_id)
    }

    pub fn timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_TIMEOUT", message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = AppError::parse("bad camera block", "trace-1");
        assert_eq!(err.to_string(), "bad camera block (ERR_PARSE)");
        assert_eq!(err.trace_id, "trace-1");
    }

    #[test]
    fn serializes_with_stable_field_names() {
        let err = AppError::timeout("adb hung", "t");
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["code"], "ERR_TIMEOUT");
        assert_eq!(value["error"], "adb hung");
    }
}
