use std::path::{Path, PathBuf};

fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    trimmed
}

fn sdk_adb(android_home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "adb.exe" } else { "adb" };
    android_home.join("platform-tools").join(name)
}

/// Picks the adb executable: configured path, then the SDK under `ANDROID_HOME`, then `adb` on PATH.
pub fn resolve_adb_program(configured: &str, android_home: Option<&Path>) -> String {
    let configured = unquote(configured);
    if !configured.is_empty() {
        return configured.to_string();
    }
    if let Some(home) = android_home {
        let candidate = sdk_adb(home);
        if candidate.is_file() {
            return candidate.to_string_lossy().to_string();
        }
    }
    "adb".to_string()
}

pub fn resolve_adb_program_from_env(configured: &str) -> String {
    let home = std::env::var_os("ANDROID_HOME")
        .or_else(|| std::env::var_os("ANDROID_SDK_ROOT"))
        .map(PathBuf::from);
    resolve_adb_program(configured, home.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins_and_is_unquoted() {
        assert_eq!(
            resolve_adb_program("  \"/opt/platform-tools/adb\" ", None),
            "/opt/platform-tools/adb"
        );
        assert_eq!(resolve_adb_program("'/x/adb'", None), "/x/adb");
    }

    #[test]
    fn falls_back_to_sdk_then_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(resolve_adb_program("", Some(dir.path())), "adb");

        let tools = dir.path().join("platform-tools");
        std::fs::create_dir_all(&tools).expect("mkdir");
        let adb = sdk_adb(dir.path());
        std::fs::write(&adb, b"").expect("touch");
        assert_eq!(
            resolve_adb_program("   ", Some(dir.path())),
            adb.to_string_lossy()
        );
    }
}
