use std::collections::BTreeMap;

use tracing::debug;

use crate::app::models::{ThreadInfo, ThreadSummary};

const THREAD_COLUMNS: usize = 10;

/// Splits one `ps -T` row into its ten columns. CMD may contain spaces and absorbs the remainder.
fn split_row(line: &str) -> Option<ThreadInfo> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < THREAD_COLUMNS {
        return None;
    }
    Some(ThreadInfo {
        user: tokens[0].to_string(),
        pid: tokens[1].to_string(),
        tid: tokens[2].to_string(),
        ppid: tokens[3].to_string(),
        vsz: tokens[4].to_string(),
        rss: tokens[5].to_string(),
        wchan: tokens[6].to_string(),
        addr: tokens[7].to_string(),
        state: tokens[8].to_string(),
        cmd: tokens[THREAD_COLUMNS - 1..].join(" "),
    })
}

/// Parses `ps -T -p <pid>` output.
///
/// The first element is always the header row as printed. Data rows follow with
/// running (`R`) threads first; the relative order inside each group is preserved.
/// Rows with fewer than ten columns are skipped.
pub fn parse_thread_table(output: &str) -> Vec<ThreadInfo> {
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let Some(header) = split_row(header_line) else {
        debug!(line = %header_line.trim(), "ps -T output has no usable header");
        return Vec::new();
    };

    let mut rows: Vec<ThreadInfo> = Vec::new();
    for line in lines {
        match split_row(line) {
            Some(row) => rows.push(row),
            None => debug!(line = %line.trim(), "skipping malformed ps -T row"),
        }
    }
    // sort_by_key is stable.
    rows.sort_by_key(|row| !row.is_running());

    let mut threads = Vec::with_capacity(rows.len() + 1);
    threads.push(header);
    threads.extend(rows);
    threads
}

pub fn summarize_threads(threads: &[ThreadInfo]) -> ThreadSummary {
    let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
    for thread in threads.iter().skip(1) {
        *by_state.entry(thread.state.clone()).or_default() += 1;
    }
    ThreadSummary {
        total: threads.len().saturating_sub(1),
        by_state,
    }
}

pub fn thread_state_label(state: &str) -> &'static str {
    match state {
        "R" => "Running",
        "S" => "Sleeping",
        "D" => "Uninterruptible",
        "Z" => "Zombie",
        "T" => "Stopped",
        "t" => "Traced",
        "X" => "Dead",
        "I" => "Idle",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_T: &str = "USER           PID   TID  PPID     VSZ    RSS WCHAN            ADDR S CMD\n\
u0_a123      12345 12345   700 15012345 120000 do_epoll_wait       0 S com.example.app\n\
u0_a123      12345 12350   700 15012345 120000 0                   0 R RenderThread\n\
u0_a123      12345 12351   700 15012345 120000 futex_wait_queue_me 0 S Binder:12345_1\n\
\n\
u0_a123      12345 12352   700 15012345 120000 0                   0 R hwuiTask 1\n\
u0_a123      12345 12353   700 15012345 120000 do_sys_poll         0 D FinalizerDaemon\n";

    #[test]
    fn pins_header_and_puts_running_first() {
        let threads = parse_thread_table(PS_T);
        assert_eq!(threads.len(), 6);
        assert_eq!(threads[0].user, "USER");
        assert_eq!(threads[0].state, "S");
        assert_eq!(threads[0].cmd, "CMD");

        let tids: Vec<&str> = threads[1..].iter().map(|t| t.tid.as_str()).collect();
        assert_eq!(tids, vec!["12350", "12352", "12345", "12351", "12353"]);
    }

    #[test]
    fn rejoins_command_with_spaces() {
        let threads = parse_thread_table(PS_T);
        let hwui = threads.iter().find(|t| t.tid == "12352").expect("hwui row");
        assert_eq!(hwui.cmd, "hwuiTask 1");
        assert_eq!(hwui.wchan, "0");
    }

    #[test]
    fn header_only_returns_header() {
        let threads = parse_thread_table(
            "USER PID TID PPID VSZ RSS WCHAN ADDR S CMD\n",
        );
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].tid, "TID");
    }

    #[test]
    fn skips_malformed_rows() {
        let input = "USER PID TID PPID VSZ RSS WCHAN ADDR S CMD\nshort row\nroot 1 1 0 100 10 0 0 R init\n";
        let threads = parse_thread_table(input);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[1].cmd, "init");
    }

    #[test]
    fn empty_and_garbage_input_yield_nothing() {
        assert!(parse_thread_table("").is_empty());
        assert!(parse_thread_table("error: no devices/emulators found\n").is_empty());
    }

    #[test]
    fn summarizes_without_header() {
        let summary = summarize_threads(&parse_thread_table(PS_T));
        assert_eq!(summary.total, 5);
        assert_eq!(summary.by_state.get("R"), Some(&2));
        assert_eq!(summary.by_state.get("S"), Some(&2));
        assert_eq!(summary.by_state.get("D"), Some(&1));
        assert_eq!(thread_state_label("D"), "Uninterruptible");
        assert_eq!(thread_state_label("?"), "Unknown");
    }
}
