//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on I/O or cancellation, never on a timer.
//! **Exception**: the daemon's reconnect backoff, which races the delay
//! against its cancellation token.

use std::path::Path;

use architectural_enforcement::{report, scan};

fn is_sleep(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(")
}

/// A sleep within a few lines of reconnect/backoff wording
fn is_backoff_context(lines: &[(usize, String)], idx: usize) -> bool {
    let start = idx.saturating_sub(8);
    let end = (idx + 3).min(lines.len());
    lines[start..end].iter().any(|(_, code)| {
        let code = code.to_lowercase();
        code.contains("reconnect") || code.contains("policy.delay")
    })
}

#[test]
fn test_no_sleep_in_core() {
    let violations = scan("birdwatch/core/src", |_: &Path, lines, idx| {
        is_sleep(&lines[idx].1)
    });
    report("no sleep in birdwatch-core", &violations);
}

#[test]
fn test_daemon_sleeps_only_for_backoff() {
    let violations = scan("birdwatch/daemon/src", |_: &Path, lines, idx| {
        is_sleep(&lines[idx].1) && !is_backoff_context(lines, idx)
    });
    report("daemon sleeps only in reconnect backoff", &violations);
}
