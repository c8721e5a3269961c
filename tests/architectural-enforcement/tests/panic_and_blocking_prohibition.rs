//! Integration Test: Panics and Blocking I/O in the Core
//!
//! **Policy**: the core library propagates errors instead of panicking, and
//! the streaming and client layers only use async I/O. A processor that
//! panics or blocks a runtime thread takes other streams down with it.

use std::path::Path;

use architectural_enforcement::{report, scan};

const PANICKING: &[&str] = &[".unwrap()", ".expect(", "panic!(", "unreachable!(", "todo!("];

const BLOCKING: &[&str] = &[
    "std::fs",
    "std::net",
    "std::thread::sleep",
    "std::process::Command",
    "reqwest::blocking",
    "parking_lot::Mutex",
];

fn contains_any(code: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| code.contains(p))
}

#[test]
fn test_no_panics_in_core() {
    let violations = scan("birdwatch/core/src", |_: &Path, lines, idx| {
        contains_any(&lines[idx].1, PANICKING)
    });
    report("no panicking calls in birdwatch-core", &violations);
}

#[test]
fn test_no_blocking_io_in_streaming() {
    let mut violations = scan("birdwatch/core/src/streaming", |_: &Path, lines, idx| {
        contains_any(&lines[idx].1, BLOCKING)
    });
    violations.extend(scan("birdwatch/core/src/client", |_: &Path, lines, idx| {
        contains_any(&lines[idx].1, BLOCKING)
    }));
    report("no blocking I/O in streaming or client code", &violations);
}
