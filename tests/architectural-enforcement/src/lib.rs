//! Architectural Enforcement Integration Tests
//!
//! Source-tree checks for rules the compiler cannot enforce:
//! - No sleeping in production code, outside reconnect backoff
//! - No panicking shortcuts in the core library
//! - No blocking I/O in the streaming and client layers
//! - The core library stays free of binary-only dependencies
//!
//! This library holds the shared scanning helpers; the checks live in
//! `tests/`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under `dir`, relative to the workspace root
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Production lines of a source file with their 1-based line numbers
///
/// Stops at the first `#[cfg(test)]`; trailing `//` comments (and so doc
/// comments) are stripped.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code.to_string())
        })
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending code
    pub code: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self
            .path
            .strip_prefix(workspace_root())
            .unwrap_or(&self.path);
        write!(f, "{}:{}: {}", shown.display(), self.line, self.code.trim())
    }
}

/// Scan production code under `dir` for lines matching `is_violation`
///
/// `is_violation` gets the file path, every production line of the file,
/// and the index of the line being checked.
pub fn scan<F>(dir: &str, is_violation: F) -> Vec<Violation>
where
    F: Fn(&Path, &[(usize, String)], usize) -> bool,
{
    let mut violations = Vec::new();
    for path in rust_files(dir) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines = production_lines(&content);
        for idx in 0..lines.len() {
            if is_violation(&path, &lines, idx) {
                violations.push(Violation {
                    path: path.clone(),
                    line: lines[idx].0,
                    code: lines[idx].1.clone(),
                });
            }
        }
    }
    violations
}

/// Fail with a readable report if any violation was found
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n{rule}: {} violation(s)", violations.len());
    for violation in violations {
        eprintln!("  {violation}");
    }
    panic!("\nFound {} violation(s) of: {rule}", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_tests() {
        let source = "//! Docs\nfn a() {} // trailing\n\n#[cfg(test)]\nmod tests { fn b() {} }\n";
        let lines = production_lines(source);
        assert_eq!(lines, vec![(2, "fn a() {} ".to_string())]);
    }

    #[test]
    fn test_workspace_root_contains_core() {
        assert!(workspace_root().join("birdwatch/core/Cargo.toml").exists());
        assert!(!rust_files("birdwatch/core/src").is_empty());
    }
}
