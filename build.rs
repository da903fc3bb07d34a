use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "toml"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

const EXCLUDED_FILES: &[&str] = &["Cargo.lock"];

/// Files that contain a violation, with `(line, message)` pairs.
type Violations = Vec<(PathBuf, Vec<(usize, String)>)>;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let sha = git_output(&["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=DECISION_ENGINE_GIT_SHA={}", sha);

    // Commit timestamp (Unix epoch seconds)
    let timestamp = git_output(&["show", "-s", "--format=%ct", "HEAD"])
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    println!(
        "cargo:rustc-env=DECISION_ENGINE_BUILD_TIMESTAMP={}",
        timestamp
    );

    let root = PathBuf::from(
        std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set"),
    );
    let files = collect_files_to_check(&root);
    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    let rust_files: Vec<&PathBuf> = files
        .iter()
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("rs")
                && p.file_name().and_then(|n| n.to_str()) != Some("build.rs")
        })
        .collect();

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&root, &rust_files);
    enforce_no_test_skips(&root, &rust_files);
    enforce_serial_for_env_mutations(&root, &rust_files);
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        let rel_path = file.strip_prefix(root).unwrap_or(file);
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let line_count = content.lines().filter(|l| !l.trim().is_empty()).count();
                if line_count > MAX_LINES {
                    violations.push((rel_path.to_path_buf(), line_count));
                }
            }
            Err(e) => println!(
                "cargo:warning=Could not read file {}: {}",
                rel_path.display(),
                e
            ),
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES);
        eprintln!("========================================");
        for (path, lines) in &violations {
            eprintln!(
                "  {} - {} lines (exceeds by {})",
                path.display(),
                lines,
                lines - MAX_LINES
            );
        }
        eprintln!("========================================\n");
        eprintln!("Please split these files into smaller modules.\n");
        panic!(
            "Build failed: {} file(s) exceed the {} line limit",
            violations.len(),
            MAX_LINES
        );
    }
}

fn collect_files_to_check(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Some(stdout) = Command::new("git")
        .args(["ls-files"])
        .current_dir(root)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
    {
        files.extend(
            stdout
                .lines()
                .map(|line| root.join(line))
                .filter(|path| should_check_file(path, root)),
        );
        if !files.is_empty() {
            return files;
        }
    }

    walk_directory(root, root, &mut files);
    files
}

fn walk_directory(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            let excluded = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| EXCLUDED_DIRS.contains(&name));
            if !excluded {
                walk_directory(&path, root, files);
            }
        } else if should_check_file(&path, root) {
            files.push(path);
        }
    }
}

fn should_check_file(path: &Path, root: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if !CHECKED_EXTENSIONS.contains(&ext) {
        return false;
    }

    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };
    if EXCLUDED_FILES.contains(&rel_path.to_string_lossy().as_ref()) {
        return false;
    }
    !rel_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
    })
}

fn report(title: &str, root: &Path, violations: &Violations, advice: &[&str]) {
    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================\n");
    for (path, issues) in violations {
        let rel_path = path.strip_prefix(root).unwrap_or(path);
        for (line_num, msg) in issues {
            eprintln!("  {}:{}", rel_path.display(), line_num);
            eprintln!("    {}\n", msg.trim());
        }
    }
    eprintln!("========================================\n");
    for line in advice {
        eprintln!("{}", line);
    }
    eprintln!("\n========================================\n");
}

fn enforce_no_dead_code_allows(root: &Path, rust_files: &[&PathBuf]) {
    let mut violations: Violations = Vec::new();

    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let hits: Vec<(usize, String)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let trimmed = line.trim();
                (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                    && trimmed.contains("dead_code")
            })
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect();
        if !hits.is_empty() {
            violations.push(((*file).clone(), hits));
        }
    }

    if !violations.is_empty() {
        let total: usize = violations.iter().map(|(_, v)| v.len()).sum();
        report(
            "#[allow(dead_code)] IS NOT ALLOWED",
            root,
            &violations,
            &[
                "Delete unused code, or gate test-only helpers behind #[cfg(test)].",
            ],
        );
        panic!(
            "Build failed: {} #[allow(dead_code)] occurrence(s) found. Remove the dead code.",
            total
        );
    }
}

/// Walks test functions, calling `check` on each line inside one.
///
/// `check` receives the test name, the trimmed line, the brace depth and
/// whether the test carries `#[serial]`. Returning `Some` records a
/// violation and stops checking that test.
fn scan_tests<F>(content: &str, mut check: F) -> Vec<(usize, String)>
where
    F: FnMut(&str, &str, i32, bool) -> Option<String>,
{
    let lines: Vec<&str> = content.lines().collect();
    let mut found = Vec::new();
    let mut in_test_fn = false;
    let mut test_fn_start = 0;
    let mut test_fn_name = String::new();
    let mut has_serial = false;
    let mut brace_depth = 0i32;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        if trimmed == "#[serial]" || trimmed == "#[serial_test::serial]" {
            has_serial = true;
        }

        if trimmed == "#[test]" || trimmed.starts_with("#[tokio::test") {
            if let Some(fn_line) = lines[i + 1..lines.len().min(i + 5)]
                .iter()
                .find(|l| l.contains("fn "))
            {
                test_fn_start = i + 1;
                test_fn_name = fn_line
                    .split("fn ")
                    .nth(1)
                    .and_then(|rest| rest.split('(').next())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                in_test_fn = true;
                brace_depth = 0;
            }
        }

        if !in_test_fn {
            continue;
        }

        for c in line.chars() {
            match c {
                '{' => brace_depth += 1,
                '}' => {
                    brace_depth -= 1;
                    if brace_depth == 0 {
                        in_test_fn = false;
                        has_serial = false;
                    }
                }
                _ => {}
            }
        }

        if let Some(msg) = check(&test_fn_name, trimmed, brace_depth, has_serial) {
            found.push((test_fn_start, msg));
            in_test_fn = false;
            has_serial = false;
        }
    }

    found
}

/// Bans tests that silently skip instead of failing.
fn enforce_no_test_skips(root: &Path, rust_files: &[&PathBuf]) {
    let skip_patterns = ["Skipping test", "skipping test", "Test skipped", "test skipped"];
    let mut violations: Violations = Vec::new();

    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let hits = scan_tests(&content, |name, trimmed, depth, _| {
            if let Some(pattern) = skip_patterns.iter().find(|p| trimmed.contains(*p)) {
                return Some(format!("test `{}` contains skip pattern: {}", name, pattern));
            }
            // A bare return inside a nested block is a conditional early exit
            (trimmed == "return;" && depth > 1)
                .then(|| format!("test `{}` has conditional early return (silent skip)", name))
        });
        if !hits.is_empty() {
            violations.push(((*file).clone(), hits));
        }
    }

    if !violations.is_empty() {
        let total: usize = violations.iter().map(|(_, v)| v.len()).sum();
        report(
            "SILENT TEST SKIPS ARE NOT ALLOWED",
            root,
            &violations,
            &[
                "Tests must FAIL if they cannot run, not silently pass.",
                "Use assert!() to verify preconditions instead.",
            ],
        );
        panic!(
            "Build failed: {} silent test skip(s) found. Make tests fail instead of skip.",
            total
        );
    }
}

/// Requires #[serial] for tests that mutate environment variables.
fn enforce_serial_for_env_mutations(root: &Path, rust_files: &[&PathBuf]) {
    let mut violations: Violations = Vec::new();

    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let hits = scan_tests(&content, |name, trimmed, _, has_serial| {
            let mutates = !trimmed.starts_with("//")
                && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"));
            (mutates && !has_serial)
                .then(|| format!("test `{}` mutates env without #[serial]", name))
        });
        if !hits.is_empty() {
            violations.push(((*file).clone(), hits));
        }
    }

    if !violations.is_empty() {
        let total: usize = violations.iter().map(|(_, v)| v.len()).sum();
        report(
            "ENV MUTATIONS REQUIRE #[serial]",
            root,
            &violations,
            &[
                "Tests that call std::env::set_var or std::env::remove_var",
                "modify global state and cause flaky failures in parallel.",
                "Add #[serial] from the serial_test crate.",
            ],
        );
        panic!(
            "Build failed: {} test(s) mutate env vars without #[serial].",
            total
        );
    }
}
