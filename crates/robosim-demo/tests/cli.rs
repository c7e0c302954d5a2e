use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use robosim_demo::{DemoError, PUCK_FACTORY_LAYOUT, RunOptions, run};

fn test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("robosim_demo_{suffix}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn fast_config(dir: &Path) -> PathBuf {
    let path = dir.join("fast.toml");
    fs::write(&path, "tick_interval_ms = 5\n").unwrap();
    path
}

// -----------------------------------------------------------------------
// Library runs
// -----------------------------------------------------------------------

#[test]
fn puck_factory_runs_without_overlaps() {
    let dir = test_dir("puck");
    let options = RunOptions {
        config: Some(fast_config(&dir)),
        duration: Duration::from_millis(1500),
        status_interval: Duration::from_millis(500),
        store: Some(dir.join("store")),
        ..RunOptions::default()
    };

    let mut reports = 0;
    let summary = run(&options, |_, robots| {
        assert_eq!(robots.len(), 2);
        reports += 1;
    })
    .unwrap();

    assert_eq!(summary.factory, "Simple Test Puck Factory");
    assert!(reports >= 2);
    assert!(summary.moves > 0);
    assert_eq!(summary.overlaps, 0);
    assert!(dir.join("store/Simple_Test_Puck_Factory.json").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_layout_is_a_load_error() {
    let options = RunOptions {
        layout: PathBuf::from("/nonexistent/layout.toml"),
        duration: Duration::ZERO,
        ..RunOptions::default()
    };
    assert!(matches!(run(&options, |_, _| {}), Err(DemoError::DataLoad { .. })));
}

// -----------------------------------------------------------------------
// Binary
// -----------------------------------------------------------------------

#[test]
fn binary_prints_a_summary() {
    let dir = test_dir("binary");
    let output = Command::new(env!("CARGO_BIN_EXE_robosim"))
        .arg("--layout")
        .arg(PUCK_FACTORY_LAYOUT)
        .arg("--config")
        .arg(fast_config(&dir))
        .args(["--seconds", "1"])
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("=== SUMMARY: Simple Test Puck Factory ==="));
    assert!(stdout.contains("Overlap check: PASS"));

    let _ = fs::remove_dir_all(&dir);
}
