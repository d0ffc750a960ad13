//! A bootstrapped process can ask for a freeze report through the reporter
//! it was handed.
//!
//! Crash handling is process-wide, so the bootstrap runs in a child copy of
//! this test binary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use viewer_config::testing::TestEnvironment;
use viewer_config::Config;
use viewer_instance::NoopCoordinator;
use viewer_launch::{Bootstrap, Launch};

const CHILD_MARKER: &str = "VIEWER_LAUNCH_TEST_CHILD";
const REPORTER_NAME_VAR: &str = "VIEWER_LAUNCH_TEST_REPORTER_NAME";
const DUMP_VAR: &str = "VIEWER_LAUNCH_TEST_DUMPS";
const LOGS_VAR: &str = "VIEWER_LAUNCH_TEST_LOGS";

fn wait_for_report(path: &Path) -> Option<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if contents.ends_with('\n') {
                return Some(contents);
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

struct InstalledReporter(PathBuf);

impl Drop for InstalledReporter {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn freeze_child_reports_through_bootstrap() {
    if std::env::var_os(CHILD_MARKER).is_none() {
        return;
    }
    let mut config = Config::default();
    config.crash.reporter_name = std::env::var(REPORTER_NAME_VAR).unwrap();
    config.crash.dump_dir = Some(PathBuf::from(std::env::var(DUMP_VAR).unwrap()));
    config.crash.grid_id = "test-grid".to_string();
    config.plugin.enabled = false;

    let Launch {
        startup,
        crash_reporter,
    } = Bootstrap::new(config, None)
        .with_coordinator(Box::new(NoopCoordinator))
        .with_logs_dir(std::env::var(LOGS_VAR).unwrap())
        .launch()
        .unwrap();
    assert_eq!(startup.name(), "standalone");

    let reporter = crash_reporter.expect("crash handling should be installed");
    reporter.launch_reporter(true).unwrap();
}

#[test]
fn test_bootstrap_reporter_sends_freeze_report() {
    let env = TestEnvironment::new().unwrap();
    let exe = std::env::current_exe().unwrap();
    let name = format!("viewer-freeze-logger-{}-{}", std::process::id(), env.test_id);
    let out = env.root().join("report.args");

    let script = exe.parent().unwrap().join(&name);
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$@\" > '{}'\n", out.display()),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let _installed = InstalledReporter(script);

    let status = Command::new(&exe)
        .args([
            "freeze_child_reports_through_bootstrap",
            "--exact",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(CHILD_MARKER, "1")
        .env(REPORTER_NAME_VAR, &name)
        .env(DUMP_VAR, &env.dump_dir)
        .env(LOGS_VAR, &env.logs_dir)
        .status()
        .unwrap();
    assert!(status.success(), "child failed: {:?}", status);

    let report = wait_for_report(&out).expect("freeze report was not launched");
    assert!(report.contains("-user test-grid"), "report args: {}", report);
    assert!(report.trim_end().ends_with("-freeze"), "report args: {}", report);
    assert!(
        report.contains(&format!("-dumpdir {}", env.dump_dir.display())),
        "report args: {}",
        report
    );
}
