#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tilelaunch-cli-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writes a config whose client records its pid in `started-<x>` and then sleeps.
fn write_config(dir: &Path, logical: [u32; 2]) -> PathBuf {
    let script = format!(
        "echo $$ > \"{}/started-$2\"; exec sleep 30",
        dir.display()
    );
    let config = format!(
        r#"
[client]
program = "sh"
args = ["-c", '{}', "client"]

[geometry]
override_physical = [3024, 1964]
override_logical = [{}, {}]

[timing]
stagger_ms = 0
settle_ms = 0
term_grace_ms = 200
"#,
        script, logical[0], logical[1]
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn launcher(config: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_tilelaunch"));
    command.arg("--config").arg(config).arg("--no-raise");
    command
}

fn markers(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.starts_with("started-"))
        })
        .collect()
}

fn wait_for_markers(dir: &Path, count: usize) -> Vec<PathBuf> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let found = markers(dir);
        let written = found
            .iter()
            .all(|path| std::fs::read_to_string(path).map_or(false, |s| s.ends_with('\n')));
        if found.len() >= count && written {
            return found;
        }
        assert!(Instant::now() < deadline, "clients did not start in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn wait_with_deadline(child: &mut Child) -> std::process::ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("launcher did not exit after the signal");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn is_alive(pid: libc::pid_t) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

fn run_and_signal(name: &str, signal: libc::c_int) -> (std::process::ExitStatus, Vec<libc::pid_t>) {
    let dir = scratch_dir(name);
    let config = write_config(&dir, [1512, 982]);

    let mut child = launcher(&config)
        .arg("2")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let pids: Vec<libc::pid_t> = wait_for_markers(&dir, 2)
        .iter()
        .map(|path| std::fs::read_to_string(path).unwrap().trim().parse().unwrap())
        .collect();

    unsafe {
        libc::kill(child.id() as libc::pid_t, signal);
    }
    let status = wait_with_deadline(&mut child);

    let _ = std::fs::remove_dir_all(&dir);
    (status, pids)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn zero_logical_width_aborts_before_spawning() {
    let dir = scratch_dir("zero-width");
    let config = write_config(&dir, [0, 982]);

    let output = launcher(&config).arg("2").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("screen geometry unavailable"));
    assert!(markers(&dir).is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn zero_count_is_rejected() {
    let dir = scratch_dir("zero-count");
    let config = write_config(&dir, [1512, 982]);

    let output = launcher(&config).arg("0").output().unwrap();

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    assert!(markers(&dir).is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn dry_run_defaults_to_two_instances() {
    let dir = scratch_dir("dry-run");
    let config = write_config(&dir, [1512, 982]);

    let output = launcher(&config).arg("--dry-run").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout.contains("Scale factor: 2.000 (measured)"));
    assert!(stdout.contains("Instances: 2"));
    assert!(stdout.contains("--window-x 984"));
    assert!(stdout.contains("--window-x -1056"));
    assert!(markers(&dir).is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sigterm_stops_clients_and_exits_143() {
    let (status, pids) = run_and_signal("sigterm", libc::SIGTERM);

    assert_eq!(status.code(), Some(143));
    assert_eq!(pids.len(), 2);
    assert!(pids.iter().all(|&pid| !is_alive(pid)));
}

#[test]
fn sigint_stops_clients_and_exits_130() {
    let (status, pids) = run_and_signal("sigint", libc::SIGINT);

    assert_eq!(status.code(), Some(130));
    assert!(pids.iter().all(|&pid| !is_alive(pid)));
}
