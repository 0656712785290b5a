use crate::config::{Config, TimingConfig};
use crate::error::LaunchError;
use crate::layout::{InstancePlacement, LaunchPlan};
use crate::raise::{raise_after, WindowRaiser};
use log::{debug, error, info, warn};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub stagger: Duration,
    pub settle: Duration,
    /// Time between SIGTERM and SIGKILL.
    pub term_grace: Duration,
}

impl Timing {
    pub fn immediate() -> Self {
        Self {
            stagger: Duration::ZERO,
            settle: Duration::ZERO,
            term_grace: Duration::from_millis(100),
        }
    }
}

impl From<&TimingConfig> for Timing {
    fn from(config: &TimingConfig) -> Self {
        Self {
            stagger: config.stagger(),
            settle: config.settle(),
            term_grace: config.term_grace(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientCommand {
    pub program: String,
    pub leading_args: Vec<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub extra_args: Vec<String>,
}

impl ClientCommand {
    pub fn from_config(config: &Config) -> Self {
        let mut extra_args = Vec::new();
        if let Some(server) = &config.client.server {
            extra_args.push("--server".to_string());
            extra_args.push(server.clone());
        }
        if config.client.lag_ms > 0 {
            extra_args.push("--lag-ms".to_string());
            extra_args.push(config.client.lag_ms.to_string());
        }

        Self {
            program: config.client.program.clone(),
            leading_args: config.client.args.clone(),
            window_width: config.layout.window_width,
            window_height: config.layout.window_height,
            extra_args,
        }
    }

    /// Arguments for one instance, after the leading args.
    pub fn instance_args(&self, placement: &InstancePlacement) -> Vec<String> {
        let mut args = vec![
            "--window-x".to_string(),
            placement.physical_x.to_string(),
            "--window-y".to_string(),
            placement.physical_y.to_string(),
            "--window-width".to_string(),
            self.window_width.to_string(),
            "--window-height".to_string(),
            self.window_height.to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn describe(&self, placement: &InstancePlacement) -> String {
        std::iter::once(self.program.clone())
            .chain(self.leading_args.iter().cloned())
            .chain(self.instance_args(placement))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn spawn(&self, placement: &InstancePlacement) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.leading_args)
            .args(self.instance_args(placement))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

#[derive(Debug)]
pub struct SupervisedProcess {
    pub index: usize,
    pub pid: Option<u32>,
    pub placement: InstancePlacement,
    child: Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Spawned { index: usize, pid: Option<u32> },
    SpawnFailed { index: usize },
    Exited { index: usize, code: Option<i32> },
    Terminated { index: usize },
    TerminateFailed { index: usize },
}

#[derive(Debug)]
enum ChildOutcome {
    Exited { index: usize, status: Option<ExitStatus> },
    Terminated { index: usize, status: ExitStatus },
    TerminateFailed { index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub spawned: Vec<usize>,
    pub failed: Vec<usize>,
    pub exited: Vec<usize>,
    pub terminated: Vec<usize>,
    pub unterminated: Vec<usize>,
    pub raised: bool,
    pub interrupted: bool,
}

impl RunReport {
    fn record(&mut self, outcome: ChildOutcome) {
        match outcome {
            ChildOutcome::Exited { index, status } => {
                debug!("Instance {} finished with {:?}", index, status);
                self.exited.push(index);
            }
            ChildOutcome::Terminated { index, status } => {
                debug!("Instance {} terminated with {}", index, status);
                self.terminated.push(index);
            }
            ChildOutcome::TerminateFailed { index } => self.unterminated.push(index),
        }
    }
}

struct RaiseRequest {
    raiser: Arc<dyn WindowRaiser>,
    process_name: String,
}

pub struct Supervisor {
    command: ClientCommand,
    timing: Timing,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
    raise: Option<RaiseRequest>,
}

impl Supervisor {
    pub fn new(command: ClientCommand, timing: Timing, cancel: CancellationToken) -> Self {
        Self {
            command,
            timing,
            cancel,
            events: None,
            raise: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Raise windows named `process_name` once every instance has been spawned.
    pub fn with_raiser(mut self, raiser: Arc<dyn WindowRaiser>, process_name: &str) -> Self {
        self.raise = Some(RaiseRequest {
            raiser,
            process_name: process_name.to_string(),
        });
        self
    }

    pub async fn run(&self, plan: &LaunchPlan) -> RunReport {
        let group = self.spawn_all(plan).await;

        let raised = match &self.raise {
            Some(request) if !group.spawned.is_empty() => {
                raise_after(
                    request.raiser.clone(),
                    &request.process_name,
                    self.timing.settle,
                    &self.cancel,
                )
                .await
            }
            _ => false,
        };

        let mut report = group.wait().await;
        report.raised = raised;
        report
    }

    pub async fn spawn_all(&self, plan: &LaunchPlan) -> ProcessGroup {
        let mut group = ProcessGroup {
            tasks: JoinSet::new(),
            spawned: Vec::new(),
            failed: Vec::new(),
            cancel: self.cancel.clone(),
        };

        for (position, placement) in plan.iter().enumerate() {
            if position > 0 && !self.timing.stagger.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.timing.stagger) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
            if self.cancel.is_cancelled() {
                info!(
                    "Launch cancelled; {} of {} instances not started",
                    plan.len() - position,
                    plan.len()
                );
                break;
            }

            let index = placement.index;
            match self.command.spawn(placement) {
                Ok(child) => {
                    let pid = child.id();
                    info!("Spawned instance {} (pid {:?})", index, pid);
                    debug!("Instance {} command: {}", index, self.command.describe(placement));

                    let process = SupervisedProcess {
                        index,
                        pid,
                        placement: *placement,
                        child,
                    };
                    group.tasks.spawn(supervise(
                        process,
                        self.cancel.clone(),
                        self.timing.term_grace,
                        self.events.clone(),
                    ));
                    group.spawned.push(index);
                    self.emit(SupervisorEvent::Spawned { index, pid });
                }
                Err(source) => {
                    warn!("{}", LaunchError::Spawn { index, source });
                    group.failed.push(index);
                    self.emit(SupervisorEvent::SpawnFailed { index });
                }
            }
        }

        group
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

pub struct ProcessGroup {
    tasks: JoinSet<ChildOutcome>,
    spawned: Vec<usize>,
    failed: Vec<usize>,
    cancel: CancellationToken,
}

impl ProcessGroup {
    pub async fn wait(mut self) -> RunReport {
        let mut report = RunReport {
            spawned: std::mem::take(&mut self.spawned),
            failed: std::mem::take(&mut self.failed),
            ..Default::default()
        };

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => error!("Supervision task failed: {}", e),
            }
        }

        report.exited.sort_unstable();
        report.terminated.sort_unstable();
        report.unterminated.sort_unstable();
        report.interrupted = self.cancel.is_cancelled();
        report
    }
}

async fn supervise(
    mut process: SupervisedProcess,
    cancel: CancellationToken,
    grace: Duration,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
) -> ChildOutcome {
    let index = process.index;
    let exited = tokio::select! {
        status = process.child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    let (outcome, event) = match exited {
        Some(Ok(status)) => {
            info!("Instance {} (pid {:?}) exited: {}", index, process.pid, status);
            (
                ChildOutcome::Exited {
                    index,
                    status: Some(status),
                },
                SupervisorEvent::Exited {
                    index,
                    code: status.code(),
                },
            )
        }
        Some(Err(e)) => {
            // The child can no longer be waited on, so count it as exited.
            error!("Failed to wait on instance {}: {}", index, e);
            (
                ChildOutcome::Exited {
                    index,
                    status: None,
                },
                SupervisorEvent::Exited { index, code: None },
            )
        }
        None => match terminate(&mut process, grace).await {
            Ok(status) => {
                info!("Instance {} terminated: {}", index, status);
                (
                    ChildOutcome::Terminated { index, status },
                    SupervisorEvent::Terminated { index },
                )
            }
            Err(e) => {
                warn!("{}", e);
                (
                    ChildOutcome::TerminateFailed { index },
                    SupervisorEvent::TerminateFailed { index },
                )
            }
        },
    };

    if let Some(events) = events {
        let _ = events.send(event);
    }
    outcome
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.start_kill();
}

async fn terminate(
    process: &mut SupervisedProcess,
    grace: Duration,
) -> Result<ExitStatus, LaunchError> {
    let index = process.index;

    request_exit(&mut process.child);

    match tokio::time::timeout(grace, process.child.wait()).await {
        Ok(Ok(status)) => return Ok(status),
        Ok(Err(source)) => return Err(LaunchError::TerminationPropagation { index, source }),
        Err(_) => warn!(
            "Instance {} still running {:?} after SIGTERM; killing",
            index, grace
        ),
    }

    process
        .child
        .kill()
        .await
        .map_err(|source| LaunchError::TerminationPropagation { index, source })?;
    process
        .child
        .wait()
        .await
        .map_err(|source| LaunchError::TerminationPropagation { index, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ScreenGeometry;

    fn placement() -> InstancePlacement {
        InstancePlacement {
            index: 1,
            column: 1,
            row: 0,
            logical_x: -528.0,
            logical_y: 75.0,
            physical_x: -1056,
            physical_y: 150,
        }
    }

    #[test]
    fn instance_args_carry_geometry() {
        let command = ClientCommand::from_config(&Config::default());
        assert_eq!(
            command.instance_args(&placement()),
            vec![
                "--window-x",
                "-1056",
                "--window-y",
                "150",
                "--window-width",
                "1000",
                "--window-height",
                "600"
            ]
        );
    }

    #[test]
    fn lag_and_server_are_forwarded() {
        let mut config = Config::default();
        config.client.lag_ms = 120;
        config.client.server = Some("10.0.0.2:8080".to_string());
        let command = ClientCommand::from_config(&config);

        let args = command.instance_args(&placement());
        assert_eq!(
            &args[8..],
            &["--server", "10.0.0.2:8080", "--lag-ms", "120"]
        );
    }

    #[test]
    fn zero_lag_is_omitted() {
        let command = ClientCommand::from_config(&Config::default());
        assert!(!command
            .instance_args(&placement())
            .contains(&"--lag-ms".to_string()));
    }

    #[test]
    fn describe_includes_leading_args() {
        let mut config = Config::default();
        config.client.program = "cargo".to_string();
        config.client.args = vec!["run".into(), "--bin".into(), "client".into(), "--".into()];
        let command = ClientCommand::from_config(&config);
        assert!(command
            .describe(&placement())
            .starts_with("cargo run --bin client -- --window-x -1056"));
    }

    #[test]
    fn timing_from_config() {
        let timing = Timing::from(&TimingConfig::default());
        assert_eq!(timing.stagger, Duration::from_millis(300));
        assert_eq!(timing.settle, Duration::from_millis(1000));
        assert_eq!(timing.term_grace, Duration::from_millis(500));
    }

    #[test]
    fn unwaitable_child_counts_as_exited() {
        let mut report = RunReport::default();
        report.record(ChildOutcome::Exited {
            index: 2,
            status: None,
        });
        report.record(ChildOutcome::TerminateFailed { index: 3 });

        assert_eq!(report.exited, vec![2]);
        assert_eq!(report.unterminated, vec![3]);
    }

    #[tokio::test]
    async fn cancelled_before_start_spawns_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let screen = ScreenGeometry {
            physical_width: 3024,
            physical_height: 1964,
            logical_width: 1512.0,
            logical_height: 982.0,
            scale_factor: 2.0,
        };
        let plan = LaunchPlan::new(3, &Config::default().layout, &screen);
        let mut command = ClientCommand::from_config(&Config::default());
        command.program = "/nonexistent/tilelaunch-client".to_string();

        let report = Supervisor::new(command, Timing::immediate(), cancel)
            .run(&plan)
            .await;
        assert!(report.spawned.is_empty());
        assert!(report.failed.is_empty());
        assert!(report.interrupted);
    }
}
