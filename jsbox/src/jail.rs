use crate::{
    error::Error,
    types::{Execution, ProcessStats, ResourceLimits},
};
use nix::sys::resource::{getrusage, setrlimit, Resource, UsageWho};
use std::{path::PathBuf, process::Stdio, time::Instant};
use tokio::process::Command;
use tokio::{
    fs,
    io::AsyncWriteExt,
    time::{self, Duration},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Process jail for a single evaluation
pub struct Jail {
    /// Scratch directory for the jailed process
    pub root_dir: PathBuf,
    /// Resource budgets
    limits: ResourceLimits,
    /// Unique ID for this jail instance
    id: String,
    /// Start time of the current run
    start_time: Option<Instant>,
}

impl Jail {
    /// Create a new jail with its scratch directory structure.
    pub async fn new(limits: ResourceLimits) -> Result<Self, Error> {
        let id = Uuid::new_v4().to_string();
        let root_dir = PathBuf::from("/tmp").join(format!("jsbox-{}", id));

        fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create jail directory: {}", e)))?;

        for dir in &["tmp", "home"] {
            fs::create_dir_all(root_dir.join(dir))
                .await
                .map_err(|e| Error::Sandbox(format!("Failed to create {} directory: {}", dir, e)))?;
        }

        Ok(Jail {
            root_dir,
            limits,
            id,
            start_time: None,
        })
    }

    /// Check whether the finished run stayed inside its budgets.
    fn check_resource_usage(&self) -> Result<(), Error> {
        if let Some(start_time) = self.start_time {
            let elapsed = start_time.elapsed();
            if elapsed.as_secs() as u32 > self.limits.cpu_time {
                return Err(Error::ResourceExceeded(format!(
                    "CPU time budget exhausted: {}s > {}s",
                    elapsed.as_secs(),
                    self.limits.cpu_time
                )));
            }
        }

        // rusage RSS is unreliable on macOS, so the check is Linux-only
        #[cfg(target_os = "linux")]
        {
            let usage = getrusage(UsageWho::RUSAGE_CHILDREN)
                .map_err(|e| Error::Sandbox(format!("Failed to get resource usage: {}", e)))?;
            let memory_bytes = usage.max_rss() as u64 * 1024;
            if memory_bytes > self.limits.memory {
                return Err(Error::ResourceExceeded(format!(
                    "Memory budget exhausted: {} > {}",
                    memory_bytes, self.limits.memory
                )));
            }
        }

        Ok(())
    }

    /// Run a command in the jail under the configured budgets.
    ///
    /// Resource kills come back as `Error::ResourceExceeded`; anything that
    /// produced an exit status comes back as `Ok(Execution)` so the caller
    /// can apply its own exit-code policy.
    pub async fn execute(
        &mut self,
        cmd: &str,
        args: &[&str],
        env: &[(String, String)],
        input: Option<&str>,
        timeout: Duration,
    ) -> Result<Execution, Error> {
        self.start_time = Some(Instant::now());

        debug!("Jail {} - command: {} {:?}", self.id, cmd, args);

        let cmd_path = which::which(cmd)
            .map_err(|_| Error::Sandbox(format!("Command not found: {}", cmd)))?;

        let mut command = Command::new(&cmd_path);
        command
            .args(args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k, v)))
            .env("PATH", "/usr/bin:/bin:/usr/sbin:/sbin")
            .env("HOME", self.root_dir.join("home"))
            .current_dir(&self.root_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let file_size = self.limits.file_size;
        let cpu_time = self.limits.cpu_time;

        unsafe {
            command.pre_exec(move || {
                #[cfg(target_os = "linux")]
                {
                    if let Err(e) = setrlimit(Resource::RLIMIT_FSIZE, file_size, file_size) {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("Failed to set file size limit: {}", e),
                        ));
                    }
                }

                if let Err(e) = setrlimit(Resource::RLIMIT_CPU, cpu_time as u64, cpu_time as u64) {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to set CPU time limit: {}", e),
                    ));
                }

                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::Sandbox(format!("Failed to spawn process: {}", e)))?;

        if let Some(input_str) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input_str.as_bytes())
                    .await
                    .map_err(|e| Error::Sandbox(format!("Failed to write input: {}", e)))?;
                // Close stdin to signal EOF
                drop(stdin);
            }
        }

        let child_id = child.id();
        let output = match time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok((output.status, output.stdout, output.stderr)),
            Ok(Err(e)) => Err(Error::Sandbox(format!("Process error: {}", e))),
            Err(_) => {
                if let Some(id) = child_id {
                    // SIGTERM first, then force kill after a short grace period
                    let _ = Command::new("kill").arg(id.to_string()).status().await;
                    time::sleep(Duration::from_millis(10)).await;
                    let _ = Command::new("kill")
                        .arg("-9")
                        .arg(id.to_string())
                        .status()
                        .await;
                }
                Err(Error::ResourceExceeded(format!(
                    "Wall clock budget of {}s exhausted",
                    timeout.as_secs()
                )))
            }
        }?;

        let (status, stdout, stderr) = output;

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return match signal {
                    // SIGXCPU: the kernel stopped the script for CPU abuse
                    24 => Err(Error::ResourceExceeded(format!(
                        "CPU time budget of {}s exhausted",
                        cpu_time
                    ))),
                    // SIGABRT: the engine gave up under memory pressure
                    6 => Err(Error::ResourceExceeded(format!(
                        "Memory budget of {} bytes exhausted",
                        self.limits.memory
                    ))),
                    9 | 15 => Err(Error::ResourceExceeded(
                        "Execution terminated before completion".to_string(),
                    )),
                    other => {
                        warn!("Jail {} - child died on signal {}", self.id, other);
                        Err(Error::Sandbox(format!(
                            "Process terminated by signal {}",
                            other
                        )))
                    }
                };
            }
        }

        self.check_resource_usage()?;

        let execution_time = self.start_time.unwrap().elapsed();
        let usage = getrusage(UsageWho::RUSAGE_CHILDREN)
            .map_err(|e| Error::Sandbox(format!("Failed to get resource usage: {}", e)))?;

        Ok(Execution {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            stats: ProcessStats {
                max_rss: usage.max_rss() as u64 * 1024,
                minor_page_faults: usage.minor_page_faults() as u64,
                major_page_faults: usage.major_page_faults() as u64,
                user_time: Duration::from_micros(
                    (usage.user_time().tv_sec() as i64 * 1_000_000
                        + usage.user_time().tv_usec() as i64) as u64,
                ),
                system_time: Duration::from_micros(
                    (usage.system_time().tv_sec() as i64 * 1_000_000
                        + usage.system_time().tv_usec() as i64) as u64,
                ),
                execution_time,
            },
        })
    }
}

impl Drop for Jail {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root_dir) {
            error!("Failed to clean up jail directory: {}", e);
        }
    }
}
