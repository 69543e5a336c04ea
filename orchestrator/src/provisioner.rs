use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use log::{debug, info};
use tokio::{process::Command, time};

use crate::ProvisionErr;

/// Starts and stops the backing process of an edge node.
#[allow(unused)]
#[trait_variant::make(Provisioner: Send)]
pub trait ProvisionerTemplate {
    /// Brings up the node named `node`.
    async fn start(&self, node: &str) -> Result<(), ProvisionErr>;

    /// Tears down the node named `node`.
    async fn stop(&self, node: &str) -> Result<(), ProvisionErr>;
}

/// Runs `sh <script> <node>` to start or stop a node.
#[derive(Debug, Clone)]
pub struct ScriptProvisioner {
    run_script: PathBuf,
    kill_script: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptProvisioner {
    /// Creates a new `ScriptProvisioner`.
    ///
    /// # Arguments
    /// * `run_script` - The script that starts a node.
    /// * `kill_script` - The script that stops a node.
    pub fn new(run_script: impl Into<PathBuf>, kill_script: impl Into<PathBuf>) -> Self {
        Self {
            run_script: run_script.into(),
            kill_script: kill_script.into(),
            timeout: None,
        }
    }

    /// Bounds every script invocation to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Checks that both scripts exist.
    pub fn check(&self) -> Result<(), ProvisionErr> {
        for script in [&self.run_script, &self.kill_script] {
            if !script.is_file() {
                return Err(ProvisionErr::MissingScript(script.clone()));
            }
        }

        Ok(())
    }

    async fn invoke(&self, script: &Path, node: &str) -> Result<(), ProvisionErr> {
        if !script.is_file() {
            return Err(ProvisionErr::MissingScript(script.to_path_buf()));
        }

        debug!("running {} {node}", script.display());

        let output = Command::new("sh")
            .arg(script)
            .arg(node)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(after) => time::timeout(after, output)
                .await
                .map_err(|_| ProvisionErr::Timeout {
                    script: script.to_path_buf(),
                    after,
                })?,
            None => output.await,
        }
        .map_err(|source| ProvisionErr::Spawn {
            script: script.to_path_buf(),
            source,
        })?;

        if !output.status.success() {
            return Err(ProvisionErr::Failed {
                script: script.to_path_buf(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            info!("[{node}] {line}");
        }

        Ok(())
    }
}

impl Provisioner for ScriptProvisioner {
    async fn start(&self, node: &str) -> Result<(), ProvisionErr> {
        self.invoke(&self.run_script, node).await
    }

    async fn stop(&self, node: &str) -> Result<(), ProvisionErr> {
        self.invoke(&self.kill_script, node).await
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use tempfile::TempDir;

    use super::{Provisioner, ScriptProvisioner};
    use crate::ProvisionErr;

    fn script(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn scripts_receive_the_node_name() {
        let dir = tempfile::tempdir().unwrap();
        let started = dir.path().join("started");
        let stopped = dir.path().join("stopped");

        let run = script(
            &dir,
            "run.sh",
            &format!("echo \"starting $1\"\necho \"$1\" >> {}\n", started.display()),
        );
        let kill = script(&dir, "kill.sh", &format!("echo \"$1\" >> {}\n", stopped.display()));

        let provisioner = ScriptProvisioner::new(run, kill);
        provisioner.check().unwrap();

        provisioner.start("node-1").await.unwrap();
        provisioner.start("node-2").await.unwrap();
        provisioner.stop("node-1").await.unwrap();

        assert_eq!(fs::read_to_string(started).unwrap(), "node-1\nnode-2\n");
        assert_eq!(fs::read_to_string(stopped).unwrap(), "node-1\n");
    }

    #[tokio::test]
    async fn missing_script_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner =
            ScriptProvisioner::new(dir.path().join("run.sh"), dir.path().join("kill.sh"));

        assert!(matches!(
            provisioner.check().unwrap_err(),
            ProvisionErr::MissingScript(_)
        ));
        assert!(matches!(
            provisioner.start("node-1").await.unwrap_err(),
            ProvisionErr::MissingScript(_)
        ));
    }

    #[tokio::test]
    async fn non_zero_exit_carries_status_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let run = script(&dir, "run.sh", "echo \"no capacity for $1\" >&2\nexit 3\n");
        let kill = script(&dir, "kill.sh", "exit 0\n");

        let provisioner = ScriptProvisioner::new(run, kill);
        let err = provisioner.start("node-7").await.unwrap_err();

        let ProvisionErr::Failed { status, stderr, .. } = err else {
            panic!("expected a failed script, got {err:?}");
        };
        assert_eq!(status, Some(3));
        assert_eq!(stderr.trim(), "no capacity for node-7");
    }

    #[tokio::test]
    async fn hung_script_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let run = script(&dir, "run.sh", "sleep 5\n");
        let kill = script(&dir, "kill.sh", "exit 0\n");

        let provisioner =
            ScriptProvisioner::new(run, kill).with_timeout(Duration::from_millis(100));

        assert!(matches!(
            provisioner.start("node-1").await.unwrap_err(),
            ProvisionErr::Timeout { .. }
        ));
    }
}
