//! External agent process driven over JSONL on stdin/stdout.
//!
//! Each prompt is written as one JSON object per line:
//!
//! ```json
//! {"task_id": "t1", "model": "gpt-x", "trial_index": 0, "prompt": "...", "files": []}
//! ```
//!
//! and the process answers with a line holding `output` (plus optional
//! `tool_calls`) or `error`. Non-JSON lines on stdout are skipped. The model
//! name is exported to the process as `SKILLBENCH_MODEL`.
//!
//! The process is spawned on first use. While a prompt is in flight it is
//! owned by the call, so a call cancelled by the trial deadline kills it and
//! the next prompt starts a fresh one.

use super::{AgentEngine, EngineError, EngineRequest, EngineResponse, EngineSettings};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct AgentReply {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    tool_calls: u32,
    #[serde(default)]
    error: Option<String>,
}

struct AgentProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_task: JoinHandle<()>,
}

impl AgentProcess {
    fn spawn(
        command: &str,
        env: &BTreeMap<String, String>,
        model: &str,
        work_dir: Option<&PathBuf>,
    ) -> Result<Self, EngineError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // A missing fixtures directory leaves the agent in the caller's cwd.
        if let Some(dir) = work_dir.filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }
        cmd.envs(env);
        cmd.env("SKILLBENCH_MODEL", model);

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("agent process missing stdout".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("agent process missing stdin".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Protocol("agent process missing stderr".into()))?;

        let model_name = model.to_string();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    warn!(model = %model_name, "[stderr] {}", line);
                }
            }
        });

        debug!(command, model, "spawned agent process");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_task,
        })
    }

    /// Outer error: the transport broke and the process must be discarded.
    /// Inner error: the agent reported a failure and stays usable.
    async fn exchange(
        &mut self,
        request: &EngineRequest,
    ) -> Result<Result<EngineResponse, String>, EngineError> {
        let payload = json!({
            "task_id": request.task_id,
            "model": request.model,
            "trial_index": request.trial_index,
            "prompt": request.prompt,
            "files": request.files,
        });
        let line = payload.to_string() + "\n";
        let started = Instant::now();
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let mut buf = String::new();
            let n = self.stdout.read_line(&mut buf).await?;
            if n == 0 {
                return Err(EngineError::Protocol(
                    "agent process exited unexpectedly (EOF)".into(),
                ));
            }
            if buf.trim().is_empty() {
                continue;
            }
            let reply = match serde_json::from_str::<Value>(&buf) {
                Ok(Value::Object(map))
                    if map.contains_key("output") || map.contains_key("error") =>
                {
                    serde_json::from_value::<AgentReply>(Value::Object(map))
                        .map_err(|e| EngineError::Protocol(format!("malformed reply: {e}")))?
                }
                _ => continue,
            };
            return Ok(match (reply.error, reply.output) {
                (Some(error), _) => Err(error),
                (None, Some(output)) => Ok(EngineResponse {
                    output,
                    tool_calls: reply.tool_calls,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    from_cache: false,
                }),
                (None, None) => Err("agent returned neither output nor error".into()),
            });
        }
    }

    async fn terminate(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("agent process already gone: {e}");
        }
        self.stderr_task.abort();
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        self.stderr_task.abort();
    }
}

/// Model-backed engine running an agent command per model.
pub struct CommandEngine {
    command: String,
    model: String,
    env: BTreeMap<String, String>,
    work_dir: Option<PathBuf>,
    process: Mutex<Option<AgentProcess>>,
}

impl CommandEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let command = settings
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                EngineError::Unavailable("the command executor requires config.command".into())
            })?;
        Ok(Self {
            command: command.to_string(),
            model: settings.model.clone(),
            env: settings.env.clone(),
            work_dir: settings.work_dir.clone(),
            process: Mutex::new(None),
        })
    }
}

#[async_trait]
impl AgentEngine for CommandEngine {
    async fn send_prompt(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        let mut slot = self.process.lock().await;
        let mut process = match slot.take() {
            Some(process) => process,
            None => AgentProcess::spawn(
                &self.command,
                &self.env,
                &self.model,
                self.work_dir.as_ref(),
            )?,
        };

        match process.exchange(request).await {
            Ok(reply) => {
                *slot = Some(process);
                reply.map_err(EngineError::Failed)
            }
            Err(e) => {
                warn!(model = %self.model, "discarding agent process: {e}");
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        if let Some(process) = self.process.lock().await.take() {
            process.terminate().await;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("command:{}:{}", self.command, self.model)
    }
}
