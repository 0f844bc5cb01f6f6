//! Generic CLI-backed agent.
//!
//! Runs one external executable per call. Non-streaming execution
//! captures stdout/stderr; streaming execution attaches the child to a
//! pseudo-terminal and classifies each line as output or an interactive
//! prompt.

use std::io::{BufRead, BufReader, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use regex::Regex;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use hub_core::agent::{
    Agent, ExecutionContext, ExecutionResult, RuntimeCapabilities, StreamEvent, StreamEventKind,
    STREAM_CHANNEL_CAPACITY,
};
use hub_core::error::{HubError, Result};
use hub_core::model::{AgentCard, AgentHealth};
use hub_core::registry::HEALTH_PROBE_TIMEOUT;

/// Placeholder replaced by the user prompt in argument templates.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Configuration of one CLI backend.
#[derive(Debug, Clone)]
pub struct CliAgentConfig {
    pub agent_id: String,
    pub name: String,
    pub exec: String,
    /// Argument template; every `{prompt}` element is replaced per call.
    pub args: Vec<String>,
    pub health_args: Vec<String>,
    pub card: AgentCard,
    /// Lines matching any of these mark an interactive prompt.
    pub prompt_patterns: Vec<String>,
}

/// A CLI-backed agent.
pub struct CliAgent {
    config: CliAgentConfig,
    prompt_patterns: Vec<Regex>,
}

enum ChildExit {
    Status(portable_pty::ExitStatus),
    Timeout,
    Canceled,
    WaitFailed(String),
}

impl CliAgent {
    /// Invalid prompt patterns are skipped rather than failing
    /// construction.
    pub fn new(config: CliAgentConfig) -> CliAgent {
        let prompt_patterns = config
            .prompt_patterns
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "skipping invalid prompt pattern");
                    None
                }
            })
            .collect();
        CliAgent {
            config,
            prompt_patterns,
        }
    }

    pub fn exec_path(&self) -> &str {
        &self.config.exec
    }

    pub fn template_args(&self) -> &[String] {
        &self.config.args
    }

    /// Replace each `{prompt}` element of `template` with the prompt
    /// text.
    pub fn substitute_prompt(template: &[String], prompt: &str) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                if arg == PROMPT_PLACEHOLDER {
                    prompt.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }

    fn is_prompt(&self, line: &str) -> bool {
        self.prompt_patterns.iter().any(|re| re.is_match(line))
    }

    /// Non-streaming execution with an explicit argument template.
    /// Specializations rebuild the template per call and pass an
    /// assembled prompt.
    pub async fn run_with_args(
        &self,
        ctx: &ExecutionContext,
        template: &[String],
        prompt: &str,
    ) -> Result<ExecutionResult> {
        if prompt.trim().is_empty() {
            return Err(HubError::EmptyPrompt);
        }
        let args = Self::substitute_prompt(template, prompt);
        debug!(agent_id = %self.config.agent_id, exec = %self.config.exec, "executing");

        let mut cmd = Command::new(&self.config.exec);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let working_dir = ctx.working_dir.trim();
        if !working_dir.is_empty() {
            cmd.current_dir(working_dir);
        }

        let run = cmd.output();
        tokio::pin!(run);
        let output = tokio::select! {
            result = &mut run => {
                result.map_err(|err| HubError::Execution(err.to_string()))?
            }
            _ = deadline(ctx.timeout) => return Err(HubError::Timeout),
            _ = ctx.cancel.cancelled() => {
                return Err(HubError::Execution("execution canceled".to_string()))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !stderr.is_empty() {
                return Err(HubError::Execution(stderr));
            }
            return Err(HubError::Execution(output.status.to_string()));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(ExecutionResult::completed_text(ctx, text))
    }

    /// Streaming execution with an explicit argument template. The child
    /// runs under a fresh PTY; lines flow out through `output`, keystrokes
    /// flow back through `input`.
    pub async fn stream_with_args(
        &self,
        ctx: &ExecutionContext,
        template: &[String],
        prompt: &str,
        output: mpsc::Sender<StreamEvent>,
        mut input: mpsc::Receiver<String>,
    ) -> Result<()> {
        let agent_id = self.config.agent_id.clone();
        let task_id = ctx.task_id.clone();
        let send_event = |kind: StreamEventKind, text: Option<String>| {
            let mut event = StreamEvent::new(kind, &agent_id, &task_id);
            event.text = text;
            event
        };

        if prompt.trim().is_empty() {
            let _ = output
                .send(send_event(
                    StreamEventKind::Error,
                    Some("empty prompt".to_string()),
                ))
                .await;
            return Err(HubError::EmptyPrompt);
        }
        let args = Self::substitute_prompt(template, prompt);

        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| HubError::Execution(err.to_string()))?;

        let mut cmd = CommandBuilder::new(&self.config.exec);
        cmd.args(&args);
        let working_dir = ctx.working_dir.trim();
        if !working_dir.is_empty() {
            cmd.cwd(working_dir);
        }

        let mut child = match pair.slave.spawn_command(cmd) {
            Ok(child) => child,
            Err(err) => {
                let _ = output
                    .send(send_event(StreamEventKind::Error, Some(err.to_string())))
                    .await;
                return Err(HubError::Execution(err.to_string()));
            }
        };
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| HubError::Execution(err.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| HubError::Execution(err.to_string()))?;

        // Output reader: blocking line scan off the PTY master. EOF
        // arrives once the child exits and the slave side is closed.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
        let reader_task = tokio::task::spawn_blocking(move || {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = line.trim_end_matches(['\r', '\n']).to_string();
                        if line_tx.blocking_send(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        // Input forwarder: each keystroke line is written to the master
        // with a trailing newline.
        let writer = Arc::new(Mutex::new(writer));
        let forwarder = {
            let writer = writer.clone();
            tokio::spawn(async move {
                while let Some(text) = input.recv().await {
                    let writer = writer.clone();
                    let write = tokio::task::spawn_blocking(move || {
                        let Ok(mut writer) = writer.lock() else {
                            return Err(std::io::Error::other("writer lock poisoned"));
                        };
                        writer.write_all(format!("{text}\n").as_bytes())?;
                        writer.flush()
                    })
                    .await;
                    if !matches!(write, Ok(Ok(()))) {
                        break;
                    }
                }
            })
        };

        // Relay: classify each line and emit it in producer order.
        let relay = {
            let output = output.clone();
            let patterns = self.prompt_patterns.clone();
            let agent_id = agent_id.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move {
                while let Some(line) = line_rx.recv().await {
                    let kind = if patterns.iter().any(|re| re.is_match(&line)) {
                        StreamEventKind::Prompt
                    } else {
                        StreamEventKind::Output
                    };
                    let event = StreamEvent::new(kind, &agent_id, &task_id).with_text(line);
                    if output.send(event).await.is_err() {
                        break;
                    }
                }
            })
        };

        let mut killer = child.clone_killer();
        let wait_task = tokio::task::spawn_blocking(move || child.wait());
        tokio::pin!(wait_task);

        let exit = tokio::select! {
            joined = &mut wait_task => match joined {
                Ok(Ok(status)) => ChildExit::Status(status),
                Ok(Err(err)) => ChildExit::WaitFailed(err.to_string()),
                Err(err) => ChildExit::WaitFailed(err.to_string()),
            },
            _ = deadline(ctx.timeout) => ChildExit::Timeout,
            _ = ctx.cancel.cancelled() => ChildExit::Canceled,
        };

        if matches!(exit, ChildExit::Timeout | ChildExit::Canceled) {
            let _ = killer.kill();
            let _ = wait_task.await;
        }

        // The master must drop for the reader to observe EOF; drain the
        // relay before emitting the terminal event.
        drop(pair.master);
        let _ = reader_task.await;
        let _ = relay.await;
        forwarder.abort();

        match exit {
            ChildExit::Status(status) if status.success() => {
                let _ = output.send(send_event(StreamEventKind::Complete, None)).await;
                Ok(())
            }
            ChildExit::Status(status) => {
                let text = format!("exit status: {}", status.exit_code());
                let _ = output
                    .send(send_event(StreamEventKind::Error, Some(text.clone())))
                    .await;
                Err(HubError::Execution(text))
            }
            ChildExit::WaitFailed(err) => {
                let _ = output
                    .send(send_event(StreamEventKind::Error, Some(err.clone())))
                    .await;
                Err(HubError::Execution(err))
            }
            ChildExit::Timeout => {
                let _ = output
                    .send(send_event(
                        StreamEventKind::Error,
                        Some("deadline exceeded".to_string()),
                    ))
                    .await;
                Err(HubError::Timeout)
            }
            ChildExit::Canceled => {
                let _ = output
                    .send(send_event(
                        StreamEventKind::Error,
                        Some("execution canceled".to_string()),
                    ))
                    .await;
                Err(HubError::Execution("execution canceled".to_string()))
            }
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) if !timeout.is_zero() => tokio::time::sleep(timeout).await,
        _ => std::future::pending().await,
    }
}

#[async_trait]
impl Agent for CliAgent {
    fn id(&self) -> &str {
        &self.config.agent_id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn card(&self) -> AgentCard {
        self.config.card.clone()
    }

    fn capabilities(&self) -> RuntimeCapabilities {
        RuntimeCapabilities::text_only(true)
    }

    async fn check_health(&self) -> Result<AgentHealth> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.config.exec);
        cmd.args(&self.config.health_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) if status.success() => {
                Ok(AgentHealth::healthy(start.elapsed().as_millis() as i64))
            }
            Ok(Ok(status)) => Ok(AgentHealth::unhealthy(status.to_string())),
            Ok(Err(err)) => Ok(AgentHealth::unhealthy(err.to_string())),
            Err(_) => Ok(AgentHealth::unhealthy("health check timed out")),
        }
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult> {
        let prompt = ctx.user_message.text();
        self.run_with_args(&ctx, &self.config.args, &prompt).await
    }

    async fn execute_streaming(
        &self,
        ctx: ExecutionContext,
        output: mpsc::Sender<StreamEvent>,
        input: mpsc::Receiver<String>,
    ) -> Result<()> {
        let prompt = ctx.user_message.text();
        self.stream_with_args(&ctx, &self.config.args, &prompt, output, input)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::model::{Message, TaskState};
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    fn agent_for(exec: String, args: Vec<&str>, patterns: Vec<&str>) -> CliAgent {
        CliAgent::new(CliAgentConfig {
            agent_id: "test-cli".to_string(),
            name: "Test CLI".to_string(),
            exec,
            args: args.into_iter().map(String::from).collect(),
            health_args: vec![],
            card: AgentCard::new("Test CLI", "test", "http://localhost".to_string(), "Test"),
            prompt_patterns: patterns.into_iter().map(String::from).collect(),
        })
    }

    fn ctx(text: &str) -> ExecutionContext {
        ExecutionContext::new("task-1", "ctx-1", Message::user_text(text))
    }

    #[test]
    fn prompt_is_substituted_at_every_placeholder() {
        let template = vec![
            "-p".to_string(),
            "{prompt}".to_string(),
            "--echo".to_string(),
            "{prompt}".to_string(),
        ];
        let args = CliAgent::substitute_prompt(&template, "hello");
        assert_eq!(args, vec!["-p", "hello", "--echo", "hello"]);
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "echo.sh", "echo hi");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let err = agent.execute(ctx("   ")).await.unwrap_err();
        assert!(matches!(err, HubError::EmptyPrompt));
    }

    #[tokio::test]
    async fn execute_captures_trimmed_stdout() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "echo.sh", "echo \"Hi\"");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let result = agent.execute(ctx("hello")).await.unwrap();
        assert_eq!(result.final_state, TaskState::Completed);
        assert_eq!(result.task.result_text(), "Hi");
    }

    #[tokio::test]
    async fn execute_surfaces_stderr_on_failure() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "fail.sh", "echo \"boom\" >&2\nexit 3");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let err = agent.execute(ctx("hello")).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn execute_times_out() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "slow.sh", "sleep 5");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let mut context = ctx("hello");
        context.timeout = Some(Duration::from_millis(50));
        let err = agent.execute(context).await.unwrap_err();
        assert!(matches!(err, HubError::Timeout));
    }

    #[tokio::test]
    async fn streaming_emits_one_terminal_event() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "lines.sh", "echo one\necho two");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let (event_tx, mut event_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (_input_tx, input_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        agent
            .execute_streaming(ctx("go"), event_tx, input_rx)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].kind, StreamEventKind::Complete);
        assert!(events
            .iter()
            .any(|e| e.text.as_deref() == Some("one") && e.kind == StreamEventKind::Output));
    }

    #[tokio::test]
    async fn streaming_classifies_prompt_lines_and_forwards_input() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(
            &dir,
            "interactive.sh",
            "echo \"Proceed? [y/N]\"\nread answer\necho \"got $answer\"",
        );
        let agent = agent_for(exec, vec!["{prompt}"], vec![r"(?i)\bproceed\b"]);
        let (event_tx, mut event_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        let mut context = ctx("go");
        context.timeout = Some(Duration::from_secs(10));
        let run = tokio::spawn(async move {
            agent.execute_streaming(context, event_tx, input_rx).await
        });

        let mut saw_prompt = false;
        let mut saw_answer = false;
        while let Some(event) = tokio::time::timeout(Duration::from_secs(10), event_rx.recv())
            .await
            .unwrap()
        {
            match event.kind {
                StreamEventKind::Prompt => {
                    saw_prompt = true;
                    input_tx.send("y".to_string()).await.unwrap();
                }
                StreamEventKind::Output => {
                    if event.text.as_deref().is_some_and(|t| t.contains("y")) {
                        saw_answer = true;
                    }
                }
                StreamEventKind::Complete => break,
                StreamEventKind::Error => panic!("unexpected error event"),
            }
        }
        assert!(saw_prompt);
        assert!(saw_answer);
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn streaming_failure_emits_error_event() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "fail.sh", "exit 2");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let (event_tx, mut event_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (_input_tx, input_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        let err = agent
            .execute_streaming(ctx("go"), event_tx, input_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Execution(_)));

        let mut terminal = None;
        while let Some(event) = event_rx.recv().await {
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        assert_eq!(terminal.unwrap().kind, StreamEventKind::Error);
    }

    #[tokio::test]
    async fn health_check_reports_latency() {
        let dir = TempDir::new().unwrap();
        let exec = write_script(&dir, "ok.sh", "exit 0");
        let agent = agent_for(exec, vec!["{prompt}"], vec![]);
        let health = agent.check_health().await.unwrap();
        assert_eq!(health.status, hub_core::model::HealthStatus::Healthy);
        assert!(health.latency_ms.is_some());
    }

    #[tokio::test]
    async fn health_check_flags_missing_executable() {
        let agent = agent_for("/no/such/binary".to_string(), vec!["{prompt}"], vec![]);
        let health = agent.check_health().await.unwrap();
        assert_eq!(health.status, hub_core::model::HealthStatus::Unhealthy);
    }
}
