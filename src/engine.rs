//! Core execution engine: run an untrusted submission in an ephemeral
//! workspace under a wall-clock budget and classify the outcome.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Name the submission is exposed under: both the artifact inside the
/// workspace and the placeholder substituted for its absolute path in
/// captured output.
pub const SOURCE_FILE_NAME: &str = "submission.py";

/// Name of the optional stdin artifact inside the workspace.
pub const INPUT_FILE_NAME: &str = "input.txt";

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Terminal classification of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Execution Failed")]
    ExecutionFailed,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Internal Error")]
    InternalError,
}

/// One submission to execute. Doubles as the HTTP request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub source: String,
    #[serde(default)]
    pub stdin: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Result of one execution. Field names are the external contract.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// Engine configuration, injectable so tests can redirect the workspace
/// root or substitute the interpreter.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter binary used to run submissions.
    pub interpreter: String,
    /// Directory under which per-call workspaces are created.
    pub workspace_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            workspace_root: std::env::temp_dir(),
        }
    }
}

/// Ephemeral scratch directory owned by exactly one execution. The guard
/// removes the directory and everything in it when dropped, on every exit
/// path including panics.
struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn create(root: &Path) -> std::io::Result<Self> {
        let dir = root.join(format!("runbox-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn source_path(&self) -> PathBuf {
        self.dir.join(SOURCE_FILE_NAME)
    }

    fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE_NAME)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(dir = ?self.dir, error = %e, "Failed to remove workspace");
        }
    }
}

/// Execute one submission. Never fails to the caller: every failure mode,
/// including engine-side ones, is encoded as a verdict in the result.
pub fn execute(config: &EngineConfig, request: &ExecutionRequest) -> ExecutionResult {
    info!(
        timeout_seconds = request.timeout_seconds,
        source_len = request.source.len(),
        "Executing submission"
    );
    let started = Instant::now();
    let result = match run_submission(config, request) {
        Ok(result) => result,
        Err(e) => ExecutionResult {
            status: Verdict::InternalError,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            error: Some(e),
        },
    };
    info!(status = ?result.status, execution_time_ms = result.execution_time_ms, "Execution finished");
    result
}

fn run_submission(
    config: &EngineConfig,
    request: &ExecutionRequest,
) -> Result<ExecutionResult, String> {
    if request.timeout_seconds == 0 {
        return Err("timeout_seconds must be positive".to_string());
    }

    let workspace = Workspace::create(&config.workspace_root)
        .map_err(|e| format!("create workspace: {}", e))?;

    let source_path = workspace.source_path();
    fs::write(&source_path, &request.source).map_err(|e| format!("write source file: {}", e))?;

    let mut cmd = Command::new(&config.interpreter);
    cmd.arg(&source_path)
        .current_dir(&workspace.dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if request.stdin.is_empty() {
        cmd.stdin(Stdio::null());
    } else {
        let input_path = workspace.input_path();
        fs::write(&input_path, &request.stdin).map_err(|e| format!("write input file: {}", e))?;
        let input = fs::File::open(&input_path).map_err(|e| format!("open input file: {}", e))?;
        cmd.stdin(Stdio::from(input));
    }

    // Put the child in its own session so a timeout can SIGKILL the whole
    // process group, descendants included.
    unsafe {
        use std::os::unix::process::CommandExt as _;
        cmd.pre_exec(|| {
            if libc::setsid() == -1 && libc::setpgid(0, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| format!("spawn {}: {}", config.interpreter, e))?;

    let stdout_reader = capture_stream(child.stdout.take());
    let stderr_reader = capture_stream(child.stderr.take());

    let pgid = Pid::from_raw(child.id() as i32);
    let wait_outcome = wait_with_deadline(&mut child, Duration::from_secs(request.timeout_seconds));

    // Kill the group unconditionally: straggling descendants would hold the
    // output pipes open and block the reader threads.
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            warn!(pid = child.id(), error = %e, "Failed to kill process group");
        }
    }

    let (status, timed_out) = wait_outcome?;
    let execution_time_ms = started.elapsed().as_millis() as u64;

    if timed_out {
        // Partial output after a forced kill is not trustworthy; drop it.
        let _ = stdout_reader.join();
        let _ = stderr_reader.join();
        return Ok(ExecutionResult {
            status: Verdict::TimeLimitExceeded,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_ms,
            error: Some(format!(
                "Execution timed out after {} seconds",
                request.timeout_seconds
            )),
        });
    }

    let stdout = sanitize_output(&stdout_reader.join().unwrap_or_default(), &source_path);
    let stderr = sanitize_output(&stderr_reader.join().unwrap_or_default(), &source_path);
    let (verdict, error) = classify_exit(&status, &stderr);

    Ok(ExecutionResult {
        status: verdict,
        stdout,
        stderr,
        execution_time_ms,
        error,
    })
}

/// Poll the child against a wall-clock deadline. On deadline, SIGKILL the
/// child's process group and reap it.
fn wait_with_deadline(
    child: &mut Child,
    limit: Duration,
) -> Result<(ExitStatus, bool), String> {
    let deadline = Instant::now().checked_add(limit);
    loop {
        if let Some(status) = child.try_wait().map_err(|e| format!("wait for child: {}", e))? {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let pgid = Pid::from_raw(child.id() as i32);
            if killpg(pgid, Signal::SIGKILL).is_err() {
                let _ = child.kill();
            }
            let status = child
                .wait()
                .map_err(|e| format!("reap child after kill: {}", e))?;
            return Ok((status, true));
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn capture_stream<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_string(&mut buf);
        }
        buf
    })
}

/// Classify a finished child by exit status. A non-zero exit with empty
/// stderr lands in ExecutionFailed; this is a heuristic, not a guaranteed
/// signal of any particular failure class (a process killed by a signal
/// without a message lands here too).
fn classify_exit(status: &ExitStatus, stderr: &str) -> (Verdict, Option<String>) {
    if status.success() {
        return (Verdict::Accepted, None);
    }
    let verdict = if stderr.is_empty() {
        Verdict::ExecutionFailed
    } else {
        Verdict::RuntimeError
    };
    let detail = match status.code() {
        Some(code) => format!("Process exited with code {}", code),
        None => {
            use std::os::unix::process::ExitStatusExt as _;
            match status.signal() {
                Some(sig) => format!("Process terminated by signal {}", sig),
                None => "Process terminated abnormally".to_string(),
            }
        }
    };
    (verdict, Some(detail))
}

/// Trim the stream and rewrite the workspace's source path to a fixed
/// placeholder so untrusted output never reveals host filesystem structure.
/// Tracebacks embed the full path, so this runs on RuntimeError output too.
fn sanitize_output(text: &str, source_path: &Path) -> String {
    text.trim()
        .replace(&source_path.display().to_string(), SOURCE_FILE_NAME)
}
