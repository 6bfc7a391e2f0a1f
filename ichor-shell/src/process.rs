//! Process-backed sandbox.
//!
//! Every call spawns the engine shell on a freshly written script, so a
//! crash or hang never takes the fuzzer down with it. State that must
//! outlive one call is replayed: `execute` re-runs every fragment executed
//! since the last `reset` before the new one, and the leak probe re-runs
//! the isolated evaluation and reclamation passes recorded since the last
//! count.
//!
//! The script reports back through a single marker line on stdout:
//!
//! ```text
//! __ichor__ {"threw":false,"text":"42"}
//! ```
//!
//! A clean exit without that line means the engine shell did not behave as
//! configured, and is reported as [`SandboxError::Unavailable`].

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, trace, warn};

use ichor::config::SandboxConfig;
use ichor::render::quote;
use ichor::sandbox::{ExecutionSandbox, Outcome, ReachableProbe, SandboxError};

/// Prefix of the report line.
pub const MARKER: &str = "__ichor__ ";

/// Lines of stderr kept in a crash report.
const STDERR_TAIL: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What the script printed after the marker.
#[derive(Debug, Deserialize)]
struct Report {
    threw: bool,
    text: Option<String>,
}

impl From<Report> for Outcome {
    fn from(report: Report) -> Self {
        if report.threw {
            Outcome {
                threw: true,
                error_text: report.text,
                value: None,
            }
        } else {
            Outcome {
                threw: false,
                error_text: None,
                value: report.text,
            }
        }
    }
}

/// Runs code in an external engine shell, one process per call.
#[derive(Debug)]
pub struct ProcessSandbox {
    engine: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    print: String,
    reclaim: Option<String>,
    count: Option<String>,
    /// Fragments executed in the shared environment, replayed before the
    /// next one.
    history: String,
    /// Statements recorded for the next reachable count.
    session: Vec<String>,
    workdir: TempDir,
    runs: u64,
}

impl ProcessSandbox {
    /// Fails with [`SandboxError::Unavailable`] when no engine is configured
    /// or it does not exist.
    pub fn new(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let engine = config
            .engine
            .clone()
            .ok_or_else(|| SandboxError::Unavailable("no engine configured".into()))?;
        if !engine.exists() {
            return Err(SandboxError::Unavailable(format!(
                "engine {} not found",
                engine.display()
            )));
        }
        Ok(Self {
            engine,
            args: config.engine_args.clone(),
            timeout: config.timeout(),
            print: config.print_function.clone(),
            reclaim: config.reclaim_expression.clone(),
            count: config.count_expression.clone(),
            history: String::new(),
            session: Vec::new(),
            workdir: tempfile::Builder::new().prefix("ichor-").tempdir()?,
            runs: 0,
        })
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// Engine processes spawned so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Whether this sandbox can count reachable objects.
    pub fn can_count(&self) -> bool {
        self.count.is_some()
    }

    /// Definitions every script starts with. The print and stringify
    /// functions are captured before generated code can replace them.
    fn header(&self) -> String {
        format!(
            "var __ichor_print = {print};\n\
             var __ichor_json = JSON.stringify;\n\
             function __ichor_str(v) {{ try {{ return String(v); }} catch (e) {{ return \"<unprintable>\"; }} }}\n\
             function __ichor_report(threw, text) {{ __ichor_print({marker} + __ichor_json({{ threw: threw, text: text === undefined ? null : text }})); }}\n",
            print = self.print,
            marker = quote(MARKER),
        )
    }

    /// Run a script body and parse its report.
    fn report(&mut self, body: &str) -> Result<Outcome, SandboxError> {
        let script = format!("{}{}", self.header(), body);
        let stdout = self.spawn(&script)?;
        parse_report(&stdout).map(Outcome::from)
    }

    /// Write `script`, run the engine on it under the timeout and return
    /// its stdout.
    fn spawn(&mut self, script: &str) -> Result<String, SandboxError> {
        let dir = self.workdir.path();
        let script_path = dir.join("case.js");
        let out_path = dir.join("stdout.txt");
        let err_path = dir.join("stderr.txt");
        fs::write(&script_path, script)?;

        self.runs += 1;
        trace!(run = self.runs, bytes = script.len(), "spawning engine");
        let mut child = Command::new(&self.engine)
            .args(&self.args)
            .arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(File::create(&out_path)?))
            .stderr(Stdio::from(File::create(&err_path)?))
            .spawn()?;

        let status = match wait_timeout(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                warn!(timeout = ?self.timeout, "engine timed out; killing");
                child.kill()?;
                child.wait()?;
                return Err(SandboxError::TimedOut(self.timeout));
            }
        };

        if !status.success() {
            let stderr = fs::read_to_string(&err_path).unwrap_or_default();
            return Err(SandboxError::Crashed {
                status: status.code(),
                detail: describe_exit(&status, &stderr),
            });
        }
        Ok(fs::read_to_string(&out_path)?)
    }
}

/// Poll `child` until it exits or `timeout` elapses.
fn wait_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn describe_exit(status: &ExitStatus, stderr: &str) -> String {
    use std::os::unix::process::ExitStatusExt;

    let tail = tail(stderr, STDERR_TAIL);
    match status.signal() {
        Some(signal) if tail.is_empty() => format!("killed by signal {}", signal),
        Some(signal) => format!("killed by signal {}: {}", signal, tail),
        None => tail,
    }
}

#[cfg(not(unix))]
fn describe_exit(_status: &ExitStatus, stderr: &str) -> String {
    tail(stderr, STDERR_TAIL)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// The last marker line of `stdout`, decoded.
fn parse_report(stdout: &str) -> Result<Report, SandboxError> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(MARKER))
        .ok_or_else(|| SandboxError::Unavailable("engine printed no report".into()))?;
    serde_json::from_str(line)
        .map_err(|e| SandboxError::Unavailable(format!("malformed report: {}", e)))
}

/// `code` run through a direct `eval`, errors swallowed.
fn replayed(code: &str) -> String {
    format!("try {{ eval({}); }} catch (e) {{ }}\n", quote(code))
}

/// `code` run through an indirect `eval` inside a function that is then
/// dropped, errors swallowed.
fn isolated(code: &str) -> String {
    format!(
        "try {{ (function () {{ (0, eval)({}); }})(); }} catch (e) {{ }}\n",
        quote(code)
    )
}

impl ExecutionSandbox for ProcessSandbox {
    fn reset(&mut self, prelude: &str) -> Result<(), SandboxError> {
        debug!(bytes = prelude.len(), "new shared environment");
        self.history = replayed(prelude);
        Ok(())
    }

    fn compile(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        let body = format!(
            "try {{ new Function({}); __ichor_report(false); }} \
             catch (e) {{ __ichor_report(true, __ichor_str(e)); }}\n",
            quote(code)
        );
        self.report(&body)
    }

    fn execute(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        let body = format!(
            "{}try {{ __ichor_report(false, __ichor_str(eval({}))); }} \
             catch (e) {{ __ichor_report(true, __ichor_str(e)); }}\n",
            self.history,
            quote(code)
        );
        let outcome = self.report(&body)?;
        self.history.push_str(&replayed(code));
        Ok(outcome)
    }

    fn evaluate_isolated(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        let body = format!(
            "try {{ __ichor_report(false, __ichor_str((0, eval)({}))); }} \
             catch (e) {{ __ichor_report(true, __ichor_str(e)); }}\n",
            quote(code)
        );
        let outcome = self.report(&body)?;
        self.session.push(isolated(code));
        Ok(outcome)
    }

    fn force_reclaim(&mut self) -> Result<(), SandboxError> {
        let reclaim = self
            .reclaim
            .as_ref()
            .ok_or_else(|| SandboxError::Unavailable("no reclaim expression configured".into()))?;
        self.session
            .push(format!("try {{ {}; }} catch (e) {{ }}\n", reclaim));
        Ok(())
    }
}

impl ReachableProbe for ProcessSandbox {
    fn start(&mut self) -> Result<(), SandboxError> {
        self.session.clear();
        Ok(())
    }

    fn count_reachable(&mut self) -> Result<u64, SandboxError> {
        let count = self
            .count
            .clone()
            .ok_or_else(|| SandboxError::Unavailable("no count expression configured".into()))?;
        let mut body: String = self.session.drain(..).collect();
        body.push_str(&format!(
            "__ichor_report(false, __ichor_str({}));\n",
            count
        ));
        let outcome = self.report(&body)?;
        let text = outcome.value.unwrap_or_default();
        text.trim()
            .parse()
            .map_err(|_| SandboxError::Unavailable(format!("count was not a number: {:?}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(engine: &Path) -> SandboxConfig {
        SandboxConfig {
            engine: Some(engine.to_path_buf()),
            ..SandboxConfig::default()
        }
    }

    #[test]
    fn test_missing_engine_is_unavailable() {
        let err = ProcessSandbox::new(&SandboxConfig::default()).unwrap_err();
        assert!(matches!(err, SandboxError::Unavailable(_)));

        let err = ProcessSandbox::new(&config(Path::new("/no/such/engine"))).unwrap_err();
        assert!(matches!(err, SandboxError::Unavailable(_)));
        assert!(!err.is_engine_fault());
    }

    #[test]
    fn test_parse_report_takes_last_marker() {
        let stdout = "noise\n__ichor__ {\"threw\":true,\"text\":\"a\"}\n\
                      more\n__ichor__ {\"threw\":false,\"text\":\"7\"}\n";
        let outcome = Outcome::from(parse_report(stdout).unwrap());
        assert_eq!(outcome, Outcome::value("7"));
    }

    #[test]
    fn test_parse_report_threw() {
        let outcome =
            Outcome::from(parse_report("__ichor__ {\"threw\":true,\"text\":\"boom\"}").unwrap());
        assert_eq!(outcome, Outcome::threw("boom"));

        let outcome = Outcome::from(parse_report("__ichor__ {\"threw\":false,\"text\":null}").unwrap());
        assert_eq!(outcome, Outcome::ok());
    }

    #[test]
    fn test_missing_or_bad_report() {
        assert!(matches!(
            parse_report("hello\n"),
            Err(SandboxError::Unavailable(_))
        ));
        assert!(matches!(
            parse_report("__ichor__ {nope"),
            Err(SandboxError::Unavailable(_))
        ));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("a", 5), "a");
        assert_eq!(tail("", 5), "");
    }

    #[test]
    fn test_replayed_quotes_code() {
        assert_eq!(
            replayed("a = \"x\";\nb"),
            "try { eval(\"a = \\\"x\\\";\\nb\"); } catch (e) { }\n"
        );
        assert!(isolated("1").contains("(0, eval)(\"1\")"));
    }
}
