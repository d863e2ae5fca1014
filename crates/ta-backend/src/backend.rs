//! External model-checker interface (`spec.md` §4.11).
//!
//! Grounded in `backend/interface/verifyta.py`: spawn `verifyta` as a child
//! process, wait for it with a timeout, kill and drain its pipes if it runs
//! over, and scan stdout for the literal satisfaction marker. Timed via
//! `std::time::Instant` and logged via `tracing`, mirroring the Python
//! source's `log_time`/`verifyta_log` discipline (SPEC_FULL §7.1).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::BackendError;

const SATISFIED_MARKER: &str = "-- Formula is satisfied.";

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub is_timeout: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct VerifytaInterface {
    pub verifyta_path: PathBuf,
    pub timeout: Duration,
}

impl VerifytaInterface {
    pub fn new(verifyta_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { verifyta_path: verifyta_path.into(), timeout }
    }

    /// Spawns `args`, waits up to `self.timeout`; on timeout, kills the
    /// child and drains whatever it had written so far instead of losing
    /// it (`execute_command`'s `TimeoutExpired` -> `kill()` ->
    /// second `communicate()`).
    pub fn execute_command(&self, args: &[String]) -> Result<CommandOutcome, BackendError> {
        let start = Instant::now();
        let mut child = Command::new(&self.verifyta_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::LaunchFailed(e.to_string()))?;

        let deadline = start + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let mut stdout = String::new();
                        let mut stderr = String::new();
                        if let Some(mut out) = child.stdout.take() {
                            let _ = out.read_to_string(&mut stdout);
                        }
                        if let Some(mut err) = child.stderr.take() {
                            let _ = err.read_to_string(&mut stderr);
                        }
                        let _ = child.wait();
                        tracing::debug!(elapsed = ?start.elapsed(), "verifyta timed out");
                        return Ok(CommandOutcome { stdout, stderr, is_timeout: true, elapsed: start.elapsed() });
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => return Err(BackendError::LaunchFailed(e.to_string())),
            }
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout).map_err(|e| BackendError::MalformedOutput(e.to_string()))?;
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr).map_err(|e| BackendError::MalformedOutput(e.to_string()))?;
        }
        tracing::debug!(elapsed = ?start.elapsed(), "verifyta finished");
        Ok(CommandOutcome { stdout, stderr, is_timeout: false, elapsed: start.elapsed() })
    }

    /// Assembles `[verifyta_path] + settings + [model_file_path] +
    /// [query_file_path?]`, creates `output_dir` if missing, and runs it
    /// (`execute_verifyta`).
    #[tracing::instrument(name = "invoke_backend", skip(self, settings), fields(verifyta = %self.verifyta_path.display()))]
    pub fn execute_verifyta(
        &self,
        settings: &[String],
        model_file_path: &Path,
        query_file_path: Option<&Path>,
        output_dir: &Path,
    ) -> Result<CommandOutcome, BackendError> {
        std::fs::create_dir_all(output_dir).map_err(|e| BackendError::LaunchFailed(e.to_string()))?;

        let mut args: Vec<String> = settings.to_vec();
        args.push(model_file_path.display().to_string());
        if let Some(query_file_path) = query_file_path {
            args.push(query_file_path.display().to_string());
        }
        self.execute_command(&args)
    }

    /// `-t 0 -X <trace_prefix>` — matcher settings (§4.11).
    pub fn matcher_settings(trace_prefix: &Path) -> Vec<String> {
        vec!["-t".to_string(), "0".to_string(), "-X".to_string(), trace_prefix.display().to_string()]
    }

    /// Matcher settings plus `-o 2 -Y` — trace-generator settings (§4.11).
    pub fn trace_generator_settings(trace_prefix: &Path) -> Vec<String> {
        let mut s = Self::matcher_settings(trace_prefix);
        s.extend(["-o".to_string(), "2".to_string(), "-Y".to_string()]);
        s
    }

    /// The success/match verdict is a literal substring match, not a parsed
    /// result code (`spec.md` §4.11).
    pub fn is_satisfied(outcome: &CommandOutcome) -> bool {
        outcome.stdout.contains(SATISFIED_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_satisfied_requires_the_exact_marker() {
        let outcome = CommandOutcome {
            stdout: "Verifying formula 1\n-- Formula is satisfied.\n".to_string(),
            stderr: String::new(),
            is_timeout: false,
            elapsed: Duration::ZERO,
        };
        assert!(VerifytaInterface::is_satisfied(&outcome));
    }

    #[test]
    fn is_satisfied_rejects_a_near_miss() {
        let outcome = CommandOutcome {
            stdout: "-- Formula is NOT satisfied.\n".to_string(),
            stderr: String::new(),
            is_timeout: false,
            elapsed: Duration::ZERO,
        };
        assert!(!VerifytaInterface::is_satisfied(&outcome));
    }

    #[test]
    fn matcher_settings_are_t0_and_trace_prefix() {
        let settings = VerifytaInterface::matcher_settings(Path::new("/tmp/out/m"));
        assert_eq!(settings, vec!["-t", "0", "-X", "/tmp/out/m"]);
    }

    #[test]
    fn trace_generator_settings_extend_matcher_settings() {
        let settings = VerifytaInterface::trace_generator_settings(Path::new("/tmp/out/g"));
        assert_eq!(settings, vec!["-t", "0", "-X", "/tmp/out/g", "-o", "2", "-Y"]);
    }
}
