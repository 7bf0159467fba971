//! Git binary driver
//!
//! Runs `git -C <repo> ...` as a subprocess. Output (stdout and stderr
//! combined) is captured in an anonymous temp file so a long-running command
//! can be polled against its deadline without filling a pipe.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::User;
use crate::error::{GitDbError, Result};

use super::VersionControl;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Version control through the `git` command line
#[derive(Debug, Clone)]
pub struct GitBinary {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Default for GitBinary {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl GitBinary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill commands running longer than `timeout` (`None` waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the git executable can be run at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Run one git command in `repo`, returning its combined output
    fn run(&self, repo: &Path, args: &[&str]) -> Result<String> {
        debug!(repo = %repo.display(), command = %args.join(" "), "git");

        let mut output = tempfile::tempfile()?;
        let mut child = Command::new(&self.program)
            .arg("-C")
            .arg(repo)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::from(output.try_clone()?))
            .stderr(Stdio::from(output.try_clone()?))
            .spawn()
            .map_err(|e| GitDbError::Sync(format!("failed to run git: {}", e)))?;

        let status = self.wait(&mut child, args)?;

        let mut bytes = Vec::new();
        output.seek(SeekFrom::Start(0))?;
        output.read_to_end(&mut bytes)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        if status.success() {
            Ok(text)
        } else {
            Err(GitDbError::Sync(format!(
                "git {} failed ({}): {}",
                args.join(" "),
                status,
                text.trim()
            )))
        }
    }

    fn wait(&self, child: &mut Child, args: &[&str]) -> Result<ExitStatus> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return Ok(child.wait()?),
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitDbError::Sync(format!(
                    "git {} timed out after {:?}",
                    args.join(" "),
                    timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn has_commits(&self, repo: &Path) -> bool {
        self.run(repo, &["rev-parse", "--verify", "--quiet", "HEAD"])
            .is_ok()
    }
}

impl VersionControl for GitBinary {
    fn is_repository(&self, repo: &Path) -> bool {
        repo.join(".git").exists()
    }

    fn init(&self, repo: &Path, branch: &str, remotes: &[(&str, &str)]) -> Result<()> {
        fs::create_dir_all(repo)?;
        self.run(repo, &["init"])?;

        let head = format!("refs/heads/{}", branch);
        self.run(repo, &["symbolic-ref", "HEAD", &head])?;

        for &(name, url) in remotes {
            self.run(repo, &["remote", "add", name, url])?;
        }
        Ok(())
    }

    fn pull(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(repo, &["pull", "--no-edit", remote, branch])?;
        Ok(())
    }

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(repo, &["push", remote, branch])?;
        Ok(())
    }

    fn commit(&self, repo: &Path, message: &str, author: &User) -> Result<()> {
        // identity failures are not fatal; git falls back to global config
        if let Err(e) = self.run(repo, &["config", "user.email", &author.email]) {
            warn!(error = %e, "failed to set commit email");
        }
        if let Err(e) = self.run(repo, &["config", "user.name", &author.name]) {
            warn!(error = %e, "failed to set commit name");
        }

        self.run(repo, &["add", "--all", "."])?;

        let status = self.run(repo, &["status", "--porcelain"])?;
        if status.trim().is_empty() {
            debug!("nothing to commit");
            return Ok(());
        }

        self.run(repo, &["commit", "-m", message])?;
        Ok(())
    }

    fn checkout(&self, repo: &Path, pathspec: &str) -> Result<()> {
        if !self.has_commits(repo) {
            return Ok(());
        }
        self.run(repo, &["checkout", "--", pathspec])?;
        Ok(())
    }

    fn last_commit_time(&self, repo: &Path, remote: &str) -> Result<DateTime<Utc>> {
        let remotes = format!("--remotes={}", remote);
        let out = self.run(repo, &["log", "-1", &remotes, "--format=%cI"])?;
        let stamp = out.trim();
        if stamp.is_empty() {
            return Err(GitDbError::Sync(format!("no commits seen on remote {}", remote)));
        }

        DateTime::parse_from_rfc3339(stamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| GitDbError::Sync(format!("bad commit time {:?}: {}", stamp, e)))
    }
}
