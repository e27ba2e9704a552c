use std::io;
use std::process::Stdio;
use std::time::Duration;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{OracleOptions, Score, SearchBudget};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine {path:?}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("engine io error: {0}")]
    Io(#[from] io::Error),
    #[error("engine exited unexpectedly")]
    Exited,
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("engine did not become ready within {0:?}")]
    StartupTimeout(Duration),
    #[error("engine pool is closed")]
    PoolClosed,
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EngineError::PoolClosed)
    }
}

static SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bscore\s+(cp|mate)\s+(-?\d+)(\s+(lowerbound|upperbound))?").unwrap()
});

/// Extracts the score of a UCI `info` line. Bound-only scores from aspiration windows are skipped.
pub fn parse_info_score(line: &str) -> Option<Score> {
    if !line.starts_with("info") || line.starts_with("info string") {
        return None;
    }

    let cap = SCORE_RE.captures(line)?;

    if cap.get(4).is_some() {
        return None;
    }

    let value = cap[2].parse::<i32>().ok()?;

    match &cap[1] {
        "cp" => Some(Score::Centipawns(value)),
        _ => Some(Score::Mate(value)),
    }
}

/// One external engine process spoken to over UCI.
pub struct UciEngine {
    id: usize,
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    searching: bool,
}

impl UciEngine {
    pub async fn spawn(id: usize, options: &OracleOptions) -> Result<Self, EngineError> {
        let mut child = Command::new(&options.engine_path)
            .args(&options.engine_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: options.engine_path.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdout unavailable".to_string()))?;

        let mut engine = Self {
            id,
            _child: child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            searching: false,
        };

        let startup_timeout = options.startup_timeout();
        tokio::time::timeout(startup_timeout, engine.handshake(options))
            .await
            .map_err(|_| EngineError::StartupTimeout(startup_timeout))??;

        Ok(engine)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// False while a search is in flight. Such an engine still owes a `bestmove` and must not be reused.
    pub fn is_idle(&self) -> bool {
        !self.searching
    }

    async fn handshake(&mut self, options: &OracleOptions) -> Result<(), EngineError> {
        self.send("uci").await?;
        self.read_until(|line| line == "uciok").await?;

        self.send(&format!("setoption name Threads value {}", options.engine_threads))
            .await?;
        self.send(&format!("setoption name Hash value {}", options.engine_hash_mb))
            .await?;

        self.send("isready").await?;
        self.read_until(|line| line == "readyok").await?;

        Ok(())
    }

    pub async fn search(
        &mut self,
        position_command: &str,
        budget: &SearchBudget,
    ) -> Result<Score, EngineError> {
        self.send(position_command).await?;
        self.send(&budget.go_command()).await?;
        self.searching = true;

        let mut score = None;

        loop {
            let line = self.read_line().await?;

            if line.starts_with("bestmove") {
                break;
            }

            if let Some(s) = parse_info_score(&line) {
                score = Some(s);
            }
        }

        self.searching = false;

        score.ok_or_else(|| EngineError::Protocol("no score reported before bestmove".to_string()))
    }

    pub async fn quit(mut self) {
        let _ = self.send("quit").await;
    }

    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!("engine {} << {}", self.id, cmd);
        self.stdin.write_all(cmd.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, EngineError> {
        let line = self.lines.next_line().await?.ok_or(EngineError::Exited)?;
        Ok(line.trim().to_owned())
    }

    async fn read_until<F: Fn(&str) -> bool>(&mut self, done: F) -> Result<(), EngineError> {
        loop {
            let line = self.read_line().await?;
            if done(&line) {
                return Ok(());
            }
        }
    }
}
