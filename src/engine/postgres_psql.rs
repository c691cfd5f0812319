// This executor drives a locally provided PSQL command. One psql process
// serves every submission, so session settings (`SET lock_timeout`, open
// transactions, ...) carry over from one statement to the next.
//
// After each statement an `\echo` sentinel is sent; psql prints it once the
// statement is done, which marks where that statement's output ends. Row
// counts are read back from the command tags psql prints.

use crate::engine::{ExecutionResult, Executor};
use crate::error::ExecutionError;
use async_trait::async_trait;
use regex::Regex;
use std::io;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Sent once per session. QUIET must come first so the other settings print
/// nothing; it is switched off again so command tags are reported.
const SESSION_SETUP: &str =
    "\\set QUIET on\n\\pset pager off\n\\set ON_ERROR_STOP on\n\\set QUIET off\n";

/// Command tags that carry a row count, plus the `(n rows)` footer printed
/// after a result set. `INSERT` tags carry an oid before the count.
static ROWCOUNT_TAG: OnceLock<Regex> = OnceLock::new();

fn rowcount_tag() -> &'static Regex {
    ROWCOUNT_TAG.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:INSERT \d+ (\d+)",
            r"|(?:UPDATE|DELETE|SELECT|MERGE|COPY|MOVE|FETCH) (\d+)",
            r"|\((\d+) rows?\))$",
        ))
        .expect("row count pattern is valid")
    })
}

/// A running psql process and its pipes.
#[derive(Debug)]
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: JoinHandle<Vec<u8>>,
    configured: bool,
}

impl Session {
    fn spawn(psql_command: &[String]) -> io::Result<Self> {
        let mut child = Command::new(&psql_command[0])
            .args(&psql_command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        // Drained for the whole life of the session so psql never blocks on it
        let stderr = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        tracing::debug!("started psql session (pid {:?})", child.id());

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr,
            configured: false,
        })
    }

    /// Writes `payload` and reads stdout up to the line holding `sentinel`.
    /// Both sides run together so a large payload cannot deadlock against
    /// psql's output.
    async fn exchange(&mut self, payload: &str, sentinel: &str) -> io::Result<String> {
        let stdin = &mut self.stdin;
        let stdout = &mut self.stdout;

        let write = async move {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.flush().await?;
            Ok::<(), io::Error>(())
        };

        let read = async move {
            let mut output = String::new();
            let mut line = String::new();
            loop {
                line.clear();
                if stdout.read_line(&mut line).await? == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "psql exited before finishing the statement",
                    ));
                }
                if line.trim_end() == sentinel {
                    return Ok::<String, io::Error>(output);
                }
                output.push_str(&line);
            }
        };

        let ((), output) = tokio::try_join!(write, read)?;
        Ok(output)
    }

    /// Closes stdin, lets psql run to the end and reports how it exited.
    async fn finish(self) -> ExecutionResult<()> {
        let Session {
            mut child,
            stdin,
            mut stdout,
            stderr,
            ..
        } = self;
        drop(stdin);

        let mut rest = Vec::new();
        let _ = stdout.read_to_end(&mut rest).await;
        if !rest.is_empty() {
            tracing::debug!("psql: {}", String::from_utf8_lossy(&rest).trim_end());
        }

        let status = child.wait().await?;
        let stderr_bytes = stderr.await.unwrap_or_default();

        if !status.success() {
            return Err(ExecutionError::StatementFailed {
                exit_code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
            });
        }

        Ok(())
    }

    /// Turns a broken exchange into the most useful error: psql's own exit
    /// code and stderr when it stopped on a failed statement, the i/o error
    /// otherwise.
    async fn into_failure(self, cause: io::Error) -> ExecutionError {
        match self.finish().await {
            Err(failed @ ExecutionError::StatementFailed { .. }) => failed,
            _ => ExecutionError::Io(cause),
        }
    }
}

fn missing_pipe(name: &str) -> io::Error {
    io::Error::other(format!("psql {} was not captured", name))
}

#[derive(Debug)]
pub struct PSQL {
    psql_command: Vec<String>,
    session: Option<Session>,
    submissions: u64,
    /// Set once a session died; a new one would silently drop its state.
    ended: bool,
}

impl PSQL {
    pub fn new(psql_command: Vec<String>) -> ExecutionResult<Self> {
        if psql_command.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        Ok(Self {
            psql_command,
            session: None,
            submissions: 0,
            ended: false,
        })
    }

    /// Sends one statement through the session, starting it on first use,
    /// and returns what psql printed for it.
    async fn submit(&mut self, sql: &str) -> ExecutionResult<String> {
        if self.ended {
            return Err(ExecutionError::SessionEnded);
        }

        let mut session = match self.session.take() {
            Some(session) => session,
            None => Session::spawn(&self.psql_command)?,
        };

        self.submissions += 1;
        let sentinel = format!("__north_submission_{}_done__", self.submissions);

        let mut payload = String::new();
        if !session.configured {
            payload.push_str(SESSION_SETUP);
        }
        payload.push_str(&terminate(sql));
        payload.push_str(&format!("\\echo {}\n", sentinel));

        match session.exchange(&payload, &sentinel).await {
            Ok(output) => {
                session.configured = true;
                self.session = Some(session);
                Ok(output)
            }
            Err(cause) => {
                self.ended = true;
                Err(session.into_failure(cause).await)
            }
        }
    }

    /// Ends the session, if one was started. psql exits on its own once its
    /// input is closed; a non-zero exit is reported as a failure.
    pub async fn close(&mut self) -> ExecutionResult<()> {
        match self.session.take() {
            Some(session) => {
                tracing::debug!("closing psql session after {} submissions", self.submissions);
                session.finish().await
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Executor for PSQL {
    async fn execute(&mut self, sql: &str) -> ExecutionResult<u64> {
        tracing::debug!("psql: {}", sql);
        let stdout = self.submit(sql).await?;
        Ok(parse_rowcount(&stdout))
    }
}

/// The `;` goes on its own line so a trailing line comment cannot swallow it.
fn terminate(sql: &str) -> String {
    format!("{}\n;\n", sql.trim_end().trim_end_matches(';'))
}

/// Row count reported for the last counted statement in `stdout`, or 0 when
/// psql printed no count (DDL, `DISCARD ALL`, ...).
pub fn parse_rowcount(stdout: &str) -> u64 {
    stdout
        .lines()
        .rev()
        .find_map(|line| {
            let caps = rowcount_tag().captures(line.trim())?;
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .and_then(|m| m.as_str().parse::<u64>().ok())
        })
        .unwrap_or(0)
}
