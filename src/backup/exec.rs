use crate::backup::redacted::{RedactedString, REDACTED};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use getset::Getters;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Routing key for commands: the prefix (e.g. `docker exec ddb_mysql`) is put in front of
/// `sh -c <script>`, an empty prefix runs the host shell.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Environment {
    name: Arc<str>,
    prefix: Arc<[String]>,
}

impl Environment {
    pub fn new<N: Into<Arc<str>>, P: Into<Arc<[String]>>>(name: N, prefix: P) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    /// Builds the process for `script`: `<prefix...> sh -c <script>`.
    fn command(&self, script: &str) -> Command {
        let mut command = match self.prefix.split_first() {
            Some((program, args)) => {
                let mut command = Command::new(program);
                command.args(args).arg("sh");
                command
            }
            None => Command::new("sh"),
        };
        command.arg("-c").arg(script);
        command
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.prefix.join(" "))
        }
    }
}

/// A shell script plus the secrets that must never be displayed with it.
///
/// `Display` masks every secret, `script()` returns the real text.
#[derive(Clone, Debug, Getters)]
pub struct ShellCommand {
    #[getset(get = "pub")]
    script: String,
    secrets: Vec<RedactedString>,
}

impl ShellCommand {
    pub fn new<S: Into<String>>(script: S) -> Self {
        Self {
            script: script.into(),
            secrets: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: &RedactedString) -> Self {
        self.secrets.push(secret.clone());
        self
    }
}

impl Display for ShellCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The script holds the quoted form when the secret needs quoting.
        let masked = self
            .secrets
            .iter()
            .filter(|secret| !secret.inner().is_empty())
            .fold(self.script.clone(), |text, secret| {
                secret.mask(&text.replace(&quote(secret.inner()), REDACTED))
            });
        f.write_str(&masked)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    /// What a dry run returns for every command.
    pub fn dry() -> Self {
        Self {
            status: Some(0),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_string(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone()).map_err(Error::from)
    }
}

pub trait Executor {
    /// Runs `command` in `environment`.
    ///
    /// With `dry_run` the command is only logged and an empty successful output is returned.
    /// A non-zero exit status is returned as is, see [`Executor::run_checked`].
    fn run(
        &self,
        environment: &Environment,
        command: &ShellCommand,
        dry_run: bool,
    ) -> Result<CommandOutput>;

    /// Like [`Executor::run`], but a non-zero exit status becomes [`Error::CommandFailure`].
    fn run_checked(
        &self,
        environment: &Environment,
        command: &ShellCommand,
        dry_run: bool,
    ) -> Result<CommandOutput> {
        let output = self.run(environment, command, dry_run)?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::CommandFailure {
                environment: environment.name().to_string(),
                command: command.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            })
        }
    }
}

/// Runs commands as child processes of this program.
#[derive(Clone, Debug, Default)]
pub struct ShellExecutor {
    timeout: Option<Duration>,
}

impl ShellExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Executor for ShellExecutor {
    fn run(
        &self,
        environment: &Environment,
        command: &ShellCommand,
        dry_run: bool,
    ) -> Result<CommandOutput> {
        if dry_run {
            info!("[dry run] {} > sh -c \"{}\"", environment, command);
            return Ok(CommandOutput::dry());
        }
        info!("{} > sh -c \"{}\"", environment, command);

        let mut child = environment
            .command(command.script())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Error::from)
            .with_msg(format!(
                "Failed to start command in environment {:?}",
                environment.name()
            ))?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => match wait_with_timeout(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    if let Err(e) = child.kill() {
                        warn!("Failed to kill timed out command: {e}");
                    }
                    let _ = child.wait();
                    // Reader threads are left behind: grandchildren may still hold the pipes.
                    return Err(Error::CommandTimeout {
                        environment: environment.name().to_string(),
                        command: command.to_string(),
                        timeout,
                    });
                }
            },
        };

        let output = CommandOutput {
            stdout: join_reader(stdout_reader)?,
            stderr: join_reader(stderr_reader)?,
            status: status.code(),
        };
        if !output.stderr.is_empty() {
            debug!("stderr: {}", String::from_utf8_lossy(&output.stderr).trim_end());
        }
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        })
    })
}

fn join_reader(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match handle {
        None => Ok(Vec::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| Error::from(std::io::Error::other("pipe reader thread panicked")))?
            .map_err(Error::from),
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Quotes `s` as a single POSIX shell word.
pub fn quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.,:/@%+=".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
