//! Argument-vector command lines

use async_process::Command as AsyncCommand;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::time::Duration;

/// An external program invocation.
///
/// Each argument is one argv entry handed to the OS unchanged; nothing is
/// ever passed through a shell. The type is `Clone`, so the same command can
/// be retried or logged after it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Command {
    /// `program` with no arguments
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Start a chained builder for `program`
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandBuilder {
        CommandBuilder(Self::new(program))
    }

    /// Append one argument
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append every argument of `args`
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Kill the process and fail with [`Error::TimedOut`](crate::Error::TimedOut)
    /// once it has run for `limit`
    pub fn timeout(&mut self, limit: Duration) -> &mut Self {
        self.timeout = Some(limit);
        self
    }

    /// The program to run
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// The arguments, in order
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Execution time limit, if any
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn to_async(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Single-quotes arguments holding whitespace or quotes so a logged line can
/// be pasted into a terminal. Execution never parses this text.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            let needs_quotes =
                arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"');
            if needs_quotes {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Chained construction of a [`Command`]
pub struct CommandBuilder(Command);

impl CommandBuilder {
    /// Append one argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.arg(arg);
        self
    }

    /// Append every argument of `args`
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    /// Limit how long the command may run
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.0.timeout(limit);
        self
    }

    /// Finish the command
    pub fn build(self) -> Command {
        self.0
    }
}
