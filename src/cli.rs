//! Command-line interface for session-lock.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Session operation to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Lock the session, print its payload, release.
    Read { id: String },
    /// Lock the session, store a payload, release.
    Write { id: String, data: String },
    /// Delete the payload and release the lock.
    Destroy { id: String },
    /// Hold the session lock for a while.
    Hold { id: String, duration: Duration },
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Redis connection URL.
    pub redis_url: Option<String>,
    /// Key prefix.
    pub prefix: Option<String>,
    /// Payload TTL in seconds.
    pub ttl: Option<i64>,
    /// Maximum lock wait in seconds.
    pub max_wait: Option<f64>,
    /// Spin wait in microseconds.
    pub spin_wait: Option<u64>,
    /// Require an owned lock for writes.
    pub strict_write: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Operation to run.
    pub command: Option<Command>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut positional: Vec<String> = Vec::new();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('u') | Long("redis-url") => {
                result.redis_url = Some(parser.value()?.parse()?);
            }
            Short('P') | Long("prefix") => {
                result.prefix = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("ttl") => {
                result.ttl = Some(parse_value(&mut parser, "ttl")?);
            }
            Short('w') | Long("max-wait") => {
                result.max_wait = Some(parse_value(&mut parser, "max-wait")?);
            }
            Short('s') | Long("spin-wait") => {
                result.spin_wait = Some(parse_value(&mut parser, "spin-wait")?);
            }
            Long("strict-write") => {
                result.strict_write = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                positional.push(val.string()?);
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if !positional.is_empty() {
        result.command = Some(parse_command(positional)?);
    }

    Ok(result)
}

fn parse_value<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    use lexopt::ValueExt;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

fn parse_command(positional: Vec<String>) -> Result<Command, ArgsError> {
    let mut words = positional.into_iter();
    let name = words.next().unwrap_or_default();
    let rest: Vec<String> = words.collect();

    let command = match (name.as_str(), rest.as_slice()) {
        ("read", [id]) => Command::Read { id: id.clone() },
        ("write", [id, data]) => Command::Write {
            id: id.clone(),
            data: data.clone(),
        },
        ("destroy", [id]) => Command::Destroy { id: id.clone() },
        ("hold", [id, seconds]) => Command::Hold {
            id: id.clone(),
            duration: seconds
                .parse::<f64>()
                .ok()
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .ok_or_else(|| ArgsError::InvalidValue("seconds", seconds.clone()))?,
        },
        ("read" | "write" | "destroy" | "hold", _) => {
            return Err(ArgsError::WrongArity(name.clone()));
        }
        _ => return Err(ArgsError::UnexpectedArgument(name.clone())),
    };
    Ok(command)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"session-lock {version}
Distributed mutual-exclusion session store

USAGE:
    session-lock [OPTIONS] <COMMAND>

COMMANDS:
    read <ID>               Lock the session and print its payload
    write <ID> <DATA>       Lock the session and store DATA
    destroy <ID>            Delete the session payload
    hold <ID> <SECONDS>     Hold the session lock for SECONDS

OPTIONS:
    -c, --config <FILE>     Path to configuration file (JSON)
    -u, --redis-url <URL>   Redis URL [default: redis://127.0.0.1:6379/0]
    -P, --prefix <PREFIX>   Key prefix [default: session_key]
    -t, --ttl <SECS>        Payload TTL, 0 for none [default: 1440]
    -w, --max-wait <SECS>   Maximum lock wait [default: 20]
    -s, --spin-wait <USECS> Sleep between lock attempts [default: 200000]
        --strict-write      Refuse writes without an owned lock
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    SESSION_LOCK_REDIS_URL            Redis URL (overrides config)
    SESSION_LOCK_PREFIX               Key prefix (overrides config)
    SESSION_LOCK_TTL                  Payload TTL (overrides config)
    SESSION_LOCK_MAX_EXECUTION_TIME   Execution budget; lock wait is 70% of it
    SESSION_LOCK_SPIN_WAIT            Spin wait (overrides config)
    SESSION_LOCK_LOG_LEVEL            Log level (overrides config)
    RUST_LOG                          Alternative log level setting

EXIT STATUS:
    0 on success, 2 if the session lock stayed busy, 1 on any other error.

EXAMPLES:
    session-lock write abc 'X=1'
    session-lock hold abc 10 &
    session-lock -w 2 read abc
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("session-lock {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unknown command or stray positional argument.
    UnexpectedArgument(String),
    /// Known command with the wrong number of operands.
    WrongArity(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::WrongArity(command) => {
                write!(f, "wrong number of arguments for '{}'", command)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("session-lock")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.command.is_none());
        assert!(result.redis_url.is_none());
        assert!(!result.strict_write);
    }

    #[test]
    fn test_read_command() {
        let result = parse_args_from(args(&["read", "abc"])).unwrap();
        assert_eq!(result.command, Some(Command::Read { id: "abc".into() }));
    }

    #[test]
    fn test_write_command() {
        let result = parse_args_from(args(&["write", "abc", "X=1"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Write {
                id: "abc".into(),
                data: "X=1".into()
            })
        );
    }

    #[test]
    fn test_hold_command() {
        let result = parse_args_from(args(&["hold", "abc", "1.5"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Hold {
                id: "abc".into(),
                duration: Duration::from_millis(1500)
            })
        );
        assert!(parse_args_from(args(&["hold", "abc", "soon"])).is_err());
        assert!(parse_args_from(args(&["hold", "abc", "inf"])).is_err());
        assert!(parse_args_from(args(&["hold", "abc", "-1"])).is_err());
    }

    #[test]
    fn test_hold_too_long() {
        let result = parse_args_from(args(&["hold", "abc", "1e30"]));
        assert!(matches!(result, Err(ArgsError::InvalidValue("seconds", _))));
    }

    #[test]
    fn test_wrong_arity() {
        let result = parse_args_from(args(&["write", "abc"]));
        assert!(matches!(result, Err(ArgsError::WrongArity(_))));
    }

    #[test]
    fn test_unknown_command() {
        let result = parse_args_from(args(&["lock", "abc"]));
        assert!(matches!(result, Err(ArgsError::UnexpectedArgument(_))));
    }

    #[test]
    fn test_options() {
        let result = parse_args_from(args(&[
            "-u",
            "redis://cache/1",
            "-P",
            "sess_",
            "-t",
            "-1",
            "-w",
            "0.5",
            "-s",
            "1000",
            "--strict-write",
            "destroy",
            "abc",
        ]))
        .unwrap();

        assert_eq!(result.redis_url, Some("redis://cache/1".to_string()));
        assert_eq!(result.prefix, Some("sess_".to_string()));
        assert_eq!(result.ttl, Some(-1));
        assert_eq!(result.max_wait, Some(0.5));
        assert_eq!(result.spin_wait, Some(1000));
        assert!(result.strict_write);
        assert_eq!(result.command, Some(Command::Destroy { id: "abc".into() }));
    }

    #[test]
    fn test_invalid_spin_wait() {
        let result = parse_args_from(args(&["-s", "fast"]));
        assert!(matches!(result, Err(ArgsError::InvalidValue("spin-wait", _))));
    }

    #[test]
    fn test_help_and_version() {
        assert!(parse_args_from(args(&["--help"])).unwrap().help);
        assert!(parse_args_from(args(&["-V"])).unwrap().version);
    }
}
