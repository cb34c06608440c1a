//! Command-line interface for cdn-tunnel.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Origin address, `scheme://host:port`.
    pub origin: Option<String>,
    /// Proxy-mode destination, `host:port`.
    pub dest: Option<String>,
    /// Application-mode command line.
    pub app: Option<String>,
    /// Certificate file (required for HTTPS).
    pub cert: Option<PathBuf>,
    /// Private key file (required for HTTPS).
    pub key: Option<PathBuf>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Shorthand for debug-level logging.
    pub debug: bool,
    /// Allow connections that did not come through the CDN.
    pub allow_direct: bool,
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
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('o') | Long("origin") => {
                result.origin = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("dest") => {
                result.dest = Some(parser.value()?.parse()?);
            }
            Short('a') | Long("app") => {
                result.app = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("cert") => {
                result.cert = Some(parser.value()?.parse()?);
            }
            Short('k') | Long("key") => {
                result.key = Some(parser.value()?.parse()?);
            }
            Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("debug") => {
                result.debug = true;
            }
            Long("allow-direct") => {
                result.allow_direct = true;
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cdn-tunnel {version}
TCP-over-CDN tunnel server component

USAGE:
    cdn-tunnel [OPTIONS]

OPTIONS:
    -o, --origin <URL>      Origin address, http(s)://ip:port
                            [default: http://0.0.0.0:8080]
    -d, --dest <HOST:PORT>  Destination address to forward sessions to
                            (e.g. localhost:22 for SSH forwarding)
    -a, --app <COMMAND>     Application mode: launch a command per session
                            instead of forwarding (cannot be used with -d)
    -c, --cert <FILE>       Path to certificate file (required for HTTPS)
    -k, --key <FILE>        Path to private key file (required for HTTPS)
        --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
        --debug             Enable debug logging
        --allow-direct      Allow direct connections without CDN headers
                            (not recommended for production use)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    CDN_TUNNEL_ORIGIN       Origin address (overrides config)
    CDN_TUNNEL_DEST         Destination address (overrides config)
    CDN_TUNNEL_APP          Application command (overrides config)
    CDN_TUNNEL_LOG_LEVEL    Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # HTTPS server forwarding to a local SSH daemon
    cdn-tunnel -o https://0.0.0.0:443 -d localhost:22 -c cert.pem -k key.pem

    # HTTP server (testing only)
    cdn-tunnel -o http://0.0.0.0:8080 -d localhost:22

    # Application mode: one subprocess per tunnel session
    cdn-tunnel -o http://127.0.0.1:8080 -a "sshd -i"
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cdn-tunnel {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
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
