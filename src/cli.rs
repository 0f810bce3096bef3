//! Command-line interface.
//!
//! `run` is the default command. Single-dash long flags (`-config`,
//! `-confdir`, `-format`, `-test`, `-dump`, ...) are accepted and rewritten to
//! their `--` form before clap sees them.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::loader::ConfigFormat;
use crate::config::locator::{ConfigLocator, EnvDefaults};
use crate::config::watcher::WatcherOptions;
use crate::lifecycle::supervisor::ReloadPolicy;

const LONG_FLAGS: &[&str] = &[
    "config",
    "confdir",
    "format",
    "test",
    "dump",
    "reload-policy",
    "reload-debounce-ms",
    "metrics-addr",
    "no-watch",
    "help",
    "version",
];

/// Flags whose value may follow as a separate argument.
const VALUE_FLAGS: &[&str] = &[
    "c",
    "config",
    "confdir",
    "format",
    "reload-policy",
    "reload-debounce-ms",
    "metrics-addr",
];

#[derive(Debug, Parser)]
#[command(name = "hotvisor", version)]
#[command(about = "Run a service from JSON config and hot-reload it when the config changes")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// Parse process arguments, accepting single-dash long flags.
    pub fn parse_normalized<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_args(args))
    }

    pub fn try_parse_normalized<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the service with config, the default command
    Run(RunArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Config file; may be given more than once
    #[arg(short = 'c', long = "config", value_name = "FILE", allow_hyphen_values = true)]
    pub config: Vec<PathBuf>,

    /// Directory whose *.json / *.jsonc files are used as config
    #[arg(long, value_name = "DIR", allow_hyphen_values = true)]
    pub confdir: Option<PathBuf>,

    /// Format of input files (auto, json, jsonc)
    #[arg(long, default_value = "auto")]
    pub format: String,

    /// Load and build the config only, without starting the service
    #[arg(long)]
    pub test: bool,

    /// Print the merged config only, without starting the service
    #[arg(long, conflicts_with = "test")]
    pub dump: bool,

    /// Order of start and stop when swapping instances on reload
    #[arg(long, value_enum, default_value_t = ReloadPolicy::StartFirst)]
    pub reload_policy: ReloadPolicy,

    /// Coalesce config changes arriving within this many milliseconds (0 = off)
    #[arg(long, default_value_t = 0, value_name = "MS")]
    pub reload_debounce_ms: u64,

    /// Expose Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Do not watch config files for changes
    #[arg(long)]
    pub no_watch: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: Vec::new(),
            confdir: None,
            format: "auto".to_string(),
            test: false,
            dump: false,
            reload_policy: ReloadPolicy::default(),
            reload_debounce_ms: 0,
            metrics_addr: None,
            no_watch: false,
        }
    }
}

impl RunArgs {
    pub fn format(&self) -> ConfigFormat {
        ConfigFormat::from_hint(&self.format)
    }

    pub fn locator(&self, env: EnvDefaults, working_dir: Option<PathBuf>) -> ConfigLocator {
        ConfigLocator::new(self.config.clone(), self.confdir.clone())
            .with_env(env)
            .with_working_dir(working_dir)
    }

    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            debounce: Duration::from_millis(self.reload_debounce_ms),
        }
    }
}

/// Rewrite `-flag` / `-flag=value` to `--flag` for known long flags.
///
/// The first item is the program name and is left alone, as is the value
/// following a value-taking flag and everything after a bare `--`.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    let mut pending_value = false;

    for (i, arg) in args.into_iter().enumerate() {
        let arg: OsString = arg.into();
        if i == 0 || passthrough || pending_value {
            pending_value = false;
            out.push(arg);
            continue;
        }
        pending_value = arg.to_str().is_some_and(takes_separate_value);

        let rewritten = arg.to_str().and_then(|s| {
            if s == "--" {
                return None;
            }
            let rest = s.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            LONG_FLAGS.contains(&name).then(|| OsString::from(format!("-{}", s)))
        });

        if arg == "--" {
            passthrough = true;
        }
        out.push(rewritten.unwrap_or(arg));
    }
    out
}

/// `-c`, `--config`, `-confdir` and friends without an inline `=value`.
fn takes_separate_value(arg: &str) -> bool {
    let name = arg
        .strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))
        .unwrap_or_default();
    !name.contains('=') && VALUE_FLAGS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.into_string().unwrap()).collect()
    }

    #[test]
    fn test_normalize_go_style_flags() {
        let args = normalize_args([
            "hotvisor", "-config", "a.json", "-c", "b.json", "-confdir=/etc/hv", "-test", "--dump",
        ]);
        assert_eq!(
            strings(args),
            vec!["hotvisor", "--config", "a.json", "-c", "b.json", "--confdir=/etc/hv", "--test", "--dump"]
        );
    }

    #[test]
    fn test_normalize_leaves_values_and_passthrough() {
        let args = normalize_args(["hotvisor", "-c", "-test.json", "--", "-dump"]);
        // "-test.json" is not a known flag name, so it stays as a value
        assert_eq!(strings(args), vec!["hotvisor", "-c", "-test.json", "--", "-dump"]);
    }

    #[test]
    fn test_normalize_keeps_values_that_look_like_flags() {
        let args = normalize_args(["hotvisor", "-c", "-dump", "--confdir", "-test", "-format=json", "-test"]);
        assert_eq!(
            strings(args),
            vec!["hotvisor", "-c", "-dump", "--confdir", "-test", "--format=json", "--test"]
        );
    }

    #[test]
    fn test_config_value_named_like_a_flag() {
        let cli = Cli::try_parse_normalized(["hotvisor", "-c", "-dump"]).unwrap();
        match cli.into_command() {
            Command::Run(args) => {
                assert_eq!(args.config, vec![PathBuf::from("-dump")]);
                assert!(!args.dump);
            }
            Command::Version => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_is_default_command() {
        let cli = Cli::try_parse_normalized(["hotvisor", "-c", "a.json", "-c", "b.json", "-format", "jsonc"]).unwrap();
        match cli.into_command() {
            Command::Run(args) => {
                assert_eq!(args.config, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
                assert_eq!(args.format(), ConfigFormat::Jsonc);
                assert_eq!(args.reload_policy, ReloadPolicy::StartFirst);
                assert!(!args.test && !args.dump);
            }
            Command::Version => panic!("expected run"),
        }
    }

    #[test]
    fn test_explicit_run_and_version() {
        let cli = Cli::try_parse_normalized([
            "hotvisor", "run", "-confdir", "/etc/hv", "--reload-policy", "stop-first", "--reload-debounce-ms", "250",
        ])
        .unwrap();
        match cli.into_command() {
            Command::Run(args) => {
                assert_eq!(args.confdir, Some(PathBuf::from("/etc/hv")));
                assert_eq!(args.reload_policy, ReloadPolicy::StopFirst);
                assert_eq!(args.watcher_options().debounce, Duration::from_millis(250));
            }
            Command::Version => panic!("expected run"),
        }

        let cli = Cli::try_parse_normalized(["hotvisor", "version"]).unwrap();
        assert!(matches!(cli.into_command(), Command::Version));
    }

    #[test]
    fn test_test_and_dump_conflict() {
        assert!(Cli::try_parse_normalized(["hotvisor", "-test", "-dump"]).is_err());
    }
}
