//! CLI argument definitions for the Varlens client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Varlens: load a genomic analysis session's results and ask questions about them.
#[derive(Parser, Debug)]
#[command(name = "varlens", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the analysis service.
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load every result store for a session and print a summary.
    Results {
        /// Analysis session id.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
    /// Ask the assistant a question about a session.
    Chat {
        /// Analysis session id.
        #[arg(short = 's', long = "session")]
        session: Option<String>,

        /// Continue an existing conversation.
        #[arg(long = "conversation")]
        conversation: Option<String>,

        /// Print the reply once it is complete instead of streaming it.
        #[arg(long = "buffered")]
        buffered: bool,

        /// The question to ask.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > VARLENS_CONFIG env var > platform default
    /// (~/.varlens/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VARLENS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the analysis service base URL.
    ///
    /// Priority: --base-url flag > VARLENS_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config_url: &str) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("VARLENS_BASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config_url.to_string()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the session id given on the command line.
    ///
    /// Priority: --session flag > VARLENS_SESSION env var. Blank values count
    /// as absent.
    pub fn resolve_session(&self) -> Option<String> {
        let flag = match &self.command {
            Command::Results { session } | Command::Chat { session, .. } => session.clone(),
        };
        flag.or_else(|| std::env::var("VARLENS_SESSION").ok())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".varlens").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".varlens").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_results() {
        let args = parse(&["varlens", "results", "--session", "s-1"]);
        assert!(matches!(
            args.command,
            Command::Results { ref session } if session.as_deref() == Some("s-1")
        ));
        assert_eq!(args.resolve_session().as_deref(), Some("s-1"));
    }

    #[test]
    fn test_parse_chat_with_global_flags_after_subcommand() {
        let args = parse(&[
            "varlens",
            "chat",
            "-s",
            "s-2",
            "--buffered",
            "--base-url",
            "http://analysis:9000",
            "which",
            "genes?",
        ]);
        match &args.command {
            Command::Chat {
                buffered,
                message,
                conversation,
                ..
            } => {
                assert!(*buffered);
                assert_eq!(message, &vec!["which".to_string(), "genes?".to_string()]);
                assert!(conversation.is_none());
            }
            other => panic!("expected chat command, got {:?}", other),
        }
        assert_eq!(
            args.resolve_base_url("http://127.0.0.1:8000"),
            "http://analysis:9000"
        );
    }

    #[test]
    fn test_chat_requires_message() {
        assert!(CliArgs::try_parse_from(["varlens", "chat", "--session", "s"]).is_err());
    }

    #[test]
    fn test_config_flag_wins() {
        let args = parse(&["varlens", "--config", "/tmp/varlens.toml", "results"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/varlens.toml"));
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let args = parse(&["varlens", "results"]);
        assert_eq!(args.resolve_log_level("warn"), "warn");

        let args = parse(&["varlens", "-l", "debug", "results"]);
        assert_eq!(args.resolve_log_level("warn"), "debug");
    }
}
