use crate::ast::Datum;
use crate::engine::Mode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    version,
    name = "crowdstore",
    about = r#"
An embedded SQL-shaped record store persisted to a single JSON file.

crowdstore evaluates a small dialect of SELECT, INSERT, UPDATE and DELETE
statements with positional `?` parameters against the users, communities,
proposals, posts, pledges, comments and sessions tables of one JSON document."#
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create an empty store file if none exists
    Init(InitCommand),
    /// Execute one statement and print its result as JSON
    Query(QueryCommand),
    /// Execute a script; only DELETE FROM statements take effect
    Exec(ExecCommand),
    /// Print the plan of a statement without executing it
    Explain(ExplainCommand),
    /// Start the server
    Start(StartCommand),
}

/// Configuration for the server, including the listen address.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address for the database server.
    #[arg(long, short, env = "CROWDSTORE_ADDRESS", default_value = "127.0.0.1:6969")]
    pub address: String,
}

#[derive(Debug, Clone, Args)]
pub struct EngineConfig {
    /// Path to the store file.
    #[arg(long, short, env = "CROWDSTORE_DATABASE", default_value = "./database.json")]
    pub database: PathBuf,
    /// Write the store without indentation.
    #[arg(long, env = "CROWDSTORE_COMPACT", default_value_t = false)]
    pub compact: bool,
    /// Treat unsupported WHERE clauses and unparseable statements as no-ops
    /// instead of errors.
    #[arg(long, env = "CROWDSTORE_LENIENT", default_value_t = false)]
    pub lenient: bool,
    /// Keep changes in memory until shutdown instead of saving after every mutation.
    #[arg(long, env = "CROWDSTORE_DEFERRED", default_value_t = false)]
    pub deferred: bool,
}

#[derive(Debug, Clone, Args)]
pub struct InitCommand {
    #[command(flatten)]
    pub engine_config: EngineConfig,
}

#[derive(Debug, Clone, Args)]
pub struct QueryCommand {
    #[command(flatten)]
    pub engine_config: EngineConfig,
    /// How to report the outcome.
    #[arg(long, short, value_enum, default_value_t = Mode::All)]
    pub mode: Mode,
    /// The statement to execute.
    pub statement: String,
    /// Positional parameters. JSON scalars (`42`, `true`, `null`, `"x"`) keep
    /// their type; anything else is passed as a string.
    #[arg(allow_hyphen_values = true, value_parser = parse_param)]
    pub params: Vec<Datum>,
}

#[derive(Debug, Clone, Args)]
pub struct ExecCommand {
    #[command(flatten)]
    pub engine_config: EngineConfig,
    /// The script to execute.
    pub script: String,
}

#[derive(Debug, Clone, Args)]
pub struct ExplainCommand {
    #[command(flatten)]
    pub engine_config: EngineConfig,
    /// The statement to explain.
    pub statement: String,
}

#[derive(Debug, Clone, Args)]
pub struct StartCommand {
    #[command(flatten)]
    pub server_config: ServerConfig,

    #[command(flatten)]
    pub engine_config: EngineConfig,
}

#[allow(clippy::unnecessary_wraps)]
fn parse_param(raw: &str) -> Result<Datum, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Datum::from(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), Ok(Datum::Integer(42)));
        assert_eq!(parse_param("null"), Ok(Datum::Null));
        assert_eq!(parse_param("\"7\""), Ok(Datum::from("7")));
        assert_eq!(parse_param("a@x.com"), Ok(Datum::from("a@x.com")));
        assert_eq!(parse_param("[1]"), Ok(Datum::from("[1]")));
    }

    #[test]
    fn test_query_command_parsing() {
        let cli = Cli::try_parse_from([
            "crowdstore",
            "query",
            "--database",
            "/tmp/db.json",
            "--mode",
            "get",
            "SELECT * FROM users WHERE id = ?",
            "u1",
        ])
        .unwrap();
        let Commands::Query(cmd) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(cmd.mode, Mode::Get);
        assert_eq!(cmd.params, vec![Datum::from("u1")]);
        assert_eq!(cmd.engine_config.database, PathBuf::from("/tmp/db.json"));
    }
}
