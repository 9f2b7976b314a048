use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use reconcile::Operation;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Role-scoped deploys over SSH", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $DECKHAND_CONFIG, ./deckhand.toml, ~/.config/deckhand/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the deploy branch to every web host and restart it
    Deploy(OperationArgs),

    /// Deploy a branch (default: master) to the staging host and restart it
    Stage(OperationArgs),

    /// Bring a fresh web host to a deployable state
    InitializeServer(OperationArgs),

    /// Bring a fresh staging host up on master
    InitializeStagingServer(OperationArgs),

    /// Load the database schema (never drops existing data)
    SetupDb(OperationArgs),

    /// Reset the config working copy to its branch
    SyncConfig(OperationArgs),

    /// Upgrade packages to the manifest's pinned versions
    UpgradeDeps(OperationArgs),

    /// Upload the environment's credential files
    DistributeCredentials(OperationArgs),

    /// Restart the managed service
    Restart(OperationArgs),

    /// Upgrade packages and restart a web host
    SetupWeb(OperationArgs),

    /// Create the application's database role
    CreateDbUser(OperationArgs),

    /// List roles, their hosts and the known environments
    Hosts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect the configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Command {
    /// The operation and its arguments, for operation subcommands
    pub fn operation(&self) -> Option<(Operation, &OperationArgs)> {
        let op = match self {
            Self::Deploy(args) => (Operation::Deploy, args),
            Self::Stage(args) => (Operation::Stage, args),
            Self::InitializeServer(args) => (Operation::InitializeServer, args),
            Self::InitializeStagingServer(args) => (Operation::InitializeStagingServer, args),
            Self::SetupDb(args) => (Operation::SetupDb, args),
            Self::SyncConfig(args) => (Operation::SyncConfig, args),
            Self::UpgradeDeps(args) => (Operation::UpgradeDeps, args),
            Self::DistributeCredentials(args) => (Operation::DistributeCredentials, args),
            Self::Restart(args) => (Operation::Restart, args),
            Self::SetupWeb(args) => (Operation::SetupWeb, args),
            Self::CreateDbUser(args) => (Operation::CreateDbUser, args),
            Self::Hosts { .. } | Self::Config(_) | Self::Completions { .. } => return None,
        };
        Some(op)
    }
}

#[derive(Args, Debug, Clone)]
pub struct OperationArgs {
    /// Target role (default: the operation's first role)
    #[arg(short, long)]
    pub role: Option<String>,

    /// Only these hosts of the role (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub hosts: Option<Vec<String>>,

    /// Branch to converge to (deploy or master)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Hosts reconciled in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Show the plan without contacting any host
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Check the configuration for problems
    Validate,

    /// Show which config file is in use
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_every_operation_has_a_subcommand() {
        let cli = Cli::command();
        for op in Operation::ALL {
            let name = op.name().replace('_', "-");
            assert!(
                cli.find_subcommand(&name).is_some(),
                "missing subcommand {name}"
            );
        }
    }

    #[test]
    fn test_parse_operation_args() {
        let cli = Cli::try_parse_from([
            "deckhand",
            "-vv",
            "stage",
            "--branch",
            "deploy",
            "--hosts",
            "a,b",
            "--jobs",
            "2",
            "--yes",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let (op, args) = cli.command.operation().unwrap();
        assert_eq!(op, Operation::Stage);
        assert_eq!(args.branch.as_deref(), Some("deploy"));
        assert_eq!(args.hosts, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(args.jobs, 2);
        assert!(args.yes);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["deckhand", "restart", "--config", "/tmp/d.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/d.toml"));
        assert!(cli.command.operation().is_some());
    }

    #[test]
    fn test_non_operation_commands() {
        let cli = Cli::try_parse_from(["deckhand", "hosts"]).unwrap();
        assert!(cli.command.operation().is_none());
    }
}
