use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "stratus")]
#[command(about = "Stratus CLI for cluster administration", long_about = None)]
pub struct Args {
    /// Console URL
    #[arg(
        long,
        env = "STRATUS_CONSOLE_URL",
        default_value = "http://127.0.0.1:18100"
    )]
    pub console_url: String,

    /// Console API token (Authorization: Bearer)
    #[arg(long, env = "STRATUS_CONSOLE_TOKEN")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cluster overview: entity counts and aggregate slot usage
    Summary {
        /// Restrict to one scaling group
        #[arg(long)]
        scaling_group: Option<String>,
    },
    /// Compute agents
    Agents {
        #[command(subcommand)]
        subcommand: AgentCommand,
    },
    /// Compute sessions
    Sessions {
        #[command(subcommand)]
        subcommand: SessionCommand,
    },
    /// API keypairs
    Keypairs {
        #[command(subcommand)]
        subcommand: KeypairCommand,
    },
    /// Resource policies
    Policies {
        #[command(subcommand)]
        subcommand: PolicyCommand,
    },
    /// Bookkeeping repairs
    Maintenance {
        #[command(subcommand)]
        subcommand: MaintenanceCommand,
    },
    /// Show current auth identity
    Whoami,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    /// List agents
    List {
        /// Filter by status (alive, lost, restarting, terminated)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one agent with its slot usage
    Get { id: String },
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// List sessions
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Filter by owning access key
        #[arg(long)]
        access_key: Option<String>,
    },
    /// Show one session
    Get { id: String },
    /// Request termination
    Terminate { id: String },
}

#[derive(Debug, Subcommand)]
pub enum KeypairCommand {
    /// List keypairs
    List,
    /// Create a keypair for a user
    Create {
        #[arg(long)]
        user_id: String,
        /// Grant the admin flag
        #[arg(long)]
        admin: bool,
        /// Resource policy name (defaults to "default")
        #[arg(long)]
        policy: Option<String>,
        #[arg(long)]
        rate_limit: Option<u32>,
    },
    /// Re-enable a keypair
    Activate { access_key: String },
    /// Disable a keypair
    Deactivate { access_key: String },
    /// Quota report: policy limits vs live occupancy
    Usage { access_key: String },
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// List policies
    List,
    /// Show one policy
    Get { name: String },
}

#[derive(Debug, Subcommand)]
pub enum MaintenanceCommand {
    /// Rebuild occupancy counters from the sessions that hold resources
    RecalculateUsage,
    /// Drop terminated and cancelled session records
    PurgeSessions,
}
