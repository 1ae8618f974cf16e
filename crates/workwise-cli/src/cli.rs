use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use workwise_core::models::MachineStatus;

#[derive(Debug, Parser)]
#[command(name = "workwise", version, about = "Manage Workwise departments and machines from the terminal")]
pub struct Cli {
    /// API base URL (overrides config and WORKWISE_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session tokens
    Login {
        /// Username (defaults to WORKWISE_USERNAME or the last user)
        username: Option<String>,
        /// Save the password in the OS keychain
        #[arg(long)]
        remember: bool,
        /// Prompt for the password even if one is stored
        #[arg(long)]
        ask: bool,
    },
    /// Create an account and log in
    Register {
        username: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Clear the stored session
    Logout {
        /// Also delete the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show whether a session is stored
    Status,
    /// Department management
    #[command(subcommand)]
    Departments(DepartmentCommand),
    /// Machine management
    #[command(subcommand)]
    Machines(MachineCommand),
    /// List maintenance tickets
    Tickets,
    /// List scheduled jobs
    Jobs,
    /// List notifications
    Notifications {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },
    /// List users, or show one user
    Users { id: Option<i64> },
}

#[derive(Debug, Subcommand)]
pub enum DepartmentCommand {
    List,
    Add(DepartmentArgs),
    Update {
        id: i64,
        #[command(flatten)]
        fields: DepartmentArgs,
    },
    Delete { id: i64 },
}

#[derive(Debug, Args)]
pub struct DepartmentArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum MachineCommand {
    List,
    Add(MachineArgs),
    Update {
        id: i64,
        #[command(flatten)]
        fields: MachineArgs,
    },
    Delete { id: i64 },
}

#[derive(Debug, Args)]
pub struct MachineArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long = "model")]
    pub model_number: String,
    #[arg(long)]
    pub location: String,
    #[arg(long, value_enum, default_value_t = StatusArg::Operational)]
    pub status: StatusArg,
    /// Date of the last maintenance (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub last_maintenance: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Operational,
    Maintenance,
}

impl From<StatusArg> for MachineStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Operational => MachineStatus::Operational,
            StatusArg::Maintenance => MachineStatus::Maintenance,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}
