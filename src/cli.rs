use crate::enhance::EnhancementStyle;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "selection-bubble",
    version,
    about = "Floating text-selection bubble with AI text enhancement"
)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the service, replaying a JSON-lines event script
    Run(RunArgs),
    /// Enhance a piece of text once and print the result
    Enhance(EnhanceArgs),
    /// Store an access token for the enhancement API
    Login(LoginArgs),
    /// Forget the stored session
    Logout,
    /// Turn selection monitoring on or off
    Monitoring {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Show configuration and token usage
    Status,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Script to replay (reads stdin when omitted)
    #[arg(long)]
    pub script: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct EnhanceArgs {
    pub text: String,

    #[arg(long, value_enum)]
    pub style: Option<EnhancementStyle>,

    /// Skip the API and apply the local transform
    #[arg(long)]
    pub offline: bool,

    /// Also put the result on the system clipboard
    #[arg(long)]
    pub copy: bool,
}

#[derive(clap::Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub token: String,

    #[arg(long)]
    pub refresh: Option<String>,

    #[arg(long)]
    pub email: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}
