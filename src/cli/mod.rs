use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "activity-tracker",
    about = "Local activity tracker: focus intervals, daily categories and summaries"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the collector, the query API and the summary scheduler until Ctrl+C.
    Service,
    /// Render and save the daily summary.
    Summary {
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print the day's intervals.
    Export {
        #[arg(long)]
        date: Option<String>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,
    },
    Stats {
        #[arg(long)]
        date: Option<String>,
    },
    Status,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Markdown,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    /// Ask the provider for a summary of an empty day.
    Test {
        #[arg(long)]
        provider: Option<String>,
    },
}
