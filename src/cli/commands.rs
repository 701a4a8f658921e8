use clap::{Parser, Subcommand};
use hopchain::config::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hopchain")]
#[command(about = "Multi-hop proxy chain editor and sing-box config compiler", long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_log: bool,

    #[arg(short, long, global = true, help = "Settings file (YAML)")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Write the bootstrap profile")]
    Init {
        #[arg(help = "Profile path (.json, .yaml or .yml)")]
        path: PathBuf,

        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },

    #[command(about = "Compile a profile into a sing-box config")]
    Compile {
        #[arg(help = "Profile path")]
        profile: PathBuf,

        #[arg(short, long, help = "Output file (stdout when omitted)")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Output format: json or yaml")]
        format: Option<OutputFormat>,
    },

    #[command(about = "Repair a profile so every link is legal")]
    Normalize {
        #[arg(help = "Profile path")]
        profile: PathBuf,

        #[arg(short, long, help = "Output file (rewrites the profile when omitted)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Connect two nodes, or an inbound to a node")]
    Link {
        #[arg(help = "Profile path")]
        profile: PathBuf,

        #[arg(help = "Source node or inbound tag")]
        source: String,

        #[arg(help = "Target node tag")]
        target: String,

        #[arg(long, help = "Treat the source as an inbound")]
        inbound: bool,

        #[arg(short, long, help = "Output file (rewrites the profile when omitted)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Delete a node definition and every reference to it")]
    Remove {
        #[arg(help = "Profile path")]
        profile: PathBuf,

        #[arg(help = "Node tag")]
        tag: String,

        #[arg(short, long, help = "Output file (rewrites the profile when omitted)")]
        output: Option<PathBuf>,
    },

    #[command(about = "List round-robin groups of a compiled config")]
    Groups {
        #[arg(help = "Compiled config (JSON)")]
        config: PathBuf,
    },

    #[command(about = "Compile a profile and push it to the runtime manager")]
    Deploy {
        #[arg(help = "Profile path")]
        profile: PathBuf,

        #[arg(short, long, help = "Runtime manager API base URL")]
        url: Option<String>,

        #[arg(long, help = "Deploy even if the config is unchanged")]
        force: bool,

        #[arg(short, long, help = "Re-deploy on change, polling every N seconds")]
        watch: Option<u64>,
    },
}
