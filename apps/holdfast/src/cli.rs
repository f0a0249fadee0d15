use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "holdfast")]
#[command(about = "Long-polling session client for HTTP-only control panels")]
pub struct Cli {
    /// Server base URL, e.g. 192.168.1.10/cp or https://device.example.com
    #[arg(long, global = true, env = "HOLDFAST_SERVER", default_value = "localhost:4132")]
    pub server: String,

    /// Log verbosity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session and stream server updates until Ctrl-C
    Watch,

    /// Send one update through a fresh session and print the response
    Send {
        /// Payload text forwarded verbatim in the update body
        payload: String,
    },
}
