//! CLI interface for Jellyship
//!
//! Command-line interface using clap's derive API. Each deploy mode is a
//! subcommand; an omitted version means "resolve the next one".

use clap::{Parser, Subcommand};
use sdk::types::Version;
use std::path::PathBuf;

/// Jellyship plugin release tool
///
/// Builds a media server plugin, publishes it to a GitHub release and a
/// repository manifest, and deploys it to a running server.
#[derive(Parser, Debug)]
#[command(name = "jellyship")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the plugin package and print manual install instructions
    Build {
        /// Version to build (default: next version)
        version: Option<Version>,
    },

    /// Build, then install on the server from an already published manifest
    Deploy {
        /// Version to install (default: next version)
        version: Option<Version>,

        /// Branch whose manifest the server reads (default: current branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Build, publish a release, update the manifest and deploy with verification
    Release {
        /// Version to release (default: next version)
        version: Option<Version>,
    },

    /// Print the version the next release would get
    NextVersion,

    /// Show the plugin as installed on the server
    Status,
}
