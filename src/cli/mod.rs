//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{BuildCommand, ConfigsCommand, PipelineCommand, TypesCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Build toolchain containers and release their configs
#[derive(Debug, Parser, Clone)]
#[command(name = "toolchain-release")]
#[command(version = "0.1.0")]
#[command(about = "Build toolchain containers and release Bazel toolchain configs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository root, discovered with git when omitted
    #[arg(long, global = true)]
    pub git_root: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build a toolchain container locally or with the cloud build service
    Build(BuildCommand),

    /// Print the cloud build pipeline for a container without submitting it
    Pipeline(PipelineCommand),

    /// Generate toolchain configs for a Bazel version
    Configs(ConfigsCommand),

    /// List the container types that can be built
    Types(TypesCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
