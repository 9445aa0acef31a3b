//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pipeline-debug")]
#[command(about = "Inspect blend strings and pipeline state trees")]
#[command(version)]
pub struct Cli {
    /// Capabilities file (TOML); defaults to a fully featured target
    #[arg(long, global = true)]
    pub caps: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a blend string and print the statements and blend state
    Compile {
        /// Blend string, e.g. "RGBA = ADD(SRC_COLOR, DST_COLOR*(1-SRC_COLOR[A]))"
        blend: String,
    },

    /// Build one pipeline per blend string off a shared base and print the
    /// node graph as Graphviz DOT
    Graph {
        /// Blend strings, one derived pipeline each
        blends: Vec<String>,

        /// Alpha of the base pipeline color
        #[arg(long, default_value_t = 1.0)]
        alpha: f32,

        /// Also print per-pipeline hashes and derived blend enable
        #[arg(long, short)]
        verbose: bool,
    },
}
