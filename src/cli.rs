//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::capability::LinkStyle;
use crate::infer::InferFlavour;
use crate::target::BuildTarget;

/// Derive Infer and cross-language rules from a declared target graph.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the graph manifest to use.
    #[arg(short, long, value_name = "FILE", default_value = "kasane.yml")]
    pub file: PathBuf,

    /// Change to this directory before doing anything.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Manifest path after applying `--directory`.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.directory
            .as_ref()
            .map_or_else(|| self.file.clone(), |dir| dir.join(&self.file))
    }
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone)]
pub enum Commands {
    /// Derive the rules for a target and print every registered rule as JSON.
    Derive {
        /// Target to derive, optionally flavoured.
        #[arg(value_name = "TARGET")]
        target: BuildTarget,

        /// Infer stage to derive for the target.
        #[arg(long, value_enum)]
        stage: Option<InferFlavour>,
    },

    /// Print the aggregated link arguments of a target's dependencies.
    Link {
        /// Target whose dependencies are linked.
        #[arg(value_name = "TARGET")]
        target: BuildTarget,

        /// Link style requested by the consumer.
        #[arg(long, value_enum, default_value_t = LinkStyle::Static)]
        style: LinkStyle,
    },

    /// Print the transitive preprocessor arguments of a target's dependencies.
    Headers {
        /// Target whose dependencies are inspected.
        #[arg(value_name = "TARGET")]
        target: BuildTarget,
    },

    /// List the declared targets.
    Targets,
}
