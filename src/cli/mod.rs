//! CLI module for deepdive
//!
//! Provides command-line interface parsing for the deepdive binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::research::RunRequest;
use crate::types::ResearchDepth;

/// Deepdive - research orchestration engine
///
/// Plans specialised subtasks for a topic, runs them in parallel against
/// search and LLM providers, and prints one credibility-ranked synthesis.
#[derive(Parser, Debug)]
#[command(
    name = "deepdive",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "Deepdive - research orchestration engine",
    long_about = "Plans specialised research subtasks for a topic, runs them under bounded\n\
                  concurrency against search and LLM providers, and merges the results into\n\
                  one credibility-ranked synthesis within a time budget.",
    after_help = "EXAMPLES:\n    \
                  deepdive init                                   # Write a starter deepdive.toml\n    \
                  deepdive research \"Acme Corp\"                   # Standard-depth run\n    \
                  deepdive research NVDA --focus earnings --budget 60\n    \
                  deepdive research NVDA --persona value_investor --json\n    \
                  deepdive config --validate                      # Check deepdive.toml"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "deepdive.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a topic and print the synthesis
    Research(ResearchArgs),

    /// Write a starter deepdive.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing deepdive.toml
        #[arg(short, long)]
        force: bool,

        /// Ollama endpoint to configure
        #[arg(long, default_value = "http://localhost:11434")]
        ollama_url: String,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file and list warnings
        #[arg(long)]
        validate: bool,
    },

    /// List the available investor personas
    Personas,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ResearchArgs {
    /// Topic to research, e.g. a company or ticker
    pub topic: String,

    /// Research depth (basic, standard, comprehensive, exhaustive)
    #[arg(short, long)]
    pub depth: Option<ResearchDepth>,

    /// Focus area; repeat for several
    #[arg(short, long = "focus")]
    pub focus: Vec<String>,

    /// Persona whose focus areas apply when no --focus is given
    #[arg(short, long)]
    pub persona: Option<String>,

    /// Timeframe qualifier, e.g. "last quarter"
    #[arg(short, long)]
    pub timeframe: Option<String>,

    /// Wall-clock budget in seconds
    #[arg(short, long)]
    pub budget: Option<f64>,

    /// Stop analysing a task once confidence reaches this value
    #[arg(long)]
    pub target_confidence: Option<f64>,

    /// Session id (generated when omitted)
    #[arg(long)]
    pub session: Option<String>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResearchArgs {
    pub fn to_request(&self) -> RunRequest {
        let mut request = RunRequest::new(self.topic.clone());
        if !self.focus.is_empty() {
            request = request.focus(self.focus.clone());
        }
        if let Some(depth) = self.depth {
            request = request.depth(depth);
        }
        if let Some(persona) = &self.persona {
            request = request.persona(persona.clone());
        }
        if let Some(timeframe) = &self.timeframe {
            request = request.timeframe(timeframe.clone());
        }
        if let Some(budget) = self.budget {
            request = request.time_budget(budget);
        }
        if let Some(target) = self.target_confidence {
            request = request.target_confidence(target);
        }
        if let Some(session) = &self.session {
            request = request.session(session.clone());
        }
        request
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
