//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::models::{ExtractionMode, ProviderKind};
use crate::infrastructure::providers::TargetSelector;

#[derive(Parser, Debug)]
#[command(name = "quantbench")]
#[command(about = "Harvest model answers to quantitative tasks and score them within tolerance", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to load instead of .quantbench/config.yaml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect answers from one or more models
    Harvest(HarvestArgs),

    /// Extract values from harvested answers and score them
    Evaluate(EvaluateArgs),

    /// List the configured harvest targets
    List(ListArgs),
}

/// Which models a command applies to
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct TargetArgs {
    /// A single model, by id or slug
    #[arg(short, long)]
    pub model: Option<String>,

    /// Every model of one provider family (openai, anthropic, gemini, session)
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Every model in the catalog
    #[arg(long)]
    pub all: bool,
}

impl TargetArgs {
    pub fn selector(&self) -> Option<TargetSelector> {
        if let Some(model) = &self.model {
            Some(TargetSelector::Model(model.clone()))
        } else if let Some(kind) = self.provider {
            Some(TargetSelector::Provider(kind))
        } else if self.all {
            Some(TargetSelector::All)
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct HarvestArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// List available targets and exit
    #[arg(long)]
    pub list: bool,

    /// Task catalog file or directory (overrides harvest.tasks_path)
    #[arg(long, value_name = "PATH")]
    pub tasks: Option<PathBuf>,

    /// Output root for outcome stores (overrides harvest.output_dir)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Extraction strategy selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    /// Phrase patterns only, no secondary model
    Pattern,
    /// Secondary model with structured output
    Assisted,
}

impl From<MethodArg> for ExtractionMode {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Pattern => Self::Pattern,
            MethodArg::Assisted => Self::Assisted,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Extraction strategy (defaults to extraction.mode)
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,

    /// Also score each answer with the judge rubric
    #[arg(long)]
    pub rubric: bool,

    /// Task catalog file or directory (overrides harvest.tasks_path)
    #[arg(long, value_name = "PATH")]
    pub tasks: Option<PathBuf>,

    /// Root of the harvested outcome stores (overrides harvest.output_dir)
    #[arg(long, value_name = "DIR")]
    pub raw_dir: Option<PathBuf>,

    /// Output root for evaluation results (overrides evaluation.output_dir)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only models of this provider family
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,
}
