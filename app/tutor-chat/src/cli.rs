//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spanish math tutor backed by a local language model
#[derive(Parser, Debug)]
#[command(name = "tutor-chat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON config file (defaults are used for missing fields)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model to load: gemma, qwen or a directory name under the model root
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Root directory holding one sub-directory per model
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Directory holding profile.json and lessons.json
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Refuse off-topic and non-Spanish questions before they reach the model
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive problem chat (default)
    Chat {
        /// Replace the default tutoring policy
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// List units and lessons
    Lessons {
        /// Only this unit
        unit: Option<String>,
    },

    /// Show a lesson and ask the tutor to explain it
    Explain { unit: String, lesson: String },

    /// Mark a lesson as completed
    Complete {
        unit: String,
        lesson: String,
        /// Experience awarded on first completion
        #[arg(long, default_value_t = 5)]
        xp: u64,
    },

    /// Show experience and recent completions
    Profile {
        /// Number of recent completions to list
        #[arg(long, default_value_t = 6)]
        recent: usize,

        /// Clear all progress
        #[arg(long)]
        reset: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tutor-chat", "explain", "Álgebra", "Ecuaciones", "--model", "qwen"])
            .unwrap();
        assert_eq!(cli.model.as_deref(), Some("qwen"));
        match cli.command {
            Some(Commands::Explain { unit, lesson }) => {
                assert_eq!(unit, "Álgebra");
                assert_eq!(lesson, "Ecuaciones");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_means_chat() {
        let cli = Cli::try_parse_from(["tutor-chat", "--strict"]).unwrap();
        assert!(cli.strict);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_complete_default_xp() {
        let cli = Cli::try_parse_from(["tutor-chat", "complete", "U", "L"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Complete { xp: 5, .. })));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
