use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    matcher::DEFAULT_TOP_JOBS,
    retriever::LocationFilter,
};

#[derive(Debug, Parser)]
#[command(
    name = "jobmatch",
    about = "Match resumes against a local index of job postings"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding model used to build or query the index
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the job index from a directory of postings (full rebuild)
    Index(IndexArgs),
    /// Retrieve the job postings closest to a query, without the LLM
    Search(SearchArgs),
    /// Match a resume against the indexed postings
    Match(MatchArgs),
    /// Show index and service status
    Status(StatusArgs),
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory containing .txt, .md, .pdf or .docx postings
    pub jobs_dir: PathBuf,

    /// Only index files whose relative path matches this glob
    #[arg(long)]
    pub glob: Option<String>,

    /// Maximum chunk size in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters repeated between consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of jobs to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_JOBS)]
    pub top_jobs: usize,

    /// Location filter: "Berlin", "Berlin + Remote", anything else keeps all
    #[arg(short, long, default_value = LocationFilter::BERLIN_OR_REMOTE)]
    pub location: String,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Match --

#[derive(Debug, Parser)]
pub struct MatchArgs {
    /// Resume file (.txt, .md, .pdf or .docx); "-" reads stdin
    pub resume: PathBuf,

    /// Number of jobs to assess
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_JOBS)]
    pub top_jobs: usize,

    /// Location filter: "Berlin", "Berlin + Remote", anything else keeps all
    #[arg(short, long, default_value = LocationFilter::BERLIN_OR_REMOTE)]
    pub location: String,

    /// Ollama model used for the report
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL of the Ollama server
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Generation timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retrieve with the resume's skill and experience lines only
    #[arg(long)]
    pub compact_query: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show resolved settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// One of llm_model, ollama_url, embedding_model,
        /// generation_timeout_secs
        key: String,
        value: String,
    },
    /// Clear a stored setting (revert to default)
    Clear { key: String },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "jobmatch",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_match_defaults() {
        let cli = Cli::parse_from(["jobmatch", "match", "cv.pdf"]);
        match cli.command {
            Command::Match(args) => {
                assert_eq!(args.resume, PathBuf::from("cv.pdf"));
                assert_eq!(args.top_jobs, DEFAULT_TOP_JOBS);
                assert_eq!(args.location, "Berlin + Remote");
                assert!(args.model.is_none());
                assert!(!args.compact_query);
                assert!(!args.json);
                assert!(args.output.is_none());
            }
            _ => panic!("expected match command"),
        }
    }

    #[test]
    fn parse_index_with_glob() {
        let cli = Cli::parse_from([
            "jobmatch",
            "index",
            "jobs",
            "--glob",
            "berlin/**",
            "--chunk-size",
            "500",
        ]);
        match cli.command {
            Command::Index(args) => {
                assert_eq!(args.jobs_dir, PathBuf::from("jobs"));
                assert_eq!(args.glob.as_deref(), Some("berlin/**"));
                assert_eq!(args.chunk_size, 500);
                assert_eq!(args.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "jobmatch",
            "search",
            "rust",
            "-l",
            "Berlin",
            "--data-dir",
            "/tmp/jm",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/jm")));
        match cli.command {
            Command::Search(args) => assert_eq!(args.location, "Berlin"),
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["jobmatch", "-q", "-v", "status"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
