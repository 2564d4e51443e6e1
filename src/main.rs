use std::{io::Read, path::Path, process::ExitCode};

use clap::Parser;
use jobmatch::{
    ConfigDb,
    DataDir,
    Error,
    ModelManager,
    Result,
    Retriever,
    chunking::ChunkingConfig,
    cli::{Cli, Command, ConfigAction, IndexArgs, MatchArgs, SearchArgs},
    indexer,
    keywords::KeywordConfig,
    llm::OllamaClient,
    loader,
    matcher::{self, MatchRequest},
    mcp,
    report,
    retriever::LocationFilter,
    settings::{SettingKey, SettingOverrides, Settings},
    walker,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("JOBMATCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    let mut overrides = SettingOverrides {
        embedding_model: cli.embedding_model.clone(),
        ..Default::default()
    };
    if let Command::Match(args) = &cli.command {
        overrides.llm_model = args.model.clone();
        overrides.ollama_url = args.ollama_url.clone();
        overrides.timeout_secs = args.timeout;
    }
    let settings = Settings::resolve(&overrides, &config_db)?;

    match cli.command {
        Command::Index(args) => cmd_index(&data_dir, &settings, &args)?,
        Command::Search(args) => cmd_search(&data_dir, &settings, &args)?,
        Command::Match(args) => cmd_match(&data_dir, &settings, &args)?,
        Command::Status(args) => cmd_status(&data_dir, &settings, args.json)?,
        Command::Config { action } => match action {
            ConfigAction::Show { json } => config_show(&settings, json)?,
            ConfigAction::Set { key, value } => {
                config_set(&config_db, &key, &value)?
            }
            ConfigAction::Clear { key } => config_clear(&config_db, &key)?,
        },
        Command::Mcp => mcp::run_mcp(data_dir, settings)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_index(
    data_dir: &DataDir,
    settings: &Settings,
    args: &IndexArgs,
) -> Result<()> {
    if !args.jobs_dir.is_dir() {
        return Err(Error::Config(format!(
            "jobs directory does not exist: {}",
            args.jobs_dir.display()
        )));
    }
    if args.chunk_size == 0 {
        return Err(Error::Config("--chunk-size must be at least 1".into()));
    }

    let filter = walker::compile_filter(args.glob.as_deref())?;
    let chunking = ChunkingConfig {
        chunk_size: args.chunk_size,
        overlap: args.chunk_overlap,
    };
    let mut model = ModelManager::with_model_id(settings.indexing_model().to_string());

    let summary = indexer::index_jobs(
        &args.jobs_dir,
        filter.as_ref(),
        &mut model,
        &chunking,
        &data_dir.index(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "Indexed {} of {} postings ({} skipped) into {} chunks with {}",
            summary.indexed,
            summary.discovered,
            summary.skipped,
            summary.chunks,
            summary.embedding_model
        );
    }
    Ok(())
}

/// Open the index and an embedding model compatible with it.
fn open_index(
    data_dir: &DataDir,
    settings: &Settings,
) -> Result<(Retriever, ModelManager)> {
    let retriever = Retriever::open(&data_dir.index())?;
    let model = ModelManager::with_model_id(
        settings.query_model(retriever.model_id()).to_string(),
    );
    retriever.ensure_model(&model)?;
    info!(chunks = retriever.len(), model = retriever.model_id(), "loaded job index");
    Ok((retriever, model))
}

fn cmd_search(
    data_dir: &DataDir,
    settings: &Settings,
    args: &SearchArgs,
) -> Result<()> {
    let (retriever, mut model) = open_index(data_dir, settings)?;
    let filter = LocationFilter::parse(&args.location);
    let jobs = retriever.search_jobs(&mut model, &args.query, args.top_jobs, &filter)?;

    if args.json {
        let out = json!({
            "query": args.query,
            "location_filter": filter,
            "jobs": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if jobs.is_empty() {
        println!("No jobs found for \"{}\" ({filter}).", args.query);
    } else {
        for (i, job) in jobs.iter().enumerate() {
            println!(
                "{:>2}. {:.3}  {} [{}] ({})",
                i + 1,
                job.best_score,
                job.job_title,
                job.job_file,
                job.location
            );
        }
    }
    Ok(())
}

fn read_resume(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    if !path.is_file() {
        return Err(Error::Ingestion {
            path: path.to_path_buf(),
            reason: "file does not exist".into(),
        });
    }
    loader::load_document(path)
}

fn cmd_match(
    data_dir: &DataDir,
    settings: &Settings,
    args: &MatchArgs,
) -> Result<()> {
    let (retriever, mut model) = open_index(data_dir, settings)?;
    let resume = read_resume(&args.resume)?;
    let client = OllamaClient::new(&settings.ollama_url, settings.generation_timeout)?;

    let request = MatchRequest {
        resume,
        top_jobs: args.top_jobs,
        location_filter: LocationFilter::parse(&args.location),
        llm_model: settings.llm_model.clone(),
        compact_query: args.compact_query,
    };
    let report = matcher::match_resume(
        &request,
        &retriever,
        &mut model,
        &client,
        &KeywordConfig::default(),
    )?;

    if let Some(path) = &args.output {
        write_report(path, &report)?;
        info!(path = %path.display(), "wrote JSON report");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report::render_text(&report));
    }
    Ok(())
}

fn write_report(path: &Path, report: &report::MatchReport) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

fn cmd_status(data_dir: &DataDir, settings: &Settings, json: bool) -> Result<()> {
    let paths = data_dir.index();
    let (rows, index_model, index_error) = match Retriever::open(&paths) {
        Ok(r) => (Some(r.len()), Some(r.model_id().to_string()), None),
        Err(Error::IndexMissing { .. }) => (None, None, None),
        Err(e) => (None, paths.read_model_id().ok(), Some(e.to_string())),
    };
    let reachable = OllamaClient::new(&settings.ollama_url, settings.generation_timeout)?
        .is_reachable();

    if json {
        let out = json!({
            "data_dir": data_dir.root().display().to_string(),
            "index": {
                "path": paths.dir().display().to_string(),
                "present": rows.is_some(),
                "chunks": rows,
                "embedding_model": index_model,
                "error": index_error,
            },
            "llm_model": settings.llm_model,
            "ollama_url": settings.ollama_url,
            "ollama_reachable": reachable,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        match (rows, &index_error) {
            (Some(rows), _) => println!("Index: {rows} chunks"),
            (None, Some(e)) => println!("Index: unusable ({e})"),
            (None, None) => {
                println!("Index: missing (run `jobmatch index <jobs-dir>`)")
            }
        }
        if let Some(model) = &index_model {
            println!("Embedding model: {model}");
        }
        println!("LLM model: {}", settings.llm_model);
        println!(
            "Ollama: {} ({})",
            settings.ollama_url,
            if reachable { "reachable" } else { "unreachable" }
        );
    }
    Ok(())
}

fn config_show(settings: &Settings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
    } else {
        println!("llm_model: {}", settings.llm_model);
        println!("ollama_url: {}", settings.ollama_url);
        println!(
            "embedding_model: {}",
            settings
                .embedding_model
                .as_deref()
                .unwrap_or("(recorded in index)")
        );
        println!(
            "generation_timeout_secs: {}",
            settings.generation_timeout.as_secs()
        );
    }
    Ok(())
}

fn config_set(config_db: &ConfigDb, key: &str, value: &str) -> Result<()> {
    let key: SettingKey = key.parse()?;
    key.validate(value)?;
    config_db.set_setting(key.name(), value.trim())?;
    println!("Set {key} = {}", value.trim());
    Ok(())
}

fn config_clear(config_db: &ConfigDb, key: &str) -> Result<()> {
    let key: SettingKey = key.parse()?;
    if config_db.remove_setting(key.name())? {
        println!("Cleared {key}");
    } else {
        println!("{key} was not set");
    }
    Ok(())
}
