use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ragfuse_core::config::{resolve_with_base, Config, TransformMode};
use ragfuse_core::loader::DocumentLoader;
use ragfuse_core::MetaValue;
use ragfuse_embed::default_embedder;
use ragfuse_hybrid::{Pipeline, QueryOptions, QueryResult, Session};
use ragfuse_vector::MemoryVectorIndex;

const INGEST_BATCH: usize = 64;
const PREVIEW_CHARS: usize = 160;

struct Args {
    command: String,
    words: Vec<String>,
    data_dir: Option<PathBuf>,
    limit: Option<usize>,
    options: QueryOptions,
    show_prompt: bool,
}

fn usage() -> ! {
    eprintln!(
        "Usage: ragfuse <check|query|chat> [query words...]\n\
         The corpus lives in memory and is rebuilt from --dir on every run;\n\
         `check` loads and indexes it once to validate the data, then exits.\n\
         Options:\n  --dir <path>          directory of .txt files (default: data.raw_txt_dir)\n  \
         --limit <n>           only load the first n files\n  \
         --mode <m>            passthrough | reformulate | expand | hyde\n  \
         --rerank              enable the rerank stage\n  \
         --top-k <n>           number of contexts to return\n  \
         --context <key=value> exact-match metadata filter (repeatable)\n  \
         --deadline-ms <n>     overall query deadline\n  \
         --prompt              print the assembled prompt"
    );
    std::process::exit(1)
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    *i += 1;
    args.get(*i).cloned().ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_mode(s: &str) -> Result<TransformMode> {
    match s {
        "passthrough" => Ok(TransformMode::Passthrough),
        "reformulate" => Ok(TransformMode::Reformulate),
        "expand" => Ok(TransformMode::Expand),
        "hyde" => Ok(TransformMode::Hyde),
        other => Err(anyhow!("unknown transform mode '{other}'")),
    }
}

fn parse_meta(raw: &str) -> MetaValue {
    if let Ok(b) = raw.parse::<bool>() { return MetaValue::Bool(b); }
    if let Ok(i) = raw.parse::<i64>() { return MetaValue::Integer(i); }
    if let Ok(x) = raw.parse::<f64>() { return MetaValue::Float(x); }
    MetaValue::String(raw.to_string())
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else { usage() };
    let mut parsed = Args {
        command,
        words: vec![],
        data_dir: None,
        limit: None,
        options: QueryOptions::new(),
        show_prompt: false,
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => parsed.data_dir = Some(PathBuf::from(next_value(&args, &mut i, "--dir")?)),
            "--limit" => parsed.limit = Some(next_value(&args, &mut i, "--limit")?.parse()?),
            "--mode" => parsed.options.transform_mode = Some(parse_mode(&next_value(&args, &mut i, "--mode")?)?),
            "--rerank" => parsed.options.use_rerank = Some(true),
            "--top-k" => parsed.options.top_k_rerank = Some(next_value(&args, &mut i, "--top-k")?.parse()?),
            "--deadline-ms" => {
                let ms: u64 = next_value(&args, &mut i, "--deadline-ms")?.parse()?;
                parsed.options.deadline = Some(Duration::from_millis(ms));
            }
            "--context" => {
                let pair = next_value(&args, &mut i, "--context")?;
                let (key, value) = pair.split_once('=').ok_or_else(|| anyhow!("--context expects key=value, got '{pair}'"))?;
                parsed.options.context.insert(key.to_string(), parse_meta(value));
            }
            "--prompt" => parsed.show_prompt = true,
            "-h" | "--help" => usage(),
            flag if flag.starts_with("--") => return Err(anyhow!("unknown option {flag}")),
            word => parsed.words.push(word.to_string()),
        }
        i += 1;
    }
    Ok(parsed)
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let pipeline_config = config.pipeline()?;
    let embedder = default_embedder()?;
    let index = Arc::new(MemoryVectorIndex::new(embedder.dim()));
    Ok(Pipeline::builder(embedder, index).config(pipeline_config).build()?)
}

async fn ingest_directory(pipeline: &Pipeline, data_dir: &Path, limit: Option<usize>) -> Result<usize> {
    let loader = DocumentLoader::new();
    let documents = match limit {
        Some(n) => loader.load_directory_limited(data_dir, n)?,
        None => loader.load_directory(data_dir)?,
    };
    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    for batch in documents.chunks(INGEST_BATCH) {
        pipeline.ingest(batch.to_vec()).await?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("indexed");
    Ok(documents.len())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS { return flat; }
    format!("{}…", flat.chars().take(PREVIEW_CHARS).collect::<String>())
}

fn print_result(result: &QueryResult, show_prompt: bool) {
    for q in &result.search_queries {
        println!("🔎 {}", preview(q));
    }
    if result.no_supporting_context {
        println!("No supporting context found.");
    }
    for (i, ctx) in result.ranked_contexts.iter().enumerate() {
        println!(
            "{:>2}. [{}] {:.4} ({}) {}",
            i + 1,
            ctx.candidate.document_id,
            ctx.candidate.score,
            ctx.candidate.source,
            preview(&ctx.document.content)
        );
    }
    for d in &result.degradations {
        println!("⚠️  {d}");
    }
    if result.withheld > 0 {
        println!("🔒 {} passage(s) withheld by the safety filter", result.withheld);
    }
    if show_prompt {
        println!("\n{}", result.prompt);
    }
}

/// Interactive retrieval session. Without a generator the recorded reply is the best passage.
async fn chat(pipeline: Pipeline, options: QueryOptions, show_prompt: bool) -> Result<()> {
    let mut options = options;
    options.transform_mode.get_or_insert(TransformMode::Reformulate);
    let mut session = Session::new(Arc::new(pipeline));
    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 { break; }
        let utterance = line.trim();
        if utterance.is_empty() { continue; }
        if matches!(utterance, "exit" | "quit") { break; }
        match session.query(utterance, &options).await {
            Ok(result) => {
                print_result(&result, show_prompt);
                let reply = result
                    .ranked_contexts
                    .first()
                    .map(|c| c.document.content.clone())
                    .unwrap_or_else(|| "I don't have enough information to answer that.".to_string());
                session.record(utterance, reply);
            }
            Err(e) => eprintln!("❌ {e}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let args = parse_args()?;
    if !matches!(args.command.as_str(), "check" | "query" | "chat") {
        eprintln!("Unknown command: {}", args.command);
        usage();
    }
    let data_dir = args.data_dir.clone().unwrap_or_else(|| {
        let dir: String = config.get("data.raw_txt_dir").unwrap_or_else(|_| "dev_data/txt".to_string());
        resolve_with_base(Path::new("."), dir)
    });

    let pipeline = build_pipeline(&config)?;
    println!("Loading {}", data_dir.display());
    let count = ingest_directory(&pipeline, &data_dir, args.limit).await?;
    tracing::info!(documents = count, dir = %data_dir.display(), "corpus ready");

    match args.command.as_str() {
        "check" => println!("✅ {count} documents load and index cleanly (in-memory check, nothing was persisted)"),
        "query" => {
            let text = args.words.join(" ");
            if text.trim().is_empty() { usage() }
            let result = pipeline.query(&text, &args.options).await?;
            print_result(&result, args.show_prompt);
        }
        _ => chat(pipeline, args.options, args.show_prompt).await?,
    }
    Ok(())
}
