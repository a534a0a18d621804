use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use studyplan_core::{
    ConflictDetector, LocalMemory, Pipeline, RunInput, RunStatus, ScheduleSlot, SimilarityMemory, Task,
    TaskCompletion, TimeRange,
};
use studyplan_ingest::{combine_documents, FileExtractor};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod llm;
mod state;

use config::Config;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("STUDYPLAN_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "studyplan", version = VERSION, about = "Turn coursework into a conflict-checked study schedule")]
struct Cli {
    /// More logging on stderr (-v info, -vv debug). STUDYPLAN_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract tasks, propose a schedule, check and repair conflicts
    Plan {
        /// Free text describing assignments and deadlines ("-" reads stdin)
        text: Option<String>,

        /// Documents to read tasks from (txt, md, pdf, png, jpg)
        #[arg(long = "doc", short = 'd')]
        docs: Vec<PathBuf>,

        /// Override today's date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Print the full run state as JSON
        #[arg(long)]
        json: bool,

        /// Skip the similarity memory
        #[arg(long)]
        no_memory: bool,
    },

    /// Check a schedule JSON file for conflicts (no LLM calls)
    Check {
        /// JSON array of slots: task_name, date, time_slot, duration_hours
        #[arg(long)]
        schedule: PathBuf,

        /// JSON array of tasks: task_name, deadline, estimated_hours, priority
        #[arg(long)]
        tasks: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Print the text extracted from documents
    Extract {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Similarity memory of past tasks and productivity patterns
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store API credentials in ~/.studyplan/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Add the sample history to the memory store
    Seed,

    /// Show the records most similar to a query
    Search {
        query: String,

        #[arg(short, long, default_value_t = 3)]
        k: usize,
    },

    /// Record a finished task so future estimates can learn from it
    Record {
        #[arg(long)]
        name: String,

        #[arg(long)]
        course: Option<String>,

        #[arg(long)]
        estimated: f64,

        #[arg(long)]
        actual: f64,

        #[arg(long, default_value = "Medium")]
        priority: String,

        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.studyplan/config.toml with defaults
    Init,

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Paste an OpenAI-compatible API key
    PasteOpenaiApiKey,

    /// Paste an Anthropic token
    PasteAnthropicToken,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_env("STUDYPLAN_LOG").unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Plan {
            text,
            docs,
            today,
            json,
            no_memory,
        } => {
            let cfg = config::load_config()?;
            plan(&cfg, text, docs, today, json, no_memory)?;
        }

        Command::Check {
            schedule,
            tasks,
            json,
        } => {
            let cfg = config::load_config()?;
            check(&cfg, &schedule, tasks.as_deref(), json)?;
        }

        Command::Extract { paths } => {
            let cfg = config::load_config()?;
            let text = combine_documents(&file_extractor(&cfg), &paths);
            if text.trim().is_empty() {
                bail!("no text could be extracted from the given files");
            }
            println!("{text}");
        }

        Command::Memory { command } => {
            let cfg = config::load_config()?;
            let path = cfg.memory.resolved_path()?;
            match command {
                MemoryCommand::Seed => {
                    let mut memory = LocalMemory::load(&path)?;
                    memory.seed_initial_data();
                    memory.save(&path)?;
                    println!("Seeded {} ({} records)", path.display(), memory.len());
                }
                MemoryCommand::Search { query, k } => {
                    let memory = LocalMemory::load(&path)?;
                    let hits = memory.retrieve_similar(&query, k);
                    if hits.is_empty() {
                        println!("No records in {}", path.display());
                    }
                    for (i, h) in hits.iter().enumerate() {
                        println!("{}. [score {:.3}]", i + 1, h.score);
                        for line in h.content.lines() {
                            println!("   {line}");
                        }
                    }
                }
                MemoryCommand::Record {
                    name,
                    course,
                    estimated,
                    actual,
                    priority,
                    notes,
                } => {
                    let mut memory = LocalMemory::load(&path)?;
                    memory.add_task_completion(&TaskCompletion {
                        task_name: name.clone(),
                        course,
                        estimated_hours: estimated,
                        actual_hours: actual,
                        priority,
                        status: "Completed".to_string(),
                        notes,
                    });
                    memory.save(&path)?;
                    println!("Recorded {name} ({} records)", memory.len());
                }
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::openai_paste_api_key()?,
            AuthCommand::PasteAnthropicToken => auth::anthropic_paste_token()?,
        },
    }

    Ok(())
}

fn file_extractor(cfg: &Config) -> FileExtractor {
    let mut x = FileExtractor::new();
    if let Some(cmd) = &cfg.ingest.pdf {
        x = x.with_pdf_command(cmd.clone());
    }
    if cfg.ingest.vision {
        let reader = auth::load_auth().and_then(|a| llm::LlmCompleter::from_config(&cfg.llm, &a));
        match reader {
            Ok(llm) => {
                let model = cfg.ingest.vision_model.clone().unwrap_or_else(|| cfg.llm.model.clone());
                x = x.with_image_reader(llm.with_model(model));
            }
            Err(e) => warn!(error = %format!("{e:#}"), "image reading disabled"),
        }
    }
    x
}

fn load_memory(cfg: &Config) -> Result<LocalMemory> {
    let path = cfg.memory.resolved_path()?;
    let mut memory = LocalMemory::load(&path)?;
    if memory.is_empty() && cfg.memory.seed_when_empty {
        info!(path = %path.display(), "seeding empty memory store");
        memory.seed_initial_data();
        if let Err(e) = memory.save(&path) {
            warn!(error = %format!("{e:#}"), "could not persist seeded memory");
        }
    }
    Ok(memory)
}

fn read_text_arg(text: Option<String>) -> Result<String> {
    match text.as_deref() {
        Some("-") => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("read stdin")?;
            Ok(s)
        }
        Some(t) => Ok(t.to_string()),
        None => Ok(String::new()),
    }
}

fn plan(
    cfg: &Config,
    text: Option<String>,
    docs: Vec<PathBuf>,
    today: Option<NaiveDate>,
    json: bool,
    no_memory: bool,
) -> Result<()> {
    let raw = read_text_arg(text)?;
    if raw.trim().is_empty() && docs.is_empty() {
        bail!("nothing to plan: pass some text, '-' for stdin, or --doc <file>");
    }

    let today = match today {
        Some(d) => d,
        None => state::today_in(&cfg.profile.timezone)?,
    };

    let completer = llm::LlmCompleter::from_config(&cfg.llm, &auth::load_auth()?)?;
    let memory = if no_memory { LocalMemory::new() } else { load_memory(cfg)? };
    let pipeline = Pipeline::new(file_extractor(cfg), completer, memory, cfg.pipeline.clone());

    let state = pipeline.run(RunInput::text(raw, today).with_documents(docs));

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    for m in state.messages() {
        println!("{m}");
    }
    println!();
    match (&state.final_schedule, state.status) {
        (Some(s), _) => print!("{s}"),
        (None, RunStatus::Error) => println!("Nothing could be read from the input."),
        (None, _) => println!("No schedule produced."),
    }
    Ok(())
}

fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {} as a JSON array", path.display()))
}

fn check(cfg: &Config, schedule_path: &Path, tasks_path: Option<&Path>, json: bool) -> Result<()> {
    let tasks: Vec<Task> = match tasks_path {
        Some(p) => read_json_array(p)?
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Task::from_extracted(i + 1, v))
            .collect(),
        None => Vec::new(),
    };

    let (mut schedule, skipped) = ScheduleSlot::parse_many(read_json_array(schedule_path)?);
    if skipped > 0 {
        warn!(skipped, "ignored malformed slots");
    }
    for slot in schedule.iter_mut() {
        slot.resolve_task_id(&tasks);
        if TimeRange::parse(&slot.time_slot).is_none() {
            warn!(task = %slot.task_name, time_slot = %slot.time_slot, "unparseable time slot; overlap checks skip it");
        }
    }

    let conflicts = ConflictDetector::new(cfg.pipeline.detector).detect(&schedule, &tasks);

    if json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No conflicts detected ({} slots)", schedule.len());
    } else {
        println!("Found {} conflict(s):", conflicts.len());
        for c in &conflicts {
            println!("  - {c}");
        }
    }
    Ok(())
}
