use acronym_core::core::packs::{CanonicalPack, CanonicalPacks};
use acronym_core::{AcronymEngine, DocumentHints, EngineConfig, RankedAcronym};
use clap::Parser;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const STORE_PATH: &str = "learned_acronyms.bin";

#[derive(Parser, Debug)]
#[command(name = "acronym_engine")]
#[command(about = "Find acronyms in a plain-text document and rank candidate definitions")]
struct Args {
    /// Plain-text document to scan
    input: PathBuf,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Active-learning store file; overrides the config
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Glossary tables as JSON: {"tables": [[["ACR", "Definition"], ...]]}
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Extra dictionary pack as JSON: {"ACR": ["Definition", ...]}. Repeatable
    #[arg(long = "pack")]
    packs: Vec<PathBuf>,

    /// Do not query any web provider
    #[arg(long)]
    offline: bool,

    /// Print every ranked list as JSON instead of prompting
    #[arg(long)]
    json: bool,

    /// Record provider attempts and ranking decisions, printed on exit
    #[arg(long)]
    diagnostics: bool,
}

enum Choice {
    Pick(usize),
    Skip,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = EngineConfig::load(args.config.as_deref());
    if let Some(store) = &args.store {
        config.store.path = Some(store.clone());
    } else if config.store.path.is_none() {
        config.store.path = Some(PathBuf::from(STORE_PATH));
    }
    if args.offline {
        config.web.enabled = false;
    }
    config.diagnostics |= args.diagnostics;

    let text = std::fs::read_to_string(&args.input)?;
    let hints: DocumentHints = match &args.hints {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => DocumentHints::default(),
    };

    let mut packs = CanonicalPacks::builtin();
    for path in &args.packs {
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("custom");
        match CanonicalPack::from_json_file(name, path) {
            Ok(pack) => packs.add(pack),
            Err(e) => eprintln!("{} skipping pack '{}': {}", "[WARN]".yellow(), path.display(), e),
        }
    }

    let engine = AcronymEngine::open(&config).await?.with_packs(packs);
    let ranked = engine.rank_document(&text, &hints).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else {
        review(&engine, &text, &ranked).await?;
    }

    if let Err(e) = engine.flush().await {
        eprintln!("{} could not save learned definitions: {}", "[ERROR]".red(), e);
    } else if let Some(path) = engine.store().path() {
        eprintln!("Learned definitions saved to '{}'", path.display());
    }

    if engine.diagnostics().is_enabled() {
        for event in engine.diagnostics().drain() {
            eprintln!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}

async fn review(engine: &AcronymEngine, text: &str, ranked: &[RankedAcronym]) -> std::io::Result<()> {
    if ranked.is_empty() {
        println!("No acronyms found.");
        return Ok(());
    }
    for (i, entry) in ranked.iter().enumerate() {
        print_entry(engine, text, entry, i + 1, ranked.len())?;
        match read_choice(entry.candidates.len())? {
            Choice::Pick(n) => {
                let Some(chosen) = entry.candidates.get(n) else { continue };
                println!("\nConfirming: '{}'", chosen.definition);
                let recorded = engine
                    .confirm_selection(&entry.acronym.text, entry.fingerprint.as_deref(), &chosen.definition)
                    .await;
                if !recorded {
                    eprintln!(
                        "{} could not record '{}' for {}; it will not be remembered",
                        "[WARN]".yellow(),
                        chosen.definition,
                        entry.acronym.text
                    );
                }
            }
            Choice::Skip => continue,
            Choice::Quit => break,
        }
    }
    Ok(())
}

fn print_entry(
    engine: &AcronymEngine,
    text: &str,
    entry: &RankedAcronym,
    position: usize,
    total: usize,
) -> std::io::Result<()> {
    let mut out = stdout();
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    println!("Acronym Review ({}/{})", position, total);
    println!("---------------------------------------------------------------");
    println!("[Enter] accept the top candidate, a number to pick, 's' to skip, 'q' to quit.\n");

    println!("{}", entry.acronym.text.as_str().bold());
    if let Some(window) = engine.context_windows(&entry.acronym, text).first() {
        println!("  …{}…", window.text.replace('\n', " ").dim());
    }
    println!();

    for (i, candidate) in entry.candidates.iter().enumerate() {
        let sources: Vec<&str> = candidate.sources.iter().map(|s| s.as_str()).collect();
        let origin = candidate.origin.as_deref().map(|o| format!(" @ {}", o)).unwrap_or_default();
        let line = format!(
            "  {}: {} [{}{}] (score: {:.3})",
            i + 1,
            candidate.definition,
            sources.join(", "),
            origin,
            candidate.score
        );
        if i == 0 {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    print!("\n> ");
    out.flush()
}

fn read_choice(count: usize) -> std::io::Result<Choice> {
    loop {
        let mut input = String::new();
        if stdin().read_line(&mut input)? == 0 {
            return Ok(Choice::Quit);
        }
        match input.trim() {
            "" => return Ok(Choice::Pick(0)),
            "s" => return Ok(Choice::Skip),
            "q" => return Ok(Choice::Quit),
            s => match s.parse::<usize>() {
                Ok(n) if n > 0 && n <= count => return Ok(Choice::Pick(n - 1)),
                _ => {
                    print!("Enter 1-{}, 's' or 'q' > ", count);
                    stdout().flush()?;
                }
            },
        }
    }
}
