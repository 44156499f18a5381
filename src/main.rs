//! product-speaker: look up products by ID, summarize them with an LLM, and
//! speak the summary aloud.

mod catalog;
mod completion;
mod config;
mod error;
mod history;
mod player;
mod prompt;
mod session;
mod speech;
#[cfg(test)]
mod test_support;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::catalog::ProductCatalog;
use crate::completion::{CompletionClient, OpenAiCompletion};
use crate::history::TurnHistory;
use crate::player::{Playback, RodioPlayback, SilentPlayback};
use crate::session::ConversationSession;
use crate::speech::{GoogleSpeech, NoSpeech, SpeechRenderer};

#[derive(Parser, Debug)]
#[command(
    name = "product-speaker",
    about = "Speak LLM-written product summaries looked up by product ID"
)]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Product CSV file (overrides catalog.path)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Print replies only, without synthesizing speech
    #[arg(long)]
    no_speech: bool,

    /// Synthesize and save audio but do not play it
    #[arg(long)]
    mute: bool,

    /// Print the turn history report for a date (YYYY-MM-DD or "today") and exit
    #[arg(long, value_name = "DATE")]
    report: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so they stay out of the console conversation
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper_util=info,reqwest=info,symphonia=warn")
    } else {
        EnvFilter::new("info,hyper_util=warn,reqwest=warn,symphonia=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("product-speaker starting");

    let mut config = config::Config::load(args.config.as_deref());
    if let Some(date) = args.report.as_deref() {
        let date = if date == "today" {
            chrono::Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        };
        let records = TurnHistory::new(config.history.resolved_dir()).load(&date);
        println!("{}", history::generate_report(&records, &date));
        return Ok(());
    }

    if let Some(path) = args.catalog {
        config.catalog.path = path;
    }

    let catalog = Arc::new(ProductCatalog::load(
        &config.catalog.path,
        &config.catalog.columns,
    )?);
    if catalog.is_empty() {
        warn!("Catalog {} has no products", config.catalog.path.display());
    }

    let api_key = config.openai.resolve_api_key()?;
    let completer: Arc<dyn CompletionClient> =
        Arc::new(OpenAiCompletion::new(config.openai.clone(), api_key)?);
    info!("Completion model: {} via {}", config.openai.model, config.openai.host);

    let speaker: Arc<dyn SpeechRenderer> = if args.no_speech || !config.speech.enabled {
        info!("Speech disabled");
        Arc::new(NoSpeech)
    } else {
        let player: Arc<dyn Playback> = if args.mute || !config.speech.playback {
            info!("Playback muted, audio is only saved to {}", config.speech.output_path.display());
            Arc::new(SilentPlayback)
        } else {
            match RodioPlayback::open() {
                Ok(player) => Arc::new(player),
                Err(e) => {
                    warn!("{e}, continuing with playback muted");
                    Arc::new(SilentPlayback)
                }
            }
        };
        Arc::new(GoogleSpeech::new(config.speech.clone(), player)?)
    };

    let history = config
        .history
        .enabled
        .then(|| TurnHistory::new(config.history.resolved_dir()));

    let mut session = ConversationSession::new(
        catalog,
        completer,
        speaker,
        history,
        config.session.clone(),
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let summary = session.run(stdin, tokio::io::stdout()).await?;
    info!("{} after {} turns", session.state(), summary.turns);

    Ok(())
}
