use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use silentvoice::arbiter::{Clock, SystemClock};
use silentvoice::catalog::SignCatalog;
use silentvoice::config::Config;
use silentvoice::dataset;
use silentvoice::matcher::SignMatcher;
use silentvoice::motion::MotionAnalyzer;
use silentvoice::recognizer::Recognizer;
use silentvoice::sequence_model::SequenceModel;
use silentvoice::session::SessionRegistry;
use silentvoice::text2sign::{TextToSign, Translation};
use silentvoice::transport::{MessageHandler, Server};

#[derive(Parser, Debug)]
#[command(name = "silentvoice", version, about = "Sign gesture recognition service")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// nng listen address, e.g. tcp://127.0.0.1:54321
    #[arg(long, global = true)]
    listen: Option<String>,

    /// ONNX sequence model
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Model metadata with class names (default: metadata.json next to the model)
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,

    /// Sign catalog JSON (default: bundled catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve recognition requests (default)
    Serve {
        /// Exit after N seconds
        #[arg(long)]
        exit_after: Option<u64>,
    },
    /// Convert recorded samples into X.npy / y.npy / metadata.json
    ExportDataset {
        /// Directory with one sub-directory of JSON samples per label
        root: PathBuf,
        /// Output directory
        out: PathBuf,
    },
    /// Print the signs for a piece of text
    Text2sign { text: Vec<String> },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())
        .with_context(|| format!("loading config {:?}", cli.config))?;
    if let Some(listen) = &cli.listen {
        config.server.listen = listen.clone();
    }
    if let Some(model) = &cli.model {
        config.model.path = Some(model.clone());
    }
    if let Some(metadata) = &cli.metadata {
        config.model.metadata = Some(metadata.clone());
    }
    if let Some(catalog) = &cli.catalog {
        config.catalog.path = Some(catalog.clone());
    }
    Ok(config)
}

fn load_model(config: &Config) -> SequenceModel {
    let mut model = SequenceModel::unloaded();
    model.set_sequence_length(config.model.sequence_length);
    let Some(path) = &config.model.path else {
        info!("no sequence model configured, using dictionary and rules only");
        return model;
    };
    let metadata = config
        .model
        .metadata
        .clone()
        .unwrap_or_else(|| path.with_file_name("metadata.json"));
    if !model.load_with_metadata(path, &metadata) {
        warn!(path = %path.display(), "continuing without the sequence model");
    }
    model
}

fn serve(config: &Config, exit_after: Option<u64>) -> anyhow::Result<()> {
    let catalog = match &config.catalog.path {
        Some(path) => SignCatalog::from_path(path)
            .with_context(|| format!("loading sign catalog {}", path.display()))?,
        None => SignCatalog::default(),
    };
    info!(signs = catalog.len(), "sign catalog ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let recognizer = Recognizer::new(
        Arc::new(catalog),
        SignMatcher::new(config.recognition.min_match_ratio),
        MotionAnalyzer::new(config.recognition.motion()),
        Arc::new(load_model(config)),
        clock.clone(),
    );
    let registry = SessionRegistry::new(config.session_settings(), clock);
    let handler = Arc::new(MessageHandler::new(
        Arc::new(registry),
        Arc::new(recognizer),
        TextToSign::default(),
        config.server.legacy_prediction_shape,
    ));

    let server = Server::bind(&config.server.listen, config.server.workers, handler)
        .with_context(|| format!("listening on {}", config.server.listen))?;
    server.run(
        Duration::from_secs(config.server.idle_timeout_secs),
        exit_after.map(Duration::from_secs),
    );
    server.close();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "silentvoice=info".into()),
        )
        .init();

    let config = load_config(&cli)?;
    info!("silentvoice v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        None => serve(&config, None),
        Some(Command::Serve { exit_after }) => serve(&config, exit_after),
        Some(Command::ExportDataset { root, out }) => {
            let dataset = dataset::load_dataset(&root, config.model.sequence_length)
                .with_context(|| format!("reading samples under {}", root.display()))?;
            dataset
                .write(&out)
                .with_context(|| format!("writing dataset to {}", out.display()))?;
            println!(
                "{} samples, {} classes -> {}",
                dataset.len(),
                dataset.class_names.len(),
                out.display()
            );
            Ok(())
        }
        Some(Command::Text2sign { text }) => {
            let text = text.join(" ");
            match TextToSign::default().translate(&text) {
                Translation::Signs(signs) => println!("{}", signs.join(" ")),
                Translation::FingerSpelling(letters) => println!("spell: {}", letters.join("-")),
            }
            Ok(())
        }
    }
}
