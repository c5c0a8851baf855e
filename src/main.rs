use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docqa_channels::CliChannel;
use docqa_core::channel::Channel;
use docqa_core::config::{Config, EmbeddingProviderKind, resolve_config_path};
use docqa_core::{Runner, Session, SessionSettings, SessionState};
use docqa_llm::any::AnyProvider;
use docqa_llm::ollama::OllamaProvider;
use tokio::sync::watch;

/// Ask questions about a PDF or text document with a local model.
#[derive(Debug, Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to the TOML config file (default: $DOCQA_CONFIG or config/default.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let generator = create_generator(&config);
    let embedder = create_embedder(&config, &generator)?;
    health_check(&generator).await;
    if config.embedding.provider != EmbeddingProviderKind::Ollama {
        health_check(&embedder).await;
    }

    let session = Arc::new(
        Session::new(SessionSettings::from(&config), generator, embedder)
            .context("invalid session settings")?,
    );
    tracing::info!(
        dir = %session.dir().display(),
        model = %config.llm.model,
        embedding = %config.embedding.effective_model(),
        "session ready"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(watch_ctrl_c(Arc::clone(&session), shutdown_tx));

    let mut channel = CliChannel::new();
    channel
        .send("docqa: /upload <path> to index a document, /help for commands.")
        .await?;

    let mut runner = Runner::new(channel, session);
    tokio::select! {
        result = runner.run() => result?,
        Ok(()) = shutdown_rx.changed() => tracing::info!("interrupted, exiting"),
    }
    Ok(())
}

/// Ctrl-C cancels the operation in flight; with nothing running it requests shutdown.
async fn watch_ctrl_c(session: Arc<Session<AnyProvider>>, shutdown_tx: watch::Sender<bool>) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        match session.state() {
            SessionState::Indexing | SessionState::Answering => {
                tracing::info!("cancelling current operation");
                session.cancel();
            }
            SessionState::Idle | SessionState::Ready => {
                let _ = shutdown_tx.send(true);
                return;
            }
        }
    }
}

fn create_generator(config: &Config) -> AnyProvider {
    AnyProvider::Ollama(OllamaProvider::new(
        &config.llm.base_url,
        config.llm.model.clone(),
        config.embedding.effective_model().to_owned(),
    ))
}

fn create_embedder(config: &Config, generator: &AnyProvider) -> anyhow::Result<AnyProvider> {
    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => Ok(generator.clone()),
        #[cfg(feature = "candle")]
        EmbeddingProviderKind::Candle => {
            let device = docqa_llm::candle_provider::select_device(&config.embedding.device)?;
            let embedder = docqa_llm::candle_provider::CandleEmbedder::load(
                config.embedding.effective_model(),
                device,
            )
            .context("failed to load candle embedding model")?;
            Ok(AnyProvider::Candle(embedder))
        }
        #[cfg(not(feature = "candle"))]
        EmbeddingProviderKind::Candle => {
            anyhow::bail!("embedding.provider = \"candle\" requires building with --features candle")
        }
    }
}

async fn health_check(provider: &AnyProvider) {
    match provider {
        AnyProvider::Ollama(ollama) => match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        },
        #[cfg(feature = "candle")]
        AnyProvider::Candle(candle) => {
            tracing::info!("candle embedder loaded, device: {}", candle.device_name());
        }
        #[allow(unreachable_patterns)]
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use docqa_llm::provider::LlmProvider;

    use super::*;

    #[test]
    fn cli_accepts_config_flag() {
        let cli = Cli::parse_from(["docqa", "--config", "my.toml"]);
        assert_eq!(cli.config.as_deref(), Some("my.toml"));
        assert!(Cli::parse_from(["docqa"]).config.is_none());
    }

    #[test]
    fn ollama_embedder_shares_generator() {
        let config = Config::load(Path::new("/nonexistent")).unwrap();
        let generator = create_generator(&config);
        let embedder = create_embedder(&config, &generator).unwrap();
        assert_eq!(embedder.name(), "ollama");
        let debug = format!("{embedder:?}");
        assert!(debug.contains("llama3.2"));
        assert!(debug.contains("all-minilm:33m"));
    }

    #[cfg(not(feature = "candle"))]
    #[test]
    fn candle_embedder_requires_feature() {
        let mut config = Config::load(Path::new("/nonexistent")).unwrap();
        config.embedding.provider = EmbeddingProviderKind::Candle;
        let generator = create_generator(&config);
        let err = create_embedder(&config, &generator).unwrap_err();
        assert!(err.to_string().contains("--features candle"));
    }

    #[tokio::test]
    async fn health_check_ollama_unreachable() {
        let provider = AnyProvider::Ollama(OllamaProvider::new(
            "http://127.0.0.1:1",
            "test".into(),
            "embed".into(),
        ));
        health_check(&provider).await;
    }
}
