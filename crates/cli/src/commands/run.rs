//! `surveyor run`: Write a review from a corpus file.

use anyhow::{Context, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use surveyor_config::AppConfig;
use surveyor_core::{Corpus, CorpusLoader, Provider, SimilaritySearch, Tokenizer};
use surveyor_index::{InMemoryIndex, JsonCorpusLoader, NoopIndex, TextSplitter};
use surveyor_providers::build_from_config;
use surveyor_synthesis::{
    BpeTokenizer, HeuristicTokenizer, PipelineSettings, ReviewDocument, ReviewPipeline,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct RunArgs {
    pub query: String,
    pub corpus: PathBuf,
    pub output: Option<PathBuf>,
    pub no_embeddings: bool,
    pub no_index: bool,
    pub heuristic_tokens: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    config.validate()?;

    if !config.has_api_key() {
        warn!(
            provider = %config.default_provider,
            "No API key configured (set SURVEYOR_API_KEY or OPENAI_API_KEY); continuing for keyless endpoints"
        );
    }

    let router = build_from_config(&config);
    let provider = router
        .default_provider()
        .ok_or_else(|| anyhow!("Provider '{}' is not configured", config.default_provider))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the run");
            trigger.cancel();
        }
    });

    let doc = synthesize(&config, &args, provider, &cancel).await.map_err(|e| {
        let kind = e
            .downcast_ref::<surveyor_core::Error>()
            .map(surveyor_core::Error::kind)
            .unwrap_or("setup");
        e.context(format!("Review failed ({kind}); no document was written"))
    })?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &doc.markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = doc.markdown.len(), "Review written");
        }
        None => print!("{}", doc.markdown),
    }

    info!(report = %serde_json::to_string(&doc.report)?, "Run report");
    Ok(())
}

/// Load the corpus, build the index and run the pipeline.
pub async fn synthesize(
    config: &AppConfig,
    args: &RunArgs,
    provider: Arc<dyn Provider>,
    cancel: &CancellationToken,
) -> anyhow::Result<ReviewDocument> {
    let tokenizer: Arc<dyn Tokenizer> = if args.heuristic_tokens {
        Arc::new(HeuristicTokenizer)
    } else {
        Arc::new(BpeTokenizer::for_model(&config.index.tokenizer_model)?)
    };

    let loader = JsonCorpusLoader::new(&args.corpus);
    let records = loader.load(&args.query).await?;
    let corpus = Corpus::with_limit(records, config.pipeline.max_corpus_size)?;

    let search: Arc<dyn SimilaritySearch> = if args.no_index {
        Arc::new(NoopIndex)
    } else {
        let splitter = TextSplitter::new(
            tokenizer.clone(),
            config.index.chunk_size,
            config.index.chunk_overlap,
        );
        let index = InMemoryIndex::build(&corpus, &splitter)?;
        if config.index.use_embeddings && !args.no_embeddings && !index.is_empty() {
            Arc::new(
                index
                    .with_embeddings(provider.clone(), &config.index.embedding_model)
                    .await?,
            )
        } else {
            Arc::new(index)
        }
    };

    let pipeline = ReviewPipeline::new(
        provider,
        tokenizer,
        search,
        PipelineSettings::from_config(config),
    );
    Ok(pipeline.run(&args.query, &corpus, cancel).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;
    use surveyor_core::Message;
    use surveyor_core::error::ProviderError;
    use surveyor_core::provider::{ProviderRequest, ProviderResponse};
    use tempfile::NamedTempFile;

    struct ScriptedProvider {
        replies: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ProviderError::NotConfigured("script exhausted".into()));
            }
            Ok(ProviderResponse {
                message: Message::assistant(replies.remove(0)),
                usage: None,
                model: "scripted".into(),
                metadata: serde_json::Map::new(),
            })
        }
    }

    fn corpus_file() -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"[{{"title": "Planning agents", "summary": "Agents plan.", "text": "Agents plan with search.", "link": "https://x/1"}},
                {{"title": "Memory agents", "summary": "Agents remember.", "link": "https://x/2"}}]"#
        )
        .unwrap();
        tmp
    }

    fn args(corpus: &NamedTempFile, no_index: bool) -> RunArgs {
        RunArgs {
            query: "llm agents".into(),
            corpus: corpus.path().to_path_buf(),
            output: None,
            no_embeddings: true,
            no_index,
            heuristic_tokens: true,
        }
    }

    fn provider() -> Arc<dyn Provider> {
        Arc::new(ScriptedProvider {
            replies: Mutex::new(vec![
                r#"{"title": "Agents", "main_points": ["Why"], "overview": "Overview."}"#,
                r#"{"sections": [{"title": "Introduction", "citation_ids": [2]}], "citation_ids": [2]}"#,
                "Agents remember [^2].",
            ]),
        })
    }

    #[tokio::test]
    async fn synthesize_from_corpus_file() {
        let file = corpus_file();
        let doc = synthesize(&AppConfig::default(), &args(&file, false), provider(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(doc.markdown.starts_with("# Agents\n\nOverview.\n"));
        assert!(doc.markdown.contains("## Introduction\n\nAgents remember [^2]."));
        assert!(doc.markdown.ends_with("## References\n\n[^2]: [Memory agents](https://x/2)\n"));
    }

    #[tokio::test]
    async fn synthesize_without_index() {
        let file = corpus_file();
        let doc = synthesize(&AppConfig::default(), &args(&file, true), provider(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(doc.report.sections[0].retrieved_chunks, 0);
    }

    #[tokio::test]
    async fn corpus_limit_applies() {
        let file = corpus_file();
        let mut config = AppConfig::default();
        config.pipeline.max_corpus_size = 1;

        // Id 2 is no longer in the corpus, so the outline's citation is rejected
        let err = synthesize(&config, &args(&file, true), provider(), &CancellationToken::new())
            .await
            .unwrap_err();
        let err = err.downcast_ref::<surveyor_core::Error>().unwrap();
        assert_eq!(err.kind(), "citation");
    }

    #[tokio::test]
    async fn missing_corpus_file_fails_before_any_call() {
        let mut args = args(&corpus_file(), true);
        args.corpus = PathBuf::from("/nonexistent/corpus.json");
        let err = synthesize(&AppConfig::default(), &args, provider(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/corpus.json"));
    }
}
