use clap::{Parser, Subcommand};
use faceless_crawler::{
    config::Config,
    credentials::{CredentialProvider, KeyRing, KeyRingStorage, CRAWLER_KEY_NAME},
    crawler::{derive_candidates, CrawlJobClient},
    research::{ContentAnalyst, OpenAiAnalyst, ResearchAgent, WebSearch},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "faceless-crawler", version, about = "Crawl pages and run web research")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl one absolute URL and print every job item
    Crawl { url: String },
    /// Crawl a URL or free-text query and print the usable results
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        max_results: usize,
    },
    /// Show the candidate URLs a free-text query expands to (no network)
    Candidates { query: String },
    /// Crawl seeds for a query and analyze the collected content
    Research {
        query: String,
        #[arg(long, default_value_t = 3)]
        depth: usize,
        #[arg(long, default_value_t = 5)]
        breadth: usize,
    },
    /// Inspect or rotate the crawler key ring
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Print key status (keys are masked)
    Report,
    /// Mark the active key exhausted and move to the next backup
    Rotate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "faceless_crawler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Command::Candidates { query } = &cli.command {
        for url in derive_candidates(query) {
            println!("{}", url);
        }
        return Ok(());
    }

    let config = Config::from_env()?;
    info!(base_url = %config.crawler.base_url, "Configuration loaded");

    let ring = Arc::new(build_key_ring(&config).await?);

    match cli.command {
        Command::Keys { action } => {
            match action {
                KeysAction::Report => print!("{}", ring.report()),
                KeysAction::Rotate => {
                    let token = ring
                        .bearer_token()
                        .ok_or_else(|| anyhow::anyhow!("no usable key left to rotate from"))?;
                    if !ring.rotate(&token).await {
                        anyhow::bail!("no backup keys available for {}", CRAWLER_KEY_NAME);
                    }
                    print!("{}", ring.report());
                }
            }
            Ok(())
        }
        Command::Crawl { url } => {
            let client = CrawlJobClient::new(config.crawler.clone(), ring)?;
            let results = client.crawl_url(&url).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Command::Search { query, max_results } => {
            let client = CrawlJobClient::new(config.crawler.clone(), ring)?;
            let results = client.search_and_scrape(&query, max_results).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Command::Research {
            query,
            depth,
            breadth,
        } => {
            let client = CrawlJobClient::new(config.crawler.clone(), ring)?;
            let analyst = OpenAiAnalyst::from_config(&config.llm)
                .map(|a| Arc::new(a) as Arc<dyn ContentAnalyst>);
            if analyst.is_none() {
                info!("OPENAI_API_KEY not set, using basic analysis");
            }

            let mut agent = ResearchAgent::new(client, analyst);
            if config.search.enabled {
                agent = agent.with_web_search(WebSearch::new(
                    config.search.url.clone(),
                    config.search.timeout,
                )?);
            }
            let report = agent.conduct_research(&query, depth, breadth).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Candidates { .. } => Ok(()),
    }
}

async fn build_key_ring(config: &Config) -> anyhow::Result<KeyRing> {
    let creds = &config.credentials;
    match &creds.keyring_dir {
        Some(dir) => {
            KeyRing::restore(
                KeyRingStorage::with_path(dir.clone()),
                CRAWLER_KEY_NAME,
                &creds.crawler_api_key,
                &creds.crawler_backup_keys,
            )
            .await
        }
        None => Ok(KeyRing::new(
            CRAWLER_KEY_NAME,
            &creds.crawler_api_key,
            &creds.crawler_backup_keys,
        )),
    }
}
