use analysis_core::{AsxSymbol, NewsArticle};
use analytics::{render_text, ReportBuilder};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use dashboard::AppState;
use prediction_store::db::file_path;
use prediction_store::{
    audit, compare_counts, merge_from, Repairer, SyntheticConfig, SyntheticOutcomeGenerator, TradingDb,
};
use sentiment_analysis::SentimentAnalysisEngine;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::cli::Command;
use crate::config::AppConfig;
use crate::pipeline::PredictionPipeline;
use crate::providers::{build_price_provider, ProviderPriceLookup};

pub async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Quote { symbol } => quote(config, &symbol).await,
        Command::Predict { symbols, news_file } => predict(config, &symbols, news_file.as_deref()).await,
        Command::Evaluate { horizon_hours } => {
            evaluate(config, horizon_hours.unwrap_or(config.evaluation_horizon_hours)).await
        }
        Command::Audit => {
            let db = open_db(&config.database_url).await?;
            let report = audit(&db).await?;
            print_json(&report)?;
            if !report.is_clean() {
                tracing::warn!("{} integrity violations; run `bank-trader repair`", report.violations());
            }
            Ok(())
        }
        Command::Repair { dry_run } => repair(config, dry_run).await,
        Command::Consolidate { other_db } => {
            let db = open_db(&config.database_url).await?;
            let report = merge_from(&db, &other_db).await?;
            print_json(&report)
        }
        Command::Compare { other_db } => compare(config, &other_db).await,
        Command::Synthesize { seed, limit } => {
            let db = open_db(&config.database_url).await?;
            let generator = SyntheticOutcomeGenerator::new(
                db,
                SyntheticConfig {
                    seed,
                    limit,
                    ..Default::default()
                },
            );
            print_json(&generator.run().await?)
        }
        Command::Report { json, hold_window } => {
            let db = open_db(&config.database_url).await?;
            let report = ReportBuilder::new(db).hold_window(hold_window).build().await?;
            if json {
                print_json(&report)
            } else {
                print!("{}", render_text(&report));
                Ok(())
            }
        }
        Command::Serve { addr } => {
            let db = open_db(&config.database_url).await?;
            dashboard::serve(AppState::new(db), addr.unwrap_or(config.dashboard_addr)).await
        }
    }
}

/// Open the trading database, creating its directory if needed.
pub async fn open_db(database_url: &str) -> Result<TradingDb> {
    let path = file_path(database_url);
    if !path.contains(":memory:") {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
    }
    TradingDb::connect(database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))
}

fn sqlite_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{}", path)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_news(path: &Path) -> Result<Vec<NewsArticle>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of articles", path.display()))
}

fn resolve_symbols(requested: &[String], config: &AppConfig) -> Result<Vec<AsxSymbol>> {
    if requested.is_empty() {
        return Ok(config.watchlist.clone());
    }
    requested
        .iter()
        .map(|s| AsxSymbol::parse(s).with_context(|| format!("Invalid symbol '{}'", s)))
        .collect()
}

async fn quote(config: &AppConfig, symbol: &str) -> Result<()> {
    let symbol = AsxSymbol::parse(symbol)?;
    let provider = build_price_provider(config)?;
    let quote = provider
        .latest_quote(&symbol)
        .await
        .with_context(|| format!("No provider could quote {}", symbol))?;
    print_json(&quote)
}

async fn predict(config: &AppConfig, requested: &[String], news_file: Option<&Path>) -> Result<()> {
    let symbols = resolve_symbols(requested, config)?;
    let news = match news_file {
        Some(path) => read_news(path)?,
        None => Vec::new(),
    };

    let db = open_db(&config.database_url).await?;
    let pipeline = PredictionPipeline::new(
        build_price_provider(config)?,
        Arc::new(SentimentAnalysisEngine::new()),
        config.scorer()?,
        db,
        config.model_version.clone(),
    );

    let now = Utc::now();
    let mut summaries = Vec::new();
    let mut failed = 0;
    for symbol in &symbols {
        match pipeline.predict(symbol, &news, now).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                failed += 1;
                tracing::error!("Prediction failed for {}: {:#}", symbol, e);
            }
        }
    }

    for s in &summaries {
        println!(
            "{:<8} {:<4} confidence {:.2}  entry {:>8.2}  sentiment {:+.2}  technical {:+.2}  volume {}",
            s.symbol.as_str(),
            s.decision.action.as_str(),
            s.decision.confidence,
            s.entry_price,
            s.sentiment.score,
            s.technical_score,
            s.volume.grade
        );
    }

    if summaries.is_empty() {
        bail!("All {} predictions failed", failed);
    }
    if failed > 0 {
        tracing::warn!("{} of {} symbols failed", failed, symbols.len());
    }
    Ok(())
}

async fn evaluate(config: &AppConfig, horizon_hours: i64) -> Result<()> {
    let db = open_db(&config.database_url).await?;
    let provider = build_price_provider(config)?;
    let lookup = ProviderPriceLookup::new(provider.clone());
    let pipeline = PredictionPipeline::new(
        provider,
        Arc::new(SentimentAnalysisEngine::new()),
        config.scorer()?,
        db,
        config.model_version.clone(),
    );

    let report = pipeline
        .evaluate(&lookup, horizon_hours, config.hold_band_pct, Utc::now())
        .await?;
    print_json(&report)
}

async fn repair(config: &AppConfig, dry_run: bool) -> Result<()> {
    let db = open_db(&config.database_url).await?;
    let mut repairer = Repairer::new(db, config.hold_band_pct).dry_run(dry_run);

    // Entry prices can only be backfilled with a working provider
    match build_price_provider(config) {
        Ok(provider) => repairer = repairer.with_price_lookup(Arc::new(ProviderPriceLookup::new(provider))),
        Err(e) => tracing::warn!("Repairing without price lookups: {:#}", e),
    }

    let report = repairer.run().await?;
    print_json(&report)
}

async fn compare(config: &AppConfig, other_db: &str) -> Result<()> {
    if !TradingDb::exists(other_db) {
        bail!("Database file {} does not exist", file_path(other_db));
    }
    let local = open_db(&config.database_url).await?;
    let other = TradingDb::open_read_only(&sqlite_url(other_db))
        .await
        .with_context(|| format!("Failed to open {} read-only", other_db))?;

    let comparison = compare_counts(&local, &other).await?;
    print_json(&comparison)?;
    if comparison.diverged() {
        println!("Databases differ in {} table(s)", comparison.differences().len());
    } else {
        println!("Databases match");
    }
    Ok(())
}
