//! CLI command implementations.
//!
//! Each `run_*` function backs one `rix` subcommand and prints its result
//! to stdout as `key: value` lines. Logs go to stderr.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};

use repo_index_core::codec;
use repo_index_core::models::RepositoryRecord;
use repo_index_core::store::{vector_object_key, BlobStore, MetadataStore};
use repo_index_core::sync::now_millis;
use repo_index_core::RepoKey;

use crate::config::Config;
use crate::github_url::parse_repo_url;
use crate::service::{build_engine, open_blob_store, open_metadata_store};

fn format_millis(millis: i64) -> String {
    if millis <= 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn print_record(record: &RepositoryRecord) {
    println!("repo: {}/{}", record.owner, record.repo);
    println!("status: {}", record.status);
    println!("last sync: {}", format_millis(record.last_sync_at));
    if let Some(ref message) = record.error_message {
        println!("error: {}", message);
    }
}

fn parse_key(input: &str) -> Result<RepoKey> {
    input.parse::<RepoKey>().map_err(|e| anyhow!(e))
}

/// `rix add <repo-url>`
pub async fn run_add(config: &Config, repo_url: &str) -> Result<()> {
    let key = parse_repo_url(repo_url)?;
    let store = open_metadata_store(config).await?;
    let (record, created) = store.create_if_absent(&key, now_millis()).await?;
    println!("{}: {}", if created { "added" } else { "exists" }, key);
    print_record(&record);
    Ok(())
}

/// `rix list`
pub async fn run_list(config: &Config) -> Result<()> {
    let store = open_metadata_store(config).await?;
    let records = store.list().await?;
    if records.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }
    for record in records {
        println!(
            "{}/{}\t{}\t{}",
            record.owner,
            record.repo,
            record.status,
            format_millis(record.last_sync_at)
        );
    }
    Ok(())
}

/// `rix status <owner/repo>`
pub async fn run_status(config: &Config, repo: &str) -> Result<()> {
    let key = parse_key(repo)?;
    let store = open_metadata_store(config).await?;
    match store.get(&key).await? {
        Some(record) => {
            print_record(&record);
            Ok(())
        }
        None => bail!("repository not found: {}", key),
    }
}

/// `rix sync <owner/repo>`
pub async fn run_sync(config: &Config, repo: &str) -> Result<()> {
    let key = parse_key(repo)?;
    let engine = build_engine(config).await?;
    let outcome = engine
        .sync(&key)
        .await
        .map_err(|e| anyhow!("{}: {}", e.code(), e))?;

    println!("repo: {}", outcome.repo);
    println!("status: {}", outcome.status);
    println!("last sync: {}", format_millis(outcome.last_sync_at));
    println!("issues: {}", outcome.issues_count);
    println!("pull requests: {}", outcome.pull_requests_count);
    println!("embedded: {}", outcome.embedded);
    println!("carried over: {}", outcome.carried_over);
    println!("removed: {}", outcome.removed);
    println!("ok");
    Ok(())
}

/// `rix inspect <owner/repo>`: decode the stored vector object.
pub async fn run_inspect(config: &Config, repo: &str, verbose: bool) -> Result<()> {
    let key = parse_key(repo)?;
    let blobs = open_blob_store(&config.storage)?;
    let object_key = vector_object_key(&key);
    let Some(bytes) = blobs.get(&object_key).await? else {
        bail!("no vector object stored for {} ({})", key, object_key);
    };
    let object = codec::decode(&bytes)?;

    println!("repo: {}", object.repo);
    println!("synced at: {}", format_millis(object.synced_at));
    println!("bytes: {}", bytes.len());
    println!("dims: {}", object.dims().unwrap_or(0));
    println!("issues: {}", object.issues.len());
    println!("pull requests: {}", object.pull_requests.len());

    if verbose {
        for (id, issue) in &object.issues {
            println!("issue #{}\t{}\t{:?}", issue.number, id, issue.state);
        }
        for (id, pr) in &object.pull_requests {
            println!(
                "pull request #{}\t{}\t{:?}\t{}",
                pr.number, id, pr.state, pr.content_hash
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "never");
        assert_eq!(format_millis(1_700_000_000_000), "2023-11-14T22:13:20+00:00");
    }
}
