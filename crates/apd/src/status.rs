//! Status tracking commands: `status`, `show`, `find`, `list`, `advance`,
//! `ready`, and `retry`.

use anyhow::{bail, Result};

use apd_core::models::{ContentRecord, ContentType, Status};
use apd_core::store::{ListFilter, ListOrder, Store};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Options for `apd list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub period: Option<String>,
    pub status: Option<Status>,
    pub content_type: Option<ContentType>,
    pub min_quality: Option<f64>,
    pub exclude_filtered: bool,
    pub exclude_merged: bool,
    pub order: ListOrder,
    pub limit: Option<usize>,
}

impl ListOptions {
    fn to_filter(&self) -> ListFilter {
        let mut filter = ListFilter::new()
            .period(self.period.as_deref())
            .order(self.order);
        if let Some(status) = self.status {
            filter = filter.status(status);
        }
        if let Some(ct) = self.content_type {
            filter = filter.content_type(ct);
        }
        if let Some(min) = self.min_quality {
            filter = filter.min_quality(min);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        filter.include_filtered = !self.exclude_filtered;
        filter.include_merged = !self.exclude_merged;
        filter
    }
}

pub async fn run_status(config: &Config, period: Option<&str>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let counts = store.status_counts(period).await?;
    let publishable = store.list_publishable(period).await?;

    println!("Status ({})", period.unwrap_or("all periods"));
    let mut total = 0;
    for status in Status::STAGES.iter().chain(std::iter::once(&Status::Error)) {
        let n = counts.get(status).copied().unwrap_or(0);
        total += n;
        println!("  {:<10} {:>6}", status.as_str(), n);
    }
    println!("  {:<10} {:>6}", "TOTAL", total);
    println!();
    println!("  publishable: {}", publishable.len());
    Ok(())
}

pub async fn run_show(config: &Config, content_id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    match store.get(content_id).await? {
        Some(record) => {
            print_record(&record);
            Ok(())
        }
        None => bail!("content not found: {}", content_id),
    }
}

pub async fn run_find(config: &Config, title: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store.find_by_title(title).await?;
    if records.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for record in &records {
        print_row(record);
    }
    Ok(())
}

pub async fn run_list(config: &Config, options: &ListOptions) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store.list(&options.to_filter()).await?;
    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for record in &records {
        print_row(record);
    }
    println!();
    println!("{} record(s)", records.len());
    Ok(())
}

pub async fn run_advance(
    config: &Config,
    content_id: &str,
    status: Status,
    error: Option<&str>,
    increment_retry: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    match store
        .advance_status(content_id, status, error, increment_retry)
        .await?
    {
        Some(record) => {
            println!("{} -> {}", record.content_id, record.status);
            Ok(())
        }
        None => bail!("content not found: {}", content_id),
    }
}

pub async fn run_ready(config: &Config, period: Option<&str>, target: Status) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store
        .list_ready_for_stage(period, target, config.pipeline.max_retries)
        .await?;
    if records.is_empty() {
        println!("Nothing ready for {}.", target);
        return Ok(());
    }
    for record in &records {
        print_row(record);
    }
    Ok(())
}

pub async fn run_retry(config: &Config, period: Option<&str>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let reset = store
        .retry_errored(period, config.pipeline.max_retries)
        .await?;
    println!("reset {} errored record(s)", reset);
    Ok(())
}

fn print_row(record: &ContentRecord) {
    let score = record
        .quality_score
        .map(|s| format!("{:5.1}", s))
        .unwrap_or_else(|| "    -".to_string());
    let mut flags = String::new();
    if record.filtered_out {
        flags.push_str(" [filtered]");
    }
    if let Some(target) = &record.merged_into {
        flags.push_str(&format!(" [merged into {}]", target));
    }
    println!(
        "{:<24} {:<10} {:<10} {:<8} {}  {}{}",
        record.content_id,
        record.period_id,
        record.content_type.as_str(),
        record.status.as_str(),
        score,
        record.title_or_empty(),
        flags
    );
}

fn print_record(record: &ContentRecord) {
    println!("--- Content ---");
    println!("content_id:   {}", record.content_id);
    println!("period_id:    {}", record.period_id);
    println!("type:         {}", record.content_type);
    if let Some(title) = &record.title {
        println!("title:        {}", title);
    }
    if let Some(url) = record.primary_url() {
        println!("url:          {}", url);
    }
    println!("status:       {}", record.status);
    if let Some(stage) = record.error_stage {
        println!("failed at:    {}", stage);
    }
    println!("retry_count:  {}", record.retry_count);
    if let Some(err) = &record.last_error {
        println!("last_error:   {}", err);
    }
    if let Some(target) = &record.merged_into {
        println!("merged_into:  {}", target);
    }
    println!("created_at:   {}", record.created_at);
    println!("updated_at:   {}", record.updated_at);

    if let Some(score) = record.quality_score {
        println!();
        println!("--- Quality ---");
        println!("score:        {:.1}", score);
        println!("filtered_out: {}", record.filtered_out);
        if let Some(reason) = &record.filter_reason {
            println!("reason:       {}", reason);
        }
        for reason in &record.quality_reasons {
            println!("  - {}", reason);
        }
    }

    if let Some(summary) = &record.summary {
        println!();
        println!("--- Summary ---");
        println!("{}", summary);
    }
}
