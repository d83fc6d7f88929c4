//! Subcommand implementations

use crate::job_file::load_job;
use anyhow::{Context, Result};
use docshift_core::{AggregateResult, DocumentStore, Job, Migrator, MigratorConfig, Namespace};
use docshift_store::{seed_contracts, MemoryStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments for `docshift migrate`
#[derive(Debug, Clone)]
pub struct MigrateArgs {
    /// Job envelope file
    pub job: PathBuf,
    /// Collection file to migrate
    pub store: PathBuf,
    /// Where written results go; defaults to `store`
    pub out: Option<PathBuf>,
    /// Overrides the default concurrency when the job sets none
    pub concurrency: Option<usize>,
}

/// Arguments for `docshift seed`
#[derive(Debug, Clone)]
pub struct SeedArgs {
    /// Collection file to write
    pub out: PathBuf,
    /// Number of contracts
    pub count: usize,
    /// RNG seed for reproducible fixtures
    pub seed: Option<u64>,
}

/// Run a job file against a collection file
///
/// Written results are saved back; dry runs leave the file untouched.
///
/// # Errors
/// Job loading, validation, store and migration failures, with context.
pub async fn migrate(args: &MigrateArgs) -> Result<Option<AggregateResult>> {
    let raw = load_job(&args.job).await?;
    let job = Job::from_value(&raw).context("invalid job envelope")?;
    let namespace = job.namespace().context("invalid job connection")?;

    let store = Arc::new(
        MemoryStore::open_file(&namespace, &args.store)
            .await
            .with_context(|| format!("failed to open store '{}'", args.store.display()))?,
    );

    let mut config = MigratorConfig::new();
    if let Some(concurrency) = args.concurrency {
        config = config.with_default_concurrency(concurrency);
    }
    let migrator = Migrator::new(config);

    let result = job
        .run(&migrator, Arc::clone(&store) as Arc<dyn DocumentStore>)
        .await
        .with_context(|| format!("job '{}' failed", args.job.display()))?;

    if let Some(ack) = result.as_ref().and_then(AggregateResult::as_written) {
        let out = args.out.as_deref().unwrap_or(&args.store);
        store
            .save_file(&namespace, out)
            .await
            .with_context(|| format!("failed to save store '{}'", out.display()))?;
        tracing::info!(
            modified = ack.modified_count,
            upserted = ack.upserted_count,
            out = %out.display(),
            "saved collection"
        );
    }

    Ok(result)
}

/// Render a migration result for stdout (`null` when nothing matched)
///
/// # Errors
/// Fails only if the result cannot be serialized.
pub fn render(result: Option<&AggregateResult>) -> Result<String> {
    let value = match result {
        Some(result) => serde_json::to_value(result)?,
        None => Value::Null,
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Write a fixture collection file
///
/// # Errors
/// Fails if the file cannot be written.
pub async fn seed(args: &SeedArgs) -> Result<usize> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let namespace = fixture_namespace(&args.out);
    let store = MemoryStore::new();
    store.create_collection(&namespace);
    let ids = seed_contracts(&store, &namespace, args.count, &mut rng);

    store
        .save_file(&namespace, &args.out)
        .await
        .with_context(|| format!("failed to write fixtures '{}'", args.out.display()))?;
    tracing::info!(count = ids.len(), out = %args.out.display(), "seeded contracts");
    Ok(ids.len())
}

fn fixture_namespace(path: &Path) -> Namespace {
    let collection = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("contracts");
    Namespace::new("docshift", collection)
}
