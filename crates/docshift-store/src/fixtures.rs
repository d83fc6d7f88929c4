//! Contract fixtures
//!
//! Generates contract-like documents for seeding test and demo collections.
//! Every document has an empty `fieldsData` object and three `addOns`
//! elements carrying an `id`. Ids and dates come from the supplied RNG, so a
//! seeded RNG reproduces the same collection.

use crate::memory::MemoryStore;
use chrono::{DateTime, Duration, Utc};
use docshift_core::{Document, Namespace, ID_FIELD};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::{json, Value};

/// Number of documents in a default seed
pub const DEFAULT_FIXTURE_COUNT: usize = 100;

/// Add-ons per generated contract
pub const ADD_ONS_PER_CONTRACT: usize = 3;

const STATUSES: &[&str] = &["draft", "pending", "signed", "expired", "archived"];
const TIME_ZONES: &[&str] = &[
    "Europe/Oslo",
    "Europe/London",
    "America/New_York",
    "Asia/Tokyo",
    "Australia/Sydney",
];
const LANGUAGES: &[&str] = &["no", "en", "de", "fr", "sv", "ja"];
const SIGN_METHODS: &[&str] = &["bankid", "email", "sms", "handwritten"];
const CURRENCIES: &[&str] = &["NOK", "EUR", "USD", "SEK", "JPY"];

/// `createdAt` values fall in the year before this instant (2025-01-01T00:00:00Z)
const CREATED_BEFORE_SECS: i64 = 1_735_689_600;

/// Generate `count` contract documents (without `_id`)
pub fn generate_contracts<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Document> {
    (0..count).map(|_| contract(rng)).collect()
}

/// Insert `count` generated contracts into `namespace`
///
/// # Returns
/// IDs of the inserted documents.
pub fn seed_contracts<R: Rng + ?Sized>(
    store: &MemoryStore,
    namespace: &Namespace,
    count: usize,
    rng: &mut R,
) -> Vec<Value> {
    let contracts: Vec<Document> = generate_contracts(count, rng)
        .into_iter()
        .map(|mut contract| {
            let id = uuid_from(rng).simple().to_string();
            contract.insert(ID_FIELD.to_string(), Value::String(id));
            contract
        })
        .collect();
    let ids = store.insert_many(namespace, contracts);
    tracing::debug!(%namespace, count, "seeded contracts");
    ids
}

fn contract<R: Rng + ?Sized>(rng: &mut R) -> Document {
    let created_before = DateTime::<Utc>::from_timestamp(CREATED_BEFORE_SECS, 0).unwrap_or_default();
    let created_at = created_before - Duration::days(rng.random_range(1..=365));
    let add_ons: Vec<Value> = (0..ADD_ONS_PER_CONTRACT)
        .map(|_| json!({ "id": uuid_from(rng).to_string() }))
        .collect();

    let value = json!({
        "metaTemplateId": uuid_from(rng).to_string(),
        "status": pick(STATUSES, rng),
        "createdAt": created_at.to_rfc3339(),
        "timeZone": pick(TIME_ZONES, rng),
        "language": pick(LANGUAGES, rng),
        "signMethod": pick(SIGN_METHODS, rng),
        "templatePrice": rng.random_range(0..100_000),
        "currency": pick(CURRENCIES, rng),
        "fieldsData": {},
        "addOns": add_ons,
    });

    match value {
        Value::Object(document) => document,
        _ => Document::new(),
    }
}

/// Version 4 UUID drawn from `rng`
fn uuid_from<R: Rng + ?Sized>(rng: &mut R) -> uuid::Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

fn pick<R: Rng + ?Sized>(options: &[&'static str], rng: &mut R) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}
