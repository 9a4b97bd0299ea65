//! # Naming
//!
//! Deterministic names derived from a bucket name.
//!
//! Storage account names are global across Azure, lowercase alphanumeric and
//! at most 24 characters, so the bucket name is hashed rather than embedded.
//! Generated secret names carry a short hash of their creation time, which
//! gives a rotated secret a fresh name next to the one it supersedes.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Prefix of every storage account created by the controller
pub const STORAGE_ACCOUNT_PREFIX: &str = "bkp";
/// Hex characters of the bucket hash kept in the storage account name
pub const STORAGE_ACCOUNT_HASH_LENGTH: usize = 15;

/// Prefix of every generated secret
pub const GENERATED_SECRET_PREFIX: &str = "generated-bucket-";
/// Hex characters of the timestamp hash kept in the generated secret name
pub const GENERATED_SECRET_HASH_LENGTH: usize = 4;

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// `bkp` followed by the first 15 hex characters of the bucket name's SHA-256
#[must_use]
pub fn storage_account_name(bucket_name: &str) -> String {
    let hash = sha256_hex(bucket_name);
    format!(
        "{STORAGE_ACCOUNT_PREFIX}{}",
        &hash[..STORAGE_ACCOUNT_HASH_LENGTH]
    )
}

/// The resource group hosting a bucket's storage account is named after the bucket
#[must_use]
pub fn resource_group_name(bucket_name: &str) -> String {
    bucket_name.to_string()
}

/// `generated-bucket-<bucket>-<4 hex>`, hashing the RFC 3339 form of `timestamp`
///
/// The timestamp is rendered with second precision and a `Z` suffix, so two
/// names generated within the same second are identical.
#[must_use]
pub fn generated_secret_name(bucket_name: &str, timestamp: DateTime<Utc>) -> String {
    let hash = sha256_hex(&timestamp.to_rfc3339_opts(SecondsFormat::Secs, true));
    format!(
        "{GENERATED_SECRET_PREFIX}{bucket_name}-{}",
        &hash[..GENERATED_SECRET_HASH_LENGTH]
    )
}
