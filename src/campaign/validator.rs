//! Recipient batch validation.
//!
//! Raw recipient lists arrive as free-form strings. Each entry is normalized
//! to a canonical international form and deduplicated; a bad entry is recorded
//! and skipped, never failing the whole batch.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

static E164_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("phone regex"));

/// Canonical `+<country code><number>` form, 8 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalizes a raw entry: strips formatting characters, maps the `00`
    /// international prefix to `+`, and adds `+` to bare digit strings.
    /// Returns `None` for anything that does not look like a phone number.
    pub fn parse(raw: &str) -> Option<PhoneNumber> {
        let mut cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();
        if let Some(rest) = cleaned.strip_prefix("00") {
            cleaned = format!("+{rest}");
        }
        if !cleaned.starts_with('+') {
            cleaned = format!("+{cleaned}");
        }
        if E164_SHAPE.is_match(&cleaned) {
            Some(PhoneNumber(cleaned))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Malformed,
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRecipient {
    pub raw: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    /// First occurrence of every valid number, input order preserved.
    pub accepted: Vec<PhoneNumber>,
    pub rejected: Vec<RejectedRecipient>,
}

/// `accepted.len()` is exactly the recipient count passed to the quota
/// ledger; rejected entries never count against the per-campaign limit.
pub fn validate_batch(raw_numbers: &[String]) -> ValidatedBatch {
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for raw in raw_numbers {
        match PhoneNumber::parse(raw) {
            Some(number) => {
                if seen.insert(number.clone()) {
                    accepted.push(number);
                } else {
                    rejected.push(RejectedRecipient {
                        raw: raw.clone(),
                        reason: RejectReason::Duplicate,
                    });
                }
            }
            None => rejected.push(RejectedRecipient {
                raw: raw.clone(),
                reason: RejectReason::Malformed,
            }),
        }
    }

    ValidatedBatch { accepted, rejected }
}
