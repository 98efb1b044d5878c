use std::collections::BTreeSet;

use chrono::{NaiveDateTime, SecondsFormat};
use regex::Regex;
use serde::Serializer;
use slug::slugify;

use crate::types::{CoreError, CoreResult, EntityId};

lazy_static! {
    static ref PUNCTUATION_RE: Regex = Regex::new(r"[^\p{L}\p{N}\s-]+").unwrap();
}

pub fn serialize_date<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = date.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true);
    serializer.serialize_str(&s)
}

/// Lower-cased, punctuation-free, hyphen-joined form of a title.
/// "Don't Panic!" becomes "dont-panic".
pub fn slug_for(title: &str) -> String {
    slugify(PUNCTUATION_RE.replace_all(title, ""))
}

/// Splits a free-text tag field on whitespace, dropping empty parts and exact
/// duplicates. Iteration order is by name.
pub fn tag_candidates(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace()
        .map(|part| part.trim().to_owned())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Parses an identifier taken from a path or form field.
pub fn parse_id(field: &str, raw: &str) -> CoreResult<EntityId> {
    raw.trim()
        .parse::<EntityId>()
        .map_err(|_| CoreError::invalid(field, format!("invalid {}: {:?}", field, raw)))
}
