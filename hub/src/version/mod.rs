//! Version extraction and comparison
//!
//! Plugins report their version in a zoo of formats: bare JSON strings,
//! `{"version": ..}` objects, `{"Major":..,"Minor":..}` objects, free text in
//! release titles and bodies, and Windows file-version resources. Each source
//! kind has its own normalizer and all of them converge on a canonical
//! three-component semantic version string. Nothing in here returns an error:
//! anything unrecognizable is `None`, and comparing an unparseable version
//! never reports an update.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::LazyLock;

use crate::logger;

pub mod binary;

const LOG_CTX: &str = "version";

/// First dotted 2-3 component number, optionally labelled and letter-prefixed
static TEXT_VERSION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:(?:version|release)\s*)?[a-z]?(\d+)\.(\d+)(?:\.(\d+))?").ok()
});

/// A version-bearing input, tagged by how it must be interpreted
#[derive(Debug, Clone, Copy)]
pub enum VersionSource<'a> {
    /// Contents of a sidecar / `version.json` metadata file
    Metadata(&'a str),
    /// Free text such as a release title or changelog body
    Text(&'a str),
    /// A release tag such as `v1.2.3`
    Tag(&'a str),
    /// A binary carrying a file-version resource
    BinaryFile(&'a Path),
}

/// Extract a canonical semantic version from any source
pub fn extract(source: VersionSource<'_>) -> Option<String> {
    match source {
        VersionSource::Metadata(raw) => parse_metadata(raw).and_then(|v| normalize(&v)),
        VersionSource::Text(text) => extract_from_text(text),
        VersionSource::Tag(tag) => normalize(tag),
        VersionSource::BinaryFile(path) => binary::query_file_version(path),
    }
}

/// Version forms accepted in metadata files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataVersion {
    /// `"1.2.3"`
    Bare(String),
    /// `{"version": "1.2.3"}`
    Field(String),
    /// `{"Major": 1, "Minor": 2, "Patch": 3}` with `Patch` optional
    Components {
        major: u64,
        minor: u64,
        patch: Option<u64>,
    },
}

impl MetadataVersion {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(MetadataVersion::Bare(s.trim().to_string())),
            Value::Object(map) => {
                let lookup = |key: &str| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(key))
                        .map(|(_, v)| v)
                };

                if let Some(version) = lookup("version") {
                    return match version {
                        Value::String(s) => Some(MetadataVersion::Field(s.trim().to_string())),
                        Value::Number(n) => Some(MetadataVersion::Field(n.to_string())),
                        // Nested {"version": {"Major": ..}} shows up in older builds
                        nested @ Value::Object(_) => Self::from_value(nested),
                        _ => None,
                    };
                }

                let major = lookup("major").and_then(component_number)?;
                let minor = lookup("minor").and_then(component_number)?;
                let patch = lookup("patch").and_then(component_number);
                Some(MetadataVersion::Components {
                    major,
                    minor,
                    patch,
                })
            }
            _ => None,
        }
    }

    /// Version text before two-to-three component normalization
    pub fn joined(&self) -> String {
        match self {
            MetadataVersion::Bare(s) | MetadataVersion::Field(s) => s.clone(),
            MetadataVersion::Components {
                major,
                minor,
                patch: Some(patch),
            } => format!("{}.{}.{}", major, minor, patch),
            MetadataVersion::Components {
                major,
                minor,
                patch: None,
            } => format!("{}.{}", major, minor),
        }
    }
}

fn component_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a metadata payload into its joined (not yet normalized) version
///
/// A payload that fails to parse is retried once with the BOM and all
/// control characters stripped. A second failure is logged and yields None.
pub fn parse_metadata(raw: &str) -> Option<String> {
    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(value) => Some(value),
        Err(first) => {
            let sanitized = sanitize_metadata(raw);
            match serde_json::from_str::<Value>(&sanitized) {
                Ok(value) => {
                    logger::log_debug(
                        &format!("Metadata parsed after sanitizing ({})", first),
                        Some(LOG_CTX),
                        None,
                    );
                    Some(value)
                }
                Err(second) => {
                    logger::log_warn(
                        &format!("Unreadable version metadata: {}", second),
                        Some(LOG_CTX),
                    );
                    None
                }
            }
        }
    }?;

    let version = MetadataVersion::from_value(&parsed)?;
    let joined = version.joined();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn sanitize_metadata(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\u{feff}' && !c.is_control())
        .collect()
}

/// First embedded version in free text, normalized to three components
pub fn extract_from_text(text: &str) -> Option<String> {
    let re = TEXT_VERSION_RE.as_ref()?;
    let caps = re.captures(text)?;
    let major = caps.get(1)?.as_str();
    let minor = caps.get(2)?.as_str();
    let candidate = match caps.get(3) {
        Some(patch) => format!("{}.{}.{}", major, minor, patch.as_str()),
        None => format!("{}.{}", major, minor),
    };
    normalize(&candidate)
}

/// Canonicalize a version string
///
/// Accepts anything `semver` accepts (after an optional `v` prefix) and bare
/// numeric `major.minor[.patch]` with leading zeros. Idempotent on its output.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_v = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if without_v.is_empty() {
        return None;
    }

    if let Ok(version) = semver::Version::parse(without_v) {
        return Some(version.to_string());
    }

    let parts: Vec<&str> = without_v.split('.').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let mut numbers = Vec::with_capacity(3);
    for part in &parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        numbers.push(part.parse::<u64>().ok()?);
    }
    if numbers.len() == 2 {
        numbers.push(0);
    }

    let candidate = format!("{}.{}.{}", numbers[0], numbers[1], numbers[2]);
    semver::Version::parse(&candidate)
        .ok()
        .map(|v| v.to_string())
}

/// Remote version by precedence: valid tag, then title, then body
pub fn remote_version(tag: &str, title: &str, body: &str) -> Option<String> {
    extract(VersionSource::Tag(tag))
        .or_else(|| extract(VersionSource::Text(title)))
        .or_else(|| extract(VersionSource::Text(body)))
}

/// Outcome of comparing an installed version with a remote one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComparison {
    RemoteNewer,
    NotNewer,
    /// At least one side is not a valid semantic version
    Incomparable,
}

pub fn compare(local: &str, remote: &str) -> VersionComparison {
    match (
        semver::Version::parse(local.trim()),
        semver::Version::parse(remote.trim()),
    ) {
        (Ok(local_ver), Ok(remote_ver)) => match remote_ver.cmp(&local_ver) {
            Ordering::Greater => VersionComparison::RemoteNewer,
            _ => VersionComparison::NotNewer,
        },
        _ => {
            logger::log_debug(
                &format!("Versions not comparable: local={:?} remote={:?}", local, remote),
                Some(LOG_CTX),
                None,
            );
            VersionComparison::Incomparable
        }
    }
}

/// True only when both sides parse and remote is strictly greater
pub fn update_available(local: &str, remote: &str) -> bool {
    compare(local, remote) == VersionComparison::RemoteNewer
}
