//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is walked as a `toml::Value` before serde deserialization so
//! a misspelled key (`pol_interval_secs`) produces a "did you mean?" warning
//! instead of silently falling back to the default. Warnings never break a
//! config.

use std::collections::HashSet;

/// A non-fatal config warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Every valid dotted key path of `CasetaConfig`.
///
/// Any new field added to the config structs must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    [
        "server",
        "server.addr",
        "storage",
        "storage.backend",
        "storage.data_dir",
        "alerts",
        "alerts.poll_interval_secs",
        "alerts.broadcast_capacity",
        "oracle",
        "oracle.backend",
        "oracle.endpoint",
        "oracle.model",
        "oracle.api_key_env",
        "oracle.timeout_secs",
        "oracle.max_image_bytes",
        "timeouts",
        "timeouts.store_ms",
        "timeouts.petition_ms",
    ]
    .into_iter()
    .collect()
}

/// Recursively collect dotted key paths from a TOML table.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

/// Warnings for every unknown key in a raw TOML document.
///
/// Parse errors are left to the serde pass.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
