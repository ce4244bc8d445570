//! Deterministic local suggestion lookup.
//!
//! [`FallbackEngine::suggest`] resolves candidates in this order:
//!
//! 1. the context's entry for the exact last token,
//! 2. the context's `default` entry,
//! 3. the global `default` entry (also used for unknown contexts),
//! 4. [`FLOOR`](super::table::FLOOR).
//!
//! Every list stored in the engine is non-empty, so `suggest` never returns
//! an empty vector.
//!
//! User overrides are read from a TOML file shaped like the built-in table:
//!
//! ```toml
//! [restaurant]
//! "냉면" = ["주세요", "곱빼기로"]
//!
//! [cafe]
//! default = ["아메리카노", "라떼", "주세요"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result};

use super::table::{BUILTIN, DEFAULT_KEY, FLOOR};

/// Candidate lists keyed by last token.
pub type TokenTable = BTreeMap<String, Vec<String>>;

/// Token tables keyed by context id.
pub type SuggestionTable = BTreeMap<String, TokenTable>;

/// Context-and-last-token keyed candidate lookup.
#[derive(Debug, Clone)]
pub struct FallbackEngine {
    tables: SuggestionTable,
}

impl FallbackEngine {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Engine backed by the built-in Korean table.
    pub fn builtin() -> Self {
        let tables = BUILTIN
            .iter()
            .map(|(context, entries)| {
                let table = entries
                    .iter()
                    .map(|(token, list)| {
                        (
                            token.to_string(),
                            list.iter().map(|s| s.to_string()).collect(),
                        )
                    })
                    .collect();
                (context.to_string(), table)
            })
            .collect();
        Self { tables }
    }

    /// Built-in table with `text` (TOML) merged on top.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let overrides: SuggestionTable =
            toml::from_str(text).context("invalid suggestion table")?;
        let mut engine = Self::builtin();
        engine.merge(overrides);
        Ok(engine)
    }

    /// Built-in table with the overrides at `path` merged on top.
    ///
    /// A missing file is not an error: the built-in table is returned as is.
    pub fn load_with_overrides(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let engine = Self::from_toml_str(&text)
            .with_context(|| format!("loading {}", path.display()))?;
        log::info!("fallback: loaded suggestion overrides from {}", path.display());
        Ok(engine)
    }

    /// Merge `overrides` into the table, replacing entries with the same
    /// context and token.  Empty candidate lists are skipped.
    ///
    /// Returns the number of entries that were applied.
    pub fn merge(&mut self, overrides: SuggestionTable) -> usize {
        let mut applied = 0;
        for (context, entries) in overrides {
            for (token, list) in entries {
                let list: Vec<String> = list
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if list.is_empty() {
                    log::warn!("fallback: ignoring empty candidate list for {context}/{token}");
                    continue;
                }
                self.tables
                    .entry(context.clone())
                    .or_default()
                    .insert(token, list);
                applied += 1;
            }
        }
        applied
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Next-token candidates for `context` after `last_token`.
    ///
    /// `last_token = None` means the sentence has not started yet.
    pub fn suggest(&self, context: &str, last_token: Option<&str>) -> Vec<String> {
        let resolved = self.tables.get(context).and_then(|table| {
            last_token
                .and_then(|token| table.get(token))
                .or_else(|| table.get(DEFAULT_KEY))
        });

        match resolved.or_else(|| self.global_default()) {
            Some(list) => list.clone(),
            None => FLOOR.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether `context` has its own table.
    pub fn knows_context(&self, context: &str) -> bool {
        self.tables.contains_key(context)
    }

    fn global_default(&self) -> Option<&Vec<String>> {
        self.tables
            .get(DEFAULT_KEY)
            .and_then(|table| table.get(DEFAULT_KEY))
    }
}

impl Default for FallbackEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
