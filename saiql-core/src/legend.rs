//! Symbol legend: families of SAIQL symbols and their SQL meanings
//!
//! The legend is the lexer's dictionary. It maps each symbol (`*3`, `*COUNT`,
//! `oQ`, `$1`, ...) to its family, human-readable semantic, SQL hint, and
//! declared type. Loaded once at lexer construction and immutable afterwards.
//!
//! On disk the legend is a JSON document rooted at `SAIQL_LEGEND`:
//!
//! ```json
//! {
//!   "SAIQL_LEGEND": {
//!     "families": {
//!       "ASTERISK_FAMILY": {
//!         "symbols": {
//!           "*3": { "semantic": "select rows", "sql_hint": "SELECT", "type": "operation" }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Flattened legend entry for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Family the symbol belongs to (e.g. `ASTERISK_FAMILY`).
    pub family: String,
    /// Human-readable meaning.
    pub semantic: String,
    /// SQL equivalent hint (e.g. `SELECT`, `COUNT`).
    pub sql_hint: String,
    /// Declared type from the legend file.
    pub symbol_type: String,
}

// Wire format of the legend file.

#[derive(Debug, Deserialize)]
struct LegendFile {
    #[serde(rename = "SAIQL_LEGEND")]
    legend: LegendDoc,
}

#[derive(Debug, Deserialize)]
struct LegendDoc {
    #[serde(default)]
    families: HashMap<String, FamilyDoc>,
}

#[derive(Debug, Deserialize)]
struct FamilyDoc {
    #[serde(default)]
    symbols: HashMap<String, SymbolDoc>,
}

#[derive(Debug, Deserialize)]
struct SymbolDoc {
    semantic: String,
    sql_hint: String,
    #[serde(rename = "type")]
    symbol_type: String,
}

/// Loaded symbol dictionary with a flattened lookup cache.
#[derive(Debug, Clone, Default)]
pub struct Legend {
    symbols: HashMap<String, SymbolInfo>,
    max_symbol_len: usize,
}

impl Legend {
    /// Empty legend. A lexer built on this recognizes no legend symbols.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in core legend: the asterisk, aggregate, circle, at,
    /// dollar, exclamation, and hash families every SAIQL deployment ships.
    pub fn core() -> Self {
        let mut legend = Self::default();
        let entries: &[(&str, &str, &str, &str, &str)] = &[
            // symbol, family, semantic, sql_hint, type
            ("*3", "ASTERISK_FAMILY", "select rows", "SELECT", "operation"),
            ("*4", "ASTERISK_FAMILY", "update rows", "UPDATE", "operation"),
            ("*COUNT", "AGGREGATES", "count rows", "COUNT", "aggregate"),
            ("*SUM", "AGGREGATES", "sum values", "SUM", "aggregate"),
            ("*AVG", "AGGREGATES", "average values", "AVG", "aggregate"),
            ("*MIN", "AGGREGATES", "minimum value", "MIN", "aggregate"),
            ("*MAX", "AGGREGATES", "maximum value", "MAX", "aggregate"),
            ("o", "CIRCLE_FAMILY", "raw output", "RESULT", "output"),
            ("oQ", "CIRCLE_FAMILY", "query output", "RESULT_SET", "output"),
            ("oo", "CIRCLE_FAMILY", "paired output", "RESULT_PAIR", "output"),
            ("ooo", "CIRCLE_FAMILY", "grouped output", "RESULT_GROUP", "output"),
            ("+", "PLUS_FAMILY", "combine targets", "+", "operator"),
            ("@1", "AT_FAMILY", "create schema object", "CREATE", "schema"),
            ("@2", "AT_FAMILY", "drop schema object", "DROP", "schema"),
            ("$1", "DOLLAR_FAMILY", "begin transaction", "BEGIN", "transaction"),
            ("$2", "DOLLAR_FAMILY", "commit transaction", "COMMIT", "transaction"),
            ("$3", "DOLLAR_FAMILY", "rollback transaction", "ROLLBACK", "transaction"),
            ("!1", "EXCLAMATION_FAMILY", "primary key constraint", "PRIMARY KEY", "constraint"),
            ("#1", "HASH_FAMILY", "create index", "INDEX", "index"),
        ];
        for (symbol, family, semantic, sql_hint, symbol_type) in entries {
            legend.insert(
                symbol,
                SymbolInfo {
                    family: (*family).to_string(),
                    semantic: (*semantic).to_string(),
                    sql_hint: (*sql_hint).to_string(),
                    symbol_type: (*symbol_type).to_string(),
                },
            );
        }
        legend
    }

    /// Parse a legend from its JSON document form.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::parse(json, "<inline legend>")
    }

    /// Load a legend from a JSON file on disk.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    fn parse(json: &str, source: &str) -> Result<Self, ConfigError> {
        let file: LegendFile = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

        let mut legend = Self::default();
        for (family_name, family) in file.legend.families {
            for (symbol, doc) in family.symbols {
                legend.insert(
                    &symbol,
                    SymbolInfo {
                        family: family_name.clone(),
                        semantic: doc.semantic,
                        sql_hint: doc.sql_hint,
                        symbol_type: doc.symbol_type,
                    },
                );
            }
        }
        Ok(legend)
    }

    fn insert(&mut self, symbol: &str, info: SymbolInfo) {
        self.max_symbol_len = self.max_symbol_len.max(symbol.len());
        self.symbols.insert(symbol.to_string(), info);
    }

    /// Exact lookup of a symbol.
    pub fn lookup(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.symbols.get(symbol)
    }

    /// Longest legend symbol that prefixes `text`, longest candidate first.
    pub fn longest_match<'a>(&self, text: &'a str) -> Option<(&'a str, &SymbolInfo)> {
        let upper = self.max_symbol_len.min(text.len());
        for len in (1..=upper).rev() {
            if !text.is_char_boundary(len) {
                continue;
            }
            let candidate = &text[..len];
            if let Some(info) = self.symbols.get(candidate) {
                return Some((candidate, info));
            }
        }
        None
    }

    /// Length of the longest symbol, an upper bound for longest-match scans.
    pub fn max_symbol_len(&self) -> usize {
        self.max_symbol_len
    }

    /// Number of symbols in the legend.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_legend_has_expected_symbols() {
        let legend = Legend::core();
        assert_eq!(legend.lookup("*3").map(|s| s.sql_hint.as_str()), Some("SELECT"));
        assert_eq!(legend.lookup("*COUNT").map(|s| s.sql_hint.as_str()), Some("COUNT"));
        assert_eq!(legend.lookup("$1").map(|s| s.sql_hint.as_str()), Some("BEGIN"));
        assert!(legend.lookup("*99").is_none());
    }

    #[test]
    fn test_longest_match_prefers_longer_symbols() {
        let legend = Legend::core();
        // "oQ" must win over "o" when both prefix the input.
        let (matched, info) = legend.longest_match("oQ rest").expect("oQ should match");
        assert_eq!(matched, "oQ");
        assert_eq!(info.family, "CIRCLE_FAMILY");

        let (matched, _) = legend.longest_match("o then").expect("o should match");
        assert_eq!(matched, "o");
    }

    #[test]
    fn test_from_json_str_parses_document_format() {
        let json = r#"{
            "SAIQL_LEGEND": {
                "families": {
                    "ASTERISK_FAMILY": {
                        "symbols": {
                            "*7": { "semantic": "upsert rows", "sql_hint": "UPSERT", "type": "operation" }
                        }
                    }
                }
            }
        }"#;
        let legend = Legend::from_json_str(json).expect("valid legend should parse");
        assert_eq!(legend.len(), 1);
        let info = legend.lookup("*7").expect("symbol should be present");
        assert_eq!(info.sql_hint, "UPSERT");
        assert_eq!(info.symbol_type, "operation");
    }

    #[test]
    fn test_malformed_legend_is_a_parse_error() {
        let err = Legend::from_json_str("{ not json }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
