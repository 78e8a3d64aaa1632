use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{fallback, CatalogCache};
use crate::error::{MetabrokerError, Result};
use crate::observability::metrics;
use crate::types::CatalogRecord;

/// Resolves user-entered designations against the catalog cache.
pub struct TransientLookup {
    cache: Arc<CatalogCache>,
}

impl TransientLookup {
    pub fn new(cache: Arc<CatalogCache>) -> Self {
        Self { cache }
    }

    /// Find one catalog record for a user-entered name.
    ///
    /// Matches the IAU name and the survey alias list, then falls back to
    /// the historical table. Returns Ok(None) when a loaded catalog has no
    /// match; with no catalog at all the historical table is still
    /// consulted before NoDataAvailable propagates.
    pub async fn resolve(&self, name: &str) -> Result<Option<CatalogRecord>> {
        let needle = normalize_name(name);
        if needle.is_empty() {
            return Ok(None);
        }
        match self.cache.get_all().await {
            Ok(records) => {
                if let Some(record) = resolve_in(&records, name) {
                    metrics::lookup::hit();
                    debug!(name, resolved = %record.name, "resolved against catalog");
                    return Ok(Some(record.clone()));
                }
                if let Some(record) = fallback::lookup_historical(&needle) {
                    metrics::lookup::fallback_hit();
                    info!(name, "resolved from historical table");
                    return Ok(Some(record.clone()));
                }
                metrics::lookup::miss();
                Ok(None)
            }
            Err(MetabrokerError::NoDataAvailable(reason)) => {
                if let Some(record) = fallback::lookup_historical(&needle) {
                    metrics::lookup::fallback_hit();
                    info!(name, "resolved from historical table without a catalog");
                    return Ok(Some(record.clone()));
                }
                Err(MetabrokerError::NoDataAvailable(reason))
            }
            Err(e) => Err(e),
        }
    }
}

/// Lowercase and strip a leading "SN" survey prefix, with or without
/// whitespace after it.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.strip_prefix("sn") {
        Some(rest) => rest.trim_start().to_string(),
        None => lowered,
    }
}

/// First record whose normalized name equals the needle, or whose alias
/// list contains it. First match wins so resolution is deterministic.
pub fn resolve_in<'a>(records: &'a [CatalogRecord], name: &str) -> Option<&'a CatalogRecord> {
    let needle = normalize_name(name);
    if needle.is_empty() {
        return None;
    }
    records.iter().find(|record| {
        if normalize_name(&record.name) == needle {
            return true;
        }
        record
            .internal_names
            .as_deref()
            .map_or(false, |aliases| aliases.to_lowercase().contains(&needle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<CatalogRecord> {
        fallback::offline_catalog()
    }

    #[test]
    fn normalization_strips_survey_prefix() {
        assert_eq!(normalize_name("SN 2011fe"), "2011fe");
        assert_eq!(normalize_name("sn2011fe"), "2011fe");
        assert_eq!(normalize_name("  2011FE "), "2011fe");
        assert_eq!(normalize_name("AT2024abc"), "at2024abc");
    }

    #[test]
    fn resolves_by_iau_name() {
        let records = records();
        let hit = resolve_in(&records, "1987A").unwrap();
        assert_eq!(hit.name, "1987A");
        let hit = resolve_in(&records, "sn 1993j").unwrap();
        assert_eq!(hit.name, "1993J");
    }

    #[test]
    fn resolves_by_survey_alias() {
        let records = records();
        let hit = resolve_in(&records, "PTF11kly").unwrap();
        assert_eq!(hit.name, "2011fe");
    }

    #[test]
    fn first_match_wins_on_duplicate_aliases() {
        let mut records = records();
        let mut shadow = records[0].clone();
        shadow.name = "2099zz".to_string();
        shadow.internal_names = Some("PTF11kly".to_string());
        records.insert(0, shadow);
        let hit = resolve_in(&records, "ptf11kly").unwrap();
        assert_eq!(hit.name, "2099zz");
    }

    #[test]
    fn empty_input_matches_nothing() {
        let records = records();
        assert!(resolve_in(&records, "").is_none());
        assert!(resolve_in(&records, "   ").is_none());
        assert!(resolve_in(&records, "SN").is_none());
    }

    #[test]
    fn unknown_names_miss() {
        let records = records();
        assert!(resolve_in(&records, "2031zzz").is_none());
    }
}
