use tracing::{debug, warn};

use crate::error::{MetabrokerError, Result};
use crate::types::CatalogRecord;

/// Column positions of the fields we keep, resolved from the header line.
struct Columns {
    name: Option<usize>,
    ra: Option<usize>,
    declination: Option<usize>,
    object_type: Option<usize>,
    redshift: Option<usize>,
    discovery_date: Option<usize>,
    discovery_mag: Option<usize>,
    discovery_filter: Option<usize>,
    reporting_group: Option<usize>,
    source_group: Option<usize>,
    internal_names: Option<usize>,
    discovery_bibcode: Option<usize>,
    classification_bibcodes: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &[String]) -> Self {
        let find = |name: &str| headers.iter().position(|header| header == name);
        Self {
            name: find("name"),
            ra: find("ra"),
            declination: find("declination"),
            object_type: find("type"),
            redshift: find("redshift"),
            discovery_date: find("discoverydate"),
            discovery_mag: find("discoverymag"),
            discovery_filter: find("filter"),
            reporting_group: find("reporting_group"),
            source_group: find("source_group"),
            internal_names: find("internal_names"),
            discovery_bibcode: find("Discovery_ADS_bibcode"),
            classification_bibcodes: find("Class_ADS_bibcodes"),
        }
    }
}

/// Parse the TNS public-objects export.
///
/// The first non-blank line is a generated-at banner, the second is the
/// header, and every line after that is one object. Rows that carry no name
/// cannot be looked up and are dropped with a warning.
pub fn parse_catalog_csv(content: &str) -> Result<Vec<CatalogRecord>> {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.len() < 2 {
        return Err(MetabrokerError::ParseError(
            "catalog CSV is missing its header line".to_string(),
        ));
    }

    let headers = split_fields(lines[1]);
    let columns = Columns::from_headers(&headers);
    if columns.name.is_none() {
        return Err(MetabrokerError::ParseError(
            "catalog CSV header has no name column".to_string(),
        ));
    }

    let mut records = Vec::with_capacity(lines.len().saturating_sub(2));
    let mut nameless = 0usize;
    for line in &lines[2..] {
        let values = split_fields(line);
        match build_record(&columns, &values) {
            Some(record) => records.push(record),
            None => nameless += 1,
        }
    }
    if nameless > 0 {
        warn!(count = nameless, "dropped catalog rows without a name");
    }
    debug!(count = records.len(), "parsed catalog records");
    Ok(records)
}

fn build_record(columns: &Columns, values: &[String]) -> Option<CatalogRecord> {
    let name = field(values, columns.name)?;
    Some(CatalogRecord {
        name,
        ra: field(values, columns.ra),
        declination: field(values, columns.declination),
        object_type: field(values, columns.object_type),
        redshift: field(values, columns.redshift),
        discovery_date: field(values, columns.discovery_date),
        discovery_mag: field(values, columns.discovery_mag),
        discovery_filter: field(values, columns.discovery_filter),
        reporting_group: field(values, columns.reporting_group),
        source_group: field(values, columns.source_group),
        internal_names: field(values, columns.internal_names),
        discovery_bibcode: field(values, columns.discovery_bibcode),
        classification_bibcodes: field(values, columns.classification_bibcodes),
    })
}

/// An absent column, a short row and an empty value all come out as None.
fn field(values: &[String], index: Option<usize>) -> Option<String> {
    let value = values.get(index?)?;
    if value.is_empty() {
        None
    } else {
        Some(value.clone())
    }
}

/// Quote-aware tokenizer for one CSV line.
///
/// Doubled quotes inside a quoted field collapse to a literal quote and
/// commas inside quotes do not split. Values are trimmed.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_csv() -> String {
        [
            "tns_public_objects.csv generated 2026-08-25 00:00:00",
            "\"objid\",\"name\",\"ra\",\"declination\",\"type\",\"redshift\",\"discoverydate\",\"discoverymag\",\"filter\",\"reporting_group\",\"source_group\",\"internal_names\",\"Discovery_ADS_bibcode\",\"Class_ADS_bibcodes\"",
            "\"101\",\"2024abc\",\"14:03:05.810\",\"+54:16:25.39\",\"SN Ia\",\"0.0008\",\"2024-01-02 03:04:05\",\"17.2\",\"g\",\"ZTF\",\"ZTF\",\"ZTF24aabbccd, ATLAS24xyz\",\"2024ApJ...\",\"\"",
            "\"102\",\"2024def\",\"10.5\",\"-3.2\",,,,\"18.0\",,,,,,",
        ]
        .join("\n")
    }

    #[test]
    fn header_is_taken_from_line_two() {
        let records = parse_catalog_csv(&sample_csv()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "2024abc");
        assert_eq!(records[0].object_type.as_deref(), Some("SN Ia"));
        assert_eq!(
            records[0].internal_names.as_deref(),
            Some("ZTF24aabbccd, ATLAS24xyz")
        );
    }

    #[test]
    fn empty_and_missing_values_become_none() {
        let records = parse_catalog_csv(&sample_csv()).unwrap();
        let second = &records[1];
        assert_eq!(second.name, "2024def");
        assert_eq!(second.discovery_mag.as_deref(), Some("18.0"));
        assert!(second.object_type.is_none());
        assert!(second.redshift.is_none());
        assert!(second.internal_names.is_none());
        // Quoted-but-empty is also null.
        assert!(records[0].classification_bibcodes.is_none());
    }

    #[test]
    fn doubled_quotes_collapse_to_literal_quotes() {
        let fields = split_fields("\"2024abc\",\"he said \"\"hi\"\"\",plain");
        assert_eq!(fields, vec!["2024abc", "he said \"hi\"", "plain"]);
    }

    #[test]
    fn commas_inside_quotes_do_not_split() {
        let fields = split_fields("\"a, b\",c");
        assert_eq!(fields, vec!["a, b", "c"]);
    }

    #[test]
    fn rows_without_a_name_are_dropped() {
        let csv = format!("{}\n\"103\",,,,,,,,,,,,,", sample_csv());
        let records = parse_catalog_csv(&csv).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn record_count_matches_data_lines() {
        let records = parse_catalog_csv(&sample_csv()).unwrap();
        // Two data lines after the banner and header, nothing dropped.
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn too_short_input_is_an_error() {
        assert!(parse_catalog_csv("just a banner\n").is_err());
        assert!(parse_catalog_csv("").is_err());
    }

    #[test]
    fn blank_lines_are_ignored_before_indexing() {
        let csv = sample_csv().replace(
            "tns_public_objects.csv generated 2026-08-25 00:00:00\n",
            "tns_public_objects.csv generated 2026-08-25 00:00:00\n\n\n",
        );
        let records = parse_catalog_csv(&csv).unwrap();
        assert_eq!(records.len(), 2);
    }
}
