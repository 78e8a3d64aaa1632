pub mod alerce;
pub mod antares;
pub mod fink;
pub mod lasair;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::astro::round_to;
use crate::observability::metrics;
use crate::types::{BrokerId, BrokerObservation, RawBrokerResponse};

/// Turn one broker's raw response into the shared observation shape.
///
/// Returns None when the response is empty or shaped as "no match", so
/// callers can tell absence apart from failure. Fields a broker does not
/// supply stay absent.
pub fn normalize(broker: BrokerId, raw: &RawBrokerResponse) -> Option<BrokerObservation> {
    let observation = match broker {
        BrokerId::Alerce => alerce::normalize(raw),
        BrokerId::Antares => antares::normalize(raw),
        BrokerId::Fink => fink::normalize(raw),
        BrokerId::Lasair => lasair::normalize(raw),
    };
    match &observation {
        Some(obs) => {
            metrics::normalize::observation(broker.as_str());
            debug!(broker = %broker, object_id = ?obs.object_id, "normalized broker response");
        }
        None => metrics::normalize::no_match(broker.as_str()),
    }
    observation
}

// Display policy shared by every normalizer: probabilities as percent with
// one decimal, magnitudes with two, coordinates with six, day spans with
// one, colors with three.

pub(crate) fn percent(value: f64) -> f64 {
    round_to(value * 100.0, 1)
}

pub(crate) fn magnitude(value: f64) -> f64 {
    round_to(value, 2)
}

pub(crate) fn coordinate(value: f64) -> f64 {
    round_to(value, 6)
}

pub(crate) fn span_days(value: f64) -> f64 {
    round_to(value, 1)
}

pub(crate) fn color(value: f64) -> f64 {
    round_to(value, 3)
}

pub(crate) fn opt_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

pub(crate) fn opt_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub(crate) fn opt_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Counts sometimes arrive as floats; accept both.
pub(crate) fn opt_count(value: &Value, key: &str) -> Option<u64> {
    let v = value.get(key)?;
    v.as_u64()
        .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

static ANCHOR_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<a[^>]*>(.*?)</a>").unwrap());
static RAW_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip anchor tags keeping their inner text, drop raw URLs and collapse
/// whitespace. Sherlock descriptions embed links that are useless as text.
pub(crate) fn strip_markup(text: &str) -> String {
    let text = ANCHOR_TAG_RE.replace_all(text, "$1");
    let text = RAW_URL_RE.replace_all(&text, "");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

pub(crate) fn sanitized_str(value: &Value, key: &str) -> Option<String> {
    opt_str(value, key)
        .map(|s| strip_markup(&s))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn markup_stripping_keeps_anchor_text() {
        let cleaned = strip_markup(
            "the galaxy <a href=\"https://example.org/ngc\">NGC 5457</a> at separation 2\"",
        );
        assert_eq!(cleaned, "the galaxy NGC 5457 at separation 2\"");
    }

    #[test]
    fn markup_stripping_drops_raw_urls_and_collapses_whitespace() {
        let cleaned = strip_markup("see   https://example.org/page for\n details");
        assert_eq!(cleaned, "see for details");
    }

    #[test]
    fn probabilities_become_percent_with_one_decimal() {
        assert_eq!(percent(0.85), 85.0);
        assert_eq!(percent(0.8567), 85.7);
        assert_eq!(percent(1.0), 100.0);
    }

    #[test]
    fn counts_accept_integer_and_float_encodings() {
        let value = json!({"a": 12, "b": 12.0, "c": "12"});
        assert_eq!(opt_count(&value, "a"), Some(12));
        assert_eq!(opt_count(&value, "b"), Some(12));
        assert_eq!(opt_count(&value, "c"), None);
    }

    #[test]
    fn empty_strings_read_as_absent() {
        let value = json!({"s": "", "t": "  ", "u": "x"});
        assert_eq!(opt_str(&value, "s"), None);
        assert_eq!(opt_str(&value, "t"), None);
        assert_eq!(opt_str(&value, "u"), Some("x".to_string()));
    }
}
