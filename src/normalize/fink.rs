use serde_json::Value;

use super::{magnitude, opt_count, opt_f64, opt_str, percent};
use crate::astro::jd_to_date;
use crate::types::{BrokerObservation, ClassifierScore};

/// Fink replies with a flat list of alert rows; older proxies wrapped that
/// list in a precomputed {summary, full_data} pair. Both shapes land here.
/// Alert times are Julian Dates.
pub(super) fn normalize(raw: &Value) -> Option<BrokerObservation> {
    if let Some(alerts) = raw.as_array() {
        if alerts.is_empty() {
            return None;
        }
        return summarize_alerts(alerts);
    }
    if raw.get("summary").is_some() {
        return from_summary(
            raw.get("summary")?,
            raw.get("full_data").and_then(Value::as_array),
        );
    }
    None
}

/// Build the observation straight from the alert rows: detection window
/// from the JD extremes, photometry restricted to alerts tagged valid when
/// any are, classifier values scanned across all alerts with the last one
/// winning.
fn summarize_alerts(alerts: &[Value]) -> Option<BrokerObservation> {
    let object_id = alerts.iter().find_map(|alert| opt_str(alert, "i:objectId"))?;

    let mut observation = BrokerObservation {
        object_id: Some(object_id),
        alerts: Some(alerts.len() as u64),
        ..Default::default()
    };

    if let Some(first) = alerts
        .iter()
        .filter_map(|alert| opt_f64(alert, "i:jd"))
        .reduce(f64::min)
    {
        observation.first_detection = jd_to_date(first);
    }

    let latest = alerts.iter().max_by(|a, b| {
        opt_f64(a, "i:jd")
            .unwrap_or(0.0)
            .total_cmp(&opt_f64(b, "i:jd").unwrap_or(0.0))
    })?;
    observation.last_detection = opt_f64(latest, "i:jd").and_then(jd_to_date);
    observation.latest_magnitude = opt_f64(latest, "i:magpsf").map(magnitude);
    observation.latest_magnitude_error = opt_f64(latest, "i:sigmapsf").map(magnitude);
    if let Some(fid) = latest.get("i:fid").and_then(Value::as_i64) {
        observation.latest_filter = Some(filter_name(fid));
    }

    let mut snn_snia = None;
    let mut rf_snia = None;
    for alert in alerts {
        if let Some(value) = opt_str(alert, "d:cdsxmatch") {
            observation.classification = Some(value);
        }
        if let Some(value) = opt_f64(alert, "d:snn_snia_vs_nonia") {
            snn_snia = Some(value);
        }
        if let Some(value) = opt_f64(alert, "d:rf_snia_vs_nonia") {
            rf_snia = Some(value);
        }
    }
    if observation.classification.is_some() {
        observation.classifier = Some("cdsxmatch".to_string());
    }
    if let Some(p) = snn_snia {
        observation
            .classifier_scores
            .push(score("snn_snia_vs_nonia", p));
    }
    if let Some(p) = rf_snia {
        observation
            .classifier_scores
            .push(score("rf_snia_vs_nonia", p));
    }
    if let Some(p) = opt_f64(latest, "d:snn_sn_vs_all") {
        observation
            .classifier_scores
            .push(score("snn_sn_vs_all", p));
    }

    let valid: Vec<f64> = alerts
        .iter()
        .filter(|alert| opt_str(alert, "d:tag").as_deref() == Some("valid"))
        .filter_map(|alert| opt_f64(alert, "i:magpsf"))
        .collect();
    let mags = if valid.is_empty() {
        alerts
            .iter()
            .filter_map(|alert| opt_f64(alert, "i:magpsf"))
            .collect()
    } else {
        valid
    };
    if !mags.is_empty() {
        observation.detections = Some(mags.len() as u64);
        observation.peak_magnitude = mags.iter().copied().reduce(f64::min).map(magnitude);
        observation.faintest_magnitude = mags.iter().copied().reduce(f64::max).map(magnitude);
        observation.mean_magnitude =
            Some(magnitude(mags.iter().sum::<f64>() / mags.len() as f64));
    }

    Some(observation)
}

fn from_summary(summary: &Value, full_data: Option<&Vec<Value>>) -> Option<BrokerObservation> {
    let object_id = opt_str(summary, "objectId")?;

    let mut observation = BrokerObservation {
        object_id: Some(object_id),
        alerts: opt_count(summary, "num_alerts"),
        ..Default::default()
    };

    if let Some(first) = summary.get("first_detection") {
        observation.first_detection = opt_f64(first, "i:jd").and_then(jd_to_date);
    }
    if let Some(latest) = summary.get("latest_detection") {
        observation.last_detection = opt_f64(latest, "i:jd").and_then(jd_to_date);
        observation.latest_magnitude = opt_f64(latest, "i:magpsf").map(magnitude);
        observation.latest_magnitude_error = opt_f64(latest, "i:sigmapsf").map(magnitude);
        if let Some(fid) = latest.get("i:fid").and_then(Value::as_i64) {
            observation.latest_filter = Some(filter_name(fid));
        }
    }

    if let Some(classifications) = summary.get("classifications") {
        observation.classification = opt_str(classifications, "cdsxmatch");
        if observation.classification.is_some() {
            observation.classifier = Some("cdsxmatch".to_string());
        }
        if let Some(p) = opt_f64(classifications, "snn_snia_vs_nonia") {
            observation
                .classifier_scores
                .push(score("snn_snia_vs_nonia", p));
        }
        if let Some(p) = opt_f64(classifications, "rf_snia_vs_nonia") {
            observation
                .classifier_scores
                .push(score("rf_snia_vs_nonia", p));
        }
    }
    if let Some(latest) = full_data.and_then(|alerts| alerts.first()) {
        if let Some(p) = opt_f64(latest, "d:snn_sn_vs_all") {
            observation
                .classifier_scores
                .push(score("snn_sn_vs_all", p));
        }
    }

    if let Some(photometry) = summary.get("photometry_summary") {
        observation.detections = opt_count(photometry, "num_valid_detections");
        observation.peak_magnitude = opt_f64(photometry, "brightest_mag").map(magnitude);
        observation.faintest_magnitude = opt_f64(photometry, "faintest_mag").map(magnitude);
        observation.mean_magnitude = opt_f64(photometry, "mean_mag").map(magnitude);
    }

    Some(observation)
}

fn filter_name(fid: i64) -> String {
    match fid {
        1 => "g",
        2 => "r",
        _ => "i",
    }
    .to_string()
}

fn score(classifier: &str, probability: f64) -> ClassifierScore {
    ClassifierScore {
        classifier: classifier.to_string(),
        probability: percent(probability),
    }
}
