use serde_json::Value;

use super::{magnitude, opt_f64, opt_str, sanitized_str};
use crate::astro::jd_to_date;
use crate::types::{BrokerObservation, HostGalaxy};

/// One Lasair object document, or a detailed-objects list from a cone
/// search. Candidate rows are newest-first and carry Julian Dates; host
/// context comes from the first sherlock_classifications row.
pub(super) fn normalize(raw: &Value) -> Option<BrokerObservation> {
    let object = match raw.as_array() {
        Some(list) => list.first()?,
        None => raw,
    };
    let object_id = opt_str(object, "objectId")?;

    let mut observation = BrokerObservation {
        object_id: Some(object_id.clone()),
        ztf_object_id: Some(object_id),
        ..Default::default()
    };

    if let Some(candidates) = object.get("candidates").and_then(Value::as_array) {
        if !candidates.is_empty() {
            observation.detections = Some(candidates.len() as u64);
            let latest = &candidates[0];
            observation.last_detection = opt_f64(latest, "jd").and_then(jd_to_date);
            observation.latest_magnitude = opt_f64(latest, "magpsf").map(magnitude);
            observation.latest_magnitude_error = opt_f64(latest, "sigmapsf").map(magnitude);
        }
    }

    if let Some(row) = object
        .get("sherlock_classifications")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    {
        observation.classification = opt_str(row, "classification");
        if observation.classification.is_some() {
            observation.classifier = Some("Sherlock".to_string());
        }
        let host = host_from_row(row);
        if !host.is_empty() {
            observation.host = Some(host);
        }
    }

    Some(observation)
}

/// Field names follow the sherlock_classifications table columns; the
/// alternate spellings some older payloads use are accepted alongside them.
fn host_from_row(row: &Value) -> HostGalaxy {
    HostGalaxy {
        association_type: opt_str(row, "association_type"),
        catalogue: opt_str(row, "catalogue_table_name"),
        catalogue_object_id: opt_str(row, "catalogue_object_id").or_else(|| {
            row.get("catalogue_object_id")
                .and_then(Value::as_i64)
                .map(|id| id.to_string())
        }),
        catalogue_object_type: opt_str(row, "catalogue_object_type"),
        separation_arcsec: opt_f64(row, "separationArcsec").or_else(|| opt_f64(row, "separation")),
        physical_separation_kpc: opt_f64(row, "physical_separation_kpc"),
        distance_mpc: opt_f64(row, "direct_distance").or_else(|| opt_f64(row, "distance")),
        redshift: opt_f64(row, "z"),
        photo_z: opt_f64(row, "photoZ"),
        magnitude: opt_f64(row, "Mag").map(magnitude),
        magnitude_filter: opt_str(row, "MagFilter"),
        description: sanitized_str(row, "description")
            .or_else(|| sanitized_str(row, "context_description")),
        summary: sanitized_str(row, "summary"),
    }
}
