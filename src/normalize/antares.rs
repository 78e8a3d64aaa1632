use serde_json::Value;

use super::{coordinate, magnitude, opt_count, opt_f64, opt_str, span_days};
use crate::types::{BrokerObservation, Coordinates};

/// One ANTARES locus, or a list of loci from a cone search. Alert statistics
/// live under the locus `properties` map; observation times are MJDs so a
/// plain difference is already a day span.
pub(super) fn normalize(raw: &Value) -> Option<BrokerObservation> {
    let object = match raw.as_array() {
        Some(list) => list.first()?,
        None => raw,
    };
    let object_id = opt_str(object, "locus_id")?;

    let mut observation = BrokerObservation {
        object_id: Some(object_id),
        ..Default::default()
    };

    if let (Some(ra), Some(dec)) = (opt_f64(object, "ra"), opt_f64(object, "dec")) {
        observation.position = Some(Coordinates {
            ra: coordinate(ra),
            dec: coordinate(dec),
        });
    }

    if let Some(props) = object.get("properties") {
        observation.alerts = opt_count(props, "num_alerts");
        observation.peak_magnitude = opt_f64(props, "brightest_alert_magnitude").map(magnitude);
        observation.latest_magnitude = opt_f64(props, "newest_alert_magnitude").map(magnitude);
        observation.ztf_object_id = opt_str(props, "ztf_object_id");
        if let (Some(oldest), Some(newest)) = (
            opt_f64(props, "oldest_alert_observation_time"),
            opt_f64(props, "newest_alert_observation_time"),
        ) {
            observation.activity_days = Some(span_days(newest - oldest));
        }
    }

    if let Some(tags) = object.get("tags").and_then(Value::as_array) {
        observation.tags = tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    Some(observation)
}
