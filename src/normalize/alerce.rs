use serde_json::Value;

use super::{color, coordinate, opt_bool, opt_count, opt_f64, opt_str, percent, span_days};
use crate::astro::mjd_to_date;
use crate::types::{BrokerObservation, Coordinates};

/// ALeRCE object summaries arrive either as a bare list, as a paginated
/// {total, items} page, or with that page nested inside the list when the
/// response has been proxied. Times are Modified Julian Dates.
pub(super) fn normalize(raw: &Value) -> Option<BrokerObservation> {
    let object = select_object(raw)?;
    let object_id = opt_str(object, "oid")?;

    let position = match (opt_f64(object, "meanra"), opt_f64(object, "meandec")) {
        (Some(ra), Some(dec)) => Some(Coordinates {
            ra: coordinate(ra),
            dec: coordinate(dec),
        }),
        _ => None,
    };

    Some(BrokerObservation {
        object_id: Some(object_id),
        position,
        detections: opt_count(object, "ndet"),
        historical_detections: opt_count(object, "ndethist"),
        first_detection: opt_f64(object, "firstmjd").and_then(mjd_to_date),
        last_detection: opt_f64(object, "lastmjd").and_then(mjd_to_date),
        activity_days: opt_f64(object, "deltajd").map(span_days),
        mean_color_gr: opt_f64(object, "g_r_mean").map(color),
        max_color_gr: opt_f64(object, "g_r_max").map(color),
        stellar: opt_bool(object, "stellar"),
        classifier: opt_str(object, "classifier"),
        classification: opt_str(object, "class"),
        classification_probability: opt_f64(object, "probability").map(percent),
        ..Default::default()
    })
}

fn select_object(raw: &Value) -> Option<&Value> {
    if let Some(list) = raw.as_array() {
        return unwrap_page(list.first()?);
    }
    if raw.is_object() {
        return unwrap_page(raw);
    }
    None
}

fn unwrap_page(value: &Value) -> Option<&Value> {
    if let Some(items) = value.get("items").and_then(Value::as_array) {
        return items.first();
    }
    Some(value)
}
