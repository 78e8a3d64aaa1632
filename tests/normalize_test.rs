use chrono::NaiveDate;
use metabroker::normalize::normalize;
use metabroker::types::BrokerId;
use serde_json::json;

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

#[test]
fn test_alerce_paginated_page() {
    let raw = json!({
        "total": 1,
        "items": [{
            "oid": "ZTF21abcdefg",
            "meanra": 210.910674321,
            "meandec": 54.273702987,
            "ndet": 42,
            "ndethist": 55,
            "firstmjd": 59000.0,
            "lastmjd": 59025.13,
            "deltajd": 25.13,
            "g_r_mean": 0.4567,
            "g_r_max": 0.9123,
            "stellar": false,
            "classifier": "lc_classifier",
            "class": "SNIa",
            "probability": 0.92
        }]
    });

    let obs = normalize(BrokerId::Alerce, &raw).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ZTF21abcdefg"));
    let position = obs.position.unwrap();
    assert_eq!(position.ra, 210.910674);
    assert_eq!(position.dec, 54.273703);
    assert_eq!(obs.detections, Some(42));
    assert_eq!(obs.historical_detections, Some(55));
    assert_eq!(obs.first_detection, Some(day(2020, 5, 31)));
    assert_eq!(obs.activity_days, Some(25.1));
    assert_eq!(obs.mean_color_gr, Some(0.457));
    assert_eq!(obs.max_color_gr, Some(0.912));
    assert_eq!(obs.stellar, Some(false));
    assert_eq!(obs.classification.as_deref(), Some("SNIa"));
    assert_eq!(obs.classifier.as_deref(), Some("lc_classifier"));
    // Probabilities are reported as percent with one decimal.
    assert_eq!(obs.classification_probability, Some(92.0));
}

#[test]
fn test_alerce_bare_list_and_nested_page() {
    let object = json!({"oid": "ZTF22aaaaaaa", "ndet": 3});

    let obs = normalize(BrokerId::Alerce, &json!([object])).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ZTF22aaaaaaa"));
    assert_eq!(obs.detections, Some(3));
    assert!(obs.position.is_none());

    // A paginated page nested inside a list unwraps the same way.
    let obs = normalize(BrokerId::Alerce, &json!([{"total": 1, "items": [object]}])).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ZTF22aaaaaaa"));
}

#[test]
fn test_antares_locus_properties() {
    let raw = json!({
        "locus_id": "ANT2021abc",
        "ra": 210.91067,
        "dec": -3.5,
        "properties": {
            "num_alerts": 17,
            "brightest_alert_magnitude": 16.234,
            "newest_alert_magnitude": 18.917,
            "ztf_object_id": "ZTF21abcdefg",
            "oldest_alert_observation_time": 59000.0,
            "newest_alert_observation_time": 59012.4
        },
        "tags": ["extragalactic", "high_snr"]
    });

    let obs = normalize(BrokerId::Antares, &raw).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ANT2021abc"));
    assert_eq!(obs.ztf_object_id.as_deref(), Some("ZTF21abcdefg"));
    assert_eq!(obs.alerts, Some(17));
    assert_eq!(obs.peak_magnitude, Some(16.23));
    assert_eq!(obs.latest_magnitude, Some(18.92));
    assert_eq!(obs.activity_days, Some(12.4));
    assert_eq!(obs.tags, vec!["extragalactic", "high_snr"]);
}

#[test]
fn test_antares_cone_list_takes_first_locus() {
    let raw = json!([
        {"locus_id": "ANT2021aaa"},
        {"locus_id": "ANT2021bbb"}
    ]);
    let obs = normalize(BrokerId::Antares, &raw).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ANT2021aaa"));
}

#[test]
fn test_fink_alert_rows() {
    let raw = json!([
        {
            "i:objectId": "ZTF21abcdefg",
            "i:jd": 2459000.5,
            "i:magpsf": 17.0,
            "i:sigmapsf": 0.05,
            "i:fid": 1,
            "d:tag": "valid",
            "d:cdsxmatch": "Unknown"
        },
        {
            "i:objectId": "ZTF21abcdefg",
            "i:jd": 2459005.5,
            "i:magpsf": 18.5,
            "i:sigmapsf": 0.11,
            "i:fid": 1,
            "d:tag": "valid",
            "d:cdsxmatch": "SN",
            "d:snn_snia_vs_nonia": 0.873
        },
        {
            "i:objectId": "ZTF21abcdefg",
            "i:jd": 2459010.5,
            "i:magpsf": 16.0,
            "i:sigmapsf": 0.08,
            "i:fid": 2,
            "d:tag": "badquality",
            "d:snn_sn_vs_all": 0.65
        }
    ]);

    let obs = normalize(BrokerId::Fink, &raw).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ZTF21abcdefg"));
    assert_eq!(obs.alerts, Some(3));
    assert_eq!(obs.first_detection, Some(day(2020, 5, 31)));
    assert_eq!(obs.last_detection, Some(day(2020, 6, 10)));

    // The newest alert supplies the latest photometry even when tagged bad.
    assert_eq!(obs.latest_magnitude, Some(16.0));
    assert_eq!(obs.latest_magnitude_error, Some(0.08));
    assert_eq!(obs.latest_filter.as_deref(), Some("r"));

    // Statistics are restricted to alerts tagged valid.
    assert_eq!(obs.detections, Some(2));
    assert_eq!(obs.peak_magnitude, Some(17.0));
    assert_eq!(obs.faintest_magnitude, Some(18.5));
    assert_eq!(obs.mean_magnitude, Some(17.75));

    // Last alert carrying a crossmatch wins.
    assert_eq!(obs.classification.as_deref(), Some("SN"));
    assert_eq!(obs.classifier.as_deref(), Some("cdsxmatch"));
    let snn = obs
        .classifier_scores
        .iter()
        .find(|score| score.classifier == "snn_snia_vs_nonia")
        .unwrap();
    assert_eq!(snn.probability, 87.3);
    let sn_vs_all = obs
        .classifier_scores
        .iter()
        .find(|score| score.classifier == "snn_sn_vs_all")
        .unwrap();
    assert_eq!(sn_vs_all.probability, 65.0);
}

#[test]
fn test_fink_summary_shape() {
    let raw = json!({
        "summary": {
            "objectId": "ZTF21abcdefg",
            "num_alerts": 12,
            "first_detection": {"i:jd": 2459000.5},
            "latest_detection": {"i:jd": 2459010.5, "i:magpsf": 17.31, "i:fid": 2},
            "classifications": {"cdsxmatch": "SN", "snn_snia_vs_nonia": 0.9},
            "photometry_summary": {
                "num_valid_detections": 9,
                "brightest_mag": 16.8,
                "faintest_mag": 19.2,
                "mean_mag": 17.9
            }
        },
        "full_data": []
    });

    let obs = normalize(BrokerId::Fink, &raw).unwrap();
    assert_eq!(obs.alerts, Some(12));
    assert_eq!(obs.detections, Some(9));
    assert_eq!(obs.latest_magnitude, Some(17.31));
    assert_eq!(obs.latest_filter.as_deref(), Some("r"));
    assert_eq!(obs.classification.as_deref(), Some("SN"));
    assert_eq!(obs.classifier_scores[0].probability, 90.0);
}

#[test]
fn test_lasair_object_with_sherlock_host() {
    let raw = json!({
        "objectId": "ZTF21abcdefg",
        "candidates": [
            {"jd": 2459010.5, "magpsf": 17.456, "sigmapsf": 0.042},
            {"jd": 2459000.5, "magpsf": 18.1, "sigmapsf": 0.09}
        ],
        "sherlock_classifications": [{
            "classification": "SN",
            "association_type": "SN",
            "catalogue_table_name": "NED/SDSS",
            "catalogue_object_id": "NGC 5457",
            "catalogue_object_type": "galaxy",
            "separationArcsec": 1.4,
            "direct_distance": 6.4,
            "z": 0.000804,
            "Mag": 8.31,
            "MagFilter": "g",
            "description": "matched against the galaxy <a href=\"https://example.org/ngc5457\">NGC 5457</a>"
        }]
    });

    let obs = normalize(BrokerId::Lasair, &raw).unwrap();
    assert_eq!(obs.object_id.as_deref(), Some("ZTF21abcdefg"));
    assert_eq!(obs.ztf_object_id.as_deref(), Some("ZTF21abcdefg"));
    assert_eq!(obs.detections, Some(2));
    // Candidate rows are newest-first.
    assert_eq!(obs.last_detection, Some(day(2020, 6, 10)));
    assert_eq!(obs.latest_magnitude, Some(17.46));
    assert_eq!(obs.classification.as_deref(), Some("SN"));
    assert_eq!(obs.classifier.as_deref(), Some("Sherlock"));

    let host = obs.host.unwrap();
    assert_eq!(host.catalogue_object_id.as_deref(), Some("NGC 5457"));
    assert_eq!(host.separation_arcsec, Some(1.4));
    assert_eq!(host.redshift, Some(0.000804));
    // Markup in descriptions is stripped down to its text.
    assert_eq!(
        host.description.as_deref(),
        Some("matched against the galaxy NGC 5457")
    );
}

#[test]
fn test_lasair_without_sherlock_rows() {
    let raw = json!({
        "objectId": "ZTF22bbbbbbb",
        "candidates": [{"jd": 2459000.5, "magpsf": 19.0}],
        "sherlock_classifications": []
    });
    let obs = normalize(BrokerId::Lasair, &raw).unwrap();
    assert!(obs.classification.is_none());
    assert!(obs.host.is_none());
}

#[test]
fn test_empty_responses_are_no_match() {
    for broker in BrokerId::ALL {
        assert!(normalize(broker, &json!([])).is_none());
        assert!(normalize(broker, &json!(null)).is_none());
    }
    // Responses without the broker's identifier field cannot be used.
    assert!(normalize(BrokerId::Alerce, &json!({"ndet": 5})).is_none());
    assert!(normalize(BrokerId::Antares, &json!({"ra": 1.0})).is_none());
    assert!(normalize(BrokerId::Lasair, &json!({"candidates": []})).is_none());
}
