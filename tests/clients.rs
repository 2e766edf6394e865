mod common;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use common::StubServer;
use lighthouse_ops::baracoda::{BaracodaClient, BaracodaHttpClient};
use lighthouse_ops::error::LighthouseError;
use lighthouse_ops::labwhere::{LabwhereClient, LabwhereHttpClient};
use lighthouse_ops::plates::create_post_body;
use lighthouse_ops::sequencescape::{
    CLIENT_ID_HEADER, SequencescapeClient, SequencescapeHttpClient,
};

#[test]
fn baracoda_returns_group_barcodes() {
    let server = StubServer::start(
        201,
        r#"{"barcodes_group": {"id": 1, "barcodes": ["TS1-1", "TS1-2", "TS1-3"]}}"#,
    );
    let client = BaracodaHttpClient::new(&server.base_url).unwrap();
    let barcodes = client.new_barcodes("TS1", 3).unwrap();
    assert_eq!(barcodes, vec!["TS1-1", "TS1-2", "TS1-3"]);

    let requests = server.finish();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].url, "/barcodes_group/TS1/new?count=3");
}

#[test]
fn baracoda_non_created_status_is_an_error() {
    let server = StubServer::start(503, r#"{"errors": ["down"]}"#);
    let client = BaracodaHttpClient::new(&server.base_url).unwrap();
    let err = client.new_barcodes("TS1", 3).unwrap_err();
    assert_matches!(err, LighthouseError::BaracodaStatus { status: 503, .. });
    assert!(err.is_external_service());
    assert_eq!(server.finish().len(), 1);
}

#[test]
fn baracoda_unreachable_is_an_error() {
    let client = BaracodaHttpClient::new("http://127.0.0.1:9").unwrap();
    let err = client.new_barcodes("TS1", 1).unwrap_err();
    assert_matches!(err, LighthouseError::BaracodaHttp(_));
}

#[test]
fn sequencescape_passes_status_and_body_through() {
    let server = StubServer::start(422, r#"{"errors": ["barcode already exists"]}"#);
    let client = SequencescapeHttpClient::new(&server.base_url, "secret-key").unwrap();

    let mut sample = common::sample("MCM001", "123", "A01", "Positive", "2020-05-10 07:30:00");
    sample.cog_barcode = Some("TS1-1".to_string());
    let payload = create_post_body("123", &[sample], "purpose", "study").unwrap();
    let response = client.create_plate(&payload).unwrap();
    assert_eq!(response.status, 422);
    assert!(!response.is_success());
    assert_eq!(response.body, json!({"errors": ["barcode already exists"]}));

    let requests = server.finish();
    assert_eq!(requests[0].url, "/api/v2/heron/plates");
    assert_eq!(requests[0].header(CLIENT_ID_HEADER), Some("secret-key"));
    let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(
        sent["data"]["attributes"]["wells"]["A01"]["content"]["supplier_name"],
        "TS1-1"
    );
}

#[test]
fn labwhere_maps_barcodes_to_locations() {
    let server = StubServer::start(
        200,
        r#"[{"barcode": "123", "location_barcode": "lw-box-1"}, {"barcode": "456", "location_barcode": null}]"#,
    );
    let client = LabwhereHttpClient::new(&server.base_url).unwrap();
    let locations = client
        .locations_for(&["123".to_string(), "456".to_string()])
        .unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].location_barcode.as_deref(), Some("lw-box-1"));
    assert_eq!(locations[1].location_barcode, None);

    let requests = server.finish();
    assert_eq!(requests[0].url, "/api/labwares_by_barcode");
    let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(sent, json!({"barcodes": ["123", "456"]}));
}

#[test]
fn labwhere_error_status_is_reported() {
    let server = StubServer::start(500, r#"{"errors": ["boom"]}"#);
    let client = LabwhereHttpClient::new(&server.base_url).unwrap();
    let err = client.locations_for(&["123".to_string()]).unwrap_err();
    assert_matches!(err, LighthouseError::LabwhereStatus { status: 500, .. });
    server.finish();
}

#[test]
fn labwhere_scan_joins_barcodes_with_newlines() {
    let server = StubServer::start(201, r#"{"message": "ok"}"#);
    let client = LabwhereHttpClient::new(&server.base_url).unwrap();
    client
        .record_scan(
            &["plate-1".to_string(), "plate-2".to_string()],
            "lw-box-1",
            "user-swipe",
        )
        .unwrap();

    let requests = server.finish();
    assert_eq!(requests[0].url, "/api/scans");
    let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(
        sent,
        json!({"scan": {
            "user_code": "user-swipe",
            "labware_barcodes": "plate-1\nplate-2",
            "location_barcode": "lw-box-1"
        }})
    );
}
