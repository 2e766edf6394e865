#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use rusqlite::{Connection, params};
use tempfile::TempDir;
use tiny_http::{Header, Response, Server, StatusCode};

use lighthouse_ops::config::WarehouseSettings;
use lighthouse_ops::domain::{Centre, Sample};
use lighthouse_ops::store::SqliteSampleStore;

pub fn utf8(temp: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap()
}

pub fn temp_store(temp: &TempDir) -> SqliteSampleStore {
    SqliteSampleStore::open(&utf8(temp, "lighthouse.sqlite")).unwrap()
}

pub fn sample(root: &str, plate: &str, coordinate: &str, result: &str, tested: &str) -> Sample {
    Sample {
        root_sample_id: root.to_string(),
        source: Some("Test Centre".to_string()),
        plate_barcode: plate.to_string(),
        coordinate: Some(coordinate.to_string()),
        result: Some(result.to_string()),
        date_tested: Some(tested.to_string()),
        lab_id: Some("TC".to_string()),
        cog_barcode: None,
        row_id: None,
    }
}

pub fn test_centre() -> Centre {
    Centre {
        name: "test centre".to_string(),
        prefix: "TS1".to_string(),
    }
}

/// One sample known to both warehouses. `cherrypicked` adds the
/// cherrypick_layout_set event for it.
pub struct WarehouseRow<'a> {
    pub root_sample_id: &'a str,
    pub plate_barcode: &'a str,
    pub phenotype: &'a str,
    pub coordinate: &'a str,
    pub cherrypicked: bool,
}

pub fn warehouse_settings(
    temp: &TempDir,
    rows: &[WarehouseRow<'_>],
    chunk_size: usize,
) -> WarehouseSettings {
    let ml_wh_db = utf8(temp, "mlwarehouse.sqlite");
    let events_wh_db = utf8(temp, "events.sqlite");

    let ml = Connection::open(ml_wh_db.as_std_path()).unwrap();
    ml.execute_batch(
        "CREATE TABLE sample (
           id_sample_tmp INTEGER PRIMARY KEY,
           description TEXT,
           phenotype TEXT,
           sanger_sample_id TEXT
         );
         CREATE TABLE stock_resource (
           id_stock_resource_tmp INTEGER PRIMARY KEY,
           id_sample_tmp INTEGER,
           labware_human_barcode TEXT,
           labware_coordinate TEXT
         );",
    )
    .unwrap();

    let events = Connection::open(events_wh_db.as_std_path()).unwrap();
    events
        .execute_batch(
            "CREATE TABLE event_types (id INTEGER PRIMARY KEY, key TEXT);
             CREATE TABLE events (id INTEGER PRIMARY KEY, event_type_id INTEGER);
             CREATE TABLE subjects (id INTEGER PRIMARY KEY, friendly_name TEXT);
             CREATE TABLE roles (id INTEGER PRIMARY KEY, event_id INTEGER, subject_id INTEGER);
             INSERT INTO event_types (id, key) VALUES (1, 'cherrypick_layout_set'), (2, 'slf_receipt');",
        )
        .unwrap();

    for (index, row) in rows.iter().enumerate() {
        let id = index as i64 + 1;
        let sanger_sample_id = format!("ss{id}");
        ml.execute(
            "INSERT INTO sample (id_sample_tmp, description, phenotype, sanger_sample_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, row.root_sample_id, row.phenotype, sanger_sample_id],
        )
        .unwrap();
        ml.execute(
            "INSERT INTO stock_resource (id_sample_tmp, labware_human_barcode, labware_coordinate)
             VALUES (?1, ?2, ?3)",
            params![id, row.plate_barcode, row.coordinate],
        )
        .unwrap();

        events
            .execute(
                "INSERT INTO subjects (id, friendly_name) VALUES (?1, ?2)",
                params![id, sanger_sample_id],
            )
            .unwrap();
        let event_type = if row.cherrypicked { 1 } else { 2 };
        events
            .execute(
                "INSERT INTO events (id, event_type_id) VALUES (?1, ?2)",
                params![id, event_type],
            )
            .unwrap();
        events
            .execute(
                "INSERT INTO roles (event_id, subject_id) VALUES (?1, ?1)",
                params![id],
            )
            .unwrap();
    }

    WarehouseSettings {
        ml_wh_db,
        ml_wh_schema: "mlwarehouse".to_string(),
        events_wh_db,
        events_wh_schema: "mlwh_events".to_string(),
        chunk_size,
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Answers every request with the same status and JSON body, recording what
/// it received. The server stops after half a second without requests.
pub struct StubServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: thread::JoinHandle<()>,
}

impl StubServer {
    pub fn start(status: u16, body: &str) -> Self {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let base_url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let body = body.to_string();
        let handle = thread::spawn(move || loop {
            let mut req = match server.recv_timeout(Duration::from_millis(500)) {
                Ok(Some(req)) => req,
                Ok(None) | Err(_) => break,
            };
            let mut content = String::new();
            let _ = req.as_reader().read_to_string(&mut content);
            recorded.lock().unwrap().push(RecordedRequest {
                method: req.method().to_string(),
                url: req.url().to_string(),
                body: content,
                headers: req
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.to_string()))
                    .collect(),
            });
            let response = Response::from_string(body.clone())
                .with_status_code(StatusCode(status))
                .with_header(
                    Header::from_bytes("Content-Type", "application/json").expect("header"),
                );
            let _ = req.respond(response);
        });
        Self {
            base_url,
            requests,
            handle,
        }
    }

    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().expect("server thread");
        let requests = self.requests.lock().unwrap();
        requests.clone()
    }
}
