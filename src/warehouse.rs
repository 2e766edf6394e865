use std::collections::HashSet;
use std::rc::Rc;

use camino::Utf8PathBuf;
use rusqlite::types::Value;
use rusqlite::vtab::array;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::config::WarehouseSettings;
use crate::error::LighthouseError;

pub const CHERRYPICK_EVENT_TYPE: &str = "cherrypick_layout_set";

/// The key columns of a sample that has a cherrypicking event. The result is
/// the lower-cased phenotype as stored in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CherrypickedSample {
    pub root_sample_id: String,
    pub plate_barcode: String,
    pub result_lower: Option<String>,
    pub coordinate: Option<String>,
}

pub trait Warehouse: Send + Sync {
    /// Samples among `root_sample_ids` x `plate_barcodes` that have been
    /// cherrypicked. Root ids are queried in chunks of `chunk_size`; rows
    /// repeated across chunks are returned once, in first-seen order.
    fn cherrypicked_samples(
        &self,
        root_sample_ids: &[String],
        plate_barcodes: &[String],
        chunk_size: usize,
    ) -> Result<Vec<CherrypickedSample>, LighthouseError>;
}

/// The sample/stock-resource warehouse and the events warehouse, as two
/// SQLite databases attached side by side to one connection.
#[derive(Debug, Clone)]
pub struct SqliteWarehouse {
    ml_wh_db: Utf8PathBuf,
    ml_wh_schema: String,
    events_wh_db: Utf8PathBuf,
    events_wh_schema: String,
}

impl SqliteWarehouse {
    pub fn new(settings: &WarehouseSettings) -> Self {
        Self {
            ml_wh_db: settings.ml_wh_db.clone(),
            ml_wh_schema: settings.ml_wh_schema.clone(),
            events_wh_db: settings.events_wh_db.clone(),
            events_wh_schema: settings.events_wh_schema.clone(),
        }
    }

    fn connect(&self) -> Result<Connection, LighthouseError> {
        let conn = Connection::open_in_memory().map_err(warehouse_err)?;
        for (path, schema) in [
            (&self.ml_wh_db, &self.ml_wh_schema),
            (&self.events_wh_db, &self.events_wh_schema),
        ] {
            if !path.as_std_path().is_file() {
                return Err(LighthouseError::Warehouse(format!(
                    "database for schema {schema} not found at {path}"
                )));
            }
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {schema}"),
                params![path.as_str()],
            )
            .map_err(warehouse_err)?;
        }
        array::load_module(&conn).map_err(warehouse_err)?;
        Ok(conn)
    }

    fn cherrypick_sql(&self) -> String {
        let ml = &self.ml_wh_schema;
        let events = &self.events_wh_schema;
        format!(
            "SELECT mlwh_sample.description, mlwh_stock_resource.labware_human_barcode, \
                    mlwh_sample.phenotype, mlwh_stock_resource.labware_coordinate \
             FROM {ml}.sample AS mlwh_sample \
             JOIN {ml}.stock_resource AS mlwh_stock_resource \
               ON (mlwh_sample.id_sample_tmp = mlwh_stock_resource.id_sample_tmp) \
             JOIN {events}.subjects AS mlwh_events_subjects \
               ON (mlwh_events_subjects.friendly_name = mlwh_sample.sanger_sample_id) \
             JOIN {events}.roles AS mlwh_events_roles \
               ON (mlwh_events_roles.subject_id = mlwh_events_subjects.id) \
             JOIN {events}.events AS mlwh_events_events \
               ON (mlwh_events_roles.event_id = mlwh_events_events.id) \
             JOIN {events}.event_types AS mlwh_events_event_types \
               ON (mlwh_events_events.event_type_id = mlwh_events_event_types.id) \
             WHERE mlwh_sample.description IN rarray(?1) \
               AND mlwh_stock_resource.labware_human_barcode IN rarray(?2) \
               AND mlwh_events_event_types.key = ?3 \
             GROUP BY mlwh_sample.description, mlwh_stock_resource.labware_human_barcode, \
                      mlwh_sample.phenotype, mlwh_stock_resource.labware_coordinate"
        )
    }
}

impl Warehouse for SqliteWarehouse {
    fn cherrypicked_samples(
        &self,
        root_sample_ids: &[String],
        plate_barcodes: &[String],
        chunk_size: usize,
    ) -> Result<Vec<CherrypickedSample>, LighthouseError> {
        if chunk_size == 0 {
            return Err(LighthouseError::Warehouse(
                "chunk size must be positive".to_string(),
            ));
        }
        if root_sample_ids.is_empty() || plate_barcodes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&self.cherrypick_sql()).map_err(warehouse_err)?;
        let plates = Rc::new(to_values(plate_barcodes));

        let mut seen = HashSet::new();
        let mut cherrypicked = Vec::new();
        for (index, chunk) in root_sample_ids.chunks(chunk_size).enumerate() {
            let roots = Rc::new(to_values(chunk));
            let rows = stmt
                .query_map(
                    params![roots, Rc::clone(&plates), CHERRYPICK_EVENT_TYPE],
                    |row| {
                        Ok(CherrypickedSample {
                            root_sample_id: row.get(0)?,
                            plate_barcode: row.get(1)?,
                            result_lower: row.get(2)?,
                            coordinate: row.get(3)?,
                        })
                    },
                )
                .map_err(warehouse_err)?;
            let mut found = 0usize;
            for row in rows {
                let sample = row.map_err(warehouse_err)?;
                found += 1;
                // The same root id can appear in two chunks and match twice.
                if seen.insert(sample.clone()) {
                    cherrypicked.push(sample);
                }
            }
            debug!(chunk = index, size = chunk.len(), found, "cherrypick chunk queried");
        }

        info!(count = cherrypicked.len(), "cherrypicked samples found");
        Ok(cherrypicked)
    }
}

fn to_values(items: &[String]) -> Vec<Value> {
    items.iter().cloned().map(Value::from).collect()
}

fn warehouse_err(err: rusqlite::Error) -> LighthouseError {
    LighthouseError::Warehouse(err.to_string())
}
