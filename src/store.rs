use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::domain::{Centre, DECLARED_AT_FORMAT, Declaration, Sample};
use crate::error::LighthouseError;

/// Document collections the operations read from: samples, centres and
/// sample declarations.
pub trait SampleStore: Send + Sync {
    fn samples_for_plate(&self, plate_barcode: &str) -> Result<Vec<Sample>, LighthouseError>;

    /// Centres whose name equals `name`, ignoring case.
    fn centres_named(&self, name: &str) -> Result<Vec<Centre>, LighthouseError>;

    /// Samples whose result starts with "positive", ignoring case.
    fn positive_samples(&self) -> Result<Vec<Sample>, LighthouseError>;

    fn declarations(&self) -> Result<Vec<Declaration>, LighthouseError>;

    fn existing_root_sample_ids(
        &self,
        root_sample_ids: &[String],
    ) -> Result<HashSet<String>, LighthouseError>;

    fn insert_declarations(&self, declarations: &[Declaration]) -> Result<(), LighthouseError>;

    /// Persists assigned COG barcodes for all given samples, or none of them.
    fn record_cog_barcodes(&self, samples: &[Sample]) -> Result<(), LighthouseError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS samples (
      id INTEGER PRIMARY KEY,
      root_sample_id TEXT NOT NULL,
      source TEXT,
      plate_barcode TEXT NOT NULL,
      coordinate TEXT,
      result TEXT,
      date_tested TEXT,
      lab_id TEXT,
      cog_barcode TEXT
    );
    CREATE INDEX IF NOT EXISTS samples_plate_barcode ON samples (plate_barcode);
    CREATE INDEX IF NOT EXISTS samples_root_sample_id ON samples (root_sample_id);
    CREATE TABLE IF NOT EXISTS centres (
      id INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      prefix TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS samples_declarations (
      id INTEGER PRIMARY KEY,
      root_sample_id TEXT NOT NULL,
      value_in_sequencing TEXT NOT NULL,
      declared_at TEXT NOT NULL
    );
";

const SAMPLE_COLUMNS: &str = "root_sample_id, source, plate_barcode, coordinate, result, \
     date_tested, lab_id, cog_barcode";

/// SQLite-backed document store. A connection is opened per operation and
/// dropped when the operation returns.
#[derive(Debug, Clone)]
pub struct SqliteSampleStore {
    path: Utf8PathBuf,
}

impl SqliteSampleStore {
    pub fn open(path: &Utf8Path) -> Result<Self, LighthouseError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| LighthouseError::Filesystem(err.to_string()))?;
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        store
            .connect()?
            .execute_batch(SCHEMA)
            .map_err(store_err)?;
        Ok(store)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn insert_samples(&self, samples: &[Sample]) -> Result<(), LighthouseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(store_err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO samples ({SAMPLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ))
                .map_err(store_err)?;
            for sample in samples {
                stmt.execute(params![
                    sample.root_sample_id,
                    sample.source,
                    sample.plate_barcode,
                    sample.coordinate,
                    sample.result,
                    sample.date_tested,
                    sample.lab_id,
                    sample.cog_barcode,
                ])
                .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)
    }

    pub fn insert_centres(&self, centres: &[Centre]) -> Result<(), LighthouseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(store_err)?;
        for centre in centres {
            tx.execute(
                "INSERT INTO centres (name, prefix) VALUES (?1, ?2)",
                params![centre.name, centre.prefix],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    pub fn cog_barcode_for(
        &self,
        plate_barcode: &str,
        root_sample_id: &str,
    ) -> Result<Option<String>, LighthouseError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT cog_barcode FROM samples WHERE plate_barcode = ?1 AND root_sample_id = ?2",
            params![plate_barcode, root_sample_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(store_err)
    }

    fn connect(&self) -> Result<Connection, LighthouseError> {
        Connection::open(self.path.as_std_path()).map_err(store_err)
    }

    fn query_samples(
        &self,
        filter: &str,
        args: &[&str],
    ) -> Result<Vec<Sample>, LighthouseError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SAMPLE_COLUMNS}, id FROM samples WHERE {filter} ORDER BY id"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(Sample {
                    root_sample_id: row.get(0)?,
                    source: row.get(1)?,
                    plate_barcode: row.get(2)?,
                    coordinate: row.get(3)?,
                    result: row.get(4)?,
                    date_tested: row.get(5)?,
                    lab_id: row.get(6)?,
                    cog_barcode: row.get(7)?,
                    row_id: row.get(8)?,
                })
            })
            .map_err(store_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err)
    }
}

impl SampleStore for SqliteSampleStore {
    fn samples_for_plate(&self, plate_barcode: &str) -> Result<Vec<Sample>, LighthouseError> {
        self.query_samples("plate_barcode = ?1", &[plate_barcode])
    }

    fn centres_named(&self, name: &str) -> Result<Vec<Centre>, LighthouseError> {
        // NOCASE only folds ASCII, so names are compared here.
        let wanted = name.to_lowercase();
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT name, prefix FROM centres ORDER BY id")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Centre {
                    name: row.get(0)?,
                    prefix: row.get(1)?,
                })
            })
            .map_err(store_err)?;
        let mut centres = Vec::new();
        for centre in rows {
            let centre = centre.map_err(store_err)?;
            if centre.name.to_lowercase() == wanted {
                centres.push(centre);
            }
        }
        Ok(centres)
    }

    fn positive_samples(&self) -> Result<Vec<Sample>, LighthouseError> {
        // LIKE is case-insensitive for ASCII in SQLite.
        self.query_samples("result LIKE 'positive%'", &[])
    }

    fn declarations(&self) -> Result<Vec<Declaration>, LighthouseError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT root_sample_id, value_in_sequencing, declared_at
                 FROM samples_declarations ORDER BY id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(store_err)?;

        let mut declarations = Vec::new();
        for row in rows {
            let (root_sample_id, value, declared_at) = row.map_err(store_err)?;
            let value_in_sequencing = value.parse().map_err(|_| {
                LighthouseError::DocumentStore(format!(
                    "stored declaration for {root_sample_id} has value {value:?}"
                ))
            })?;
            let declared_at = NaiveDateTime::parse_from_str(&declared_at, DECLARED_AT_FORMAT)
                .map_err(|err| {
                    LighthouseError::DocumentStore(format!(
                        "stored declaration for {root_sample_id} has declared_at {declared_at:?}: {err}"
                    ))
                })?;
            declarations.push(Declaration {
                root_sample_id,
                value_in_sequencing,
                declared_at,
            });
        }
        Ok(declarations)
    }

    fn existing_root_sample_ids(
        &self,
        root_sample_ids: &[String],
    ) -> Result<HashSet<String>, LighthouseError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT 1 FROM samples WHERE root_sample_id = ?1 LIMIT 1")
            .map_err(store_err)?;
        let mut existing = HashSet::new();
        for id in root_sample_ids {
            if existing.contains(id) {
                continue;
            }
            let found = stmt
                .query_row(params![id], |_| Ok(()))
                .optional()
                .map_err(store_err)?;
            if found.is_some() {
                existing.insert(id.clone());
            }
        }
        Ok(existing)
    }

    fn insert_declarations(&self, declarations: &[Declaration]) -> Result<(), LighthouseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(store_err)?;
        for declaration in declarations {
            tx.execute(
                "INSERT INTO samples_declarations (root_sample_id, value_in_sequencing, declared_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    declaration.root_sample_id,
                    declaration.value_in_sequencing.as_str(),
                    declaration
                        .declared_at
                        .format(DECLARED_AT_FORMAT)
                        .to_string(),
                ],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        debug!(count = declarations.len(), "inserted declarations");
        Ok(())
    }

    fn record_cog_barcodes(&self, samples: &[Sample]) -> Result<(), LighthouseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(store_err)?;
        for sample in samples {
            let updated = match sample.row_id {
                Some(row_id) => tx.execute(
                    "UPDATE samples SET cog_barcode = ?1 WHERE id = ?2",
                    params![sample.cog_barcode, row_id],
                ),
                None => tx.execute(
                    "UPDATE samples SET cog_barcode = ?1
                     WHERE plate_barcode = ?2 AND root_sample_id = ?3 AND coordinate IS ?4",
                    params![
                        sample.cog_barcode,
                        sample.plate_barcode,
                        sample.root_sample_id,
                        sample.coordinate,
                    ],
                ),
            }
            .map_err(store_err)?;
            if updated == 0 {
                debug!(root_sample_id = %sample.root_sample_id, "no stored row for sample");
            }
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit().map_err(store_err)
    }
}

fn store_err(err: rusqlite::Error) -> LighthouseError {
    LighthouseError::DocumentStore(err.to_string())
}
