use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::LazyLock;
use std::time::Instant;

use camino::Utf8Path;
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::{debug, info};

use crate::catalog::ReportCatalog;
use crate::domain::{DECLARED_AT_FORMAT, Declaration, ReportName, Sample, ValueInSequencing};
use crate::error::LighthouseError;
use crate::labwhere::LabwhereClient;
use crate::store::SampleStore;
use crate::warehouse::Warehouse;

pub const SHEET_WITH_LOCATION: &str = "POSITIVE SAMPLES WITH LOCATION";
pub const SHEET_ALL: &str = "ALL POSITIVE SAMPLES";

const DATE_TESTED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_TESTED_FALLBACK_FORMAT: &str = "%d/%m/%Y %H:%M";

static PADDED_COORDINATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"0(\d+)$").unwrap());

const BASE_COLUMNS: &[&str] = &[
    "source",
    "plate_barcode",
    "Root Sample ID",
    "Lab ID",
    "Result",
    "Date Tested",
    "coordinate",
    "plate and well",
    "location_barcode",
    "LIMS submission",
];
const DECLARATION_COLUMNS: &[&str] = &["Value In Sequencing", "Declared At"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimsSubmission {
    Yes,
    No,
}

impl LimsSubmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimsSubmission::Yes => "Yes",
            LimsSubmission::No => "No",
        }
    }
}

/// One row of the positives report. Enrichment columns stay `None` until
/// the corresponding join has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub source: Option<String>,
    pub plate_barcode: String,
    pub root_sample_id: String,
    pub lab_id: Option<String>,
    pub result: Option<String>,
    pub date_tested: Option<String>,
    pub coordinate: Option<String>,
    pub plate_and_well: String,
    pub location_barcode: Option<String>,
    pub lims_submission: Option<LimsSubmission>,
    pub value_in_sequencing: Option<ValueInSequencing>,
    pub declared_at: Option<NaiveDateTime>,
}

impl ReportRow {
    pub fn from_sample(sample: Sample) -> Self {
        let coordinate = unpad_coordinate(sample.coordinate.as_deref());
        let plate_and_well = format!(
            "{}:{}",
            sample.plate_barcode,
            coordinate.as_deref().unwrap_or_default()
        );
        Self {
            source: sample.source,
            plate_barcode: sample.plate_barcode,
            root_sample_id: sample.root_sample_id,
            lab_id: sample.lab_id,
            result: sample.result,
            date_tested: sample.date_tested,
            coordinate,
            plate_and_well,
            location_barcode: None,
            lims_submission: None,
            value_in_sequencing: None,
            declared_at: None,
        }
    }

    fn cells(&self, with_declarations: bool) -> Vec<Option<String>> {
        let mut cells = vec![
            self.source.clone(),
            Some(self.plate_barcode.clone()),
            Some(self.root_sample_id.clone()),
            self.lab_id.clone(),
            self.result.clone(),
            self.date_tested.clone(),
            self.coordinate.clone(),
            Some(self.plate_and_well.clone()),
            self.location_barcode.clone(),
            self.lims_submission.map(|value| value.as_str().to_string()),
        ];
        if with_declarations {
            cells.push(self.value_in_sequencing.map(|value| value.as_str().to_string()));
            cells.push(
                self.declared_at
                    .map(|value| value.format(DECLARED_AT_FORMAT).to_string()),
            );
        }
        cells
    }
}

/// Midnight (UTC) of the day `window_days` before `now`.
pub fn report_query_window_start(
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<DateTime<Utc>, LighthouseError> {
    let start = TimeDelta::try_days(window_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            LighthouseError::ReportCreation(format!(
                "a window of {window_days} days is out of range"
            ))
        })?;
    info!(start = %start.format("%d/%m/%Y"), window_days, "report window");
    Ok(start.date_naive().and_time(NaiveTime::default()).and_utc())
}

/// Parses a tested-date such as `2020-05-10 07:30:00 UTC` or
/// `10/05/2020 07:30`. Only the first 19 characters are considered.
pub fn parse_date_tested(raw: &str) -> Option<DateTime<Utc>> {
    let extracted = match raw.char_indices().nth(19) {
        Some((end, _)) => &raw[..end],
        None => raw,
    };
    let extracted = extracted.trim();
    NaiveDateTime::parse_from_str(extracted, DATE_TESTED_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(extracted, DATE_TESTED_FALLBACK_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Strips one zero in front of the trailing digits: `A01` becomes `A1`.
pub fn unpad_coordinate(coordinate: Option<&str>) -> Option<String> {
    coordinate.map(|value| PADDED_COORDINATE_RE.replace(value, "${1}").into_owned())
}

/// Keeps positives tested in `[start, now)`; rows with a missing or
/// unparseable tested-date are dropped.
pub fn positives_in_window(
    samples: Vec<Sample>,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for sample in samples {
        let Some(tested) = sample.date_tested.as_deref().and_then(parse_date_tested) else {
            debug!(
                root_sample_id = %sample.root_sample_id,
                date_tested = ?sample.date_tested,
                "excluding sample with unparseable tested date"
            );
            continue;
        };
        if tested >= start && tested < now {
            rows.push(ReportRow::from_sample(sample));
        }
    }
    rows
}

pub fn get_all_positive_samples(
    store: &dyn SampleStore,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<Vec<ReportRow>, LighthouseError> {
    debug!("getting all positive samples from the report window");
    let start = report_query_window_start(now, window_days)?;
    let rows = positives_in_window(store.positive_samples()?, start, now);
    info!(count = rows.len(), "positive samples");
    Ok(rows)
}

/// Distinct non-empty plate barcodes, in first-seen order.
pub fn distinct_plate_barcodes(rows: &[ReportRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(|row| row.plate_barcode.as_str())
        .filter(|barcode| !barcode.is_empty() && seen.insert(*barcode))
        .map(str::to_string)
        .collect()
}

/// Maps plate barcode to location barcode. A plate LabWhere knows without a
/// location maps to an empty string; an unknown plate is absent.
pub fn map_labware_to_location(
    labwhere: &dyn LabwhereClient,
    labware_barcodes: &[String],
) -> Result<HashMap<String, String>, LighthouseError> {
    if labware_barcodes.is_empty() {
        return Ok(HashMap::new());
    }
    let locations = labwhere
        .locations_for(labware_barcodes)
        .map_err(|err| {
            LighthouseError::ReportCreation(format!("response from LabWhere is not OK: {err}"))
        })?;
    let mapping = locations
        .into_iter()
        .map(|record| (record.barcode, record.location_barcode.unwrap_or_default()))
        .collect::<HashMap<_, _>>();
    info!(count = mapping.len(), "locations for plate barcodes found");
    Ok(mapping)
}

pub fn add_locations(rows: &mut [ReportRow], locations: &HashMap<String, String>) {
    for row in rows {
        row.location_barcode = locations.get(&row.plate_barcode).cloned();
    }
}

/// Marks each row `Yes` when the warehouses hold a cherrypicking event for
/// its (root id, plate barcode, lower-cased result, coordinate), else `No`.
pub fn add_cherrypicked_column(
    rows: &mut [ReportRow],
    warehouse: &dyn Warehouse,
    chunk_size: usize,
) -> Result<(), LighthouseError> {
    let mut seen_roots = HashSet::new();
    let root_sample_ids = rows
        .iter()
        .filter(|row| seen_roots.insert(row.root_sample_id.as_str()))
        .map(|row| row.root_sample_id.clone())
        .collect::<Vec<_>>();
    let plate_barcodes = distinct_plate_barcodes(rows);

    let cherrypicked = warehouse
        .cherrypicked_samples(&root_sample_ids, &plate_barcodes, chunk_size)?
        .into_iter()
        .map(|sample| {
            (
                sample.root_sample_id,
                sample.plate_barcode,
                sample.result_lower,
                sample.coordinate,
            )
        })
        .collect::<HashSet<_>>();
    info!(count = cherrypicked.len(), "cherrypicked samples");

    for row in rows.iter_mut() {
        let key = (
            row.root_sample_id.clone(),
            row.plate_barcode.clone(),
            row.result.as_deref().map(str::to_lowercase),
            row.coordinate.clone(),
        );
        row.lims_submission = Some(if cherrypicked.contains(&key) {
            LimsSubmission::Yes
        } else {
            LimsSubmission::No
        });
    }
    Ok(())
}

/// The most recent declaration per root sample id.
pub fn latest_declarations(declarations: Vec<Declaration>) -> HashMap<String, Declaration> {
    let mut latest: HashMap<String, Declaration> = HashMap::new();
    for declaration in declarations {
        let newer = latest
            .get(&declaration.root_sample_id)
            .is_none_or(|current| declaration.declared_at > current.declared_at);
        if newer {
            latest.insert(declaration.root_sample_id.clone(), declaration);
        }
    }
    latest
}

/// Left-joins the latest declarations onto `rows`. Returns `false` and leaves
/// the rows untouched when there are no declarations at all.
pub fn join_samples_declarations(rows: &mut [ReportRow], declarations: Vec<Declaration>) -> bool {
    if declarations.is_empty() {
        return false;
    }
    debug!("joining declarations");
    let latest = latest_declarations(declarations);
    for row in rows {
        match latest.get(&row.root_sample_id) {
            Some(declaration) => {
                row.value_in_sequencing = Some(declaration.value_in_sequencing);
                row.declared_at = Some(declaration.declared_at);
            }
            None => {
                row.value_in_sequencing = Some(ValueInSequencing::Unknown);
                row.declared_at = None;
            }
        }
    }
    true
}

/// Writes the two report sheets to `path`. The workbook is written to a
/// temporary file next to `path` first, so a failed write leaves nothing
/// behind under the final name.
pub fn write_report(
    path: &Utf8Path,
    rows: &[ReportRow],
    with_declarations: bool,
) -> Result<(), LighthouseError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let with_location = rows
        .iter()
        .filter(|row| row.location_barcode.is_some())
        .collect::<Vec<_>>();
    let all = rows.iter().collect::<Vec<_>>();

    write_sheet(
        workbook.add_worksheet(),
        SHEET_WITH_LOCATION,
        &header,
        &with_location,
        with_declarations,
    )
    .map_err(spreadsheet_err)?;
    write_sheet(
        workbook.add_worksheet(),
        SHEET_ALL,
        &header,
        &all,
        with_declarations,
    )
    .map_err(spreadsheet_err)?;
    let buffer = workbook.save_to_buffer().map_err(spreadsheet_err)?;

    let parent = path
        .parent()
        .ok_or_else(|| LighthouseError::Filesystem(format!("invalid report path {path}")))?;
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| LighthouseError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".lighthouse-report")
        .suffix(".xlsx.tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LighthouseError::Filesystem(err.to_string()))?;
    temp.write_all(&buffer)
        .map_err(|err| LighthouseError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| LighthouseError::Filesystem(err.to_string()))?;
    Ok(())
}

fn write_sheet(
    worksheet: &mut Worksheet,
    name: &str,
    header: &Format,
    rows: &[&ReportRow],
    with_declarations: bool,
) -> Result<(), XlsxError> {
    worksheet.set_name(name)?;
    let extra: &[&str] = if with_declarations {
        DECLARATION_COLUMNS
    } else {
        &[]
    };
    let columns = BASE_COLUMNS.iter().chain(extra).copied();
    for (col, title) in columns.enumerate() {
        worksheet.write_string_with_format(0, col as u16, title, header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let excel_row = index as u32 + 1;
        for (col, cell) in row.cells(with_declarations).into_iter().enumerate() {
            if let Some(value) = cell {
                worksheet.write_string(excel_row, col as u16, value)?;
            }
        }
    }
    worksheet.autofit();
    Ok(())
}

fn spreadsheet_err(err: XlsxError) -> LighthouseError {
    LighthouseError::Spreadsheet(err.to_string())
}

/// Collaborators and settings of one report run.
pub struct ReportJob<'a> {
    pub store: &'a dyn SampleStore,
    pub labwhere: &'a dyn LabwhereClient,
    pub warehouse: &'a dyn Warehouse,
    pub catalog: &'a ReportCatalog,
    pub window_days: i64,
    pub chunk_size: usize,
}

impl ReportJob<'_> {
    /// Builds the positives report and returns its name. Any failure before
    /// the final write aborts the run without producing a file.
    pub fn create_report(&self, now: DateTime<Utc>) -> Result<ReportName, LighthouseError> {
        info!("creating positive samples report");
        let started = Instant::now();

        let mut rows = get_all_positive_samples(self.store, now, self.window_days)?;

        debug!("getting location barcodes from LabWhere");
        let plate_barcodes = distinct_plate_barcodes(&rows);
        info!(count = plate_barcodes.len(), "distinct plate barcodes");
        let locations = map_labware_to_location(self.labwhere, &plate_barcodes)?;
        add_locations(&mut rows, &locations);

        add_cherrypicked_column(&mut rows, self.warehouse, self.chunk_size)?;

        let with_declarations = join_samples_declarations(&mut rows, self.store.declarations()?);

        let (name, path) = self.catalog.new_report_name_and_path(now);
        info!(%path, "writing results");
        write_report(&path, &rows, with_declarations)?;

        info!(
            report = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "report creation complete"
        );
        Ok(name)
    }
}
