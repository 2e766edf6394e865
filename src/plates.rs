use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::baracoda::BaracodaClient;
use crate::domain::Sample;
use crate::error::LighthouseError;
use crate::sequencescape::{
    PlateAttributes, PlateData, PlatePayload, SequencescapeClient, TrackingResponse, Well,
    WellContent,
};
use crate::store::SampleStore;

pub fn samples_for_plate(
    store: &dyn SampleStore,
    plate_barcode: &str,
) -> Result<Vec<Sample>, LighthouseError> {
    info!(plate_barcode, "getting all samples for plate");
    let samples = store.samples_for_plate(plate_barcode)?;
    info!(plate_barcode, count = samples.len(), "found samples");
    Ok(samples)
}

/// Returns the single centre all `samples` came from.
///
/// Every sample must carry a non-empty `source`; those checks run over the
/// whole batch before centres are compared.
pub fn confirm_centre(samples: &[Sample]) -> Result<String, LighthouseError> {
    for sample in samples {
        match sample.source.as_deref() {
            None => {
                return Err(LighthouseError::MissingSource(format!(
                    "no source for sample {}",
                    sample.root_sample_id
                )));
            }
            Some(source) if source.is_empty() => {
                return Err(LighthouseError::MissingCentre(format!(
                    "no centre for sample {}",
                    sample.root_sample_id
                )));
            }
            Some(_) => {}
        }
    }

    let centres = samples
        .iter()
        .filter_map(|sample| sample.source.as_deref())
        .collect::<BTreeSet<_>>();
    let mut centres = centres.into_iter();
    match (centres.next(), centres.next()) {
        (Some(centre), None) => Ok(centre.to_string()),
        (Some(_), Some(_)) => Err(LighthouseError::MultipleCentres(
            "different centres for these samples".to_string(),
        )),
        (None, _) => Err(LighthouseError::MissingCentre(
            "no samples to take a centre from".to_string(),
        )),
    }
}

pub fn centre_prefix(store: &dyn SampleStore, centre_name: &str) -> Result<String, LighthouseError> {
    debug!(centre_name, "getting the prefix for centre");
    let mut centres = store.centres_named(centre_name)?;
    if centres.len() != 1 {
        return Err(LighthouseError::DataConsistency(format!(
            "expected exactly one centre named {centre_name:?}, found {}",
            centres.len()
        )));
    }
    let prefix = centres.remove(0).prefix;
    debug!(centre_name, prefix, "centre prefix");
    Ok(prefix)
}

/// Assigns a COG-UK barcode to every sample and returns the centre prefix.
///
/// Either all samples get a barcode (in memory and in the store) or none do.
pub fn add_cog_barcodes(
    store: &dyn SampleStore,
    baracoda: &dyn BaracodaClient,
    samples: &mut [Sample],
) -> Result<String, LighthouseError> {
    let centre_name = confirm_centre(samples)?;
    let prefix = centre_prefix(store, &centre_name)?;

    info!(count = samples.len(), "getting COG-UK barcodes");
    let barcodes = baracoda.new_barcodes(&prefix, samples.len())?;
    if barcodes.len() != samples.len() {
        return Err(LighthouseError::BaracodaHttp(format!(
            "expected {} barcodes, received {}",
            samples.len(),
            barcodes.len()
        )));
    }

    let assigned = samples
        .iter()
        .zip(barcodes)
        .map(|(sample, barcode)| Sample {
            cog_barcode: Some(barcode),
            ..sample.clone()
        })
        .collect::<Vec<_>>();
    store.record_cog_barcodes(&assigned)?;
    samples.clone_from_slice(&assigned);

    Ok(prefix)
}

pub fn create_post_body(
    plate_barcode: &str,
    samples: &[Sample],
    purpose_uuid: &str,
    study_uuid: &str,
) -> Result<PlatePayload, LighthouseError> {
    debug!(plate_barcode, "creating POST body for Sequencescape");
    let mut wells = BTreeMap::new();
    for sample in samples {
        let missing = |field| LighthouseError::MissingField {
            root_sample_id: sample.root_sample_id.clone(),
            field,
        };
        let phenotype = sample.result.as_deref().ok_or_else(|| missing("Result"))?;
        let supplier_name = sample
            .cog_barcode
            .clone()
            .ok_or_else(|| missing("cog_barcode"))?;
        let coordinate = sample
            .coordinate
            .clone()
            .ok_or_else(|| missing("coordinate"))?;

        wells.insert(
            coordinate,
            Well {
                content: WellContent {
                    phenotype: phenotype.trim().to_lowercase(),
                    supplier_name,
                    sample_description: sample.root_sample_id.clone(),
                },
            },
        );
    }

    Ok(PlatePayload {
        data: PlateData {
            kind: "plates",
            attributes: PlateAttributes {
                barcode: plate_barcode.to_string(),
                purpose_uuid: purpose_uuid.to_string(),
                study_uuid: study_uuid.to_string(),
                wells,
            },
        },
    })
}

/// Submits the plate; the tracking service's status and body come back
/// unchanged whatever the status.
pub fn send_to_tracking(
    tracking: &dyn SequencescapeClient,
    payload: &PlatePayload,
) -> Result<TrackingResponse, LighthouseError> {
    let response = tracking.create_plate(payload)?;
    info!(
        plate_barcode = %payload.data.attributes.barcode,
        status = response.status,
        "Sequencescape responded"
    );
    Ok(response)
}
