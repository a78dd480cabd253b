use std::io::Write;

use serde::Serialize;

use super::machine::VerificationRecord;

#[derive(Debug, Serialize)]
struct TransitionRow<'a> {
    #[serde(rename = "Driver ID")]
    driver_id: &'a str,
    #[serde(rename = "From")]
    from: &'static str,
    #[serde(rename = "To")]
    to: &'static str,
    #[serde(rename = "At")]
    at: String,
    #[serde(rename = "Actor")]
    actor: String,
    #[serde(rename = "Note")]
    note: &'a str,
}

/// Write one CSV row per status transition, grouped by record. Returns the rows written.
pub fn write_transitions_csv<W: Write>(
    writer: W,
    records: &[VerificationRecord],
) -> Result<usize, csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut rows = 0;

    for record in records {
        for transition in record.history() {
            csv_writer.serialize(TransitionRow {
                driver_id: &record.driver_id().0,
                from: transition.from.label(),
                to: transition.to.label(),
                at: transition.at.to_rfc3339(),
                actor: transition.actor.to_string(),
                note: transition.note.as_deref().unwrap_or_default(),
            })?;
            rows += 1;
        }
    }

    csv_writer.flush()?;
    Ok(rows)
}
