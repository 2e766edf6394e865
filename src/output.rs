use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DeleteResult, PlateSubmission, ReportsResult, ScanResult};
use crate::declarations::BatchOutcome;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_submission(result: &PlateSubmission) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reports(result: &ReportsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_delete(result: &DeleteResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_declarations(result: &BatchOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_scan(result: &ScanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn render<T: Serialize>(value: &T) -> io::Result<String> {
        serde_json::to_string_pretty(value).map_err(io::Error::other)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = Self::render(value)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
