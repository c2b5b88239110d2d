use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::classifier::{Outcome, ProbeResult};
use crate::scan;

/// Matched files grouped by identity, plus the files nobody matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Identity → (file name, distance), in the order results were recorded.
    pub matched: BTreeMap<String, Vec<(String, f32)>>,
    /// File names without a match, in discovery order.
    pub unmatched: Vec<String>,
}

impl Report {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut report = Self::default();
        for r in results {
            let name = scan::file_name(&r.path);
            match &r.outcome {
                Outcome::Matched { identity, distance } => report
                    .matched
                    .entry(identity.clone())
                    .or_default()
                    .push((name, *distance)),
                Outcome::NoFace | Outcome::NoMatch => report.unmatched.push(name),
            }
        }
        report
    }

    /// Write the report body. Identical for console and file output.
    pub fn render<W: Write>(&self, out: &mut W, list_unmatched: bool) -> std::io::Result<()> {
        writeln!(out, "Matched faces:")?;
        for (identity, files) in &self.matched {
            writeln!(out, "  {}:", identity)?;
            for (file, distance) in files {
                writeln!(out, "    {} ({:.3})", file, distance)?;
            }
        }
        if list_unmatched {
            writeln!(out, "Unmatched faces:")?;
            for file in &self.unmatched {
                writeln!(out, "  {}", file)?;
            }
        }
        Ok(())
    }
}

/// `report-YYYY-MM-DD_HH-MM-SS.txt` for the given moment.
pub fn report_file_name(at: DateTime<Local>) -> String {
    format!("report-{}.txt", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Create a timestamped report file in `dir` (created if absent).
pub fn create_report_file(dir: &Path) -> std::io::Result<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(Local::now()));
    let file = std::fs::File::create(&path)?;
    Ok((path, file))
}
