//! Per-level sheet layout: six columns per worker (three scenarios, two
//! phases each), with computed summary rows under the data.

use indexmap::IndexMap;

use super::Workbook;
use crate::experiment::WorkerReport;

/// Columns 0 and 1 are reserved for the summary row labels; worker data
/// starts at column 2.
const DATA_COL: usize = 2;
/// Rows 0..=2 carry the worker / scenario / phase headers.
const HEADER_ROWS: usize = 3;
/// Each worker occupies six columns: three scenarios times two phases.
const COLS_PER_WORKER: usize = 6;

/// Append one concurrency level's sheet to the workbook.
///
/// Workers appear in map order, left to right. The mean/stdev/total block
/// sits immediately below the longest data column in the sheet.
pub fn add_level_sheet(
    workbook: &mut Workbook,
    level: usize,
    worker_data: &IndexMap<String, WorkerReport>,
) {
    let sheet = workbook.add_sheet(format!("{} workers", level));

    let mut columns: Vec<(usize, Vec<f64>)> = Vec::new();
    let mut longest = 0;

    for (worker_id, report) in worker_data.values().enumerate() {
        for (scenario_id, (kind, scenario)) in report.scenarios.iter().enumerate() {
            let base = DATA_COL + worker_id * COLS_PER_WORKER + scenario_id * 2;
            let phases = [("allocate", &scenario.allocate), ("deallocate", &scenario.deallocate)];
            for (offset, (phase_name, timings)) in phases.into_iter().enumerate() {
                let col = base + offset;
                sheet.set(0, col, format!("worker {}", worker_id + 1));
                sheet.set(1, col, kind.label());
                sheet.set(2, col, phase_name);

                let values: Vec<f64> = timings.values().copied().collect();
                for (i, secs) in values.iter().enumerate() {
                    sheet.set(HEADER_ROWS + i, col, format_seconds(*secs));
                }
                longest = longest.max(values.len());
                columns.push((col, values));
            }
        }
    }

    let footer = HEADER_ROWS + longest;
    sheet.set(footer, 1, "mean");
    sheet.set(footer + 1, 1, "stdev");
    sheet.set(footer + 2, 1, "total");

    for (col, values) in &columns {
        if values.is_empty() {
            continue;
        }
        sheet.set(footer, *col, format_seconds(mean(values)));
        sheet.set(footer + 1, *col, format_seconds(sample_stdev(values)));
        sheet.set(footer + 2, *col, format_seconds(sum(values)));
    }
}

fn format_seconds(secs: f64) -> String {
    format!("{:.6}", secs)
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn mean(values: &[f64]) -> f64 {
    sum(values) / values.len() as f64
}

/// Sample standard deviation (n-1 in the denominator, the spreadsheet
/// STDEV convention). Zero for fewer than two samples.
fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
