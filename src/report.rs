//! Result rendering: JSON or a two-column table

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// The fastest run of one test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingResult {
    pub id: String,
    pub name: String,
    /// Milliseconds, truncated to two decimal places
    pub time: f64,
}

/// Render results as a JSON array of `{id, name, time}` objects
pub fn results_to_json(results: &[TimingResult]) -> Result<String> {
    Ok(serde_json::to_string(results)?)
}

/// Render results as a `Test` / `Time (ms)` table with right-aligned times
pub fn results_to_table(results: &[TimingResult]) -> String {
    let rows: Vec<[String; 2]> = results
        .iter()
        .map(|r| [r.name.clone(), format!("{:.2}", r.time)])
        .collect();
    render_table(["Test", "Time (ms)"], &rows, [Align::Left, Align::Right])
}

/// Render the test ID -> groups mapping as a JSON object
pub fn ids_to_groups_json(pairs: &[(String, Vec<String>)]) -> Result<String> {
    let map: BTreeMap<&str, &Vec<String>> = pairs.iter().map(|(id, g)| (id.as_str(), g)).collect();
    Ok(serde_json::to_string(&map)?)
}

/// Render the test ID -> groups mapping as a table
pub fn ids_to_groups_table(pairs: &[(String, Vec<String>)]) -> String {
    let rows: Vec<[String; 2]> = pairs
        .iter()
        .map(|(id, groups)| [id.clone(), groups.join(", ")])
        .collect();
    render_table(["Test", "Groups"], &rows, [Align::Left, Align::Left])
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

fn render_table(header: [&str; 2], rows: &[[String; 2]], align: [Align; 2]) -> String {
    let mut widths = header.map(|h| h.chars().count());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: [&str; 2]| -> String {
        let formatted: Vec<String> = cells
            .iter()
            .zip(widths)
            .zip(align)
            .map(|((cell, width), align)| match align {
                Align::Left => format!("{:<width$}", cell, width = width),
                Align::Right => format!("{:>width$}", cell, width = width),
            })
            .collect();
        formatted.join("  ").trim_end().to_string()
    };

    let mut output = format_row(header);
    output.push('\n');
    for row in rows {
        output.push_str(&format_row([row[0].as_str(), row[1].as_str()]));
        output.push('\n');
    }
    output
}
