//! Container listing for `container ps`.

use bollard::models::ContainerSummary;

use crate::engine::Engine;
use crate::utils::errors::Result;

/// One row of `container ps` output.
#[derive(Debug)]
pub struct ContainerRow {
    pub id: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub names: String,
}

impl ContainerRow {
    fn from_summary(summary: ContainerSummary) -> Self {
        Self {
            id: summary.id.unwrap_or_default().chars().take(12).collect(),
            image: summary.image.unwrap_or_default(),
            state: summary.state.map(|s| s.to_string()).unwrap_or_default(),
            status: summary.status.unwrap_or_default(),
            names: summary
                .names
                .unwrap_or_default()
                .iter()
                .map(|n| n.trim_start_matches('/'))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn cells(&self) -> [&str; 5] {
        [&self.id, &self.image, &self.state, &self.status, &self.names]
    }
}

/// List containers, running only or all.
pub async fn list(engine: &Engine, all: bool) -> Result<Vec<ContainerRow>> {
    let containers = engine.list_containers(all).await?;
    Ok(containers
        .into_iter()
        .map(ContainerRow::from_summary)
        .collect())
}

/// Render rows as aligned columns with a header line.
pub fn render_table(rows: &[ContainerRow]) -> String {
    const HEADERS: [&str; 5] = ["CONTAINER ID", "IMAGE", "STATE", "STATUS", "NAMES"];

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.cells()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, HEADERS, &widths);
    for row in rows {
        push_row(&mut out, row.cells(), &widths);
    }
    out
}

fn push_row(out: &mut String, cells: [&str; 5], widths: &[usize]) {
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i + 1 == cells.len() {
            out.push_str(cell);
        } else {
            out.push_str(&format!("{:<w$}  ", cell, w = *width));
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, image: &str, state: &str, status: &str, names: &str) -> ContainerRow {
        ContainerRow {
            id: id.to_string(),
            image: image.to_string(),
            state: state.to_string(),
            status: status.to_string(),
            names: names.to_string(),
        }
    }

    #[test]
    fn test_from_summary_trims_and_shortens() {
        let summary = ContainerSummary {
            id: Some("0123456789abcdef0123456789abcdef".to_string()),
            image: Some("postgres:16".to_string()),
            state: Some(bollard::models::ContainerSummaryStateEnum::RUNNING),
            status: Some("Up 2 hours".to_string()),
            names: Some(vec!["/db".to_string(), "/db-alias".to_string()]),
            ..Default::default()
        };

        let row = ContainerRow::from_summary(summary);
        assert_eq!(row.id, "0123456789ab");
        assert_eq!(row.names, "db,db-alias");
        assert_eq!(row.image, "postgres:16");
        assert_eq!(row.state, "running");
    }

    #[test]
    fn test_render_table_alignment() {
        let rows = vec![
            row("0123456789ab", "postgres:16", "running", "Up 2 hours", "db"),
            row("fedcba987654", "alpine", "exited", "Exited (0)", "helper"),
        ];

        let table = render_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CONTAINER ID"));
        // STATE column starts at the same offset in every line.
        let offset = lines[0].find("STATE").unwrap();
        assert_eq!(&lines[1][offset..offset + 7], "running");
        assert_eq!(&lines[2][offset..offset + 6], "exited");
    }

    #[test]
    fn test_render_table_empty() {
        let table = render_table(&[]);
        assert_eq!(table.lines().count(), 1);
    }
}
