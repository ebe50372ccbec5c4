use anyhow::Context;
use serde::Serialize;

use reconciler::{PartitionPolicy, Plan, TableState};

/// Text or JSON rendering of command results.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `value` as JSON, or the text produced by `text`.
    pub fn emit<T, F>(&self, value: &T, text: F) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> String,
    {
        if self.json {
            let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
            println!("{json}");
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

/// Left-aligned columns separated by two spaces.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers.to_vec())];
    out.extend(
        rows.iter()
            .map(|row| line(row.iter().map(String::as_str).collect())),
    );
    out.join("\n")
}

pub fn describe_policy(policy: &PartitionPolicy) -> String {
    format!(
        "name {}, step {}, lead {}, keep {}{}",
        policy.naming_pattern(),
        policy.boundary_step(),
        policy.lead_count(),
        policy.retention_count(),
        if policy.force_drop() {
            ", combined drops"
        } else {
            ""
        }
    )
}

pub fn inventory_text(state: &TableState) -> String {
    if !state.exists {
        return format!("{}: table does not exist", state.table);
    }

    let mut out = vec![format!("[{}]", state.table)];
    match (&state.policy, state.partitioned) {
        (_, false) => out.push("Not partitioned".to_string()),
        (Some(policy), true) => out.push(format!("Policy: {}", describe_policy(policy))),
        (None, true) => out.push("Policy: none".to_string()),
    }

    if state.partitioned {
        let rows: Vec<Vec<String>> = state
            .partitions
            .iter()
            .map(|p| {
                vec![
                    p.name.clone(),
                    p.boundary.to_string(),
                    p.row_estimate.to_string(),
                    p.created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                    p.expression.clone().unwrap_or_default(),
                ]
            })
            .collect();
        out.push(render_table(
            &["NAME", "LESS THAN", "ROWS", "CREATED", "EXPRESSION"],
            &rows,
        ));
        out.push(format!("Count: {}", state.partitions.len()));
    }

    out.join("\n")
}

pub fn plan_text(state: &TableState, plan: &Plan, statements: &[String]) -> String {
    if plan.is_empty() {
        return format!("{}: partitions match policy", state.table);
    }

    let mut out = vec![format!("[{}]", state.table)];
    for partition in &plan.additions {
        out.push(format!(
            "  + {} VALUES LESS THAN ({})",
            partition.name, partition.boundary
        ));
    }
    for name in &plan.removals.names {
        out.push(format!("  - {name}"));
    }
    if !statements.is_empty() {
        out.push(String::new());
        out.extend(statements.iter().map(|sql| format!("{sql};")));
    }
    out.join("\n")
}
