//! tagsync changes command implementation
//!
//! Prints the outstanding change trail that a sync job would upload.

use crate::changes::RowChange;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

use super::Context;

#[derive(serde::Serialize)]
struct ChangesReport {
    total: usize,
    changes: Vec<RowChange>,
}

pub fn run(ctx: Context, limit: Option<usize>) -> Result<()> {
    let mut changes = ctx.changes.read_all()?;
    let total = changes.len();
    if let Some(limit) = limit {
        let skip = total.saturating_sub(limit);
        changes.drain(..skip);
    }

    let mut human = HumanOutput::new(format!("tagsync changes: {total} outstanding"));
    if !ctx.config.store.record_changes {
        human.push_warning("change recording is disabled in .tagsync.toml");
    }
    for change in &changes {
        human.push_detail(format!(
            "{} {:?} {:?} row {}",
            change.timestamp.to_rfc3339(),
            change.table,
            change.action,
            change.row_id
        ));
    }

    emit_success(
        ctx.output,
        "changes",
        &ChangesReport { total, changes },
        Some(&human),
    )
}
