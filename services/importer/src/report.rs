//! Progress/Result Reporter - final summary of an import run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::loader::{LoadOutcome, RowError};
use crate::model::Dimension;
use crate::upsert::UpsertOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    /// Share of source rows that became sales, in percent
    pub success_rate: f64,
    pub unresolved: usize,
    pub failed: usize,
    pub dimensions: BTreeMap<Dimension, UpsertOutcome>,
    pub errors: Vec<RowError>,
}

/// Aggregate the fact load counts into a report.
pub fn summarize(inserted: usize, skipped: usize, total: usize) -> LoadReport {
    let success_rate = if total == 0 {
        0.0
    } else {
        inserted as f64 / total as f64 * 100.0
    };

    LoadReport {
        total,
        inserted,
        skipped,
        success_rate,
        unresolved: 0,
        failed: 0,
        dimensions: BTreeMap::new(),
        errors: Vec::new(),
    }
}

impl LoadReport {
    pub fn with_upserts(mut self, upserts: BTreeMap<Dimension, UpsertOutcome>) -> Self {
        self.dimensions = upserts;
        self
    }

    pub fn with_load(mut self, outcome: &LoadOutcome) -> Self {
        self.unresolved = outcome.unresolved;
        self.failed = outcome.failed;
        self.errors = outcome.errors.clone();
        self
    }

    /// Every source row is accounted for.
    pub fn is_balanced(&self) -> bool {
        self.inserted + self.skipped == self.total
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        for (dimension, outcome) in &self.dimensions {
            writeln!(
                f,
                "{:<10} {} distinct, {} inserted, {} existing, {} failed",
                dimension.table(),
                group_thousands(outcome.distinct),
                group_thousands(outcome.inserted),
                group_thousands(outcome.existing),
                group_thousands(outcome.failed),
            )?;
        }
        writeln!(
            f,
            "Inserted {} of {} sales ({:.1}%)",
            group_thousands(self.inserted),
            group_thousands(self.total),
            self.success_rate
        )?;
        if self.skipped > 0 {
            writeln!(
                f,
                "Skipped {} rows ({} unresolved keys, {} errors)",
                group_thousands(self.skipped),
                group_thousands(self.unresolved),
                group_thousands(self.failed)
            )?;
            for err in &self.errors {
                writeln!(f, "  line {}: {}", err.line, err.reason)?;
            }
        }
        write!(f, "{rule}")
    }
}

/// 1234567 -> "1,234,567"
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
