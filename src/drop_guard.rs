use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "dataset would shrink from {previous} to {new} records ({:.1}% drop > {:.1}% threshold); rerun with --force-accept-drop to publish anyway",
    .ratio * 100.0,
    .threshold * 100.0
)]
pub struct DropGuardTripped {
    pub previous: usize,
    pub new: usize,
    pub ratio: f64,
    pub threshold: f64,
}

/// Refuses to publish a dataset that shrank too much since the previous run.
#[derive(Debug, Clone, Copy)]
pub struct DropGuard {
    threshold: f64,
    overridden: bool,
}

impl DropGuard {
    pub fn new(threshold: f64, overridden: bool) -> Self {
        Self {
            threshold,
            overridden,
        }
    }

    /// Fraction of the previous dataset that would disappear; 0 when it grew.
    pub fn drop_ratio(previous: usize, new: usize) -> f64 {
        if previous == 0 || new >= previous {
            return 0.0;
        }
        (previous - new) as f64 / previous as f64
    }

    pub fn check(&self, previous: usize, new: usize) -> Result<(), DropGuardTripped> {
        if previous == 0 {
            return Ok(());
        }

        let ratio = Self::drop_ratio(previous, new);
        if ratio <= self.threshold {
            return Ok(());
        }

        if self.overridden {
            tracing::warn!(
                "Accepting {:.1}% dataset drop ({} -> {}) because the drop guard is overridden",
                ratio * 100.0,
                previous,
                new
            );
            return Ok(());
        }

        Err(DropGuardTripped {
            previous,
            new,
            ratio,
            threshold: self.threshold,
        })
    }
}
