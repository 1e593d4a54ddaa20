use polars::prelude::DataFrame;

/// Result of a cleaning or transformation stage.
///
/// A stage never discards its table: on failure it still hands back the best data it
/// has, alongside the error and whatever it managed to record before failing.
#[derive(Debug)]
pub enum StageOutcome<R, E> {
    Completed {
        table: DataFrame,
        report: R,
    },
    Failed {
        table: DataFrame,
        report: R,
        error: E,
    },
}

impl<R, E> StageOutcome<R, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }

    pub fn table(&self) -> &DataFrame {
        match self {
            StageOutcome::Completed { table, .. } | StageOutcome::Failed { table, .. } => table,
        }
    }

    pub fn report(&self) -> &R {
        match self {
            StageOutcome::Completed { report, .. } | StageOutcome::Failed { report, .. } => report,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            StageOutcome::Completed { .. } => None,
            StageOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn into_table(self) -> DataFrame {
        self.into_parts().0
    }

    pub fn into_parts(self) -> (DataFrame, R, Option<E>) {
        match self {
            StageOutcome::Completed { table, report } => (table, report, None),
            StageOutcome::Failed {
                table,
                report,
                error,
            } => (table, report, Some(error)),
        }
    }
}
