//! The scheduling pass: promotes waiting jobs while CPU slots are free.

use std::num::NonZeroUsize;

use tracing::warn;

use crate::job::{JOBS_TARGET, JobId, JobState, ProcessDriver};
use crate::registry::{JobTable, StateFilter};

/// What a scheduling pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Jobs started, in table order.
    pub started: Vec<JobId>,
    /// Jobs whose start failed; they remain waiting.
    pub deferred: Vec<JobId>,
}

/// Starts waiting jobs in table order until `budget` jobs are running.
///
/// A job that fails to start stays waiting and the pass moves on to the next
/// one. There is no backoff: the next attempt happens on the next pass.
pub fn schedule<D>(table: &mut JobTable, driver: &mut D, budget: NonZeroUsize) -> ScheduleReport
where
    D: ProcessDriver + ?Sized,
{
    let mut report = ScheduleReport::default();
    let mut running = table.count_in_state(StateFilter::Only(JobState::Running));
    if running >= budget.get() {
        return report;
    }

    for position in table.positions_in_state(StateFilter::Only(JobState::Waiting)) {
        if running >= budget.get() {
            break;
        }
        let Some(job) = table.get_mut(position) else {
            continue;
        };
        match job.run(driver) {
            Ok(_) => {
                running += 1;
                report.started.push(job.uid());
            }
            Err(error) => {
                warn!(
                    target: JOBS_TARGET,
                    uid = %job.uid(),
                    error = %error,
                    "job start deferred"
                );
                report.deferred.push(job.uid());
            }
        }
    }
    report
}
