//! Replay driver: walks a recorded reading log through the estimator.

use log::info;

use crate::io::readings::ReadingLog;
use crate::sim::entity::{Estimator, StatusRecord, StepError, SteppedEntity};

/// Summary of a completed replay.
#[derive(Debug, Clone, Copy)]
pub struct ReplaySummary {
    /// Step invocations performed.
    pub steps: u64,
    /// Estimation cycles persisted.
    pub cycles: u64,
    /// Final accumulation snapshot.
    pub last_status: StatusRecord,
}

/// Drives the estimator from time zero: it is invoked at every reading
/// timestamp and every wake time it asks for, until neither remains or
/// the horizon is passed.
pub fn replay(
    estimator: &mut Estimator,
    log: &ReadingLog,
    horizon: u64,
) -> Result<ReplaySummary, StepError> {
    let frames = log.frames();
    let mut index = 0;
    let mut time = 0u64;
    let mut steps = 0u64;
    loop {
        let batch = if index < frames.len() && frames[index].time == time {
            let readings = frames[index].readings.clone();
            index += 1;
            readings
        } else {
            Vec::new()
        };
        let wake = estimator.step(time, &batch)?;
        steps += 1;

        let next_frame = frames.get(index).map(|f| f.time);
        let next = match (wake, next_frame) {
            (Some(w), Some(f)) => w.min(f),
            (Some(w), None) => w,
            (None, Some(f)) => f,
            (None, None) => break,
        };
        if next > horizon {
            break;
        }
        time = next;
    }
    info!("replay finished at t={time} after {steps} steps");
    Ok(ReplaySummary {
        steps,
        cycles: estimator.cycles(),
        last_status: estimator.status(),
    })
}
