//! Backward rescan
//!
//! After a restart the consumer's own progress marker and the downstream's
//! low watermark can disagree. Walking back from the marker to the newest
//! segment whose checkpoint the downstream already covers finds the point
//! where nothing confirmed is re-sent and nothing unconfirmed is skipped.

use std::time::Duration;

use tracing::{debug, info};

use super::catalog::SegmentSet;
use crate::error::Result;
use crate::record::Position;

/// Find the anchor segment for a consumer resuming with low watermark `lwm`
///
/// Scans backward from `from`. The first segment whose checkpoint is `<= lwm`
/// is the anchor: everything in it and before it has been applied. Returns 0
/// when there is no low watermark or no segment qualifies. Reading resumes at
/// `anchor + 1`.
///
/// Segments that are missing or still in progress are waited for (see
/// [`SegmentSet::wait_for_complete`]).
pub fn find_resume_anchor<P>(
    segments: &SegmentSet,
    from: u64,
    lwm: Option<&Position>,
    poll: Duration,
    mut probe: P,
) -> Result<u64>
where
    P: FnMut() -> Result<()>,
{
    let Some(lwm) = lwm else {
        info!(from, "downstream has no low watermark, replaying from the first segment");
        return Ok(0);
    };

    let mut sequence = from;
    while sequence >= 1 {
        let reader = segments.wait_for_complete(sequence, poll, &mut probe)?;
        let checkpoint = reader.checkpoint();
        debug!(sequence, checkpoint = %checkpoint, lwm = %lwm, "rescanning segment");

        if checkpoint <= lwm {
            info!(anchor = sequence, lwm = %lwm, "found resume anchor");
            return Ok(sequence);
        }
        sequence -= 1;
    }

    info!(from, lwm = %lwm, "no segment is covered by the low watermark");
    Ok(0)
}
