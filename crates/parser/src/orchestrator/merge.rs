use std::collections::HashMap;

use crate::model::{Detection, Meta};

/// Drop repeated `(event_id, version)` pairs and sort by timestamp.
///
/// The last-encountered duplicate wins and keeps its own encounter position
/// as the tiebreak for equal timestamps. Returns the merged list and the
/// number of detections removed.
pub fn merge_detections(detections: Vec<Detection>) -> (Vec<Detection>, usize) {
    let mut slots: Vec<Option<Detection>> = Vec::with_capacity(detections.len());
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut removed = 0;

    for detection in detections {
        let key = (detection.event_id.clone(), detection.version.clone());
        if let Some(prev) = seen.insert(key, slots.len()) {
            slots[prev] = None;
            removed += 1;
        }
        slots.push(Some(detection));
    }

    let mut merged: Vec<Detection> = slots.into_iter().flatten().collect();
    merged.sort_by_key(|d| d.timestamp);
    (merged, removed)
}

/// Fill missing run bounds from already-sorted detections.
pub fn fill_bounds(meta: &mut Meta, sorted: &[Detection]) {
    if meta.started_at.is_none() {
        meta.started_at = sorted.first().map(|d| d.timestamp);
    }
    if meta.finished_at.is_none() {
        meta.finished_at = sorted.last().map(|d| d.timestamp);
    }
}
