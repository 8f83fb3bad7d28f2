//! Station table rows: `<SNCL> <lat>/<lon> -- <pga> <epoch> include = <0|1>`.

use chrono::{DateTime, Utc};

use super::patterns::STATION_ROW;
use crate::model::GmObs;
use crate::time::epoch_to_utc;

/// One parsed table row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StationRow {
    pub obs: GmObs,
    pub include: bool,
}

/// Every row on the line. Some logs wrap several rows onto one line.
pub(crate) fn parse_rows(line: &str, fallback: DateTime<Utc>) -> Vec<StationRow> {
    STATION_ROW
        .captures_iter(line)
        .map(|caps| StationRow {
            obs: GmObs {
                orig_sys: Some("finder".to_string()),
                sncl: caps[1].trim().to_string(),
                value: caps[4].to_string(),
                lat: caps[2].to_string(),
                lon: caps[3].to_string(),
                time: epoch_to_utc(&caps[5]).unwrap_or(fallback),
                extra: Default::default(),
            },
            include: &caps[6] == "1",
        })
        .collect()
}

/// Rows kept for attachment, or `None` when the line is not a table row.
pub(crate) fn included(line: &str, fallback: DateTime<Utc>) -> Option<Vec<GmObs>> {
    let rows = parse_rows(line, fallback);
    if rows.is_empty() {
        return None;
    }
    Some(rows.into_iter().filter(|r| r.include).map(|r| r.obs).collect())
}
