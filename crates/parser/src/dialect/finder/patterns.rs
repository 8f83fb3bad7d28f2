//! Line patterns of the Finder family.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex compiles")
}

pub(super) static EVENT_ID: Lazy<Regex> = Lazy::new(|| compile(r"\bevent_id\s*=\s*(\d+)"));

/// `-> get_<name> = <value>` solution metrics, keyed by their stable name.
pub(super) static METRICS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("mag", r"->\s*get_mag\s*=\s*(\S+)"),
        ("mag_uncer", r"->\s*get_mag_uncer\s*=\s*(\S+)"),
        ("epicenter_lat", r"->\s*get_epicenter_lat\s*=\s*(\S+)"),
        ("epicenter_lat_uncer", r"->\s*get_epicenter_lat_uncer\s*=\s*(\S+)"),
        ("epicenter_lon", r"->\s*get_epicenter_lon\s*=\s*(\S+)"),
        ("epicenter_lon_uncer", r"->\s*get_epicenter_lon_uncer\s*=\s*(\S+)"),
        ("depth", r"->\s*get_depth\s*=\s*(\S+)"),
        ("depth_uncer", r"->\s*get_depth_uncer\s*=\s*(\S+)"),
        ("likelihood", r"->\s*get_likelihood\s*=\s*(\S+)"),
        ("origin_time", r"->\s*get_origin_time\s*=\s*(\S+)"),
        ("origin_time_uncer", r"->\s*get_origin_time_uncer\s*=\s*(\S+)"),
        ("num_stations", r"->\s*get_num_stations\s*=\s*(\S+)"),
        ("azimuth", r"->\s*get_azimuth\s*=\s*(\S+)"),
    ]
    .into_iter()
    .map(|(key, pat)| (key, compile(pat)))
    .collect()
});

pub(super) static RUPTURE_LIST: Lazy<Regex> = Lazy::new(|| compile(r"get_rupture_list\s*=\s*(.*)"));
pub(super) static RUPTURE_POINT: Lazy<Regex> =
    Lazy::new(|| compile(r"(-?[\d.]+)/(-?[\d.]+)/(-?[\d.]+)"));
/// Continuation line holding only `lat/lon/depth` triplets.
pub(super) static RUPTURE_LINE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(?:-?[\d.]+/-?[\d.]+/-?[\d.]+\s*)+$"));

pub(super) static SOLUTION_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| compile(r"SOLUTION TEMPLATE:\s*Template file name\s*=\s*(\S+)"));
pub(super) static SOLUTION_COORDS: Lazy<Regex> = Lazy::new(|| compile(r"SOLUTION COORDINATES:\s*(.*)"));
pub(super) static SOLUTION_RUPTURE: Lazy<Regex> = Lazy::new(|| compile(r"SOLUTION RUPTURE:\s*(.*)"));
pub(super) static SOLUTION_VERSION: Lazy<Regex> = Lazy::new(|| compile(r"\bVersion\s+(\d+)\b"));
pub(super) static FINDER_FLAG: Lazy<Regex> =
    Lazy::new(|| compile(r"process:\s*initial\s*finder_flags_new\.(\w+)\s*=\s*(\S+)"));

pub(super) static STATION_HEADER: Lazy<Regex> = Lazy::new(|| {
    compile(r"The stations that exceeded the minimum threshold|Stations with PGA above the min threshold")
});
pub(super) static STATION_ROW: Lazy<Regex> = Lazy::new(|| {
    compile(r"\s*([^\s,]+)\s*(-?[\d.]+)/(-?[\d.]+)\s*--\s*([-\d.eE+]+)\s*(\d+\.\d*)\s*include\s*=\s*(\d)")
});

pub(super) static PLAYBACK_START: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\d{4}[/-]\d{2}[/-]\d{2}\s+\d{2}:\d{2}:\d{2}\S*\s+\[notice/Application\]\s+Starting scfinder")
});

pub(super) static LEGACY_TIMESTAMP: Lazy<Regex> = Lazy::new(|| compile(r"\bTimestamp\s*=\s*(\d+)"));
pub(super) static LEGACY_PROCESS_TS: Lazy<Regex> =
    Lazy::new(|| compile(r"timestamp in process function\s*=\s*(\d+)"));
