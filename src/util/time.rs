use chrono::{DateTime, Utc};

// Stamp used in default export file names, e.g. 20260119_142501
pub fn export_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
