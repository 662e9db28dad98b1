//! Human-readable byte sizes, e.g. `"24 Kb"` or `"456.12 Mb"`.

const GRADES: [&str; 3] = ["Kb", "Mb", "Gb"];

/// Format `bytes` in the first grade that keeps the number below 500.
///
/// Each step divides by 1024 and rounds to two decimals; kilobytes are
/// additionally rounded up to a whole number. Gigabytes are the last grade.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut label = String::new();
    for (index, grade) in GRADES.iter().enumerate() {
        size = round2(size / 1024.0);
        if index == 0 {
            size = size.ceil();
        }
        label = format!("{size} {grade}");
        if size < 500.0 {
            break;
        }
    }
    label
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
