use std::path::Path;

use calamine::DataType;
use survey_view::{excel_serial_to_datetime, RawCell};

/// The name of the file, used to tag the rows that come out of it.
pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn cell_to_raw(cell: &DataType) -> RawCell {
    match cell {
        DataType::String(s) => RawCell::Text(s.clone()),
        DataType::Float(f) => RawCell::Number(*f),
        DataType::Int(i) => RawCell::Number(*i as f64),
        DataType::Bool(b) => RawCell::Bool(*b),
        DataType::DateTime(f) => match excel_serial_to_datetime(*f) {
            Some(dt) => RawCell::DateTime(dt),
            None => RawCell::Number(*f),
        },
        // Formula errors (#N/A, #DIV/0!) are missing values.
        _ => RawCell::Empty,
    }
}

/// The name of a column, as written in the header row.
pub fn header_name(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.trim().to_string(),
        DataType::Empty => "".to_string(),
        x => x.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn cells() {
        assert_eq!(
            cell_to_raw(&DataType::String("a".to_string())),
            RawCell::Text("a".to_string())
        );
        assert_eq!(cell_to_raw(&DataType::Int(3)), RawCell::Number(3.0));
        assert_eq!(cell_to_raw(&DataType::Empty), RawCell::Empty);
        assert_eq!(
            cell_to_raw(&DataType::DateTime(45353.5)),
            RawCell::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 2)
                    .and_then(|d| d.and_hms_opt(12, 0, 0))
                    .unwrap()
            )
        );
    }

    #[test]
    fn headers() {
        assert_eq!(header_name(&DataType::String(" KEY ".to_string())), "KEY");
        assert_eq!(header_name(&DataType::Empty), "");
        assert_eq!(header_name(&DataType::Int(7)), "7");
    }

    #[test]
    fn file_names() {
        assert_eq!(
            simplify_file_name(Path::new("/data/exports/round1.xlsx")),
            "round1.xlsx"
        );
    }
}
