use polars::prelude::*;

use crate::diagnostics::{Reporter, Stage};
use crate::frame::column_names;

/// A cleaned table together with the sheet it was read from.
#[derive(Debug, Clone)]
pub struct StationTable {
    pub sheet: String,
    pub table: DataFrame,
}

/// Stacks station tables vertically over the union of their columns.
///
/// Columns a station lacks are null-filled. Columns whose dtypes disagree across stations
/// are widened to `Float64` when every side is numeric and to `String` otherwise. The result
/// keeps the lexicographic column order the cleaner produces. When `station_column` is
/// given, each row is tagged with its source sheet first.
pub fn concat_stations(
    stations: &[StationTable],
    station_column: Option<&str>,
    reporter: &dyn Reporter,
) -> PolarsResult<DataFrame> {
    let mut frames = Vec::with_capacity(stations.len());
    for station in stations {
        let mut frame = station.table.clone();
        if let Some(column) = station_column {
            let tag = vec![station.sheet.as_str(); frame.height()];
            frame.with_column(Series::new(column.into(), tag))?;
        }
        frames.push(frame);
    }

    let mut union: Vec<String> = Vec::new();
    for frame in &frames {
        for name in column_names(frame) {
            if !union.contains(&name) {
                union.push(name);
            }
        }
    }
    union.sort();

    let mut dtypes = Vec::with_capacity(union.len());
    for name in &union {
        let seen: Vec<&DataType> = frames
            .iter()
            .filter_map(|frame| frame.column(name).ok().map(|column| column.dtype()))
            .collect();
        dtypes.push(common_dtype(&seen));
    }

    let mut combined: Option<DataFrame> = None;
    for frame in &frames {
        let mut columns = Vec::with_capacity(union.len());
        for (name, dtype) in union.iter().zip(&dtypes) {
            let column = match frame.column(name) {
                Ok(existing) if existing.dtype() == dtype => existing.clone(),
                Ok(existing) => existing.cast(dtype)?,
                Err(_) => Series::full_null(name.as_str().into(), frame.height(), dtype).into(),
            };
            columns.push(column);
        }
        let aligned = DataFrame::new(columns)?;
        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => combined = Some(aligned),
        }
    }

    let combined = combined.unwrap_or_default();
    reporter.info(
        Stage::Combine,
        &format!(
            "Combined {} station tables: {} rows, {} columns",
            stations.len(),
            combined.height(),
            combined.width()
        ),
    );
    Ok(combined)
}

fn common_dtype(dtypes: &[&DataType]) -> DataType {
    let Some(first) = dtypes.first() else {
        return DataType::String;
    };
    if dtypes.iter().all(|dtype| dtype == first) {
        return (*first).clone();
    }
    if dtypes.iter().all(|dtype| is_number(dtype)) {
        DataType::Float64
    } else {
        DataType::String
    }
}

fn is_number(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
            | DataType::Null
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingReporter;

    fn station(sheet: &str, table: DataFrame) -> StationTable {
        StationTable {
            sheet: sheet.to_string(),
            table,
        }
    }

    #[test]
    fn unions_columns_and_widens_dtypes() -> PolarsResult<()> {
        let first = DataFrame::new(vec![
            Series::new("Rack".into(), &[1i64, 2]).into(),
            Series::new("Server_ID".into(), &["S1", "S2"]).into(),
        ])?;
        let second = DataFrame::new(vec![
            Series::new("Rack".into(), &[3.5f64]).into(),
            Series::new("Server_ID".into(), &["S3"]).into(),
            Series::new("Zone".into(), &["east"]).into(),
        ])?;

        let reporter = RecordingReporter::new();
        let combined = concat_stations(
            &[station("Station1", first), station("Station2", second)],
            None,
            &reporter,
        )?;

        assert_eq!(combined.shape(), (3, 3));
        assert_eq!(combined.get_column_names(), vec!["Rack", "Server_ID", "Zone"]);
        assert_eq!(combined.column("Rack")?.dtype(), &DataType::Float64);
        assert_eq!(combined.column("Zone")?.null_count(), 2);
        assert!(reporter.contains(Stage::Combine, "3 rows"));
        Ok(())
    }

    #[test]
    fn tags_rows_with_their_sheet() -> PolarsResult<()> {
        let first = DataFrame::new(vec![Series::new("Server_ID".into(), &["S1"]).into()])?;
        let second = DataFrame::new(vec![Series::new("Server_ID".into(), &["S2", "S3"]).into()])?;

        let combined = concat_stations(
            &[station("Station1", first), station("Station2", second)],
            Some("Station"),
            &RecordingReporter::new(),
        )?;

        let tags: Vec<Option<&str>> = combined.column("Station")?.str()?.into_iter().collect();
        assert_eq!(
            tags,
            vec![Some("Station1"), Some("Station2"), Some("Station2")]
        );
        Ok(())
    }
}
