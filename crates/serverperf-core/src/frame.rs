use polars::prelude::*;

pub(crate) fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub(crate) fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Reads a column as `f64` values; any value that cannot be represented as a number fails.
pub(crate) fn float_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .strict_cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

pub(crate) fn zero_column(name: &str, height: usize) -> Series {
    Series::new(name.into(), vec![0.0f64; height])
}
