//! Stateless feature scaling, fitted to whatever rows are passed in.
//!
//! Both scalers treat a scale below `10 * f64::EPSILON` as 1 so constant
//! inputs map to finite values instead of dividing by zero. With a single
//! row this makes standardization return 0.0 for every finite value.
//!
//! The normalizer accepts finite values only. The standard scaler accepts
//! NaN, which stays NaN, but rejects infinities.

use crate::error::FeatureError;
use ndarray::{Array2, Axis};

fn handle_zero_scale(scale: f64) -> f64 {
    if scale < 10.0 * f64::EPSILON {
        1.0
    } else {
        scale
    }
}

/// First value rejected by `is_bad`, reported under its column name.
fn check_columns(
    values: &Array2<f64>,
    columns: &[&str],
    is_bad: impl Fn(f64) -> bool,
) -> Result<(), FeatureError> {
    match values.indexed_iter().find(|(_, &v)| is_bad(v)) {
        Some(((_, j), _)) => Err(FeatureError::NonFinite {
            field: columns
                .get(j)
                .map_or_else(|| format!("column {j}"), |name| name.to_string()),
        }),
        None => Ok(()),
    }
}

/// Scale every row to unit L2 norm. All-zero rows are left unchanged.
///
/// `columns` names the columns for error messages.
pub fn normalize_rows(rows: &mut Array2<f64>, columns: &[&str]) -> Result<(), FeatureError> {
    check_columns(rows, columns, |v| !v.is_finite())?;

    for mut row in rows.rows_mut() {
        let norm = handle_zero_scale(row.dot(&row).sqrt());
        row.mapv_inplace(|v| v / norm);
    }
    Ok(())
}

/// Center every column to zero mean and scale to unit (population) variance.
///
/// `columns` names the columns for error messages.
pub fn standardize_columns(
    values: &mut Array2<f64>,
    columns: &[&str],
) -> Result<(), FeatureError> {
    check_columns(values, columns, f64::is_infinite)?;

    let Some(means) = values.mean_axis(Axis(0)) else {
        return Ok(());
    };
    let variances = values.var_axis(Axis(0), 0.0);

    for ((mut column, &mean), &variance) in values
        .columns_mut()
        .into_iter()
        .zip(means.iter())
        .zip(variances.iter())
    {
        let scale = handle_zero_scale(variance.sqrt());
        column.mapv_inplace(|v| (v - mean) / scale);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const NAMES: [&str; 3] = ["a", "b", "c"];

    #[test]
    fn test_normalize_unit_norm() {
        let mut rows = array![[3.0, 4.0, 0.0], [0.0, 0.0, 2.0]];
        normalize_rows(&mut rows, &NAMES).unwrap();
        assert_eq!(rows, array![[0.6, 0.8, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_normalize_zero_row() {
        let mut rows = array![[0.0, 0.0, 0.0]];
        normalize_rows(&mut rows, &NAMES).unwrap();
        assert_eq!(rows, array![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_normalize_rejects_non_finite() {
        let mut rows = array![[1.0, f64::NAN, 2.0]];
        assert_eq!(
            normalize_rows(&mut rows, &NAMES),
            Err(FeatureError::NonFinite {
                field: "b".to_string()
            })
        );

        let mut rows = array![[1.0, 2.0, f64::NEG_INFINITY]];
        assert_eq!(
            normalize_rows(&mut rows, &NAMES),
            Err(FeatureError::NonFinite {
                field: "c".to_string()
            })
        );
    }

    #[test]
    fn test_standardize_single_row_is_zero() {
        let mut rows = array![[35.0, 50000.0, 10000.0, 612.3, 5.5, 36.0, 1.0]];
        standardize_columns(&mut rows, &[]).unwrap();
        assert!(rows.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_standardize_multiple_rows() {
        let mut rows = array![[1.0, 5.0], [3.0, 5.0]];
        standardize_columns(&mut rows, &NAMES).unwrap();
        assert_eq!(rows, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_standardize_keeps_nan() {
        let mut rows = array![[f64::NAN, 2.0]];
        standardize_columns(&mut rows, &NAMES).unwrap();
        assert!(rows[[0, 0]].is_nan());
        assert_eq!(rows[[0, 1]], 0.0);
    }

    #[test]
    fn test_standardize_rejects_infinity() {
        let mut rows = array![[1.0, 2.0, f64::INFINITY, 4.0]];
        assert_eq!(
            standardize_columns(&mut rows, &NAMES),
            Err(FeatureError::NonFinite {
                field: "c".to_string()
            })
        );

        let mut rows = array![[1.0, 2.0, 3.0, f64::INFINITY]];
        assert_eq!(
            standardize_columns(&mut rows, &NAMES),
            Err(FeatureError::NonFinite {
                field: "column 3".to_string()
            })
        );
    }
}
