//! Simple Moving Average (SMA) over an arbitrary series.
//!
//! Rolling mean over a fixed window. The first valid value sits at index
//! `period - 1`; a NaN anywhere in the window makes that output NaN.

/// Rolling mean of `values` over `period`.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for &v in values.iter().take(period) {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }
    }
    if nan_count == 0 {
        result[period - 1] = sum / period as f64;
    }

    for i in period..n {
        let leaving = values[i - period];
        let entering = values[i];
        if leaving.is_nan() {
            nan_count -= 1;
        } else {
            sum -= leaving;
        }
        if entering.is_nan() {
            nan_count += 1;
        } else {
            sum += entering;
        }
        if nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}
