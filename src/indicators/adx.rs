/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// +DI and -DI give the direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend

use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxReading {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Calculate the latest ADX, +DI and -DI
///
/// TR, +DM and -DM are Wilder-smoothed into a DX series, and the DX series is
/// Wilder-smoothed again into ADX. Needs `2 * period` candles.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<AdxReading> {
    if period == 0 || candles.len() < 2 * period {
        return None;
    }

    // Step 1: True Range and Directional Movement per bar
    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    let mut plus_dms = Vec::with_capacity(candles.len() - 1);
    let mut minus_dms = Vec::with_capacity(candles.len() - 1);

    for pair in candles.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);

        let tr = (current.high - current.low)
            .max((current.high - prev.close).abs())
            .max((current.low - prev.close).abs());
        true_ranges.push(tr);

        let up_move = current.high - prev.high;
        let down_move = prev.low - current.low;

        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    // Step 2: Wilder smoothing of each component
    let smoothed_tr = wilder_series(&true_ranges, period);
    let smoothed_plus = wilder_series(&plus_dms, period);
    let smoothed_minus = wilder_series(&minus_dms, period);

    // Step 3: DI lines and DX per smoothed bar
    let mut dx_series = Vec::with_capacity(smoothed_tr.len());
    let mut last_di = (0.0, 0.0);

    for ((tr, plus_dm), minus_dm) in smoothed_tr.iter().zip(&smoothed_plus).zip(&smoothed_minus) {
        let (plus_di, minus_di) = if *tr > 0.0 {
            (plus_dm / tr * 100.0, minus_dm / tr * 100.0)
        } else {
            (0.0, 0.0)
        };

        let di_sum = plus_di + minus_di;
        dx_series.push(if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        });
        last_di = (plus_di, minus_di);
    }

    // Step 4: ADX is the smoothed DX
    let adx = *wilder_series(&dx_series, period).last()?;

    Some(AdxReading {
        adx,
        plus_di: last_di.0,
        minus_di: last_di.1,
    })
}

/// Wilder's smoothing, returning every smoothed value
///
/// The first value is the simple average of the first `period` inputs.
fn wilder_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }

    let mut smoothed = values[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(smoothed);

    for value in &values[period..] {
        smoothed = (smoothed * (period as f64 - 1.0) + value) / period as f64;
        series.push(smoothed);
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(closes: &[f64], wick: f64) -> Vec<Candle> {
        let start = Utc::now() - chrono::Duration::hours(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "TEST".to_string(),
                open_time: start + chrono::Duration::hours(i as i64),
                close_time: start + chrono::Duration::hours(i as i64 + 1),
                open: close,
                high: close + wick,
                low: close - wick,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_adx_strong_uptrend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + 3.0 * i as f64).collect();
        let candles = create_test_candles(&closes, 1.0);

        let reading = calculate_adx(&candles, 14).unwrap();

        assert!(reading.plus_di > reading.minus_di, "+DI should be > -DI in uptrend");
        assert!(reading.adx > 25.0, "steady climb should read as trending, got {:.2}", reading.adx);
    }

    #[test]
    fn test_adx_choppy_market() {
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 102.0 })
            .collect();
        let candles = create_test_candles(&closes, 1.0);

        let reading = calculate_adx(&candles, 14).unwrap();

        assert!(
            reading.adx < 20.0,
            "ADX should be low in a ranging market, got {:.2}",
            reading.adx
        );
    }

    #[test]
    fn test_adx_needs_two_periods() {
        let closes = vec![100.0; 27];
        let candles = create_test_candles(&closes, 1.0);
        assert!(calculate_adx(&candles, 14).is_none());

        let closes = vec![100.0; 28];
        let candles = create_test_candles(&closes, 1.0);
        assert!(calculate_adx(&candles, 14).is_some());
    }

    #[test]
    fn test_wilder_series_seed_and_length() {
        let series = wilder_series(&[2.0, 4.0, 6.0, 8.0], 2);
        assert_eq!(series, vec![3.0, 4.5, 6.25]);
    }
}
