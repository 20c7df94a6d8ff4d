/// Calculate Simple Moving Average (SMA) of the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate the latest Exponential Moving Average (EMA)
///
/// Seeded with the SMA of the first `period` prices, then smoothed with
/// `2 / (period + 1)` over the remainder of the series.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = calculate_sma(&prices[..period], period)?;

    Some(
        prices[period..]
            .iter()
            .fold(seed, |ema, price| (price - ema) * multiplier + ema),
    )
}
