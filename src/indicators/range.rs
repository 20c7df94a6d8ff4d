/// Lowest and highest close over a trailing window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseRange {
    pub low: f64,
    pub high: f64,
}

/// Min/max of the last `lookback` closes, latest close included
pub fn close_range(closes: &[f64], lookback: usize) -> Option<CloseRange> {
    if lookback == 0 || closes.len() < lookback {
        return None;
    }

    let window = &closes[closes.len() - lookback..];
    let low = window.iter().copied().fold(f64::INFINITY, f64::min);
    let high = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(CloseRange { low, high })
}
