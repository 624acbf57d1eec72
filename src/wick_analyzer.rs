// =============================================================================
// Wick Analyzer — upper/lower wick size of a single candle
// =============================================================================
//
//   upper wick % = (high - body_top) / body_top * 100
//   lower wick % = (body_bottom - low) / low * 100
//
// A candle is tagged LowerWick or UpperWick when the matching percentage
// reaches its threshold.  Two policies decide what happens when both do:
//
//   Priority:  the lower wick wins.
//   Exclusive: the candle is Neutral.
//
// Degenerate inputs (zero or negative prices, inverted OHLC, NaN) resolve to
// 0% and Neutral; `classify` never fails.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::types::{ClassificationMode, Trend, TrendConvention, WickType};

/// Thresholds and policies for [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    pub upper_threshold_pct: f64,
    pub lower_threshold_pct: f64,
    pub mode: ClassificationMode,
    pub trend_convention: TrendConvention,
    pub include_total_range: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            upper_threshold_pct: 0.4,
            lower_threshold_pct: 0.4,
            mode: ClassificationMode::Priority,
            trend_convention: TrendConvention::WickBias,
            include_total_range: false,
        }
    }
}

/// Classification of one candle plus the numbers behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub wick_type: WickType,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub upper_wick_pct: f64,
    pub lower_wick_pct: f64,
    pub total_range_pct: Option<f64>,
    pub trend: Trend,
}

impl AnalysisResult {
    pub fn is_neutral(&self) -> bool {
        self.wick_type == WickType::Neutral
    }
}

/// `part / base * 100`, or 0 when the base is not positive or the result is
/// not a finite non-negative number.
fn pct_of(part: f64, base: f64) -> f64 {
    if base.is_nan() || base <= 0.0 {
        return 0.0;
    }
    let pct = part / base * 100.0;
    if pct.is_finite() && pct > 0.0 {
        pct
    } else {
        0.0
    }
}

/// Classify `candle` under `settings`.
pub fn classify(candle: &Candle, settings: &AnalyzerSettings) -> AnalysisResult {
    let body_top = candle.body_top();
    let body_bottom = candle.body_bottom();

    let upper_wick_pct = pct_of(candle.high - body_top, body_top);
    let lower_wick_pct = pct_of(body_bottom - candle.low, candle.low);

    let has_upper = upper_wick_pct >= settings.upper_threshold_pct;
    let has_lower = lower_wick_pct >= settings.lower_threshold_pct;

    let wick_type = match settings.mode {
        ClassificationMode::Priority => {
            if has_lower {
                WickType::LowerWick
            } else if has_upper {
                WickType::UpperWick
            } else {
                WickType::Neutral
            }
        }
        ClassificationMode::Exclusive => match (has_lower, has_upper) {
            (true, false) => WickType::LowerWick,
            (false, true) => WickType::UpperWick,
            _ => WickType::Neutral,
        },
    };

    let trend = match settings.trend_convention {
        TrendConvention::WickBias => match wick_type {
            WickType::LowerWick => Trend::Long,
            WickType::UpperWick => Trend::Short,
            WickType::Neutral => Trend::None,
        },
        TrendConvention::Body => {
            if candle.close > candle.open {
                Trend::Bullish
            } else if candle.close < candle.open {
                Trend::Bearish
            } else {
                Trend::Flat
            }
        }
    };

    let total_range_pct = settings
        .include_total_range
        .then(|| pct_of(candle.high - candle.low, candle.low));

    AnalysisResult {
        wick_type,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        upper_wick_pct,
        lower_wick_pct,
        total_range_pct,
        trend,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::from_millis(0, open, high, low, close)
    }

    fn settings(mode: ClassificationMode) -> AnalyzerSettings {
        AnalyzerSettings {
            mode,
            ..AnalyzerSettings::default()
        }
    }

    #[test]
    fn flat_candle_has_no_wicks() {
        for (o, c) in [(100.0, 101.0), (101.0, 100.0), (100.0, 100.0)] {
            let k = candle(o, o.max(c), o.min(c), c);
            let r = classify(&k, &settings(ClassificationMode::Priority));
            assert_eq!(r.upper_wick_pct, 0.0);
            assert_eq!(r.lower_wick_pct, 0.0);
            assert_eq!(r.wick_type, WickType::Neutral);
            assert!(r.is_neutral());
        }
    }

    #[test]
    fn small_lower_wick_is_neutral() {
        let r = classify(
            &candle(100.0, 101.0, 99.7, 101.0),
            &settings(ClassificationMode::Priority),
        );
        assert!((r.lower_wick_pct - 0.3009).abs() < 1e-3);
        assert_eq!(r.upper_wick_pct, 0.0);
        assert_eq!(r.wick_type, WickType::Neutral);
        assert_eq!(r.trend, Trend::None);
    }

    #[test]
    fn long_lower_wick_is_long_biased() {
        let r = classify(
            &candle(100.0, 100.0, 98.5, 99.0),
            &settings(ClassificationMode::Priority),
        );
        assert!((r.lower_wick_pct - 0.5076).abs() < 1e-3);
        assert_eq!(r.upper_wick_pct, 0.0);
        assert_eq!(r.wick_type, WickType::LowerWick);
        assert_eq!(r.trend, Trend::Long);
    }

    #[test]
    fn long_upper_wick_is_short_biased() {
        let r = classify(
            &candle(100.0, 101.0, 100.0, 100.2),
            &settings(ClassificationMode::Priority),
        );
        assert!((r.upper_wick_pct - 0.798).abs() < 1e-3);
        assert_eq!(r.wick_type, WickType::UpperWick);
        assert_eq!(r.trend, Trend::Short);
    }

    #[test]
    fn both_wicks_priority_vs_exclusive() {
        // Upper 1%, lower ~1.01%: both thresholds met.
        let k = candle(100.0, 101.0, 99.0, 100.0);
        let p = classify(&k, &settings(ClassificationMode::Priority));
        assert_eq!(p.wick_type, WickType::LowerWick);

        let e = classify(&k, &settings(ClassificationMode::Exclusive));
        assert_eq!(e.wick_type, WickType::Neutral);
        assert_eq!(e.trend, Trend::None);
    }

    #[test]
    fn exclusive_never_reports_a_wick_when_both_hold() {
        let s = AnalyzerSettings {
            upper_threshold_pct: 0.22,
            lower_threshold_pct: 0.29,
            ..settings(ClassificationMode::Exclusive)
        };
        for i in 0..200 {
            let base = 50.0 + i as f64;
            let spread = (i % 17) as f64 * 0.05;
            let k = candle(base, base + spread * 1.3, base - spread, base + spread * 0.2);
            let r = classify(&k, &s);
            let upper = r.upper_wick_pct >= s.upper_threshold_pct;
            let lower = r.lower_wick_pct >= s.lower_threshold_pct;
            match r.wick_type {
                WickType::LowerWick => assert!(lower && !upper),
                WickType::UpperWick => assert!(upper && !lower),
                WickType::Neutral => assert!(upper == lower),
            }
        }
    }

    #[test]
    fn degenerate_prices_resolve_to_zero() {
        let s = settings(ClassificationMode::Priority);

        let zero_low = classify(&candle(1.0, 2.0, 0.0, 1.5), &s);
        assert_eq!(zero_low.lower_wick_pct, 0.0);
        assert!(zero_low.upper_wick_pct >= 0.0);

        let all_zero = classify(&candle(0.0, 0.0, 0.0, 0.0), &s);
        assert_eq!(all_zero.upper_wick_pct, 0.0);
        assert_eq!(all_zero.lower_wick_pct, 0.0);
        assert_eq!(all_zero.wick_type, WickType::Neutral);

        // High below the body and low above it.
        let inverted = classify(&candle(100.0, 99.0, 101.0, 100.5), &s);
        assert_eq!(inverted.upper_wick_pct, 0.0);
        assert_eq!(inverted.lower_wick_pct, 0.0);

        let nan = classify(&candle(f64::NAN, 1.0, 1.0, 1.0), &s);
        assert!(nan.upper_wick_pct.is_finite());
        assert!(nan.lower_wick_pct.is_finite());
    }

    #[test]
    fn classify_is_deterministic() {
        let k = candle(27_000.5, 27_150.25, 26_890.0, 27_100.0);
        let s = AnalyzerSettings {
            include_total_range: true,
            ..AnalyzerSettings::default()
        };
        let a = classify(&k, &s);
        let b = classify(&k, &s);
        assert_eq!(a, b);
        assert_eq!(a.upper_wick_pct.to_bits(), b.upper_wick_pct.to_bits());
        assert_eq!(a.lower_wick_pct.to_bits(), b.lower_wick_pct.to_bits());
    }

    #[test]
    fn body_trend_and_total_range() {
        let s = AnalyzerSettings {
            trend_convention: TrendConvention::Body,
            include_total_range: true,
            ..AnalyzerSettings::default()
        };
        let up = classify(&candle(100.0, 102.0, 99.0, 101.0), &s);
        assert_eq!(up.trend, Trend::Bullish);
        let range = up.total_range_pct.unwrap();
        assert!((range - 3.0303).abs() < 1e-3);

        let down = classify(&candle(101.0, 102.0, 99.0, 100.0), &s);
        assert_eq!(down.trend, Trend::Bearish);

        let flat = classify(&candle(100.0, 100.0, 100.0, 100.0), &s);
        assert_eq!(flat.trend, Trend::Flat);
        assert_eq!(flat.total_range_pct, Some(0.0));

        let without = classify(&candle(100.0, 102.0, 99.0, 101.0), &AnalyzerSettings::default());
        assert_eq!(without.total_range_pct, None);
    }

    #[test]
    fn thresholds_are_inclusive() {
        // Lower wick exactly 25% of the low.
        let k = candle(10.0, 10.0, 8.0, 10.0);
        let s = AnalyzerSettings {
            lower_threshold_pct: 25.0,
            ..AnalyzerSettings::default()
        };
        let r = classify(&k, &s);
        assert_eq!(r.lower_wick_pct, 25.0);
        assert_eq!(r.wick_type, WickType::LowerWick);
    }
}
