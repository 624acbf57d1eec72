// =============================================================================
// Shared types used across the wick watcher
// =============================================================================

use serde::{Deserialize, Serialize};

/// One entry of the watch list: what to fetch for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Exchange symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Kline interval, e.g. "5m".
    pub interval: String,
    /// Number of most recent klines requested per fetch.
    pub limit: u32,
}

impl SymbolConfig {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, limit: u32) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            limit,
        }
    }
}

/// Whether the watch list is a single fixed pair or the top-N by volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    Fixed,
    TopVolume,
}

impl Default for WatchMode {
    fn default() -> Self {
        Self::TopVolume
    }
}

impl std::fmt::Display for WatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::TopVolume => write!(f, "top_volume"),
        }
    }
}

impl std::str::FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "top_volume" | "top-volume" | "top" => Ok(Self::TopVolume),
            other => Err(format!("unknown watch mode '{other}'")),
        }
    }
}

/// How the two wick thresholds combine into a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Lower wick wins when both thresholds are met.
    Priority,
    /// A candle meeting both thresholds is neutral.
    Exclusive,
}

impl Default for ClassificationMode {
    fn default() -> Self {
        Self::Priority
    }
}

impl std::str::FromStr for ClassificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(Self::Priority),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(format!("unknown classification mode '{other}'")),
        }
    }
}

/// How the trend tag of an analysis is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendConvention {
    /// LONG for a dominant lower wick, SHORT for a dominant upper wick.
    WickBias,
    /// Bullish/bearish from close vs. open.
    Body,
}

impl Default for TrendConvention {
    fn default() -> Self {
        Self::WickBias
    }
}

/// Which element of the returned kline array counts as the latest closed
/// candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePick {
    /// The final element (may still be forming at the moment of the request).
    Last,
    /// The element before the final one.
    SecondToLast,
}

impl Default for CandlePick {
    fn default() -> Self {
        Self::Last
    }
}

impl CandlePick {
    /// Offset from the end of the kline array (0 = last element).
    pub fn offset_from_end(self) -> usize {
        match self {
            Self::Last => 0,
            Self::SecondToLast => 1,
        }
    }
}

impl std::str::FromStr for CandlePick {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" => Ok(Self::Last),
            "second_to_last" | "second-to-last" => Ok(Self::SecondToLast),
            other => Err(format!("unknown candle pick policy '{other}'")),
        }
    }
}

/// Wick classification of a single candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WickType {
    LowerWick,
    UpperWick,
    Neutral,
}

impl std::fmt::Display for WickType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowerWick => write!(f, "LOWER WICK"),
            Self::UpperWick => write!(f, "UPPER WICK"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Direction tag attached to an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Long,
    Short,
    Bullish,
    Bearish,
    Flat,
    None,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Bullish => write!(f, "UP"),
            Self::Bearish => write!(f, "DOWN"),
            Self::Flat => write!(f, "FLAT"),
            Self::None => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_parse_from_env_strings() {
        assert_eq!("fixed".parse::<WatchMode>().unwrap(), WatchMode::Fixed);
        assert_eq!(" TOP_VOLUME ".parse::<WatchMode>().unwrap(), WatchMode::TopVolume);
        assert_eq!(
            "exclusive".parse::<ClassificationMode>().unwrap(),
            ClassificationMode::Exclusive
        );
        assert_eq!(
            "second_to_last".parse::<CandlePick>().unwrap(),
            CandlePick::SecondToLast
        );
        assert!("sideways".parse::<WatchMode>().is_err());
    }

    #[test]
    fn enums_use_snake_case_in_json() {
        let pick: CandlePick = serde_json::from_str(r#""second_to_last""#).unwrap();
        assert_eq!(pick, CandlePick::SecondToLast);
        let conv: TrendConvention = serde_json::from_str(r#""wick_bias""#).unwrap();
        assert_eq!(conv, TrendConvention::WickBias);
        assert_eq!(serde_json::to_string(&WatchMode::TopVolume).unwrap(), r#""top_volume""#);
    }

    #[test]
    fn candle_pick_offsets() {
        assert_eq!(CandlePick::Last.offset_from_end(), 0);
        assert_eq!(CandlePick::SecondToLast.offset_from_end(), 1);
    }
}
