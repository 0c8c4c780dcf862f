use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown timeframe: {0}")]
pub struct TimeframeError(pub String);

/// Range accepted by the historical-series endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    All,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Hour => "1h",
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
            Timeframe::Quarter => "90d",
            Timeframe::Year => "365d",
            Timeframe::All => "all",
        }
    }

    /// Days of history the upstream series is asked for
    pub fn days(&self) -> u32 {
        match self {
            Timeframe::Hour | Timeframe::Day => 1,
            Timeframe::Week => 7,
            Timeframe::Month => 30,
            Timeframe::Quarter => 90,
            Timeframe::Year | Timeframe::All => 365,
        }
    }

    /// Sampling interval of the series
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::Hour => "5m",
            Timeframe::Day => "1h",
            Timeframe::Week => "2h",
            Timeframe::Month => "6h",
            Timeframe::Quarter | Timeframe::Year | Timeframe::All => "1d",
        }
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(Timeframe::Hour),
            "24h" | "1d" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            "90d" => Ok(Timeframe::Quarter),
            "365d" | "1y" => Ok(Timeframe::Year),
            "all" => Ok(Timeframe::All),
            other => Err(TimeframeError(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    /// Unix time in milliseconds
    pub timestamp: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub volume: Option<Decimal>,
}

/// Body of `GET /api/historical/{symbol}?timeframe=`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<HistoricalPoint>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
}

impl HistoricalSeries {
    pub fn failure(symbol: Option<&str>, timeframe: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            error: Some(error.into()),
            symbol: symbol.map(str::to_string),
            timeframe: timeframe.map(str::to_string),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"data":[],"error":"serialization failed: {}"}}"#,
                e
            )
        })
    }
}
