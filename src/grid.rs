//! Grid encoding of a day's early price path
//!
//! The full day's high/low range is cut into horizontal bands of roughly one
//! volatility unit each. Each of the first `depth` bars is then placed in a
//! band, measured from the lowest basis price inside that window. This
//! gives a code such as `A1-C2-B3-...`: the letter is the band and the
//! number is the 1-based bar position.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PatternError, PatternResult};
use crate::{Bar, PriceField};

/// Separator between tokens of a serialized code
pub const TOKEN_SEPARATOR: char = '-';

/// Letter label for a band index.
///
/// 0..=25 map to `A`..=`Z`; larger indices recurse as
/// `label(index / 26 - 1) + label(index % 26)`.
pub fn band_label(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        let mut label = band_label(index / 26 - 1);
        label.push_str(&band_label(index % 26));
        label
    }
}

/// One `<label><position>` token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridCoordinate {
    pub label: String,
    pub position: usize,
}

impl GridCoordinate {
    pub fn new(label: impl Into<String>, position: usize) -> Self {
        Self {
            label: label.into(),
            position,
        }
    }

    /// 1-based alphabet position of the label's first letter.
    ///
    /// Multi-letter labels lose everything after the first letter.
    pub fn numeric_value(&self) -> f64 {
        self.label
            .bytes()
            .next()
            .map(|b| f64::from(b.saturating_sub(b'A')) + 1.0)
            .unwrap_or(0.0)
    }
}

impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label, self.position)
    }
}

impl FromStr for GridCoordinate {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| PatternError::invalid(format!("token '{}' has no position", s)))?;
        let (label, position) = s.split_at(split);

        if label.is_empty() || !label.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(PatternError::invalid(format!("token '{}' has a bad label", s)));
        }
        let position = position
            .parse::<usize>()
            .map_err(|_| PatternError::invalid(format!("token '{}' has a bad position", s)))?;

        Ok(Self::new(label, position))
    }
}

/// Ordered sequence of grid coordinates describing one day's early shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SymbolicCode {
    tokens: Vec<GridCoordinate>,
}

impl SymbolicCode {
    pub fn new(tokens: Vec<GridCoordinate>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[GridCoordinate] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Numeric form used for correlation
    pub fn numeric_vector(&self) -> Vec<f64> {
        self.tokens.iter().map(GridCoordinate::numeric_value).collect()
    }
}

impl fmt::Display for SymbolicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", TOKEN_SEPARATOR)?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

impl FromStr for SymbolicCode {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let tokens = s
            .split(TOKEN_SEPARATOR)
            .map(|t| t.trim().parse())
            .collect::<PatternResult<Vec<_>>>()?;
        Ok(Self::new(tokens))
    }
}

impl TryFrom<String> for SymbolicCode {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SymbolicCode> for String {
    fn from(code: SymbolicCode) -> Self {
        code.to_string()
    }
}

/// Quantizes the first `depth` bars of a day into a [`SymbolicCode`]
#[derive(Debug, Clone, Copy)]
pub struct GridEncoder {
    /// Price height of one band before rounding the band count up
    pub volatility_unit: f64,
    pub depth: usize,
    pub basis: PriceField,
}

impl GridEncoder {
    pub fn new(volatility_unit: f64, depth: usize, basis: PriceField) -> Self {
        Self {
            volatility_unit,
            depth,
            basis,
        }
    }

    /// Encode a full day's bars.
    ///
    /// The band grid comes from the whole day; only the first `depth` bars
    /// are placed on it. Bars whose basis price is not finite are skipped,
    /// so the code can be shorter than `depth`.
    pub fn encode(&self, bars: &[Bar]) -> PatternResult<SymbolicCode> {
        if !(self.volatility_unit.is_finite() && self.volatility_unit > 0.0) {
            return Err(PatternError::invalid(format!(
                "volatility unit must be positive, got {}",
                self.volatility_unit
            )));
        }
        if self.depth == 0 {
            return Err(PatternError::invalid("grid depth must be at least 1"));
        }
        if self.depth > bars.len() {
            return Err(PatternError::invalid(format!(
                "grid depth {} exceeds day length {}",
                self.depth,
                bars.len()
            )));
        }

        let day_high = bars
            .iter()
            .map(|b| b.high)
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let day_low = bars
            .iter()
            .map(|b| b.low)
            .filter(|v| v.is_finite())
            .fold(f64::INFINITY, f64::min);

        if !(day_high.is_finite() && day_low.is_finite()) {
            return Err(PatternError::invalid("day has no finite high/low prices"));
        }

        let range = day_high - day_low;
        let band_count = (range / self.volatility_unit).ceil();
        if band_count <= 0.0 {
            return Err(PatternError::DegenerateRange {
                high: day_high,
                low: day_low,
            });
        }
        let band_height = range / band_count;

        let window = &bars[..self.depth];
        let depth_low = window
            .iter()
            .map(|b| b.price(self.basis))
            .filter(|v| v.is_finite())
            .fold(f64::INFINITY, f64::min);

        let tokens = window
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                let value = bar.price(self.basis);
                if !value.is_finite() {
                    return None;
                }
                let band = ((value - depth_low) / band_height).floor() as usize;
                Some(GridCoordinate::new(band_label(band), i + 1))
            })
            .collect();

        Ok(SymbolicCode::new(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars_from_prices(prices: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2022, 3, 30)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Bar::new(start + Duration::minutes(5 * i as i64), p, p, p, p, 0))
            .collect()
    }

    #[test]
    fn test_band_label_single_letters() {
        assert_eq!(band_label(0), "A");
        assert_eq!(band_label(1), "B");
        assert_eq!(band_label(25), "Z");
    }

    // Recursive rule: label(i / 26 - 1) + label(i % 26). Kept exactly as is,
    // including how it behaves at every prefix boundary.
    #[test]
    fn test_band_label_recursive_boundaries() {
        assert_eq!(band_label(26), "AA");
        assert_eq!(band_label(27), "AB");
        assert_eq!(band_label(51), "AZ");
        assert_eq!(band_label(52), "BA");
        assert_eq!(band_label(100), "CW");
        assert_eq!(band_label(701), "ZZ");
        assert_eq!(band_label(702), "AAA");
    }

    #[test]
    fn test_encode_exact_bands() {
        let bars = bars_from_prices(&[10.0, 10.5, 11.0, 10.25, 12.0]);
        let code = GridEncoder::new(0.25, 3, PriceField::Close).encode(&bars).unwrap();
        assert_eq!(code.to_string(), "A1-C2-E3");
    }

    #[test]
    fn test_encode_rounds_band_count_up() {
        // range 2.0 / 0.3 -> 7 bands of ~0.2857
        let bars = bars_from_prices(&[10.0, 10.5, 11.0, 10.25, 12.0]);
        let code = GridEncoder::new(0.3, 3, PriceField::Close).encode(&bars).unwrap();
        assert_eq!(code.to_string(), "A1-B2-D3");
    }

    #[test]
    fn test_encode_uses_window_low_not_day_low() {
        let bars = bars_from_prices(&[11.0, 11.5, 12.0, 10.0, 10.0]);
        let code = GridEncoder::new(0.25, 3, PriceField::Close).encode(&bars).unwrap();
        assert_eq!(code.to_string(), "A1-C2-E3");
    }

    #[test]
    fn test_encode_multi_letter_labels() {
        let bars = bars_from_prices(&[10.0, 11.0, 12.0]);
        // 1/64 keeps the band arithmetic exact: 128 bands, bar 2 lands in band 64
        let code = GridEncoder::new(0.015625, 2, PriceField::Close).encode(&bars).unwrap();
        assert_eq!(code.to_string(), "A1-BM2");
    }

    #[test]
    fn test_encode_skips_missing_basis_values() {
        let mut bars = bars_from_prices(&[10.0, 10.5, 11.0, 10.25, 12.0]);
        bars[1].close = f64::NAN;
        let code = GridEncoder::new(0.25, 3, PriceField::Close).encode(&bars).unwrap();
        assert_eq!(code.to_string(), "A1-E3");
        assert_eq!(code.len(), 2);
    }

    #[test]
    fn test_encode_degenerate_range() {
        let bars = bars_from_prices(&[10.0; 6]);
        let err = GridEncoder::new(0.25, 3, PriceField::Close).encode(&bars).unwrap_err();
        assert!(matches!(err, PatternError::DegenerateRange { .. }));
    }

    #[test]
    fn test_encode_rejects_bad_parameters() {
        let bars = bars_from_prices(&[10.0, 10.5, 11.0]);
        assert!(GridEncoder::new(0.0, 2, PriceField::Close).encode(&bars).is_err());
        assert!(GridEncoder::new(0.25, 0, PriceField::Close).encode(&bars).is_err());
        assert!(GridEncoder::new(0.25, 4, PriceField::Close).encode(&bars).is_err());
        assert!(GridEncoder::new(0.25, 1, PriceField::Close).encode(&[]).is_err());
    }

    #[test]
    fn test_positions_strictly_increase_within_depth() {
        let prices: Vec<f64> = (0..79).map(|i| 100.0 + ((i * 7) % 13) as f64 * 0.1).collect();
        let bars = bars_from_prices(&prices);
        let depth = 20;
        let code = GridEncoder::new(0.25, depth, PriceField::Open).encode(&bars).unwrap();

        assert!(code.len() <= depth);
        let positions: Vec<usize> = code.tokens().iter().map(|t| t.position).collect();
        assert!(positions.iter().all(|&p| (1..=depth).contains(&p)));
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let prices: Vec<f64> = (0..79).map(|i| 100.0 + ((i * 5) % 11) as f64 * 0.07).collect();
        let bars = bars_from_prices(&prices);
        let encoder = GridEncoder::new(0.25, 20, PriceField::Close);

        let first = encoder.encode(&bars);
        assert!(first.is_ok());
        assert_eq!(first, encoder.encode(&bars));
    }

    #[test]
    fn test_code_parse_and_display() {
        let code: SymbolicCode = "A1-AB2-C3".parse().unwrap();
        assert_eq!(code.len(), 3);
        assert_eq!(code.tokens()[1], GridCoordinate::new("AB", 2));
        assert_eq!(code.to_string(), "A1-AB2-C3");
        assert!("A1-2".parse::<SymbolicCode>().is_err());
        assert!("".parse::<SymbolicCode>().unwrap().is_empty());
    }

    #[test]
    fn test_numeric_vector_uses_first_letter_only() {
        let code: SymbolicCode = "A1-C2-BZ3".parse().unwrap();
        assert_eq!(code.numeric_vector(), vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_code_serializes_as_string() {
        let code: SymbolicCode = "A1-B2".parse().unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"A1-B2\"");
        let back: SymbolicCode = serde_json::from_str("\"A1-B2\"").unwrap();
        assert_eq!(back, code);
    }
}
