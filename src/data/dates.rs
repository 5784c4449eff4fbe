use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RasterError;

/// How to find the acquisition date inside a file name.
///
/// The first capture group of `regex` (or the whole match when the
/// expression has no group) is handed to chrono with `format`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePattern {
    pub regex: String,
    pub format: String,
}

impl Default for DatePattern {
    /// MODIS-style `YYYY_DDD` (year and day of year), e.g. `ndvi_2005_129.tif`.
    fn default() -> Self {
        Self {
            regex: r"(\d{4}_\d{3})".to_string(),
            format: "%Y_%j".to_string(),
        }
    }
}

impl DatePattern {
    pub fn new(regex: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            format: format.into(),
        }
    }

    pub fn compile(&self) -> Result<CompiledDatePattern, RasterError> {
        Ok(CompiledDatePattern {
            regex: Regex::new(&self.regex)?,
            format: self.format.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledDatePattern {
    regex: Regex,
    format: String,
}

impl CompiledDatePattern {
    pub fn parse(&self, file_name: &str) -> Result<NaiveDate, RasterError> {
        let caps = self
            .regex
            .captures(file_name)
            .ok_or_else(|| RasterError::DateParse {
                file: file_name.to_string(),
                reason: format!("no match for /{}/", self.regex.as_str()),
            })?;
        let token = caps
            .get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str())
            .unwrap_or_default();
        NaiveDate::parse_from_str(token, &self.format).map_err(|e| RasterError::DateParse {
            file: file_name.to_string(),
            reason: format!("'{token}' does not fit '{}': {e}", self.format),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_and_day_of_year() {
        let p = DatePattern::default().compile().unwrap();
        assert_eq!(
            p.parse("ndvi_2005_129.tif").unwrap(),
            NaiveDate::from_ymd_opt(2005, 5, 9).unwrap()
        );
    }

    #[test]
    fn calendar_dates_without_group() {
        let p = DatePattern::new(r"\d{8}", "%Y%m%d").compile().unwrap();
        assert_eq!(
            p.parse("AK_NDVI_20050701_crop.tif").unwrap(),
            NaiveDate::from_ymd_opt(2005, 7, 1).unwrap()
        );
    }

    #[test]
    fn missing_token_is_reported() {
        let p = DatePattern::default().compile().unwrap();
        let err = p.parse("readme.txt").unwrap_err();
        assert!(matches!(err, RasterError::DateParse { .. }));
    }

    #[test]
    fn impossible_day_is_reported() {
        let p = DatePattern::default().compile().unwrap();
        assert!(p.parse("ndvi_2005_400.tif").is_err());
    }

    #[test]
    fn bad_regex_fails_to_compile() {
        let err = DatePattern::new("(", "%Y").compile().unwrap_err();
        assert!(matches!(err, RasterError::DatePattern(_)));
    }
}
