use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::ValidationError;

/// Half-open window `[geq, lt)` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    geq: i64,
    lt: i64,
}

#[derive(Deserialize)]
struct RawTimeRange {
    geq: i64,
    lt: i64,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = ValidationError;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        Self::new(raw.geq, raw.lt)
    }
}

impl TimeRange {
    pub fn new(geq: i64, lt: i64) -> Result<Self, ValidationError> {
        if geq >= lt {
            return Err(ValidationError::InvalidTimeRange { geq, lt });
        }
        Ok(Self { geq, lt })
    }

    /// Window ending now and reaching `span` into the past.
    pub fn last(span: Duration) -> Result<Self, ValidationError> {
        let lt = OffsetDateTime::now_utc().unix_timestamp();
        let span = i64::try_from(span.as_secs()).unwrap_or(i64::MAX);
        Self::new(lt.saturating_sub(span), lt)
    }

    pub fn parse_rfc3339(geq: &str, lt: &str) -> Result<Self, ValidationError> {
        Self::new(parse_epoch(geq)?, parse_epoch(lt)?)
    }

    pub const fn geq(self) -> i64 {
        self.geq
    }

    pub const fn lt(self) -> i64 {
        self.lt
    }

    /// Window length, saturating at `i64::MAX` for extreme bounds.
    pub const fn span_seconds(self) -> i64 {
        self.lt.saturating_sub(self.geq)
    }

    pub const fn geq_millis(self) -> i64 {
        self.geq.saturating_mul(1000)
    }

    pub const fn lt_millis(self) -> i64 {
        self.lt.saturating_mul(1000)
    }
}

impl TimeRange {
    /// The same-length window `offset_seconds` earlier.
    pub fn shifted_back(self, offset_seconds: i64) -> Result<Self, ValidationError> {
        match (
            self.geq.checked_sub(offset_seconds),
            self.lt.checked_sub(offset_seconds),
        ) {
            (Some(geq), Some(lt)) => Self::new(geq, lt),
            _ => Err(ValidationError::InvalidOffset {
                offset: offset_seconds,
            }),
        }
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.geq, self.lt)
    }
}

fn parse_epoch(input: &str) -> Result<i64, ValidationError> {
    OffsetDateTime::parse(input.trim(), &Rfc3339)
        .map(OffsetDateTime::unix_timestamp)
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_inverted_windows() {
        assert!(matches!(
            TimeRange::new(10, 10),
            Err(ValidationError::InvalidTimeRange { geq: 10, lt: 10 })
        ));
        assert!(TimeRange::new(20, 10).is_err());
    }

    #[test]
    fn last_window_spans_requested_duration() {
        let range = TimeRange::last(Duration::from_secs(3600)).expect("valid window");
        assert_eq!(range.span_seconds(), 3600);
    }

    #[test]
    fn parses_rfc3339_bounds() {
        let range = TimeRange::parse_rfc3339("2024-01-01T00:00:00Z", "2024-01-01T01:00:00Z")
            .expect("must parse");
        assert_eq!(range.geq(), 1_704_067_200);
        assert_eq!(range.span_seconds(), 3600);
        assert_eq!(range.geq_millis(), 1_704_067_200_000);
    }

    #[test]
    fn span_of_extreme_bounds_saturates() {
        let range = TimeRange::new(i64::MIN, 1).expect("ordered bounds");
        assert_eq!(range.span_seconds(), i64::MAX);
        assert_eq!(range.geq_millis(), i64::MIN);

        let wide = TimeRange::new(-5, i64::MAX).expect("ordered bounds");
        assert_eq!(wide.span_seconds(), i64::MAX);
    }

    #[test]
    fn shifting_back_keeps_the_span() {
        let range = TimeRange::new(10_000, 13_600).expect("range");
        let shifted = range.shifted_back(86_400).expect("in range");
        assert_eq!(shifted.geq(), 10_000 - 86_400);
        assert_eq!(shifted.span_seconds(), range.span_seconds());

        let edge = TimeRange::new(i64::MIN, i64::MIN + 10).expect("range");
        assert!(matches!(
            edge.shifted_back(60),
            Err(ValidationError::InvalidOffset { offset: 60 })
        ));
    }

    #[test]
    fn deserialization_enforces_ordering() {
        let err = serde_json::from_str::<TimeRange>(r#"{"geq":5,"lt":1}"#).expect_err("must fail");
        assert!(err.to_string().contains("must be before"));
    }
}
