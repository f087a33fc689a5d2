//! Adaptive bucket width shared by every time-series provider.
//!
//! Providers embed the returned string verbatim in query payloads
//! (`fixed_interval`, `interval`, ...), so the table below is a wire contract.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Bucket count above which callers should expect slow or truncated queries.
pub const MAX_RECOMMENDED_BUCKETS: i64 = 288;

/// Bucket widths the shared table can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BucketWidth {
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
}

/// `(cutoff_seconds, width)` in descending cutoff order; first hit wins.
const THRESHOLDS: [(i64, BucketWidth); 9] = [
    (31_536_001, BucketWidth::OneDay),
    (2_592_001, BucketWidth::TwelveHours),
    (604_801, BucketWidth::SixHours),
    (86_401, BucketWidth::ThreeHours),
    (43_201, BucketWidth::OneHour),
    (21_601, BucketWidth::ThirtyMinutes),
    (3_601, BucketWidth::FiveMinutes),
    (1_800, BucketWidth::TwoMinutes),
    (1_200, BucketWidth::OneMinute),
];

impl BucketWidth {
    pub fn for_span(span_seconds: i64) -> Self {
        THRESHOLDS
            .iter()
            .find(|(cutoff, _)| span_seconds >= *cutoff)
            .map(|(_, width)| *width)
            .unwrap_or(Self::ThirtySeconds)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThirtySeconds => "30s",
            Self::OneMinute => "1m",
            Self::TwoMinutes => "2m",
            Self::FiveMinutes => "5m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::ThreeHours => "3h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
        }
    }

    pub const fn seconds(self) -> i64 {
        match self {
            Self::ThirtySeconds => 30,
            Self::OneMinute => 60,
            Self::TwoMinutes => 120,
            Self::FiveMinutes => 300,
            Self::ThirtyMinutes => 1_800,
            Self::OneHour => 3_600,
            Self::ThreeHours => 10_800,
            Self::SixHours => 21_600,
            Self::TwelveHours => 43_200,
            Self::OneDay => 86_400,
        }
    }
}

impl Display for BucketWidth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket width literal for a query spanning `span_seconds`.
pub fn bucket_width(span_seconds: i64) -> &'static str {
    BucketWidth::for_span(span_seconds).as_str()
}

pub fn bucket_width_seconds(span_seconds: i64) -> i64 {
    BucketWidth::for_span(span_seconds).seconds()
}

/// Number of buckets a query over `span_seconds` produces with the shared table.
pub fn estimated_buckets(span_seconds: i64) -> i64 {
    if span_seconds <= 0 {
        return 0;
    }
    let width = bucket_width_seconds(span_seconds);
    span_seconds / width + i64::from(span_seconds % width != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_points() {
        assert_eq!(bucket_width(0), "30s");
        assert_eq!(bucket_width(1_199), "30s");
        assert_eq!(bucket_width(1_200), "1m");
        assert_eq!(bucket_width(1_800), "2m");
        assert_eq!(bucket_width(3_600), "2m");
        assert_eq!(bucket_width(3_601), "5m");
        assert_eq!(bucket_width(86_400), "1h");
        assert_eq!(bucket_width(100_000), "3h");
        assert_eq!(bucket_width(40_000_000), "1d");
    }

    #[test]
    fn negative_span_uses_finest_width() {
        assert_eq!(bucket_width(-5), "30s");
        assert_eq!(estimated_buckets(-5), 0);
    }

    #[test]
    fn width_never_gets_finer_as_span_grows() {
        let mut previous = bucket_width_seconds(0);
        for span in (0..=40_000_000).step_by(997) {
            let current = bucket_width_seconds(span);
            assert!(current >= previous, "span {span} regressed to {current}s");
            assert_eq!(bucket_width(span), bucket_width(span));
            previous = current;
        }
    }

    #[test]
    fn every_threshold_boundary_switches_width() {
        for (cutoff, width) in THRESHOLDS {
            assert_eq!(BucketWidth::for_span(cutoff), width);
            assert!(BucketWidth::for_span(cutoff - 1) < width);
        }
    }

    #[test]
    fn estimates_bucket_count() {
        assert_eq!(estimated_buckets(3_600), 30);
        assert_eq!(estimated_buckets(86_400), 24);
        assert!(estimated_buckets(1_199) > 0);
        assert_eq!(estimated_buckets(i64::MAX), i64::MAX / 86_400 + 1);
    }
}
