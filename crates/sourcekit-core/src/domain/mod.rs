//! # Domain Types
//!
//! Values every other module produces or consumes.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TimeRange`] | Half-open `[geq, lt)` window in epoch seconds |
//! | [`CanonicalResult`] | Provider-tagged result wrapping a [`ResultPayload`] |
//! | [`TableResult`] | Flat string table (also used for logs) |
//! | [`TimeseriesResult`] | Labeled series of `(timestamp_ms, value)` points |
//! | [`TextResult`] | Free-form text output |
//! | [`ParamSchema`] | Ordered parameter declarations of a task |
//! | [`TaskParams`] | Parameters that passed schema validation |
//!
//! Construction validates invariants: a [`TimeRange`] with `geq >= lt` cannot
//! exist, and [`TaskParams`] only come out of [`ParamSchema::validate`].

mod params;
mod result;
mod time_range;

pub(crate) use params::json_type_name;
pub use params::{ParamSchema, ParamSpec, ParamType, TaskParams};
pub use result::{
    CanonicalResult, Datapoint, LabeledSeries, ResultKind, ResultPayload, Row, TableResult,
    TextResult, TimeseriesResult,
};
pub use time_range::TimeRange;
