//! Sample schema for Lightlog
//!
//! A sample is an open set of named numeric fields plus one reserved,
//! server-assigned `timestamp` key. There is no fixed schema: any field name
//! the client posts becomes a column of that sample.

mod sample;

pub use sample::{format_timestamp, parse_timestamp, Sample, TIMESTAMP_FIELD};
