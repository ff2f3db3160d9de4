//! Published attributes and their fingerprints.
//!
//! Stages publish a fixed set of named attributes (sampling rate, channel
//! layout, source name, ...). Downstream stages that depend on an attribute
//! keep a [`Fingerprint`] of the value they were initialized against and
//! compare it with the current value's fingerprint to detect changes.
//!
//! Every observed attribute carries an explicit fingerprint function; there
//! is no implicit fallback. Aggregates such as [`ChannelLayout`] pick which
//! fields matter (see [`layout_fingerprint`] vs [`channel_labels_fingerprint`]).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-known attribute names published by built-in stages.
pub mod names {
    pub const SOURCE_NAME: &str = "source_name";
    pub const SAMPLING_RATE: &str = "sampling_rate";
    pub const CHANNEL_LAYOUT: &str = "channel_layout";
    pub const DTYPE: &str = "dtype";
}

/// Kind of a recorded channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Eeg,
    Meg,
    Misc,
}

/// Sampling rate plus per-channel labels and kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub sampling_rate: f64,
    pub channel_names: Vec<String>,
    pub channel_kinds: Vec<ChannelKind>,
}

impl ChannelLayout {
    /// Layout with `count` EEG channels labelled `Ch1..ChN`.
    pub fn uniform(sampling_rate: f64, count: usize) -> Self {
        Self {
            sampling_rate,
            channel_names: (1..=count).map(|i| format!("Ch{i}")).collect(),
            channel_kinds: vec![ChannelKind::Eeg; count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }
}

/// Value of a published attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Layout(Arc<ChannelLayout>),
}

impl AttributeValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_layout(&self) -> Option<&ChannelLayout> {
        match self {
            AttributeValue::Layout(v) => Some(v),
            _ => None,
        }
    }
}

/// One comparable component of a fingerprint.
///
/// Floats are stored as raw bits so fingerprints have total equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FingerprintPart {
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Text(String),
}

/// Cheap, comparable summary of an attribute value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<FingerprintPart>);

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, v: bool) -> Self {
        self.0.push(FingerprintPart::Bool(v));
        self
    }

    pub fn with_int(mut self, v: i64) -> Self {
        self.0.push(FingerprintPart::Int(v));
        self
    }

    pub fn with_float(mut self, v: f64) -> Self {
        self.0.push(FingerprintPart::FloatBits(v.to_bits()));
        self
    }

    pub fn with_text(mut self, v: impl Into<String>) -> Self {
        self.0.push(FingerprintPart::Text(v.into()));
        self
    }

    pub fn parts(&self) -> &[FingerprintPart] {
        &self.0
    }
}

/// Signature of a fingerprint function.
pub type FingerprintFn = fn(&AttributeValue) -> Fingerprint;

/// Fingerprint for scalar attributes: the value itself.
///
/// For a layout this falls back to [`layout_fingerprint`].
pub fn scalar_fingerprint(value: &AttributeValue) -> Fingerprint {
    match value {
        AttributeValue::Bool(v) => Fingerprint::new().with_bool(*v),
        AttributeValue::Int(v) => Fingerprint::new().with_int(*v),
        AttributeValue::Float(v) => Fingerprint::new().with_float(*v),
        AttributeValue::Text(v) => Fingerprint::new().with_text(v.as_str()),
        AttributeValue::Layout(_) => layout_fingerprint(value),
    }
}

/// Sampling rate followed by the channel labels.
pub fn layout_fingerprint(value: &AttributeValue) -> Fingerprint {
    match value.as_layout() {
        Some(layout) => {
            let fp = Fingerprint::new().with_float(layout.sampling_rate);
            layout
                .channel_names
                .iter()
                .fold(fp, |fp, name| fp.with_text(name.as_str()))
        }
        None => scalar_fingerprint(value),
    }
}

/// Channel labels only; sampling-rate changes are ignored.
pub fn channel_labels_fingerprint(value: &AttributeValue) -> Fingerprint {
    match value.as_layout() {
        Some(layout) => layout
            .channel_names
            .iter()
            .fold(Fingerprint::new(), |fp, name| fp.with_text(name.as_str())),
        None => scalar_fingerprint(value),
    }
}
