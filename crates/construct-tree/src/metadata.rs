//! Node metadata: an append-only log of typed annotations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::Backtrace;

/// One metadata record attached to a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Entry type tag; consumers dispatch on it.
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary payload. `Value::Null` payloads are never stored — they are
    /// dropped at the `add_metadata` boundary.
    pub data: Value,
    /// Captured call stack, topmost frame first, when requested at append
    /// time. Frames are opaque display strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

/// Options for [`add_metadata`](crate::Node::add_metadata).
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataOptions {
    /// Capture the current call stack into [`MetadataEntry::trace`].
    pub stack_trace: bool,
}

/// Substrings identifying this crate's own capture machinery; leading frames
/// matching one are elided so the topmost reported frame is the caller.
const LIBRARY_FRAME_MARKERS: [&str; 3] = ["backtrace", "construct_tree::metadata", "add_metadata"];

/// Capture the current call stack as opaque frame strings.
///
/// Symbolization quality is platform- and profile-dependent; callers must
/// treat the frames as display text, not structured data.
pub(crate) fn capture_stack_trace() -> Vec<String> {
    let raw = Backtrace::force_capture().to_string();
    let mut frames: Vec<String> = raw
        .lines()
        .filter_map(|line| {
            // Symbol lines look like `  3: path::to::function`; location
            // lines (`    at src/file.rs:10:5`) have no numeric prefix.
            let (index, symbol) = line.trim_start().split_once(": ")?;
            index.parse::<u32>().ok()?;
            Some(symbol.trim().to_string())
        })
        .collect();

    let first_caller = frames
        .iter()
        .position(|frame| {
            let lowered = frame.to_ascii_lowercase();
            !LIBRARY_FRAME_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker))
        })
        .unwrap_or(0);
    frames.drain(..first_caller);
    frames
}
