//! Segment taxonomy helpers.
//!
//! Segments are `parent-child` strings such as `technology & computing-software`. A
//! parent matches every one of its children and vice versa.

use std::collections::BTreeSet;

use crate::model::UserModel;

/// Reserved segment carried by ads that target everyone.
pub const UNTARGETED_SEGMENT: &str = "untargeted";

/// The part before the first `-`, or the whole segment when it has no child.
pub fn parent_segment(segment: &str) -> &str {
    segment.split_once('-').map_or(segment, |(parent, _)| parent)
}

pub fn matches_segment(requested: &str, candidate: &str) -> bool {
    requested == candidate
        || parent_segment(candidate) == requested
        || parent_segment(requested) == candidate
}

pub fn child_segments(user_model: &UserModel) -> BTreeSet<String> {
    user_model.segments().into_iter().collect()
}

pub fn parent_segments(user_model: &UserModel) -> BTreeSet<String> {
    user_model
        .segments()
        .iter()
        .map(|segment| parent_segment(segment).to_string())
        .collect()
}

pub fn untargeted_segments() -> BTreeSet<String> {
    BTreeSet::from([UNTARGETED_SEGMENT.to_string()])
}

/// Child segments, their parents and the untargeted segment in one query set.
pub fn resolve_segments(user_model: &UserModel) -> BTreeSet<String> {
    let mut segments = child_segments(user_model);
    segments.extend(parent_segments(user_model));
    segments.extend(untargeted_segments());
    segments
}
