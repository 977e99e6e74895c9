//! A single queued or playing item in a guild's song pipeline.

use crate::id::UserId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    SoundCloud,
    YouTube,
}

#[derive(Clone, Debug)]
pub struct Song {
    pub id: String,
    pub kind: SourceKind,
    pub title: String,
    pub added_by: UserId,
    pub added_by_name: String,
}

impl Song {
    pub fn new(id: impl Into<String>, kind: SourceKind, title: impl Into<String>, added_by: UserId, added_by_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            added_by,
            added_by_name: added_by_name.into(),
        }
    }
}
