//! # Scenes
//!
//! A scene is a node that roots a domain: every node below it (up to the next
//! nested scene) carries the scene as its `domain`. The scene's
//! [`SceneType`] is the tag event handlers filter on.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::InstanceId;

/// Domain tag of a scene, e.g. `"Game"` or `"Battle"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneType(Cow<'static, str>);

impl SceneType {
    /// Creates a tag from a static string.
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Creates a tag from any string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// The tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneType({})", self.0)
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for SceneType {
    fn from(tag: &'static str) -> Self {
        Self::from_static(tag)
    }
}

/// Snapshot of a scene, handed to event handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneRef {
    /// Instance id of the scene node.
    pub id: InstanceId,
    /// Domain tag of the scene.
    pub scene_type: SceneType,
}

/// Which domains a handler listens to.
///
/// A handler descriptor without a filter is rejected at registration;
/// handlers that want every domain use [`SceneFilter::Any`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SceneFilter {
    /// Every scene, whatever its tag.
    Any,
    /// Scenes with exactly this tag.
    Only(SceneType),
}

impl SceneFilter {
    /// Filter for a single tag.
    pub fn only(scene_type: impl Into<SceneType>) -> Self {
        Self::Only(scene_type.into())
    }

    /// Returns true if a publish in a scene of `scene_type` reaches this
    /// filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, scene_type: &SceneType) -> bool {
        match self {
            Self::Any => true,
            Self::Only(tag) => tag == scene_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        let game = SceneType::from_static("Game");
        let battle = SceneType::new("Battle");

        assert!(SceneFilter::Any.matches(&game));
        assert!(SceneFilter::only("Game").matches(&game));
        assert!(!SceneFilter::only("Game").matches(&battle));
    }

    #[test]
    fn test_owned_and_static_tags_compare_equal() {
        assert_eq!(SceneType::new("Game"), SceneType::from_static("Game"));
        assert_eq!(SceneType::from("Game").as_str(), "Game");
    }
}
