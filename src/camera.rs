use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// A webcam as listed on the portal.
///
/// The slug is the stable identifier: it keys catalog rows and names the
/// per-camera directory, and is treated as an opaque filesystem-safe string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub slug: String,
}

impl Camera {
    pub fn new<S: Into<String>>(name: S, slug: S) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
        }
    }

    /// Whether this camera participates in a capture round given the
    /// round's target and exclusion lists. An empty target list means
    /// every camera is targeted.
    pub fn selected(&self, targets: &[String], excludes: &[String]) -> bool {
        if excludes.iter().any(|slug| slug == &self.slug) {
            return false;
        }
        targets.is_empty() || targets.iter().any(|slug| slug == &self.slug)
    }
}

/// Boundary to the stream-resolution collaborator: given a camera, produce
/// one raw frame file at the destination path. Implementations own stream
/// discovery end to end; the capture orchestrator never sees a URL.
#[async_trait]
pub trait FrameSource {
    async fn fetch_frame(&mut self, camera: &Camera, dest: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(slug: &str) -> Camera {
        Camera::new(slug.to_uppercase(), slug.to_string())
    }

    #[test]
    fn test_selected_with_no_filters() {
        assert!(cam("downtown").selected(&[], &[]));
    }

    #[test]
    fn test_selected_respects_targets() {
        let targets = vec!["harbour".to_string()];
        assert!(cam("harbour").selected(&targets, &[]));
        assert!(!cam("downtown").selected(&targets, &[]));
    }

    #[test]
    fn test_exclusion_wins_over_target() {
        let targets = vec!["harbour".to_string()];
        let excludes = vec!["harbour".to_string()];
        assert!(!cam("harbour").selected(&targets, &excludes));
    }
}
