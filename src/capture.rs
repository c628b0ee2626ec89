use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use tracing::{error, info};

use crate::camera::{Camera, FrameSource};
use crate::catalog::ImageCatalog;
use crate::config::CamlapseConfig;
use crate::error::Result;

/// Writes one frame file per capture into the date-partitioned layout and
/// records it in the catalog. Cameras are fully failure-isolated within a
/// round: the unit of success for a round is "as many cameras as possible".
pub struct CaptureOrchestrator<'a> {
    config: &'a CamlapseConfig,
    catalog: &'a ImageCatalog,
}

impl<'a> CaptureOrchestrator<'a> {
    pub fn new(config: &'a CamlapseConfig, catalog: &'a ImageCatalog) -> Self {
        Self { config, catalog }
    }

    /// Capture a single frame for one camera.
    ///
    /// "Now" is sampled exactly once, truncated to whole seconds; the same
    /// instant names the file and keys the catalog row, so the two always
    /// agree.
    pub async fn capture_one<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        camera: &Camera,
    ) -> Result<DateTime<Tz>> {
        let now = Utc::now().with_timezone(&self.config.timezone);
        let now = now.with_nanosecond(0).unwrap_or(now);
        self.capture_one_at(source, camera, now).await?;
        Ok(now)
    }

    async fn capture_one_at<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        camera: &Camera,
        timestamp: DateTime<Tz>,
    ) -> Result<()> {
        let relative = self.frame_relative_path(camera, &timestamp);
        let dest = self.config.output_path.join(&relative);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        source.fetch_frame(camera, &dest).await?;
        // The row lands only after the frame file is durably on disk; a
        // crash in between is healed by the idempotent re-insert on retry.
        self.catalog.add_image(&camera.slug, timestamp, &relative)?;

        info!("Captured '{}' at {}", camera.slug, timestamp);
        Ok(())
    }

    /// One capture round over `cameras`, honoring target and exclusion
    /// filters. A camera failing is logged and never aborts the rest of
    /// the round. Returns how many cameras were captured.
    pub async fn capture_all<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        cameras: &[Camera],
        targets: &[String],
        excludes: &[String],
    ) -> usize {
        let mut captured = 0;
        for camera in cameras.iter().filter(|c| c.selected(targets, excludes)) {
            match self.capture_one(source, camera).await {
                Ok(_) => captured += 1,
                Err(e) => error!("Capture failed for '{}': {}", camera.slug, e),
            }
        }
        captured
    }

    /// `<slug>/<year>/<month>/<day>/<formatted-timestamp>.<ext>`, relative
    /// to the output root.
    fn frame_relative_path(&self, camera: &Camera, timestamp: &DateTime<Tz>) -> PathBuf {
        PathBuf::from(&camera.slug)
            .join(timestamp.year().to_string())
            .join(format!("{:02}", timestamp.month()))
            .join(format!("{:02}", timestamp.day()))
            .join(self.config.frame_file_name(timestamp))
    }
}
