use chrono::DateTime;
use chrono_tz::Tz;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::catalog::ImageCatalog;
use crate::error::{CamlapseError, Result};
use crate::selector::FrameSelector;

/// Playback rate of the assembled video when the caller does not ask for
/// another one.
pub const DEFAULT_FRAMERATE: u32 = 12;

/// Label burned into each frame when timestamps are requested.
const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Overlay reading the per-frame label the manifest attached via
/// `file_packet_metadata`, pinned to the lower-left corner.
const DRAWTEXT_FILTER: &str = "drawtext=text='%{metadata\\:timestamp}':\
fontcolor=white:fontsize=36:box=1:boxcolor=black@0.5:x=16:y=h-th-16";

#[derive(Debug, Clone)]
pub struct TimelapseOptions {
    pub camera: String,
    pub from: DateTime<Tz>,
    pub to: DateTime<Tz>,
    pub output_dir: PathBuf,
    pub framerate: u32,
    pub include_timestamp: bool,
}

/// One line-group of the concat manifest: a frame file, how long it stays
/// on screen, and the label to burn in when timestamps are requested.
#[derive(Debug, Clone, PartialEq)]
struct ManifestEntry {
    path: PathBuf,
    duration: f64,
    label: Option<String>,
}

/// Assembles one video from catalogued frames via the external encoder.
pub struct TimelapseAssembler<'a> {
    catalog: &'a ImageCatalog,
}

impl<'a> TimelapseAssembler<'a> {
    pub fn new(catalog: &'a ImageCatalog) -> Self {
        Self { catalog }
    }

    /// Build `<output_dir>/<camera>.mp4` from the camera's captures in
    /// `[from, to]`, narrowed by `selector`. Overwrites an existing output.
    pub async fn create(
        &self,
        options: &TimelapseOptions,
        selector: &FrameSelector,
    ) -> Result<PathBuf> {
        let entries = self.plan(options, selector)?;
        info!(
            "Assembling timelapse for '{}': {} frames at {} fps",
            options.camera,
            entries.len(),
            options.framerate
        );

        tokio::fs::create_dir_all(&options.output_dir).await?;
        let output = options.output_dir.join(format!("{}.mp4", options.camera));

        // The manifest lives only as long as this call; NamedTempFile
        // removes it on drop whether encoding succeeds or not.
        let mut manifest = NamedTempFile::new()?;
        manifest.write_all(render_manifest(&entries).as_bytes())?;
        manifest.flush()?;

        encode(manifest.path(), &output, options).await?;
        info!("Wrote {}", output.display());
        Ok(output)
    }

    /// Resolve the frame sequence for a request without touching the
    /// encoder. Failing to resolve any single selected frame aborts the
    /// whole plan: the catalog and the filesystem disagreeing is an
    /// integrity fault, not something to paper over with a shorter video.
    fn plan(
        &self,
        options: &TimelapseOptions,
        selector: &FrameSelector,
    ) -> Result<Vec<ManifestEntry>> {
        let candidates = self.catalog.list_timestamps(
            &options.camera,
            Some(options.from),
            Some(options.to),
        )?;
        if candidates.is_empty() {
            return Err(CamlapseError::EmptyRange {
                camera: options.camera.clone(),
                from: options.from,
                to: options.to,
            });
        }

        let candidate_count = candidates.len();
        let selected = selector.select(candidates);
        if selected.is_empty() {
            return Err(CamlapseError::SelectorEmptied {
                camera: options.camera.clone(),
                candidates: candidate_count,
            });
        }
        debug!(
            "Selected {} of {} candidate frames for '{}'",
            selected.len(),
            candidate_count,
            options.camera
        );

        let duration = 1.0 / f64::from(options.framerate);
        selected
            .into_iter()
            .map(|ts| {
                Ok(ManifestEntry {
                    path: self.catalog.image_path(&options.camera, ts)?,
                    duration,
                    label: options
                        .include_timestamp
                        .then(|| ts.format(LABEL_FORMAT).to_string()),
                })
            })
            .collect()
    }
}

/// Render the ffconcat manifest. The last file line is repeated because
/// the concat demuxer ignores a `duration` directive with no entry after
/// it.
fn render_manifest(entries: &[ManifestEntry]) -> String {
    let mut manifest = String::from("ffconcat version 1.0\n");
    for entry in entries {
        manifest.push_str(&format!("file '{}'\n", escape_path(&entry.path)));
        manifest.push_str(&format!("duration {}\n", entry.duration));
        if let Some(label) = &entry.label {
            manifest.push_str(&format!("file_packet_metadata timestamp={}\n", label));
        }
    }
    if let Some(last) = entries.last() {
        manifest.push_str(&format!("file '{}'\n", escape_path(&last.path)));
    }
    manifest
}

/// Single quotes inside a quoted concat path are closed-escaped-reopened,
/// shell style.
fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

async fn encode(manifest: &Path, output: &Path, options: &TimelapseOptions) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(manifest);
    if options.include_timestamp {
        cmd.args(["-vf", DRAWTEXT_FILTER]);
    }
    cmd.args(["-r", &options.framerate.to_string()])
        .args(["-pix_fmt", "yuv420p"])
        .arg(output);

    debug!("Invoking encoder: {:?}", cmd.as_std());
    let result = cmd.output().await?;
    if !result.status.success() {
        return Err(CamlapseError::Encoding {
            camera: options.camera.clone(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }
    Ok(())
}
