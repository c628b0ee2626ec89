use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::camera::{Camera, FrameSource};
use crate::error::{CamlapseError, Result};

const WEBCAMS_PAGE: &str = "https://ntvplus.ca/webcams/";
const WEBCAM_URL_PREFIX: &str = "https://ntvplus.ca/";

/// Resolves portal cameras to live HLS streams and grabs single frames
/// from them. This is the production [`FrameSource`].
///
/// Page lookups are memoized in an explicit cache scoped to this instance;
/// the run loop calls [`invalidate`](Self::invalidate) once per capture
/// round so stale stream URLs never outlive a round.
pub struct WebcamScraper {
    client: reqwest::Client,
    camera_heading: Regex,
    iframe_src: Regex,
    player_config: Regex,
    cache: ScraperCache,
}

#[derive(Default)]
struct ScraperCache {
    cameras: Option<Vec<Camera>>,
    hls_urls: HashMap<String, String>,
}

impl WebcamScraper {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            // The portal lists each camera as a heading link; the slug is
            // the trailing path segment of the link target.
            camera_heading: Regex::new(
                r#"(?s)<h3[^>]*class="boosted-elements-blog-title"[^>]*>\s*<a[^>]+href="([^"]+)"[^>]*>\s*([^<]+?)\s*</a>"#,
            )
            .expect("camera heading pattern"),
            iframe_src: Regex::new(r#"<iframe[^>]*\bsrc="(https://c\.streamhoster\.com/[^"]*)""#)
                .expect("iframe pattern"),
            player_config: Regex::new(r"var shCfg = (.*);").expect("player config pattern"),
            cache: ScraperCache::default(),
        })
    }

    /// Drop all memoized lookups. Called between capture rounds.
    pub fn invalidate(&mut self) {
        self.cache = ScraperCache::default();
    }

    /// Cameras currently listed on the portal.
    pub async fn list_cameras(&mut self) -> Result<Vec<Camera>> {
        if let Some(cameras) = &self.cache.cameras {
            return Ok(cameras.clone());
        }
        let page = self.fetch_page(WEBCAMS_PAGE).await?;
        let cameras = self.extract_cameras(&page);
        if cameras.is_empty() {
            warn!("Webcam portal listing yielded no cameras");
        }
        self.cache.cameras = Some(cameras.clone());
        Ok(cameras)
    }

    async fn resolve_hls_url(&mut self, camera: &Camera) -> Result<String> {
        if let Some(url) = self.cache.hls_urls.get(&camera.slug) {
            return Ok(url.clone());
        }

        let camera_page = self
            .fetch_page(&format!("{}{}/", WEBCAM_URL_PREFIX, camera.slug))
            .await?;
        let iframe_url = self.extract_iframe_url(&camera_page).ok_or_else(|| {
            CamlapseError::stream_resolution(&camera.slug, "no stream player iframe on camera page")
        })?;

        let player_page = self.fetch_page(&iframe_url).await?;
        let hls_url = self.extract_hls_url(&player_page).ok_or_else(|| {
            CamlapseError::stream_resolution(&camera.slug, "player page carries no HLS stream URL")
        })?;

        debug!("Resolved '{}' to {}", camera.slug, hls_url);
        self.cache
            .hls_urls
            .insert(camera.slug.clone(), hls_url.clone());
        Ok(hls_url)
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    fn extract_cameras(&self, page: &str) -> Vec<Camera> {
        self.camera_heading
            .captures_iter(page)
            .filter_map(|caps| {
                let href = caps.get(1)?.as_str();
                let name = caps.get(2)?.as_str();
                let slug = href.trim_end_matches('/').rsplit('/').next()?;
                (!slug.is_empty()).then(|| Camera::new(name, slug))
            })
            .collect()
    }

    fn extract_iframe_url(&self, page: &str) -> Option<String> {
        self.iframe_src
            .captures(page)
            .map(|caps| caps[1].to_string())
    }

    /// The player page embeds its configuration as `var shCfg = {...};`;
    /// the adaptive HLS URL lives at `mediaUrlTemplate.hlsAdaptiveUrl.url`.
    fn extract_hls_url(&self, page: &str) -> Option<String> {
        let raw = self.player_config.captures(page)?.get(1)?.as_str();
        let config: serde_json::Value = serde_json::from_str(raw).ok()?;
        config
            .pointer("/mediaUrlTemplate/hlsAdaptiveUrl/url")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
impl FrameSource for WebcamScraper {
    async fn fetch_frame(&mut self, camera: &Camera, dest: &Path) -> Result<()> {
        let hls_url = self.resolve_hls_url(camera).await?;
        grab_frame(&hls_url, dest, &camera.slug).await
    }
}

/// Pull a single still out of a live stream.
async fn grab_frame(stream_url: &str, dest: &Path, slug: &str) -> Result<()> {
    let result = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(stream_url)
        .args(["-frames:v", "1"])
        .arg(dest)
        .output()
        .await?;

    if !result.status.success() {
        return Err(CamlapseError::StreamResolution {
            camera: slug.to_string(),
            message: format!(
                "frame grab failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            ),
        });
    }
    Ok(())
}
