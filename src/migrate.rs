use chrono::{Datelike, NaiveDateTime, TimeZone};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::catalog::ImageCatalog;
use crate::config::CamlapseConfig;
use crate::error::Result;

/// One-time migration of the legacy flat `<root>/<camera>/<file>` layout
/// into the date-partitioned layout, registering every moved frame in the
/// catalog. Files whose names don't parse as capture timestamps are left
/// untouched; already-partitioned content is invisible to the scan (only
/// regular files directly under a camera directory are considered).
pub fn migrate_flat_layout(config: &CamlapseConfig, catalog: &ImageCatalog) -> Result<usize> {
    let pattern = format!("{}.{}", config.file_name_format, config.file_format);
    let mut migrated = 0;

    for camera_entry in fs::read_dir(&config.output_path)? {
        let camera_entry = camera_entry?;
        if !camera_entry.file_type()?.is_dir() {
            continue;
        }
        let camera = camera_entry.file_name().to_string_lossy().to_string();

        for image_entry in fs::read_dir(camera_entry.path())? {
            let image_entry = image_entry?;
            if !image_entry.file_type()?.is_file() {
                continue;
            }
            let file_name = image_entry.file_name().to_string_lossy().to_string();

            let Ok(naive) = NaiveDateTime::parse_from_str(&file_name, &pattern) else {
                continue;
            };
            let Some(timestamp) = config.timezone.from_local_datetime(&naive).single() else {
                warn!(
                    "Skipping '{}/{}': wall time is ambiguous in {}",
                    camera, file_name, config.timezone
                );
                continue;
            };

            let relative = Path::new(&camera)
                .join(timestamp.year().to_string())
                .join(format!("{:02}", timestamp.month()))
                .join(format!("{:02}", timestamp.day()))
                .join(&file_name);
            let dest = config.output_path.join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(image_entry.path(), &dest)?;
            catalog.add_image(&camera, timestamp, &relative)?;
            migrated += 1;
        }
    }

    info!("Migrated {} legacy frames", migrated);
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::St_Johns;

    fn setup(dir: &Path) -> (CamlapseConfig, ImageCatalog) {
        let config = CamlapseConfig {
            output_path: dir.to_path_buf(),
            ..CamlapseConfig::default()
        };
        let catalog = ImageCatalog::open(dir, config.timezone).unwrap();
        (config, catalog)
    }

    #[test]
    fn test_migrates_flat_frames_into_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let (config, catalog) = setup(dir.path());

        let camera_dir = dir.path().join("downtown");
        fs::create_dir_all(&camera_dir).unwrap();
        fs::write(camera_dir.join("2024-06-07T10-00-00.jpg"), b"frame").unwrap();
        fs::write(camera_dir.join("notes.txt"), b"not a frame").unwrap();

        let migrated = migrate_flat_layout(&config, &catalog).unwrap();
        assert_eq!(migrated, 1);

        let dest = dir
            .path()
            .join("downtown/2024/06/07/2024-06-07T10-00-00.jpg");
        assert!(dest.exists());
        assert!(!camera_dir.join("2024-06-07T10-00-00.jpg").exists());
        // Unparseable files stay where they are.
        assert!(camera_dir.join("notes.txt").exists());

        let stamp = St_Johns.with_ymd_and_hms(2024, 6, 7, 10, 0, 0).unwrap();
        assert_eq!(catalog.image_path("downtown", stamp).unwrap(), dest);
    }

    #[test]
    fn test_second_run_finds_nothing_left_to_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let (config, catalog) = setup(dir.path());

        let camera_dir = dir.path().join("downtown");
        fs::create_dir_all(&camera_dir).unwrap();
        fs::write(camera_dir.join("2024-06-07T10-00-00.jpg"), b"frame").unwrap();

        assert_eq!(migrate_flat_layout(&config, &catalog).unwrap(), 1);
        assert_eq!(migrate_flat_layout(&config, &catalog).unwrap(), 0);
        assert_eq!(
            catalog.list_timestamps("downtown", None, None).unwrap().len(),
            1
        );
    }
}
