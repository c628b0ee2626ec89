use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CamlapseError, Result};

/// Catalog schema. Creation is idempotent so opening an existing database
/// is a no-op and a fresh deployment bootstraps itself on first use.
///
/// `captured_at` is unix epoch seconds; the date-part columns are derived
/// from the capture timestamp in the catalog timezone at insert time and
/// exist only to serve indexed grouping queries. Weekday is Monday = 0.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS images (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    camera      TEXT NOT NULL,
    captured_at INTEGER NOT NULL,
    year        INTEGER NOT NULL,
    month       INTEGER NOT NULL,
    day         INTEGER NOT NULL,
    hour        INTEGER NOT NULL,
    minute      INTEGER NOT NULL,
    second      INTEGER NOT NULL,
    weekday     INTEGER NOT NULL,
    path        TEXT NOT NULL,
    UNIQUE (camera, captured_at)
);
CREATE INDEX IF NOT EXISTS idx_images_camera_captured_at
    ON images (camera, captured_at);
CREATE INDEX IF NOT EXISTS idx_images_camera_date
    ON images (camera, year, month, day);
CREATE INDEX IF NOT EXISTS idx_images_camera_weekday_hour
    ON images (camera, weekday, hour);
";

/// Durable index of captured frames, one row per `(camera, captured_at)`.
///
/// Single-writer, any-reader; the unique constraint backstops retried
/// inserts of the same key.
pub struct ImageCatalog {
    conn: Connection,
    root: PathBuf,
    tz: Tz,
}

impl ImageCatalog {
    /// Open (or create) the catalog at `<root>/camlapse.db`.
    pub fn open<P: AsRef<Path>>(root: P, tz: Tz) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let db_path = root.join("camlapse.db");
        debug!("Opening image catalog at {}", db_path.display());
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, root, tz })
    }

    /// Record a captured frame. Inserting an already-recorded
    /// `(camera, timestamp)` pair succeeds without effect, so retried
    /// captures after a partial failure are harmless.
    ///
    /// Timestamps are stored at second precision; `path` is relative to
    /// the catalog root.
    pub fn add_image(&self, camera: &str, timestamp: DateTime<Tz>, path: &Path) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO images
                (camera, captured_at, year, month, day, hour, minute, second, weekday, path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                camera,
                timestamp.timestamp(),
                timestamp.year(),
                timestamp.month(),
                timestamp.day(),
                timestamp.hour(),
                timestamp.minute(),
                timestamp.second(),
                timestamp.weekday().num_days_from_monday(),
                path.to_string_lossy(),
            ],
        )?;
        Ok(())
    }

    /// All recorded timestamps for a camera, strictly ascending, bounded
    /// inclusively when `earliest`/`latest` are given. An unknown camera
    /// or an empty range yields an empty vector.
    pub fn list_timestamps(
        &self,
        camera: &str,
        earliest: Option<DateTime<Tz>>,
        latest: Option<DateTime<Tz>>,
    ) -> Result<Vec<DateTime<Tz>>> {
        let lo = earliest.map_or(i64::MIN, |ts| ts.timestamp());
        let hi = latest.map_or(i64::MAX, |ts| ts.timestamp());

        let mut stmt = self.conn.prepare(
            "SELECT captured_at FROM images
             WHERE camera = ?1 AND captured_at >= ?2 AND captured_at <= ?3
             ORDER BY captured_at",
        )?;
        let rows = stmt.query_map(params![camera, lo, hi], |row| row.get::<_, i64>(0))?;

        let mut timestamps = Vec::new();
        for secs in rows {
            timestamps.push(self.from_epoch(secs?)?);
        }
        Ok(timestamps)
    }

    /// Absolute path of the frame recorded for `(camera, timestamp)`.
    ///
    /// A missing row is an [`CamlapseError::ImageNotFound`], distinct from
    /// any I/O failure: it means the caller asked for a frame the catalog
    /// never recorded.
    pub fn image_path(&self, camera: &str, timestamp: DateTime<Tz>) -> Result<PathBuf> {
        let path: Option<String> = self
            .conn
            .query_row(
                "SELECT path FROM images WHERE camera = ?1 AND captured_at = ?2",
                params![camera, timestamp.timestamp()],
                |row| row.get(0),
            )
            .optional()?;

        match path {
            Some(relative) => Ok(absolute(self.root.join(relative))?),
            None => Err(CamlapseError::ImageNotFound {
                camera: camera.to_string(),
                timestamp,
            }),
        }
    }

    /// Bulk-import every row from another catalog of identical schema,
    /// keeping this catalog's row on key collisions. Returns the number of
    /// rows actually inserted. The source file is left in place; removing
    /// it is the caller's decision.
    pub fn merge_from(&self, source: &Path) -> Result<usize> {
        self.conn.execute(
            "ATTACH DATABASE ?1 AS source",
            params![source.to_string_lossy()],
        )?;
        let insert = self.conn.execute(
            "INSERT OR IGNORE INTO images
                (camera, captured_at, year, month, day, hour, minute, second, weekday, path)
             SELECT camera, captured_at, year, month, day, hour, minute, second, weekday, path
             FROM source.images",
            [],
        );
        let detach = self.conn.execute("DETACH DATABASE source", []);
        let inserted = insert?;
        detach?;
        Ok(inserted)
    }

    /// Merge and remove a catalog left behind by a parallel migration
    /// process, if one exists. Returns whether anything was merged.
    pub fn merge_pending(&self, migration_db: &Path) -> Result<bool> {
        if !migration_db.exists() {
            return Ok(false);
        }
        info!("Found {}, merging", migration_db.display());
        let inserted = self.merge_from(migration_db)?;
        std::fs::remove_file(migration_db)?;
        info!("Merged {} rows from pending migration catalog", inserted);
        Ok(true)
    }

    fn from_epoch(&self, secs: i64) -> Result<DateTime<Tz>> {
        DateTime::from_timestamp(secs, 0)
            .map(|utc| utc.with_timezone(&self.tz))
            .ok_or(CamlapseError::InvalidTimestamp(secs))
    }
}

/// `Path::canonicalize` requires the file to exist; catalog rows may be
/// resolved before the filesystem is touched, so normalize lexically.
fn absolute(path: PathBuf) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
