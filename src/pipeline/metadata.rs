use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use exif::{Exif, In, Tag, Value};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::models::media::{GpsPosition, MediaItem, MediaMetadata, MediaType};
use crate::utils::path::resolve_media_url;

/// Lazily extracts and caches descriptive metadata for local media.
///
/// At most one extraction per url runs at a time, and at most `concurrency`
/// extractions run overall. Results stay cached until [`retain`] drops them.
///
/// [`retain`]: MetadataEnricher::retain
pub struct MetadataEnricher {
    root: PathBuf,
    cache: Mutex<HashMap<String, MediaMetadata>>,
    in_flight: Mutex<HashSet<String>>,
    permits: Arc<Semaphore>,
}

/// Clears the in-flight marker however the extraction ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    url: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.url);
    }
}

impl MetadataEnricher {
    pub fn new(root: PathBuf, concurrency: usize) -> Self {
        Self {
            root,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn cached(&self, url: &str) -> Option<MediaMetadata> {
        self.cache.lock().get(url).cloned()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Metadata for `item`, from cache or freshly extracted.
    ///
    /// Returns `None` for items that are not local files, for files that have
    /// disappeared, and when another extraction for the same url is running.
    /// EXIF problems never fail the call; the record just lacks those fields.
    pub async fn enrich(&self, item: &MediaItem) -> Option<MediaMetadata> {
        if let Some(hit) = self.cached(&item.url) {
            return Some(hit);
        }
        let path = resolve_media_url(&self.root, &item.url)?;

        if !self.in_flight.lock().insert(item.url.clone()) {
            debug!(url = %item.url, "metadata extraction already running");
            return None;
        }
        let _marker = InFlight { set: &self.in_flight, url: item.url.clone() };

        let _permit = self.permits.acquire().await.ok()?;
        let media_type = item.media_type;
        let meta = match tokio::task::spawn_blocking(move || read_metadata(&path, media_type)).await {
            Ok(m) => m?,
            Err(e) => {
                warn!(url = %item.url, "metadata task failed: {}", e);
                return None;
            }
        };
        self.cache.lock().insert(item.url.clone(), meta.clone());
        Some(meta)
    }

    /// Drop cached entries whose url is no longer part of the media set.
    pub fn retain(&self, urls: &HashSet<&str>) {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|url, _| urls.contains(url.as_str()));
        if cache.len() != before {
            debug!(dropped = before - cache.len(), "invalidated cached metadata");
        }
    }
}

/// Filesystem fields plus whatever EXIF offers. `None` only when the file
/// itself cannot be stat'ed.
pub fn read_metadata(path: &Path, media_type: MediaType) -> Option<MediaMetadata> {
    let md = fs::metadata(path).ok()?;
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("").to_string();
    let mime_type = mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string();
    let mut meta = MediaMetadata {
        file_name,
        file_size: md.len(),
        mime_type,
        created_at: md.created().ok().map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true)),
        modified_at: md.modified().ok().map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true)),
        gps: None,
    };

    if media_type == MediaType::Image {
        match read_exif(path) {
            Some(exif) => apply_exif(&mut meta, &exif),
            None => debug!(path = %path.display(), "no readable exif"),
        }
    }
    Some(meta)
}

fn read_exif(path: &Path) -> Option<Exif> {
    let f = fs::File::open(path).ok()?;
    let mut buf = BufReader::new(f);
    exif::Reader::new().read_from_container(&mut buf).ok()
}

fn apply_exif(meta: &mut MediaMetadata, exif: &Exif) {
    let taken = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .iter()
        .find_map(|tag| exif_datetime(exif, *tag));
    if let Some(ts) = taken {
        meta.created_at = Some(ts.clone());
        meta.modified_at = Some(ts);
    }
    meta.gps = exif_gps(exif);
}

fn exif_datetime(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref parts) = field.value else { return None };
    let raw = parts.first()?;
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    let naive = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
    match dt.offset.and_then(|mins| FixedOffset::east_opt(mins as i32 * 60)) {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => Some(Utc.from_utc_datetime(&naive).to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

fn exif_gps(exif: &Exif) -> Option<GpsPosition> {
    let lat = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let lon = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    let altitude = exif.get_field(Tag::GPSAltitude, In::PRIMARY).and_then(|f| match &f.value {
        Value::Rational(v) if !v.is_empty() => {
            let below_sea = matches!(
                exif.get_field(Tag::GPSAltitudeRef, In::PRIMARY).map(|r| &r.value),
                Some(Value::Byte(b)) if b.first() == Some(&1)
            );
            let alt = v[0].to_f64();
            Some(if below_sea { -alt } else { alt })
        }
        _ => None,
    });
    Some(GpsPosition { latitude: lat, longitude: lon, altitude })
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn gps_coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(ref dms) = field.value else { return None };
    if dms.is_empty() {
        return None;
    }
    let mut deg = dms[0].to_f64();
    if let Some(m) = dms.get(1) {
        deg += m.to_f64() / 60.0;
    }
    if let Some(s) = dms.get(2) {
        deg += s.to_f64() / 3600.0;
    }
    let negative = matches!(
        exif.get_field(ref_tag, In::PRIMARY).map(|r| &r.value),
        Some(Value::Ascii(parts)) if parts.first().and_then(|p| p.first()) == Some(&negative_ref)
    );
    if !deg.is_finite() {
        return None;
    }
    Some(if negative { -deg } else { deg })
}
