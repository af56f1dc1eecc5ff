//! Capture device model and discovery.
//!
//! Discovery results are held in a [`DeviceCache`] owned by the caller. Nothing
//! is memoized globally; call [`DeviceCache::refresh`] when the device list
//! should be re-read.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CaptureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Video,
    Audio,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Video => write!(f, "video"),
            DeviceKind::Audio => write!(f, "audio"),
        }
    }
}

/// A capture device as FFmpeg addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Human-readable name
    pub name: String,
    /// Identifier passed to FFmpeg: `/dev/video0` for V4L2, `hw:0` for ALSA
    pub id: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

impl Device {
    pub fn new(name: impl Into<String>, id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            kind,
            is_default: false,
        }
    }

    /// A video device named after its identifier.
    pub fn video(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, DeviceKind::Video)
    }

    /// An audio device named after its identifier.
    pub fn audio(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, DeviceKind::Audio)
    }

    pub(crate) fn expect_kind(&self, kind: DeviceKind) -> Result<()> {
        if self.kind != kind {
            return Err(CaptureError::invalid_argument(format!(
                "device {:?} is not a {} device",
                self.name, kind
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.kind)?;
        if self.is_default {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}

/// Caller-owned device list.
#[derive(Debug, Clone, Default)]
pub struct DeviceCache {
    devices: Vec<Device>,
    populated: bool,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate devices on this system.
    pub fn refresh(&mut self) -> &[Device] {
        self.refresh_with(discover)
    }

    /// Re-enumerate using the given discovery function.
    pub fn refresh_with<F>(&mut self, discover: F) -> &[Device]
    where
        F: FnOnce() -> Vec<Device>,
    {
        self.devices = discover();
        self.populated = true;
        log::debug!("Device cache refreshed: {} devices", self.devices.len());
        &self.devices
    }

    /// Devices found by the last refresh. Empty until the first refresh.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(move |d| d.kind == kind)
    }

    pub fn find(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// The default device of a kind, falling back to the first one found.
    pub fn default_device(&self, kind: DeviceKind) -> Option<&Device> {
        self.of_kind(kind)
            .find(|d| d.is_default)
            .or_else(|| self.of_kind(kind).next())
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.populated = false;
    }
}

/// Enumerate capture devices for the current platform.
///
/// Returns an empty list rather than an error when nothing can be found.
pub fn discover() -> Vec<Device> {
    #[cfg(target_os = "linux")]
    {
        discover_linux()
    }
    #[cfg(not(target_os = "linux"))]
    {
        log::warn!("Device discovery is only implemented for Linux");
        Vec::new()
    }
}

/// V4L2 nodes under `/dev` plus ALSA cards from `/proc/asound/cards`.
#[cfg(target_os = "linux")]
pub fn discover_linux() -> Vec<Device> {
    let mut devices = discover_v4l2(Path::new("/dev"));
    match std::fs::read_to_string("/proc/asound/cards") {
        Ok(cards) => devices.extend(parse_asound_cards(&cards)),
        Err(e) => log::debug!("No ALSA card list: {}", e),
    }
    devices
}

/// `video*` nodes in `dir` that can be opened.
pub fn discover_v4l2(dir: &Path) -> Vec<Device> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("video"))
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter(|path| match std::fs::File::open(path) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                false
            }
        })
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Device {
                is_default: name == "video0",
                name,
                id: path.to_string_lossy().into_owned(),
                kind: DeviceKind::Video,
            }
        })
        .collect()
}

/// Parse `/proc/asound/cards`.
///
/// Card lines look like ` 0 [PCH            ]: HDA-Intel - HDA Intel PCH`;
/// the continuation lines that follow them are ignored.
pub fn parse_asound_cards(contents: &str) -> Vec<Device> {
    contents
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return None;
            }
            let rest = trimmed[digits.len()..].trim_start();
            if !rest.starts_with('[') {
                return None;
            }

            let line = line.trim();
            let name = match line.find(" - ") {
                Some(idx) => line[idx + 3..].trim(),
                None => line,
            };

            Some(Device {
                name: name.to_string(),
                id: format!("hw:{}", digits),
                kind: DeviceKind::Audio,
                is_default: digits == "0",
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARDS: &str = " 0 [PCH            ]: HDA-Intel - HDA Intel PCH
                      HDA Intel PCH at 0xf7f10000 irq 32
 1 [C920           ]: USB-Audio - HD Pro Webcam C920
                      Logitech HD Pro Webcam C920 at usb-0000:00:14.0-2, high speed
";

    #[test]
    fn test_parse_asound_cards() {
        let devices = parse_asound_cards(CARDS);
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].id, "hw:0");
        assert_eq!(devices[0].name, "HDA Intel PCH");
        assert!(devices[0].is_default);
        assert_eq!(devices[0].kind, DeviceKind::Audio);

        assert_eq!(devices[1].id, "hw:1");
        assert_eq!(devices[1].name, "HD Pro Webcam C920");
        assert!(!devices[1].is_default);
    }

    #[test]
    fn test_parse_asound_cards_empty() {
        assert!(parse_asound_cards("--- no soundcards ---\n").is_empty());
        assert!(parse_asound_cards("").is_empty());
    }

    #[test]
    fn test_discover_v4l2_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["video1", "video0", "audio0"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let devices = discover_v4l2(dir.path());
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["video0", "video1"]);
        assert!(devices[0].is_default);
        assert!(devices[0].id.ends_with("/video0"));
        assert!(devices.iter().all(|d| d.kind == DeviceKind::Video));
    }

    #[test]
    fn test_discover_v4l2_missing_directory() {
        assert!(discover_v4l2(Path::new("/nonexistent/ffcapture/dev")).is_empty());
    }

    #[test]
    fn test_cache_is_explicit() {
        let mut cache = DeviceCache::new();
        assert!(!cache.is_populated());
        assert!(cache.devices().is_empty());

        cache.refresh_with(|| vec![Device::video("/dev/video0"), Device::audio("hw:0")]);
        assert!(cache.is_populated());
        assert_eq!(cache.devices().len(), 2);
        assert_eq!(cache.of_kind(DeviceKind::Audio).count(), 1);
        assert!(cache.find("hw:0").is_some());

        // A second refresh replaces the list instead of appending to it.
        cache.refresh_with(|| vec![Device::audio("hw:1")]);
        assert_eq!(cache.devices().len(), 1);
        assert!(cache.find("/dev/video0").is_none());

        cache.clear();
        assert!(!cache.is_populated());
    }

    #[test]
    fn test_default_device_fallback() {
        let mut cache = DeviceCache::new();
        let mut preferred = Device::video("/dev/video2");
        preferred.is_default = true;
        cache.refresh_with(|| vec![Device::video("/dev/video1"), preferred]);

        assert_eq!(cache.default_device(DeviceKind::Video).unwrap().id, "/dev/video2");
        assert!(cache.default_device(DeviceKind::Audio).is_none());

        cache.refresh_with(|| vec![Device::audio("hw:3")]);
        assert_eq!(cache.default_device(DeviceKind::Audio).unwrap().id, "hw:3");
    }

    #[test]
    fn test_kind_check() {
        assert!(Device::video("/dev/video0").expect_kind(DeviceKind::Video).is_ok());
        assert!(Device::audio("hw:0").expect_kind(DeviceKind::Video).is_err());
    }
}
