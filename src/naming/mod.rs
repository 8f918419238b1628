//! Canonical artwork filenames per media-center convention.
//!
//! A profile lists, per image type, the filenames a media center will look
//! for in an artist folder. The first name of each list is the primary name,
//! used when nothing is on disk yet.

use crate::artist::ImageType;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tbn"];

lazy_static! {
    static ref NUMBERED_VARIANT: Regex =
        Regex::new(r"^(?P<stem>.+?)(?P<num>\d+)\.(?P<ext>[A-Za-z0-9]+)$").unwrap();
}

/// Per-type filename overrides read from the `[naming]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamingOverrides {
    pub thumb: Option<Vec<String>>,
    pub fanart: Option<Vec<String>>,
    pub logo: Option<Vec<String>>,
    pub banner: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingProfile {
    pub name: String,
    pub thumb: Vec<String>,
    pub fanart: Vec<String>,
    pub logo: Vec<String>,
    pub banner: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl NamingProfile {
    pub fn kodi() -> Self {
        Self {
            name: "kodi".to_string(),
            thumb: names(&["folder.jpg", "artist.jpg"]),
            fanart: names(&["fanart.jpg"]),
            logo: names(&["logo.png"]),
            banner: names(&["banner.jpg"]),
        }
    }

    pub fn emby() -> Self {
        Self {
            name: "emby".to_string(),
            thumb: names(&["folder.jpg"]),
            fanart: names(&["backdrop.jpg"]),
            logo: names(&["logo.png"]),
            banner: names(&["banner.jpg"]),
        }
    }

    pub fn plex() -> Self {
        Self {
            name: "plex".to_string(),
            thumb: names(&["artist.jpg"]),
            fanart: names(&["fanart.jpg"]),
            logo: names(&["logo.png"]),
            banner: names(&["banner.jpg"]),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "kodi" => Some(Self::kodi()),
            "emby" | "jellyfin" => Some(Self::emby()),
            "plex" => Some(Self::plex()),
            _ => None,
        }
    }

    /// Replace the filename lists that have an override. Empty lists are ignored
    /// so a profile never loses its primary name.
    pub fn with_overrides(mut self, overrides: &NamingOverrides) -> Self {
        let apply = |target: &mut Vec<String>, value: &Option<Vec<String>>| {
            if let Some(list) = value {
                if !list.is_empty() {
                    *target = list.clone();
                }
            }
        };
        apply(&mut self.thumb, &overrides.thumb);
        apply(&mut self.fanart, &overrides.fanart);
        apply(&mut self.logo, &overrides.logo);
        apply(&mut self.banner, &overrides.banner);
        self
    }

    pub fn names_for(&self, image_type: ImageType) -> &[String] {
        match image_type {
            ImageType::Thumb => &self.thumb,
            ImageType::Fanart => &self.fanart,
            ImageType::Logo => &self.logo,
            ImageType::Banner => &self.banner,
        }
    }

    pub fn primary_name(&self, image_type: ImageType) -> Option<&str> {
        self.names_for(image_type).first().map(String::as_str)
    }

    /// Lowercased set of every filename considered canonical in `dir`: the
    /// profile names plus numbered fanart variants found on disk.
    pub fn canonical_names(&self, dir: &Path) -> HashSet<String> {
        let mut set: HashSet<String> = ImageType::ALL
            .iter()
            .flat_map(|t| self.names_for(*t).iter())
            .map(|n| n.to_lowercase())
            .collect();

        for file in list_files(dir) {
            if self.is_numbered_fanart(&file) {
                set.insert(file.to_lowercase());
            }
        }
        set
    }

    fn is_numbered_fanart(&self, file_name: &str) -> bool {
        let Some(caps) = NUMBERED_VARIANT.captures(file_name) else {
            return false;
        };
        let stem = caps["stem"].to_lowercase();
        let ext = caps["ext"].to_lowercase();
        self.fanart.iter().any(|name| {
            let lower = name.to_lowercase();
            match lower.rsplit_once('.') {
                Some((base, base_ext)) => base == stem && base_ext == ext,
                None => false,
            }
        })
    }

    /// Every canonical file of `image_type` present in `dir`, in profile order.
    pub fn existing_files(&self, dir: &Path, image_type: ImageType) -> Vec<PathBuf> {
        let on_disk = list_files(dir);
        self.names_for(image_type)
            .iter()
            .filter_map(|name| {
                on_disk
                    .iter()
                    .find(|f| f.eq_ignore_ascii_case(name))
                    .map(|f| dir.join(f))
            })
            .collect()
    }

    /// First canonical file of `image_type` present in `dir`.
    pub fn find_existing(&self, dir: &Path, image_type: ImageType) -> Option<PathBuf> {
        self.existing_files(dir, image_type).into_iter().next()
    }

    /// Image files in `dir` (not recursive) outside the canonical set.
    pub fn extraneous_images(&self, dir: &Path) -> Vec<PathBuf> {
        let canonical = self.canonical_names(dir);
        let mut found: Vec<PathBuf> = list_files(dir)
            .into_iter()
            .filter(|f| is_image_file(f) && !canonical.contains(&f.to_lowercase()))
            .map(|f| dir.join(f))
            .collect();
        found.sort();
        found
    }
}

impl Default for NamingProfile {
    fn default() -> Self {
        Self::kodi()
    }
}

pub fn is_image_file(file_name: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Plain file names directly inside `dir`. An unreadable directory yields
/// an empty list.
fn list_files(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_profiles_by_name() {
        assert_eq!(NamingProfile::by_name("KODI").unwrap().name, "kodi");
        assert_eq!(NamingProfile::by_name("emby").unwrap().fanart, vec!["backdrop.jpg"]);
        assert_eq!(NamingProfile::by_name("plex").unwrap().thumb, vec!["artist.jpg"]);
        assert!(NamingProfile::by_name("winamp").is_none());
    }

    #[test]
    fn test_find_existing_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Artist.JPG");
        let profile = NamingProfile::kodi();
        let found = profile.find_existing(dir.path(), ImageType::Thumb).unwrap();
        assert_eq!(found.file_name().unwrap(), "Artist.JPG");
        assert!(profile.find_existing(dir.path(), ImageType::Fanart).is_none());
    }

    #[test]
    fn test_find_existing_follows_profile_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "artist.jpg");
        touch(dir.path(), "folder.jpg");
        let profile = NamingProfile::kodi();
        let found = profile.find_existing(dir.path(), ImageType::Thumb).unwrap();
        assert_eq!(found.file_name().unwrap(), "folder.jpg");
        assert_eq!(profile.existing_files(dir.path(), ImageType::Thumb).len(), 2);
    }

    #[test]
    fn test_numbered_fanart_variants_are_canonical() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "fanart.jpg");
        touch(dir.path(), "fanart1.jpg");
        touch(dir.path(), "Fanart12.JPG");
        touch(dir.path(), "fanart2.png");
        touch(dir.path(), "cover.png");
        touch(dir.path(), "artist.nfo");

        let profile = NamingProfile::kodi();
        let canonical = profile.canonical_names(dir.path());
        assert!(canonical.contains("fanart1.jpg"));
        assert!(canonical.contains("fanart12.jpg"));

        let extraneous: Vec<String> = profile
            .extraneous_images(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(extraneous, vec!["cover.png", "fanart2.png"]);
    }

    #[test]
    fn test_overrides_replace_lists() {
        let overrides = NamingOverrides {
            thumb: Some(vec!["poster.jpg".to_string()]),
            fanart: Some(vec![]),
            ..Default::default()
        };
        let profile = NamingProfile::kodi().with_overrides(&overrides);
        assert_eq!(profile.primary_name(ImageType::Thumb), Some("poster.jpg"));
        assert_eq!(profile.primary_name(ImageType::Fanart), Some("fanart.jpg"));
    }

    #[test]
    fn test_missing_directory_has_no_files() {
        let profile = NamingProfile::kodi();
        let missing = Path::new("/definitely/not/here");
        assert!(profile.extraneous_images(missing).is_empty());
        assert!(profile.find_existing(missing, ImageType::Logo).is_none());
    }
}
