//! Checker functions. Each one inspects an artist against a rule config and
//! returns a message when the rule is violated. Checkers never fail: state
//! they cannot read counts as passing.

use super::models::RuleConfig;
use crate::artist::{Artist, ImageType};
use crate::imaging;
use crate::naming::NamingProfile;

pub type CheckFn = fn(&Artist, &RuleConfig, &NamingProfile) -> Option<String>;

#[derive(Clone, Copy)]
pub struct CheckerEntry {
    pub rule_id: &'static str,
    pub fixable: bool,
    pub check: CheckFn,
}

/// Ordered checker table. Registration order is the order violations are
/// reported in.
#[derive(Clone)]
pub struct CheckerRegistry {
    entries: Vec<CheckerEntry>,
}

impl CheckerRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("nfo_exists", true, nfo_exists);
        registry.register("nfo_has_mbid", true, nfo_has_mbid);
        registry.register("thumb_exists", true, thumb_exists);
        registry.register("thumb_square", true, thumb_square);
        registry.register("thumb_min_res", true, thumb_min_res);
        registry.register("fanart_exists", true, fanart_exists);
        registry.register("fanart_min_res", true, fanart_min_res);
        registry.register("fanart_aspect", true, fanart_aspect);
        registry.register("logo_exists", true, logo_exists);
        registry.register("logo_min_res", true, logo_min_res);
        registry.register("logo_padding", true, logo_padding);
        registry.register("banner_exists", true, banner_exists);
        registry.register("banner_min_res", true, banner_min_res);
        registry.register("bio_exists", true, bio_exists);
        registry.register("extraneous_images", true, extraneous_images);
        registry
    }

    /// Add a checker, replacing any previous one for the same rule id in place.
    pub fn register(&mut self, rule_id: &'static str, fixable: bool, check: CheckFn) {
        let entry = CheckerEntry {
            rule_id,
            fixable,
            check,
        };
        match self.entries.iter_mut().find(|e| e.rule_id == rule_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<&CheckerEntry> {
        self.entries.iter().find(|e| e.rule_id == rule_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn nfo_exists(artist: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
    (!artist.nfo_exists).then(|| "Missing artist.nfo".to_string())
}

fn nfo_has_mbid(artist: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
    artist
        .mbid()
        .is_none()
        .then(|| "No MusicBrainz ID".to_string())
}

fn missing_image(artist: &Artist, image_type: ImageType) -> Option<String> {
    (!artist.has_image(image_type)).then(|| format!("Missing {} image", image_type))
}

fn thumb_exists(artist: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
    missing_image(artist, ImageType::Thumb)
}

fn fanart_exists(artist: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
    missing_image(artist, ImageType::Fanart)
}

fn logo_exists(artist: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
    missing_image(artist, ImageType::Logo)
}

fn banner_exists(artist: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
    missing_image(artist, ImageType::Banner)
}

fn on_disk_dimensions(
    artist: &Artist,
    image_type: ImageType,
    naming: &NamingProfile,
) -> Option<(u32, u32)> {
    let path = naming.find_existing(&artist.path, image_type)?;
    imaging::dimensions(&path)
}

/// Shape an image must have to satisfy one rule. A rule without a minimum
/// has `(0, 0)`; a rule that does not constrain the shape has no aspect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageRequirements {
    pub min: (u32, u32),
    pub aspect: Option<AspectTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectTarget {
    pub ratio: f64,
    pub tolerance: f64,
}

impl AspectTarget {
    pub fn matches(&self, width: u32, height: u32) -> bool {
        height > 0 && (width as f64 / height as f64 - self.ratio).abs() <= self.tolerance
    }
}

impl ImageRequirements {
    /// Built-in defaults for `rule_id`, overridden by whatever `config` sets.
    pub fn for_rule(rule_id: &str, config: &RuleConfig) -> Self {
        let default_min = match rule_id {
            "thumb_min_res" => (500, 500),
            "fanart_min_res" => (1920, 1080),
            "logo_min_res" => (400, 155),
            "banner_min_res" => (1000, 185),
            _ => (0, 0),
        };
        let default_ratio = match rule_id {
            "thumb_square" => Some(1.0),
            "fanart_aspect" => Some(16.0 / 9.0),
            _ => None,
        };
        Self {
            min: (
                config.min_width.unwrap_or(default_min.0),
                config.min_height.unwrap_or(default_min.1),
            ),
            aspect: config.aspect_ratio.or(default_ratio).map(|ratio| AspectTarget {
                ratio,
                tolerance: config.tolerance.unwrap_or(0.1),
            }),
        }
    }

    pub fn below_minimum(&self, width: u32, height: u32) -> bool {
        width < self.min.0 || height < self.min.1
    }

    pub fn wrong_aspect(&self, width: u32, height: u32) -> bool {
        self.aspect.is_some_and(|a| !a.matches(width, height))
    }
}

fn check_min_res(
    artist: &Artist,
    config: &RuleConfig,
    naming: &NamingProfile,
    rule_id: &str,
    image_type: ImageType,
) -> Option<String> {
    let (width, height) = on_disk_dimensions(artist, image_type, naming)?;
    let required = ImageRequirements::for_rule(rule_id, config);
    required.below_minimum(width, height).then(|| {
        format!(
            "{} is {}x{}, below minimum {}x{}",
            image_type, width, height, required.min.0, required.min.1
        )
    })
}

fn check_aspect(
    artist: &Artist,
    config: &RuleConfig,
    naming: &NamingProfile,
    rule_id: &str,
    image_type: ImageType,
) -> Option<String> {
    let (width, height) = on_disk_dimensions(artist, image_type, naming)?;
    let target = ImageRequirements::for_rule(rule_id, config).aspect?;
    (!target.matches(width, height)).then(|| {
        format!(
            "{} aspect ratio {:.2} differs from {:.2} (tolerance {:.2})",
            image_type,
            width as f64 / height as f64,
            target.ratio,
            target.tolerance
        )
    })
}

fn thumb_square(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    check_aspect(artist, config, naming, "thumb_square", ImageType::Thumb)
}

fn thumb_min_res(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    check_min_res(artist, config, naming, "thumb_min_res", ImageType::Thumb)
}

fn fanart_min_res(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    check_min_res(artist, config, naming, "fanart_min_res", ImageType::Fanart)
}

fn fanart_aspect(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    check_aspect(artist, config, naming, "fanart_aspect", ImageType::Fanart)
}

fn logo_min_res(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    check_min_res(artist, config, naming, "logo_min_res", ImageType::Logo)
}

fn banner_min_res(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    check_min_res(artist, config, naming, "banner_min_res", ImageType::Banner)
}

pub const DEFAULT_PADDING_THRESHOLD: f64 = 0.05;

fn logo_padding(artist: &Artist, config: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    let path = naming.find_existing(&artist.path, ImageType::Logo)?;
    let img = imaging::decode_file(&path)?;
    let padding = imaging::padding(&img)?;
    let threshold = config
        .padding_threshold
        .unwrap_or(DEFAULT_PADDING_THRESHOLD);
    let worst = padding.max_side();
    (worst > threshold).then(|| {
        format!(
            "Logo has {:.1}% transparent padding (threshold {:.1}%)",
            worst * 100.0,
            threshold * 100.0
        )
    })
}

fn bio_exists(artist: &Artist, config: &RuleConfig, _: &NamingProfile) -> Option<String> {
    let min_length = config.min_length.unwrap_or(10);
    let length = artist.biography.trim().chars().count();
    (length < min_length).then(|| {
        if length == 0 {
            "No biography".to_string()
        } else {
            format!("Biography is {} characters, minimum {}", length, min_length)
        }
    })
}

fn extraneous_images(artist: &Artist, _: &RuleConfig, naming: &NamingProfile) -> Option<String> {
    let files = naming.extraneous_images(&artist.path);
    if files.is_empty() {
        return None;
    }
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    Some(format!(
        "{} non-canonical image file(s): {}",
        names.len(),
        names.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb, Rgba};
    use std::fs;
    use tempfile::TempDir;

    fn write_rgb(path: &std::path::Path, width: u32, height: u32) {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([10, 20, 30])));
        img.save(path).unwrap();
    }

    fn check(rule_id: &str, artist: &Artist, config: &RuleConfig) -> Option<String> {
        let registry = CheckerRegistry::builtin();
        let entry = registry.get(rule_id).unwrap();
        (entry.check)(artist, config, &NamingProfile::kodi())
    }

    #[test]
    fn test_presence_checkers() {
        let dir = TempDir::new().unwrap();
        let mut artist = Artist::new("a", "A", dir.path());
        let config = RuleConfig::default();
        assert!(check("nfo_exists", &artist, &config).is_some());
        assert!(check("thumb_exists", &artist, &config).is_some());
        artist.nfo_exists = true;
        artist.thumb_exists = true;
        assert!(check("nfo_exists", &artist, &config).is_none());
        assert!(check("thumb_exists", &artist, &config).is_none());
    }

    #[test]
    fn test_dimension_checkers_abstain_without_file() {
        let dir = TempDir::new().unwrap();
        let mut artist = Artist::new("a", "A", dir.path());
        artist.thumb_exists = true;
        let config = RuleConfig::default();
        assert!(check("thumb_min_res", &artist, &config).is_none());
        assert!(check("thumb_square", &artist, &config).is_none());
        assert!(check("logo_padding", &artist, &config).is_none());
    }

    #[test]
    fn test_dimension_checkers_abstain_on_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("folder.jpg"), b"garbage").unwrap();
        let artist = Artist::new("a", "A", dir.path());
        assert!(check("thumb_min_res", &artist, &RuleConfig::default()).is_none());
    }

    #[test]
    fn test_min_res_and_aspect() {
        let dir = TempDir::new().unwrap();
        write_rgb(&dir.path().join("folder.jpg"), 400, 300);
        let artist = Artist::new("a", "A", dir.path());

        let msg = check("thumb_min_res", &artist, &RuleConfig::default()).unwrap();
        assert!(msg.contains("400x300"));
        assert!(check("thumb_square", &artist, &RuleConfig::default()).is_some());

        let relaxed = RuleConfig {
            min_width: Some(300),
            min_height: Some(200),
            tolerance: Some(0.5),
            ..Default::default()
        };
        assert!(check("thumb_min_res", &artist, &relaxed).is_none());
        assert!(check("thumb_square", &artist, &relaxed).is_none());
    }

    #[test]
    fn test_image_requirements_defaults_and_overrides() {
        let square = ImageRequirements::for_rule("thumb_square", &RuleConfig::default());
        assert_eq!(square.min, (0, 0));
        assert!(square.wrong_aspect(1500, 500));
        assert!(!square.wrong_aspect(1000, 1050));

        let fanart = ImageRequirements::for_rule("fanart_min_res", &RuleConfig::default());
        assert!(fanart.below_minimum(1280, 720));
        assert!(fanart.aspect.is_none());

        let relaxed = RuleConfig {
            min_width: Some(100),
            tolerance: Some(2.5),
            ..Default::default()
        };
        let square = ImageRequirements::for_rule("thumb_square", &relaxed);
        assert_eq!(square.min, (100, 0));
        assert!(!square.wrong_aspect(1500, 500));
    }

    #[test]
    fn test_logo_padding() {
        let dir = TempDir::new().unwrap();
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_fn(100, 40, |x, _| {
            if (20..80).contains(&x) {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }));
        img.save(dir.path().join("logo.png")).unwrap();
        let artist = Artist::new("a", "A", dir.path());
        assert!(check("logo_padding", &artist, &RuleConfig::default()).is_some());

        let lenient = RuleConfig {
            padding_threshold: Some(0.25),
            ..Default::default()
        };
        assert!(check("logo_padding", &artist, &lenient).is_none());
    }

    #[test]
    fn test_bio_exists_trims() {
        let dir = TempDir::new().unwrap();
        let mut artist = Artist::new("a", "A", dir.path());
        artist.biography = "   short   ".to_string();
        assert!(check("bio_exists", &artist, &RuleConfig::default()).is_some());
        artist.biography = "A long enough biography.".to_string();
        assert!(check("bio_exists", &artist, &RuleConfig::default()).is_none());
    }

    #[test]
    fn test_extraneous_images() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("folder.jpg"), b"x").unwrap();
        let artist = Artist::new("a", "A", dir.path());
        assert!(check("extraneous_images", &artist, &RuleConfig::default()).is_none());
        fs::write(dir.path().join("scan0001.png"), b"x").unwrap();
        let msg = check("extraneous_images", &artist, &RuleConfig::default()).unwrap();
        assert!(msg.contains("scan0001.png"));
    }

    #[test]
    fn test_register_replaces_in_place() {
        fn always(_: &Artist, _: &RuleConfig, _: &NamingProfile) -> Option<String> {
            Some("always".to_string())
        }
        let mut registry = CheckerRegistry::builtin();
        let len = registry.len();
        registry.register("nfo_exists", false, always);
        assert_eq!(registry.len(), len);
        assert_eq!(registry.iter().next().unwrap().rule_id, "nfo_exists");
        assert!(!registry.get("nfo_exists").unwrap().fixable);
    }
}
