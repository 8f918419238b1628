use super::models::{AutomationMode, Rule, RuleCategory, RuleConfig, Severity};
use chrono::Utc;

struct Seed {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: RuleCategory,
    config: RuleConfig,
}

fn severity(severity: Severity) -> RuleConfig {
    RuleConfig {
        severity: Some(severity),
        ..Default::default()
    }
}

fn best_pick(severity: Severity) -> RuleConfig {
    RuleConfig {
        severity: Some(severity),
        auto_select_best: true,
        ..Default::default()
    }
}

fn resolution(severity: Severity, min_width: u32, min_height: u32) -> RuleConfig {
    RuleConfig {
        severity: Some(severity),
        min_width: Some(min_width),
        min_height: Some(min_height),
        ..Default::default()
    }
}

fn aspect(severity: Severity, ratio: f64, tolerance: f64) -> RuleConfig {
    RuleConfig {
        severity: Some(severity),
        aspect_ratio: Some(ratio),
        tolerance: Some(tolerance),
        ..Default::default()
    }
}

fn seeds() -> Vec<Seed> {
    vec![
        Seed {
            id: "nfo_exists",
            name: "NFO file exists",
            description: "Artist folder contains an artist.nfo sidecar",
            category: RuleCategory::Nfo,
            config: severity(Severity::Warning),
        },
        Seed {
            id: "nfo_has_mbid",
            name: "MusicBrainz ID present",
            description: "Artist carries a MusicBrainz identifier",
            category: RuleCategory::Nfo,
            config: severity(Severity::Warning),
        },
        Seed {
            id: "thumb_exists",
            name: "Thumbnail exists",
            description: "Artist folder contains a thumbnail image",
            category: RuleCategory::Image,
            config: best_pick(Severity::Error),
        },
        Seed {
            id: "thumb_square",
            name: "Thumbnail is square",
            description: "Thumbnail aspect ratio is close to 1:1",
            category: RuleCategory::Image,
            config: aspect(Severity::Info, 1.0, 0.1),
        },
        Seed {
            id: "thumb_min_res",
            name: "Thumbnail resolution",
            description: "Thumbnail is at least 500x500",
            category: RuleCategory::Image,
            config: RuleConfig {
                auto_select_best: true,
                ..resolution(Severity::Warning, 500, 500)
            },
        },
        Seed {
            id: "fanart_exists",
            name: "Fanart exists",
            description: "Artist folder contains a fanart image",
            category: RuleCategory::Image,
            config: best_pick(Severity::Warning),
        },
        Seed {
            id: "fanart_min_res",
            name: "Fanart resolution",
            description: "Fanart is at least 1920x1080",
            category: RuleCategory::Image,
            config: resolution(Severity::Info, 1920, 1080),
        },
        Seed {
            id: "fanart_aspect",
            name: "Fanart aspect ratio",
            description: "Fanart aspect ratio is close to 16:9",
            category: RuleCategory::Image,
            config: aspect(Severity::Info, 16.0 / 9.0, 0.1),
        },
        Seed {
            id: "logo_exists",
            name: "Logo exists",
            description: "Artist folder contains a transparent logo",
            category: RuleCategory::Image,
            config: best_pick(Severity::Info),
        },
        Seed {
            id: "logo_min_res",
            name: "Logo resolution",
            description: "Logo is at least 400x155",
            category: RuleCategory::Image,
            config: resolution(Severity::Info, 400, 155),
        },
        Seed {
            id: "logo_padding",
            name: "Logo padding",
            description: "Logo has no excess transparent padding",
            category: RuleCategory::Image,
            config: RuleConfig {
                severity: Some(Severity::Info),
                padding_threshold: Some(0.05),
                ..Default::default()
            },
        },
        Seed {
            id: "banner_exists",
            name: "Banner exists",
            description: "Artist folder contains a banner image",
            category: RuleCategory::Image,
            config: best_pick(Severity::Info),
        },
        Seed {
            id: "banner_min_res",
            name: "Banner resolution",
            description: "Banner is at least 1000x185",
            category: RuleCategory::Image,
            config: resolution(Severity::Info, 1000, 185),
        },
        Seed {
            id: "bio_exists",
            name: "Biography present",
            description: "Artist has a biography",
            category: RuleCategory::Metadata,
            config: RuleConfig {
                severity: Some(Severity::Warning),
                min_length: Some(10),
                ..Default::default()
            },
        },
        Seed {
            id: "extraneous_images",
            name: "No extraneous images",
            description: "Artist folder holds only canonical image files",
            category: RuleCategory::Filesystem,
            config: severity(Severity::Info),
        },
    ]
}

/// Built-in rules as seeded into a fresh database: enabled, automatic.
pub fn builtin_rules() -> Vec<Rule> {
    let now = Utc::now();
    seeds()
        .into_iter()
        .map(|seed| Rule {
            id: seed.id.to_string(),
            name: seed.name.to_string(),
            description: seed.description.to_string(),
            category: seed.category,
            enabled: true,
            automation_mode: AutomationMode::Auto,
            config: seed.config,
            built_in: true,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

pub fn is_builtin(rule_id: &str) -> bool {
    seeds().iter().any(|seed| seed.id == rule_id)
}
