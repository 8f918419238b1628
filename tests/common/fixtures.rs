//! Temporary libraries backed by a real SQLite store.

use catalog_auditor::artist::Artist;
use catalog_auditor::events::NoOpEventBus;
use catalog_auditor::fixers::{Fixer, FixerSet};
use catalog_auditor::library_store::{LibraryStores, SqliteLibraryStore};
use catalog_auditor::naming::NamingProfile;
use catalog_auditor::rules::{builtin_rules, AutomationMode, Engine, RuleConfig};
use catalog_auditor::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A library folder plus its database. Everything is removed on drop.
pub struct TestLibrary {
    pub stores: LibraryStores,
    pub library_path: PathBuf,
    _dir: TempDir,
}

impl TestLibrary {
    /// Seeds every built-in rule, enabling only `enabled` in `mode`.
    pub fn with_rules(enabled: &[&str], mode: AutomationMode) -> Self {
        let dir = TempDir::new().unwrap();
        let library_path = dir.path().join("music");
        std::fs::create_dir_all(&library_path).unwrap();
        let store = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db")).unwrap());
        let stores = LibraryStores::from_store(store);

        for mut rule in builtin_rules() {
            rule.enabled = enabled.contains(&rule.id.as_str());
            rule.automation_mode = mode;
            stores.rules.save_rule(&rule).unwrap();
        }

        Self {
            stores,
            library_path,
            _dir: dir,
        }
    }

    /// Replace a rule's config, keeping everything else.
    pub fn configure_rule(&self, rule_id: &str, config: RuleConfig) {
        let mut rule = self.stores.rules.get_rule(rule_id).unwrap().unwrap();
        rule.config = config;
        self.stores.rules.save_rule(&rule).unwrap();
    }

    /// Create the artist's folder and save a bare artist row for it.
    pub fn add_artist(&self, id: &str, name: &str) -> Artist {
        let path = self.library_path.join(name);
        std::fs::create_dir_all(&path).unwrap();
        let artist = Artist::new(id, name, path);
        self.stores.artists.save_artist(&artist).unwrap();
        artist
    }

    pub fn save(&self, artist: &Artist) {
        self.stores.artists.save_artist(artist).unwrap();
    }

    pub fn artist(&self, id: &str) -> Artist {
        self.stores.artists.get_artist(id).unwrap().unwrap()
    }

    pub fn engine(&self) -> Arc<Engine> {
        Arc::new(Engine::new(self.stores.rules.clone(), NamingProfile::kodi()))
    }

    pub fn pipeline(&self, fixers: Vec<Arc<dyn Fixer>>) -> Pipeline {
        Pipeline::new(
            self.engine(),
            self.stores.clone(),
            FixerSet::new(fixers),
            Arc::new(NoOpEventBus),
        )
    }
}
