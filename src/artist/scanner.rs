use super::{Artist, ImageType};
use crate::library_store::ArtistStore;
use crate::naming::NamingProfile;
use crate::nfo::{self, NFO_FILE_NAME};
use anyhow::{bail, Result};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub total: usize,
}

/// Stable artist id derived from the folder's path relative to the library.
fn artist_id(relative: &Path) -> String {
    let key = relative.to_string_lossy().replace('\\', "/");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

fn refresh_presence(artist: &mut Artist, naming: &NamingProfile) -> bool {
    let mut changed = false;
    for image_type in ImageType::ALL {
        let present = naming.find_existing(&artist.path, image_type).is_some();
        if artist.has_image(image_type) != present {
            artist.set_image_flag(image_type, present);
            changed = true;
        }
    }
    let nfo_present = artist.path.join(NFO_FILE_NAME).is_file();
    if artist.nfo_exists != nfo_present {
        artist.nfo_exists = nfo_present;
        changed = true;
    }
    changed
}

/// Seed a new artist from an existing sidecar, if there is a readable one.
fn seed_from_nfo(artist: &mut Artist) {
    let path = artist.path.join(NFO_FILE_NAME);
    if !path.is_file() {
        return;
    }
    match nfo::read_file(&path) {
        Ok(sidecar) => {
            artist.musicbrainz_id = sidecar.musicbrainz_id.filter(|id| !id.trim().is_empty());
            if let Some(sort_name) = sidecar.sort_name {
                artist.sort_name = sort_name;
            }
            artist.biography = sidecar.biography.unwrap_or_default();
            artist.genres = sidecar.genres;
            artist.formed = sidecar.formed;
            artist.disambiguation = sidecar.disambiguation;
        }
        Err(e) => warn!("Ignoring unreadable {:?}: {:#}", path, e),
    }
}

/// Register every top-level folder of `library_path` as an artist and
/// refresh the on-disk presence flags of known ones. Metadata already
/// stored for an artist is never overwritten.
pub fn scan_library(
    library_path: &Path,
    naming: &NamingProfile,
    store: &dyn ArtistStore,
) -> Result<ScanSummary> {
    if !library_path.is_dir() {
        bail!("Library path {:?} is not a directory", library_path);
    }
    info!("Scanning library at {:?}", library_path);

    let mut summary = ScanSummary::default();
    let mut dirs: Vec<_> = WalkDir::new(library_path)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    dirs.sort();

    for dir in dirs {
        let Ok(relative) = dir.strip_prefix(library_path) else {
            continue;
        };
        let id = artist_id(relative);
        let name = relative.to_string_lossy().to_string();

        match store.get_artist(&id)? {
            Some(mut artist) => {
                artist.path = dir.clone();
                if refresh_presence(&mut artist, naming) {
                    store.save_artist(&artist)?;
                    summary.updated += 1;
                    debug!("Refreshed '{}'", artist.name);
                }
            }
            None => {
                let mut artist = Artist::new(id, name, dir.clone());
                seed_from_nfo(&mut artist);
                refresh_presence(&mut artist, naming);
                store.save_artist(&artist)?;
                summary.added += 1;
                debug!("Added '{}'", artist.name);
            }
        }
        summary.total += 1;
    }

    info!(
        "Scan finished: {} artists, {} added, {} updated",
        summary.total, summary.added, summary.updated
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::SqliteLibraryStore;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_adds_then_refreshes() {
        let library = TempDir::new().unwrap();
        let db = TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(db.path().join("library.db")).unwrap();
        let naming = NamingProfile::kodi();

        let alpha = library.path().join("Alpha");
        fs::create_dir(&alpha).unwrap();
        fs::create_dir(library.path().join("Beta")).unwrap();
        fs::write(library.path().join("stray.txt"), b"x").unwrap();
        fs::write(alpha.join("folder.jpg"), b"x").unwrap();
        fs::write(
            alpha.join(NFO_FILE_NAME),
            "<artist><name>Alpha</name><musicBrainzArtistID>mbid-a</musicBrainzArtistID></artist>",
        )
        .unwrap();

        let summary = scan_library(library.path(), &naming, &store).unwrap();
        assert_eq!(
            summary,
            ScanSummary {
                added: 2,
                updated: 0,
                total: 2
            }
        );

        let artists = store.list_artists(false).unwrap();
        assert_eq!(artists[0].name, "Alpha");
        assert!(artists[0].thumb_exists);
        assert!(artists[0].nfo_exists);
        assert_eq!(artists[0].mbid(), Some("mbid-a"));
        assert!(!artists[1].thumb_exists);

        // rescanning keeps ids stable and only touches what changed
        fs::write(library.path().join("Beta").join("fanart.jpg"), b"x").unwrap();
        let summary = scan_library(library.path(), &naming, &store).unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.updated, 1);
        let beta = store.get_artist(&artists[1].id).unwrap().unwrap();
        assert!(beta.fanart_exists);
    }

    #[test]
    fn test_scan_rejects_missing_library() {
        let db = TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(db.path().join("library.db")).unwrap();
        assert!(scan_library(Path::new("/nonexistent/library"), &NamingProfile::kodi(), &store).is_err());
    }
}
