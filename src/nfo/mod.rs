//! Kodi-style `artist.nfo` sidecar reading and writing.

use crate::artist::Artist;
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io::Cursor;
use std::path::Path;

pub const NFO_FILE_NAME: &str = "artist.nfo";

/// Fields carried by an artist sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistNfo {
    pub name: String,
    pub sort_name: Option<String>,
    pub musicbrainz_id: Option<String>,
    pub genres: Vec<String>,
    pub biography: Option<String>,
    pub formed: Option<String>,
    pub disambiguation: Option<String>,
}

impl ArtistNfo {
    pub fn from_artist(artist: &Artist) -> Self {
        let non_empty = |s: &str| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        Self {
            name: artist.name.clone(),
            sort_name: non_empty(&artist.sort_name),
            musicbrainz_id: artist.mbid().map(String::from),
            genres: artist.genres.clone(),
            biography: non_empty(&artist.biography),
            formed: artist.formed.clone(),
            disambiguation: artist.disambiguation.clone(),
        }
    }
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

pub fn render(nfo: &ArtistNfo) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(BytesStart::new("artist")))?;

    write_element(&mut writer, "name", &nfo.name)?;
    if let Some(sort_name) = &nfo.sort_name {
        write_element(&mut writer, "sortname", sort_name)?;
    }
    if let Some(mbid) = &nfo.musicbrainz_id {
        write_element(&mut writer, "musicBrainzArtistID", mbid)?;
    }
    for genre in &nfo.genres {
        write_element(&mut writer, "genre", genre)?;
    }
    if let Some(disambiguation) = &nfo.disambiguation {
        write_element(&mut writer, "disambiguation", disambiguation)?;
    }
    if let Some(formed) = &nfo.formed {
        write_element(&mut writer, "formed", formed)?;
    }
    if let Some(biography) = &nfo.biography {
        write_element(&mut writer, "biography", biography)?;
    }

    writer.write_event(Event::End(BytesEnd::new("artist")))?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).context("NFO output is not valid UTF-8")
}

pub fn parse(xml: &str) -> Result<ArtistNfo> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut nfo = ArtistNfo::default();
    let mut current_tag = String::new();

    loop {
        match reader.read_event().context("Malformed NFO")? {
            Event::Start(ref e) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Event::Text(ref e) => {
                let text = e.unescape()?.to_string();
                match current_tag.as_str() {
                    "name" => nfo.name = text,
                    "sortname" => nfo.sort_name = Some(text),
                    "musicBrainzArtistID" => nfo.musicbrainz_id = Some(text),
                    "genre" => nfo.genres.push(text),
                    "disambiguation" => nfo.disambiguation = Some(text),
                    "formed" => nfo.formed = Some(text),
                    "biography" => nfo.biography = Some(text),
                    _ => {}
                }
            }
            Event::End(_) => current_tag.clear(),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(nfo)
}

pub fn read_file(path: &Path) -> Result<ArtistNfo> {
    let xml =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse(&xml)
}
