//! Map info item: author metadata and server settings.

use ddmap_datafile::{Datafile, Item};
use tracing::debug;

use crate::items::ItemKind;
use crate::Result;

/// Author metadata from the map info item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MapInfo {
    pub author: Option<String>,
    pub version: Option<String>,
    pub credits: Option<String>,
    pub license: Option<String>,
}

impl MapInfo {
    const AUTHOR: usize = 1;
    const VERSION: usize = 2;
    const CREDITS: usize = 3;
    const LICENSE: usize = 4;

    fn read(file: &Datafile<'_>, item: &Item<'_>) -> Result<Self> {
        let field = |word| string_at(file, item.word_or(word, -1));
        Ok(Self {
            author: field(Self::AUTHOR)?,
            version: field(Self::VERSION)?,
            credits: field(Self::CREDITS)?,
            license: field(Self::LICENSE)?,
        })
    }
}

/// Word of the info item holding the settings block index.
const SETTINGS: usize = 5;

/// Read the info item. Maps without one have empty info and no settings.
pub(crate) fn extract(file: &Datafile<'_>) -> Result<(MapInfo, Vec<String>)> {
    let kind = ItemKind::Info.type_id();
    let Some(item) = file
        .find_item(kind, 0)
        .or_else(|| file.items_of_type(kind).first())
    else {
        debug!("map has no info item");
        return Ok((MapInfo::default(), Vec::new()));
    };

    let info = MapInfo::read(file, item)?;
    let settings = match item.word(SETTINGS) {
        Some(index) if index >= 0 => split_settings(file.data(index)?),
        _ => Vec::new(),
    };
    debug!(settings = settings.len(), "read map info");

    Ok((info, settings))
}

/// Split a settings block into commands.
///
/// Each NUL terminates one command, empty ones included; bytes after the
/// last NUL form a final command.
pub fn split_settings(blob: &[u8]) -> Vec<String> {
    let mut settings = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(0, blob) {
        settings.push(String::from_utf8_lossy(&blob[start..end]).into_owned());
        start = end + 1;
    }
    if start < blob.len() {
        settings.push(String::from_utf8_lossy(&blob[start..]).into_owned());
    }
    settings
}

/// NUL-terminated string stored in a data block. Negative indices mean absent.
fn string_at(file: &Datafile<'_>, index: i32) -> Result<Option<String>> {
    if index < 0 {
        return Ok(None);
    }
    let bytes = file.data(index)?;
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    Ok(Some(String::from_utf8_lossy(&bytes[..end]).into_owned()))
}
