//! Map item type registry.
//!
//! Maps datafile type ids onto the map item kinds and decodes the fixed
//! headers of group and layer items. Payloads are read word by word because
//! older format revisions write shorter items; missing trailing words are
//! treated as absent.

use std::fmt;

use ddmap_datafile::{Datafile, Item};
use tracing::warn;

use crate::{Error, Result};

/// Known map item kinds, keyed by datafile type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Version,
    Info,
    Image,
    Envelope,
    Group,
    Layer,
    EnvPoints,
    Sound,
    /// Anything newer or unrelated (including UUID extension items). Skipped.
    Other(u16),
}

impl ItemKind {
    pub const fn from_type_id(type_id: u16) -> Self {
        match type_id {
            0 => ItemKind::Version,
            1 => ItemKind::Info,
            2 => ItemKind::Image,
            3 => ItemKind::Envelope,
            4 => ItemKind::Group,
            5 => ItemKind::Layer,
            6 => ItemKind::EnvPoints,
            7 => ItemKind::Sound,
            other => ItemKind::Other(other),
        }
    }

    pub const fn type_id(self) -> u16 {
        match self {
            ItemKind::Version => 0,
            ItemKind::Info => 1,
            ItemKind::Image => 2,
            ItemKind::Envelope => 3,
            ItemKind::Group => 4,
            ItemKind::Layer => 5,
            ItemKind::EnvPoints => 6,
            ItemKind::Sound => 7,
            ItemKind::Other(type_id) => type_id,
        }
    }
}

/// Layer type word of a layer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Invalid,
    Game,
    Tiles,
    Quads,
    Front,
    Tele,
    Speedup,
    Switch,
    Tune,
    SoundsDeprecated,
    Sounds,
    Other(i32),
}

impl From<i32> for LayerType {
    fn from(value: i32) -> Self {
        match value {
            0 => LayerType::Invalid,
            1 => LayerType::Game,
            2 => LayerType::Tiles,
            3 => LayerType::Quads,
            4 => LayerType::Front,
            5 => LayerType::Tele,
            6 => LayerType::Speedup,
            7 => LayerType::Switch,
            8 => LayerType::Tune,
            9 => LayerType::SoundsDeprecated,
            10 => LayerType::Sounds,
            other => LayerType::Other(other),
        }
    }
}

/// Tilemap flag bits marking the gameplay layers.
pub mod tilemap_flags {
    pub const GAME: i32 = 1;
    pub const TELE: i32 = 2;
    pub const SPEEDUP: i32 = 4;
    pub const FRONT: i32 = 8;
    pub const SWITCH: i32 = 16;
    pub const TUNE: i32 = 32;
}

/// Gameplay role of a tile layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TileLayerKind {
    Game,
    Front,
    Tele,
    Speedup,
    Switch,
    Tune,
    /// Decorative layer without gameplay meaning.
    Design,
}

impl TileLayerKind {
    /// Classify by tilemap flags. A layer carrying several flags takes the
    /// first in the order game, front, tele, speedup, switch, tune.
    pub fn from_flags(flags: i32) -> Self {
        use tilemap_flags::*;

        if flags & GAME != 0 {
            TileLayerKind::Game
        } else if flags & FRONT != 0 {
            TileLayerKind::Front
        } else if flags & TELE != 0 {
            TileLayerKind::Tele
        } else if flags & SPEEDUP != 0 {
            TileLayerKind::Speedup
        } else if flags & SWITCH != 0 {
            TileLayerKind::Switch
        } else if flags & TUNE != 0 {
            TileLayerKind::Tune
        } else {
            TileLayerKind::Design
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TileLayerKind::Game => "game",
            TileLayerKind::Front => "front",
            TileLayerKind::Tele => "tele",
            TileLayerKind::Speedup => "speedup",
            TileLayerKind::Switch => "switch",
            TileLayerKind::Tune => "tune",
            TileLayerKind::Design => "design",
        }
    }
}

impl fmt::Display for TileLayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded group item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    pub version: i32,
    pub start_layer: i32,
    pub num_layers: i32,
    /// Present from group version 3.
    pub name: Option<String>,
}

impl GroupHeader {
    const START_LAYER: usize = 5;
    const NUM_LAYERS: usize = 6;
    const NAME: usize = 12;

    /// Decode a group item; `None` when it is too short to carry a layer range.
    pub fn parse(item: &Item<'_>) -> Option<Self> {
        let version = item.word(0)?;
        let start_layer = item.word(Self::START_LAYER)?;
        let num_layers = item.word(Self::NUM_LAYERS)?;
        let name = (version >= 3)
            .then(|| read_name(item, Self::NAME))
            .flatten();

        Some(Self {
            version,
            start_layer,
            num_layers,
            name,
        })
    }

    /// Whether the layer at `index` (in layer item order) belongs to this group.
    pub fn contains(&self, index: usize) -> bool {
        let start = i64::from(self.start_layer);
        let end = start + i64::from(self.num_layers);
        (start..end).contains(&(index as i64))
    }
}

/// Decoded tile layer portion of a layer item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilemapHeader {
    pub version: i32,
    pub width: i32,
    pub height: i32,
    pub flags: i32,
    pub kind: TileLayerKind,
    /// Block of plain 4-byte tiles.
    pub data: i32,
    pub tele: i32,
    pub speedup: i32,
    pub front: i32,
    pub switch: i32,
    pub tune: i32,
    /// Present from tilemap version 3.
    pub name: Option<String>,
}

impl TilemapHeader {
    /// Tilemap versions from which plain tile data is run-length encoded
    /// through the tile `skip` byte.
    pub const TILE_SKIP_MIN_VERSION: i32 = 4;

    const VERSION: usize = 3;
    const WIDTH: usize = 4;
    const HEIGHT: usize = 5;
    const FLAGS: usize = 6;
    const DATA: usize = 14;
    const NAME: usize = 15;
    const TELE: usize = 18;
    const SPEEDUP: usize = 19;
    const FRONT: usize = 20;
    const SWITCH: usize = 21;
    const TUNE: usize = 22;

    /// Word that held the special data index before names were added.
    const LEGACY_SPECIAL: usize = 15;

    fn parse(item: &Item<'_>) -> Option<Self> {
        let version = item.word(Self::VERSION)?;
        let width = item.word(Self::WIDTH)?;
        let height = item.word(Self::HEIGHT)?;
        let flags = item.word(Self::FLAGS)?;
        let kind = TileLayerKind::from_flags(flags);

        let mut header = Self {
            version,
            width,
            height,
            flags,
            kind,
            data: item.word_or(Self::DATA, -1),
            tele: item.word_or(Self::TELE, -1),
            speedup: item.word_or(Self::SPEEDUP, -1),
            front: item.word_or(Self::FRONT, -1),
            switch: item.word_or(Self::SWITCH, -1),
            tune: item.word_or(Self::TUNE, -1),
            name: (version >= 3)
                .then(|| read_name(item, Self::NAME))
                .flatten(),
        };

        if version <= 2 {
            let legacy = item.word_or(Self::LEGACY_SPECIAL, -1);
            match kind {
                TileLayerKind::Front => header.front = legacy,
                TileLayerKind::Tele => header.tele = legacy,
                TileLayerKind::Speedup => header.speedup = legacy,
                TileLayerKind::Switch => header.switch = legacy,
                TileLayerKind::Tune => header.tune = legacy,
                TileLayerKind::Game | TileLayerKind::Design => {}
            }
        }

        Some(header)
    }

    /// Data block holding this layer's gameplay records.
    pub fn special_data(&self) -> i32 {
        match self.kind {
            TileLayerKind::Game | TileLayerKind::Design => self.data,
            TileLayerKind::Front => self.front,
            TileLayerKind::Tele => self.tele,
            TileLayerKind::Speedup => self.speedup,
            TileLayerKind::Switch => self.switch,
            TileLayerKind::Tune => self.tune,
        }
    }
}

/// Decoded layer item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHeader {
    /// Position among the layer items.
    pub index: usize,
    /// Group whose layer range covers this layer.
    pub group: Option<usize>,
    pub layer_type: LayerType,
    pub flags: i32,
    /// Present for `LayerType::Tiles`.
    pub tilemap: Option<TilemapHeader>,
}

impl LayerHeader {
    const TYPE: usize = 1;
    const FLAGS: usize = 2;

    pub fn parse(index: usize, item: &Item<'_>, groups: &[GroupHeader]) -> Result<Self> {
        let (Some(layer_type), Some(flags)) = (item.word(Self::TYPE), item.word(Self::FLAGS))
        else {
            return Err(Error::InvalidLayer {
                index,
                reason: format!(
                    "layer item has {} words, expected at least 3",
                    item.len_words()
                ),
            });
        };
        let layer_type = LayerType::from(layer_type);

        let tilemap = match layer_type {
            LayerType::Tiles => {
                let tilemap = TilemapHeader::parse(item).ok_or_else(|| Error::InvalidLayer {
                    index,
                    reason: format!(
                        "tile layer item has {} words, expected at least 7",
                        item.len_words()
                    ),
                })?;
                Some(tilemap)
            }
            _ => None,
        };

        Ok(Self {
            index,
            group: groups.iter().position(|group| group.contains(index)),
            layer_type,
            flags,
            tilemap,
        })
    }
}

/// Decode all group items in item order. Groups too short to be valid are
/// skipped.
pub fn read_groups(file: &Datafile<'_>) -> Vec<GroupHeader> {
    file.items_of_type(ItemKind::Group.type_id())
        .iter()
        .filter_map(|item| {
            let group = GroupHeader::parse(item);
            if group.is_none() {
                warn!(
                    id = item.id(),
                    words = item.len_words(),
                    "skipping short group item"
                );
            }
            group
        })
        .collect()
}

/// Decode all layer items in item order.
pub fn read_layers(file: &Datafile<'_>, groups: &[GroupHeader]) -> Result<Vec<LayerHeader>> {
    file.items_of_type(ItemKind::Layer.type_id())
        .iter()
        .enumerate()
        .map(|(index, item)| LayerHeader::parse(index, item, groups))
        .collect()
}

/// Decode a name packed into three words, four characters per word.
fn read_name(item: &Item<'_>, start: usize) -> Option<String> {
    let words = [item.word(start)?, item.word(start + 1)?, item.word(start + 2)?];
    Some(ints_to_str(&words))
}

/// Unpack a string stored as big-endian words of `char + 128` bytes.
///
/// The final byte is always treated as the terminator.
pub fn ints_to_str(words: &[i32]) -> String {
    let mut bytes: Vec<u8> = words
        .iter()
        .flat_map(|&word| word.to_be_bytes())
        .map(|byte| byte.wrapping_sub(128))
        .collect();
    if let Some(last) = bytes.last_mut() {
        *last = 0;
    }
    let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
