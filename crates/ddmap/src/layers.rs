//! Gameplay layer extraction.
//!
//! Walks the decoded layer headers, picks the first layer of each gameplay
//! kind and splits its data block into per-field grids.

use std::borrow::Cow;

use ddmap_datafile::Datafile;
use tracing::{debug, warn};
use zerocopy::FromBytes;

use crate::items::{LayerHeader, TilemapHeader};
use crate::tiles::{
    expand_skip, Grid, SpeedupTile, SwitchTile, TeleTile, Tile, TileRecord, TuneTile,
};
use crate::{Error, Result, TileLayerKind};

/// Tile index and flags of a game or front layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLayer {
    index: Grid<u8>,
    flags: Grid<u8>,
}

/// The front layer shares the game layer's shape.
pub type FrontLayer = GameLayer;

impl GameLayer {
    pub fn width(&self) -> usize {
        self.index.width()
    }

    pub fn height(&self) -> usize {
        self.index.height()
    }

    pub fn index(&self) -> &Grid<u8> {
        &self.index
    }

    pub fn flags(&self) -> &Grid<u8> {
        &self.flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeleLayer {
    number: Grid<u8>,
    tile_type: Grid<u8>,
}

impl TeleLayer {
    pub fn width(&self) -> usize {
        self.number.width()
    }

    pub fn height(&self) -> usize {
        self.number.height()
    }

    pub fn number(&self) -> &Grid<u8> {
        &self.number
    }

    pub fn tile_type(&self) -> &Grid<u8> {
        &self.tile_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedupLayer {
    force: Grid<u8>,
    max_speed: Grid<u8>,
    tile_type: Grid<u8>,
    angle: Grid<i16>,
}

impl SpeedupLayer {
    pub fn width(&self) -> usize {
        self.force.width()
    }

    pub fn height(&self) -> usize {
        self.force.height()
    }

    pub fn force(&self) -> &Grid<u8> {
        &self.force
    }

    pub fn max_speed(&self) -> &Grid<u8> {
        &self.max_speed
    }

    pub fn tile_type(&self) -> &Grid<u8> {
        &self.tile_type
    }

    /// Direction in degrees.
    pub fn angle(&self) -> &Grid<i16> {
        &self.angle
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchLayer {
    number: Grid<u8>,
    tile_type: Grid<u8>,
    flags: Grid<u8>,
    delay: Grid<u8>,
}

impl SwitchLayer {
    pub fn width(&self) -> usize {
        self.number.width()
    }

    pub fn height(&self) -> usize {
        self.number.height()
    }

    pub fn number(&self) -> &Grid<u8> {
        &self.number
    }

    pub fn tile_type(&self) -> &Grid<u8> {
        &self.tile_type
    }

    pub fn flags(&self) -> &Grid<u8> {
        &self.flags
    }

    pub fn delay(&self) -> &Grid<u8> {
        &self.delay
    }
}

/// Runtime door state. Map files never store doors; the layer exists
/// zero-filled at game dimensions whenever the map has a switch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorLayer {
    index: Grid<u8>,
    flags: Grid<u8>,
    number: Grid<i32>,
}

impl DoorLayer {
    fn zeroed(width: usize, height: usize) -> Self {
        Self {
            index: Grid::filled(width, height, 0),
            flags: Grid::filled(width, height, 0),
            number: Grid::filled(width, height, 0),
        }
    }

    pub fn width(&self) -> usize {
        self.index.width()
    }

    pub fn height(&self) -> usize {
        self.index.height()
    }

    pub fn index(&self) -> &Grid<u8> {
        &self.index
    }

    pub fn flags(&self) -> &Grid<u8> {
        &self.flags
    }

    pub fn number(&self) -> &Grid<i32> {
        &self.number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneLayer {
    number: Grid<u8>,
    tile_type: Grid<u8>,
}

impl TuneLayer {
    pub fn width(&self) -> usize {
        self.number.width()
    }

    pub fn height(&self) -> usize {
        self.number.height()
    }

    pub fn number(&self) -> &Grid<u8> {
        &self.number
    }

    pub fn tile_type(&self) -> &Grid<u8> {
        &self.tile_type
    }
}

/// Listing entry for one tile layer, in item order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LayerSummary {
    /// Position among the layer items.
    pub index: usize,
    pub group: Option<usize>,
    pub kind: TileLayerKind,
    pub name: Option<String>,
    pub width: i32,
    pub height: i32,
    /// Whether this layer was chosen as its kind's gameplay layer.
    pub selected: bool,
}

#[derive(Debug)]
pub(crate) struct Layers {
    pub game: GameLayer,
    pub front: Option<FrontLayer>,
    pub tele: Option<TeleLayer>,
    pub speedup: Option<SpeedupLayer>,
    pub switch: Option<SwitchLayer>,
    pub door: Option<DoorLayer>,
    pub tune: Option<TuneLayer>,
    pub summaries: Vec<LayerSummary>,
}

/// A tile layer chosen as its kind's gameplay layer.
#[derive(Debug, Clone, Copy)]
struct Selected<'h> {
    index: usize,
    tilemap: &'h TilemapHeader,
}

impl Selected<'_> {
    fn invalid(&self, reason: String) -> Error {
        Error::InvalidLayer {
            index: self.index,
            reason,
        }
    }

    fn dimensions(&self) -> Result<(usize, usize)> {
        let tilemap = self.tilemap;
        let width = usize::try_from(tilemap.width)
            .map_err(|_| self.invalid(format!("negative width {}", tilemap.width)))?;
        let height = usize::try_from(tilemap.height)
            .map_err(|_| self.invalid(format!("negative height {}", tilemap.height)))?;
        width
            .checked_mul(height)
            .ok_or_else(|| self.invalid(format!("{width}x{height} overflows")))?;
        Ok((width, height))
    }

    fn data_index(&self) -> Result<i32> {
        let index = self.tilemap.special_data();
        if index < 0 {
            return Err(self.invalid(format!("{} layer has no data block", self.tilemap.kind)));
        }
        Ok(index)
    }

    fn block<'d>(&self, file: &'d Datafile<'_>) -> Result<&'d [u8]> {
        Ok(file.data(self.data_index()?)?)
    }

    /// Data block as exactly `width * height` records.
    fn records<'d, R: TileRecord>(
        &self,
        file: &'d Datafile<'_>,
        width: usize,
        height: usize,
    ) -> Result<&'d [R]> {
        let bytes = self.block(file)?;
        let expected = width.saturating_mul(height).saturating_mul(R::SIZE);
        let mismatch = || Error::LayerSizeMismatch {
            kind: self.tilemap.kind,
            expected,
            actual: bytes.len(),
        };
        if bytes.len() != expected {
            return Err(mismatch());
        }
        <[R]>::ref_from_bytes(bytes).map_err(|_| mismatch())
    }

    /// Plain tiles, expanding the skip encoding for newer tilemaps.
    fn tiles(&self, file: &Datafile<'_>, width: usize, height: usize) -> Result<GameLayer> {
        let skip_encoded = self.tilemap.version >= TilemapHeader::TILE_SKIP_MIN_VERSION;
        let tiles: Cow<'_, [Tile]> = if skip_encoded {
            Cow::Owned(self.expanded_tiles(file, width * height)?)
        } else {
            Cow::Borrowed(self.records::<Tile>(file, width, height)?)
        };

        Ok(GameLayer {
            index: Grid::project(width, height, &tiles[..], |t| t.index),
            flags: Grid::project(width, height, &tiles[..], |t| t.flags),
        })
    }

    /// Run-length encoded tiles expanded to exactly `area` records.
    ///
    /// The expanded size is checked against the datafile's limits before
    /// anything is allocated.
    fn expanded_tiles(&self, file: &Datafile<'_>, area: usize) -> Result<Vec<Tile>> {
        let index = self.data_index()?;
        let expected = area.saturating_mul(Tile::SIZE);
        let limits = file.limits();
        let limit = if expected > limits.max_block_size {
            Some(limits.max_block_size)
        } else if expected > limits.max_total_size {
            Some(limits.max_total_size)
        } else {
            None
        };
        if let Some(limit) = limit {
            return Err(ddmap_datafile::Error::BlockTooLarge {
                index: index as usize,
                size: expected,
                limit,
            }
            .into());
        }

        let bytes = file.data(index)?;
        let mismatch = |actual: usize| Error::LayerSizeMismatch {
            kind: self.tilemap.kind,
            expected,
            actual,
        };
        let packed = <[Tile]>::ref_from_bytes(bytes).map_err(|_| mismatch(bytes.len()))?;
        let expanded = expand_skip(packed, area);
        if expanded.len() != area {
            return Err(mismatch(expanded.len().saturating_mul(Tile::SIZE)));
        }
        Ok(expanded)
    }
}

/// First layer of each gameplay kind.
#[derive(Debug, Default)]
struct Selection<'h> {
    game: Option<Selected<'h>>,
    front: Option<Selected<'h>>,
    tele: Option<Selected<'h>>,
    speedup: Option<Selected<'h>>,
    switch: Option<Selected<'h>>,
    tune: Option<Selected<'h>>,
}

impl<'h> Selection<'h> {
    fn slot(&mut self, kind: TileLayerKind) -> Option<&mut Option<Selected<'h>>> {
        match kind {
            TileLayerKind::Game => Some(&mut self.game),
            TileLayerKind::Front => Some(&mut self.front),
            TileLayerKind::Tele => Some(&mut self.tele),
            TileLayerKind::Speedup => Some(&mut self.speedup),
            TileLayerKind::Switch => Some(&mut self.switch),
            TileLayerKind::Tune => Some(&mut self.tune),
            TileLayerKind::Design => None,
        }
    }

    /// Record the layer if it is the first of its kind.
    fn offer(&mut self, index: usize, tilemap: &'h TilemapHeader) -> bool {
        let Some(slot) = self.slot(tilemap.kind) else {
            return false;
        };
        if let Some(first) = slot {
            warn!(index, first = first.index, kind = %tilemap.kind, "ignoring duplicate layer");
            return false;
        }
        *slot = Some(Selected { index, tilemap });
        true
    }
}

pub(crate) fn extract(file: &Datafile<'_>, headers: &[LayerHeader]) -> Result<Layers> {
    let mut selection = Selection::default();
    let mut summaries = Vec::new();

    for header in headers {
        let Some(tilemap) = header.tilemap.as_ref() else {
            continue;
        };
        let selected = selection.offer(header.index, tilemap);
        summaries.push(LayerSummary {
            index: header.index,
            group: header.group,
            kind: tilemap.kind,
            name: tilemap.name.clone(),
            width: tilemap.width,
            height: tilemap.height,
            selected,
        });
    }

    let game_layer = selection.game.ok_or(Error::MissingGameLayer)?;
    let (width, height) = game_layer.dimensions()?;
    if width == 0 || height == 0 {
        return Err(Error::MissingGameLayer);
    }
    let game = game_layer.tiles(file, width, height)?;
    debug!(width, height, "extracted game layer");

    let front = selection
        .front
        .map(|layer| {
            let dims = layer.dimensions()?;
            if dims != (width, height) {
                return Err(Error::LayerDimensionMismatch {
                    kind: TileLayerKind::Front,
                    expected: (width, height),
                    actual: dims,
                });
            }
            layer.tiles(file, width, height)
        })
        .transpose()?;

    let tele = selection
        .tele
        .map(|layer| {
            let (w, h) = layer.dimensions()?;
            let records = layer.records::<TeleTile>(file, w, h)?;
            Ok::<_, Error>(TeleLayer {
                number: Grid::project(w, h, records, |t| t.number),
                tile_type: Grid::project(w, h, records, |t| t.tile_type),
            })
        })
        .transpose()?;

    let speedup = selection
        .speedup
        .map(|layer| {
            let (w, h) = layer.dimensions()?;
            let records = layer.records::<SpeedupTile>(file, w, h)?;
            Ok::<_, Error>(SpeedupLayer {
                force: Grid::project(w, h, records, |t| t.force),
                max_speed: Grid::project(w, h, records, |t| t.max_speed),
                tile_type: Grid::project(w, h, records, |t| t.tile_type),
                angle: Grid::project(w, h, records, |t| t.angle.get()),
            })
        })
        .transpose()?;

    let switch = selection
        .switch
        .map(|layer| {
            let (w, h) = layer.dimensions()?;
            let records = layer.records::<SwitchTile>(file, w, h)?;
            Ok::<_, Error>(SwitchLayer {
                number: Grid::project(w, h, records, |t| t.number),
                tile_type: Grid::project(w, h, records, |t| t.tile_type),
                flags: Grid::project(w, h, records, |t| t.flags),
                delay: Grid::project(w, h, records, |t| t.delay),
            })
        })
        .transpose()?;

    let tune = selection
        .tune
        .map(|layer| {
            let (w, h) = layer.dimensions()?;
            let records = layer.records::<TuneTile>(file, w, h)?;
            Ok::<_, Error>(TuneLayer {
                number: Grid::project(w, h, records, |t| t.number),
                tile_type: Grid::project(w, h, records, |t| t.tile_type),
            })
        })
        .transpose()?;

    let door = switch.as_ref().map(|_| DoorLayer::zeroed(width, height));

    debug!(
        front = front.is_some(),
        tele = tele.is_some(),
        speedup = speedup.is_some(),
        switch = switch.is_some(),
        tune = tune.is_some(),
        "extracted gameplay layers"
    );

    Ok(Layers {
        game,
        front,
        tele,
        speedup,
        switch,
        door,
        tune,
        summaries,
    })
}
