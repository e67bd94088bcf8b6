//! Assembled map.

use std::fs;
use std::path::Path;

use ddmap_datafile::{Datafile, Limits};
use tracing::{debug, info};

use crate::items::{self, ItemKind};
use crate::layers::{
    self, DoorLayer, FrontLayer, GameLayer, LayerSummary, SpeedupLayer, SwitchLayer, TeleLayer,
    TuneLayer,
};
use crate::settings::{self, MapInfo};
use crate::Result;

/// A fully parsed map.
///
/// Owns all extracted grids; nothing borrows from the input buffer. The game
/// layer is always present and defines the map dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    game: GameLayer,
    front: Option<FrontLayer>,
    tele: Option<TeleLayer>,
    speedup: Option<SpeedupLayer>,
    switch: Option<SwitchLayer>,
    door: Option<DoorLayer>,
    tune: Option<TuneLayer>,
    settings: Vec<String>,
    info: MapInfo,
    layers: Vec<LayerSummary>,
}

impl Map {
    /// Parse a map from the complete file contents with default [`Limits`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, Limits::default())
    }

    pub fn parse_with(data: &[u8], limits: Limits) -> Result<Self> {
        let file = Datafile::parse_with(data, limits)?;
        Self::from_datafile(&file)
    }

    /// Read and parse a map file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, Limits::default())
    }

    pub fn load_with(path: impl AsRef<Path>, limits: Limits) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let map = Self::parse_with(&data, limits)?;
        info!(path = %path.display(), width = map.width(), height = map.height(), "loaded map");
        Ok(map)
    }

    /// Interpret an already resolved datafile.
    pub fn from_datafile(file: &Datafile<'_>) -> Result<Self> {
        let skipped = file
            .items()
            .iter()
            .filter(|item| matches!(ItemKind::from_type_id(item.type_id()), ItemKind::Other(_)))
            .count();
        if skipped > 0 {
            debug!(skipped, "skipping unknown items");
        }

        let groups = items::read_groups(file);
        let headers = items::read_layers(file, &groups)?;
        let layers = layers::extract(file, &headers)?;
        let (info, settings) = settings::extract(file)?;

        Ok(Self {
            game: layers.game,
            front: layers.front,
            tele: layers.tele,
            speedup: layers.speedup,
            switch: layers.switch,
            door: layers.door,
            tune: layers.tune,
            settings,
            info,
            layers: layers.summaries,
        })
    }

    pub fn width(&self) -> usize {
        self.game.width()
    }

    pub fn height(&self) -> usize {
        self.game.height()
    }

    pub fn game_layer(&self) -> &GameLayer {
        &self.game
    }

    pub fn front_layer(&self) -> Option<&FrontLayer> {
        self.front.as_ref()
    }

    pub fn tele_layer(&self) -> Option<&TeleLayer> {
        self.tele.as_ref()
    }

    pub fn speedup_layer(&self) -> Option<&SpeedupLayer> {
        self.speedup.as_ref()
    }

    pub fn switch_layer(&self) -> Option<&SwitchLayer> {
        self.switch.as_ref()
    }

    /// Present exactly when the map has a switch layer.
    pub fn door_layer(&self) -> Option<&DoorLayer> {
        self.door.as_ref()
    }

    pub fn tune_layer(&self) -> Option<&TuneLayer> {
        self.tune.as_ref()
    }

    /// Server commands stored with the map, in file order.
    pub fn settings(&self) -> &[String] {
        &self.settings
    }

    pub fn info(&self) -> &MapInfo {
        &self.info
    }

    /// Every tile layer in item order, including design layers.
    pub fn layers(&self) -> &[LayerSummary] {
        &self.layers
    }
}
