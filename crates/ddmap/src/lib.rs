//! DDNet map parsing.
//!
//! Loads a `.map` file, resolves the datafile container through
//! [`ddmap_datafile`] and extracts the gameplay layers (game, front, tele,
//! speedup, switch, door, tune) as owned per-field grids, together with the
//! map info and server settings.
//!
//! # Example
//!
//! ```no_run
//! let map = ddmap::Map::load("Kobra 4.map")?;
//!
//! println!("{}x{}", map.width(), map.height());
//! if let Some(tele) = map.tele_layer() {
//!     let used = tele.number().as_slice().iter().filter(|&&n| n != 0).count();
//!     println!("{used} tele tiles");
//! }
//! for setting in map.settings() {
//!     println!("{setting}");
//! }
//! # Ok::<(), ddmap::Error>(())
//! ```

mod error;
mod layers;
mod map;
mod settings;

pub mod items;
pub mod tiles;

pub use ddmap_datafile::Limits;
pub use error::{Error, Result};
pub use items::{ItemKind, LayerType, TileLayerKind};
pub use layers::{
    DoorLayer, FrontLayer, GameLayer, LayerSummary, SpeedupLayer, SwitchLayer, TeleLayer, TuneLayer,
};
pub use map::Map;
pub use settings::{split_settings, MapInfo};
pub use tiles::Grid;

/// Parse a map from the complete file contents.
pub fn parse(data: &[u8]) -> Result<Map> {
    Map::parse(data)
}

/// Parse a map, bounding decompression with `limits`.
pub fn parse_with(data: &[u8], limits: Limits) -> Result<Map> {
    Map::parse_with(data, limits)
}
