use std::io::Write;

use ddmap::{Error, Limits, Map, TileLayerKind};
use ddmap_datafile::fixture::DatafileBuilder;

const GROUP: u16 = 4;
const LAYER: u16 = 5;
const INFO: u16 = 1;

const GAME: i32 = 1;
const TELE: i32 = 2;
const SPEEDUP: i32 = 4;
const FRONT: i32 = 8;
const SWITCH: i32 = 16;
const TUNE: i32 = 32;

fn str_to_ints(text: &str) -> [i32; 3] {
    let mut bytes = [0u8; 12];
    for (slot, byte) in bytes.iter_mut().zip(text.bytes()) {
        *slot = byte;
    }
    let mut words = [0; 3];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = i32::from_be_bytes([
            chunk[0].wrapping_add(128),
            chunk[1].wrapping_add(128),
            chunk[2].wrapping_add(128),
            chunk[3].wrapping_add(128),
        ]);
    }
    words
}

/// Tile layer item in the current (version 3/4) word layout.
struct TileLayer {
    version: i32,
    width: i32,
    height: i32,
    flags: i32,
    data: i32,
    tele: i32,
    speedup: i32,
    front: i32,
    switch: i32,
    tune: i32,
    name: &'static str,
}

impl TileLayer {
    fn new(flags: i32, width: i32, height: i32) -> Self {
        Self {
            version: 3,
            width,
            height,
            flags,
            data: -1,
            tele: -1,
            speedup: -1,
            front: -1,
            switch: -1,
            tune: -1,
            name: "",
        }
    }

    fn game(width: i32, height: i32, data: i32) -> Self {
        Self {
            data,
            ..Self::new(GAME, width, height)
        }
    }

    fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    fn words(&self) -> Vec<i32> {
        let mut words = vec![0, 2, 0, self.version, self.width, self.height, self.flags];
        words.extend([0, 0, 0, 0, -1, 0, -1]);
        words.push(self.data);
        words.extend(str_to_ints(self.name));
        words.extend([self.tele, self.speedup, self.front, self.switch, self.tune]);
        words
    }
}

fn zero_tiles(width: usize, height: usize) -> Vec<u8> {
    vec![0; width * height * 4]
}

fn tiles(indices: &[u8]) -> Vec<u8> {
    indices.iter().flat_map(|&index| [index, 0, 0, 0]).collect()
}

/// Version 4 file with one zeroed 2x2 game layer.
fn minimal_map() -> DatafileBuilder {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&zero_tiles(2, 2));
    builder.add_item(LAYER, 0, &TileLayer::game(2, 2, data).version(4).words());
    builder
}

#[test]
fn test_minimal_map() {
    let bytes = minimal_map().build().unwrap();
    let map = Map::parse(&bytes).unwrap();

    assert_eq!((map.width(), map.height()), (2, 2));
    assert_eq!(map.game_layer().index().as_slice(), &[0, 0, 0, 0]);
    assert_eq!(map.game_layer().flags().len(), 4);
    assert!(map.front_layer().is_none());
    assert!(map.tele_layer().is_none());
    assert!(map.speedup_layer().is_none());
    assert!(map.switch_layer().is_none());
    assert!(map.door_layer().is_none());
    assert!(map.tune_layer().is_none());
    assert!(map.settings().is_empty());
    assert_eq!(map.info(), &ddmap::MapInfo::default());
}

#[test]
fn test_corrupt_magic() {
    let mut bytes = minimal_map().build().unwrap();
    bytes[..4].copy_from_slice(b"XXXX");

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::Datafile(ddmap_datafile::Error::CorruptHeader(_)))
    ));
}

#[test]
fn test_tele_keeps_own_dimensions() {
    let mut builder = minimal_map();
    let tele = builder.add_data(&[1, 26, 0, 0, 2, 27, 0, 0, 0, 0, 3, 10]);
    let layer = TileLayer {
        tele,
        ..TileLayer::new(TELE, 3, 2)
    };
    builder.add_item(LAYER, 1, &layer.words());
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let tele = map.tele_layer().unwrap();
    assert_eq!((tele.width(), tele.height()), (3, 2));
    assert_eq!((map.width(), map.height()), (2, 2));
    assert_eq!(tele.number().as_slice(), &[1, 0, 2, 0, 0, 3]);
    assert_eq!(tele.tile_type().get(0, 0), Some(26));
    assert_eq!(tele.tile_type().get(2, 1), Some(10));
}

#[test]
fn test_declared_size_mismatch() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data_with_declared_size(&zero_tiles(2, 2), 20);
    builder.add_item(LAYER, 0, &TileLayer::game(2, 2, data).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::Datafile(ddmap_datafile::Error::Decompression { index: 0, .. }))
    ));
}

#[test]
fn test_version_3_file() {
    let mut builder = DatafileBuilder::new();
    builder.set_version(3);
    let data = builder.add_data(&tiles(&[1, 2, 3, 4, 5, 6]));
    builder.add_item(LAYER, 0, &TileLayer::game(3, 2, data).words());
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    assert_eq!((map.width(), map.height()), (3, 2));
    assert_eq!(map.game_layer().index().get(1, 1), Some(5));
}

#[test]
fn test_tile_skip_expansion() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&[1, 0, 2, 0, 5, 8, 0, 0]);
    builder.add_item(LAYER, 0, &TileLayer::game(4, 1, data).version(4).words());
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    assert_eq!(map.game_layer().index().as_slice(), &[1, 1, 1, 5]);
    assert_eq!(map.game_layer().flags().as_slice(), &[0, 0, 0, 8]);
}

#[test]
fn test_tile_skip_short_data() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&[1, 0, 2, 0]);
    builder.add_item(LAYER, 0, &TileLayer::game(4, 1, data).version(4).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::LayerSizeMismatch {
            kind: TileLayerKind::Game,
            expected: 16,
            actual: 12,
        })
    ));
}

#[test]
fn test_tile_skip_expansion_respects_limits() {
    // 256 records of 256 tiles each expand 1 KiB of data to a 256 KiB layer.
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&[1u8, 0, 255, 0].repeat(256));
    builder.add_item(LAYER, 0, &TileLayer::game(65536, 1, data).version(4).words());
    let bytes = builder.build().unwrap();

    let limits = Limits::default()
        .with_max_block_size(2048)
        .with_max_total_size(2048);
    assert!(matches!(
        ddmap::parse_with(&bytes, limits),
        Err(Error::Datafile(ddmap_datafile::Error::BlockTooLarge {
            index: 0,
            size: 262144,
            limit: 2048,
        }))
    ));

    let limits = Limits::default().with_max_total_size(2048);
    assert!(matches!(
        ddmap::parse_with(&bytes, limits),
        Err(Error::Datafile(ddmap_datafile::Error::BlockTooLarge {
            size: 262144,
            limit: 2048,
            ..
        }))
    ));

    let map = ddmap::parse(&bytes).unwrap();
    assert_eq!((map.width(), map.height()), (65536, 1));
    assert!(map.game_layer().index().as_slice().iter().all(|&i| i == 1));
}

#[test]
fn test_layer_size_mismatch() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&zero_tiles(3, 1));
    builder.add_item(LAYER, 0, &TileLayer::game(2, 2, data).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::LayerSizeMismatch {
            kind: TileLayerKind::Game,
            expected: 16,
            actual: 12,
        })
    ));
}

#[test]
fn test_legacy_special_index() {
    let mut builder = minimal_map();
    let tele = builder.add_data(&[7, 26, 0, 0, 0, 0, 8, 27]);
    // Tilemap version 2 ends with the special data index at word 15.
    builder.add_item(
        LAYER,
        1,
        &[0, 2, 0, 2, 2, 2, TELE, 0, 0, 0, 0, -1, 0, -1, -1, tele],
    );
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let tele = map.tele_layer().unwrap();
    assert_eq!(tele.number().as_slice(), &[7, 0, 0, 8]);
    assert_eq!(map.layers()[1].name, None);
}

#[test]
fn test_first_layer_of_kind_wins() {
    let mut builder = minimal_map();
    let second = builder.add_data(&tiles(&[1; 9]));
    builder.add_item(LAYER, 1, &TileLayer::game(3, 3, second).words());
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    assert_eq!((map.width(), map.height()), (2, 2));
    assert_eq!(map.game_layer().index().as_slice(), &[0, 0, 0, 0]);

    let selected: Vec<bool> = map.layers().iter().map(|layer| layer.selected).collect();
    assert_eq!(selected, vec![true, false]);
}

#[test]
fn test_door_layer_follows_switch_layer() {
    let mut builder = DatafileBuilder::new();
    let game = builder.add_data(&zero_tiles(3, 2));
    builder.add_item(LAYER, 0, &TileLayer::game(3, 2, game).words());
    let switch = builder.add_data(&[
        1, 22, 0, 5, 0, 0, 0, 0, 2, 23, 1, 0, //
        0, 0, 0, 0, 0, 0, 0, 0, 3, 24, 0, 9,
    ]);
    builder.add_item(
        LAYER,
        1,
        &TileLayer {
            switch,
            ..TileLayer::new(SWITCH, 3, 2)
        }
        .words(),
    );
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let switch = map.switch_layer().unwrap();
    assert_eq!(switch.number().as_slice(), &[1, 0, 2, 0, 0, 3]);
    assert_eq!(switch.tile_type().get(0, 0), Some(22));
    assert_eq!(switch.flags().get(2, 0), Some(1));
    assert_eq!(switch.delay().as_slice(), &[5, 0, 0, 0, 0, 9]);

    let door = map.door_layer().unwrap();
    assert_eq!((door.width(), door.height()), (3, 2));
    assert!(door.index().as_slice().iter().all(|&v| v == 0));
    assert!(door.flags().as_slice().iter().all(|&v| v == 0));
    assert!(door.number().as_slice().iter().all(|&v| v == 0));
}

#[test]
fn test_front_layer() {
    let mut builder = minimal_map();
    let front = builder.add_data(&tiles(&[0, 9, 9, 0]));
    builder.add_item(
        LAYER,
        1,
        &TileLayer {
            front,
            ..TileLayer::new(FRONT, 2, 2)
        }
        .words(),
    );
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let front = map.front_layer().unwrap();
    assert_eq!(front.index().as_slice(), &[0, 9, 9, 0]);
}

#[test]
fn test_front_dimension_mismatch() {
    let mut builder = minimal_map();
    let front = builder.add_data(&zero_tiles(3, 2));
    builder.add_item(
        LAYER,
        1,
        &TileLayer {
            front,
            ..TileLayer::new(FRONT, 3, 2)
        }
        .words(),
    );
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::LayerDimensionMismatch {
            kind: TileLayerKind::Front,
            expected: (2, 2),
            actual: (3, 2),
        })
    ));
}

#[test]
fn test_speedup_and_tune_layers() {
    let mut builder = minimal_map();
    let speedup = builder.add_data(&[
        10, 0, 28, 0, 90, 0, //
        0, 0, 0, 0, 0, 0, //
        0, 0, 0, 0, 0, 0, //
        5, 3, 28, 0, 0x4c, 0xff,
    ]);
    builder.add_item(
        LAYER,
        1,
        &TileLayer {
            speedup,
            ..TileLayer::new(SPEEDUP, 2, 2)
        }
        .words(),
    );
    let tune = builder.add_data(&[0, 0, 4, 68]);
    builder.add_item(
        LAYER,
        2,
        &TileLayer {
            tune,
            ..TileLayer::new(TUNE, 2, 1)
        }
        .words(),
    );
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let speedup = map.speedup_layer().unwrap();
    assert_eq!(speedup.force().as_slice(), &[10, 0, 0, 5]);
    assert_eq!(speedup.max_speed().get(1, 1), Some(3));
    assert_eq!(speedup.tile_type().get(0, 0), Some(28));
    assert_eq!(speedup.angle().as_slice(), &[90, 0, 0, -180]);

    let tune = map.tune_layer().unwrap();
    assert_eq!((tune.width(), tune.height()), (2, 1));
    assert_eq!(tune.number().as_slice(), &[0, 4]);
    assert_eq!(tune.tile_type().as_slice(), &[0, 68]);
}

#[test]
fn test_zero_area_optional_layer_is_present() {
    let mut builder = minimal_map();
    let tele = builder.add_data(&[]);
    builder.add_item(
        LAYER,
        1,
        &TileLayer {
            tele,
            ..TileLayer::new(TELE, 0, 3)
        }
        .words(),
    );
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let tele = map.tele_layer().unwrap();
    assert_eq!((tele.width(), tele.height()), (0, 3));
    assert!(tele.number().is_empty());
    assert_eq!(tele.tile_type().len(), 0);
    assert_eq!(tele.number().rows().count(), 3);
    assert!(map.tune_layer().is_none());
}

#[test]
fn test_missing_game_layer() {
    let mut builder = DatafileBuilder::new();
    let tele = builder.add_data(&[0; 8]);
    builder.add_item(
        LAYER,
        0,
        &TileLayer {
            tele,
            ..TileLayer::new(TELE, 2, 2)
        }
        .words(),
    );
    let bytes = builder.build().unwrap();

    assert!(matches!(Map::parse(&bytes), Err(Error::MissingGameLayer)));
    let empty = DatafileBuilder::new().build().unwrap();
    assert!(matches!(Map::parse(&empty), Err(Error::MissingGameLayer)));
}

#[test]
fn test_zero_area_game_layer() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&[]);
    builder.add_item(LAYER, 0, &TileLayer::game(0, 5, data).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(Map::parse(&bytes), Err(Error::MissingGameLayer)));
}

#[test]
fn test_negative_dimensions() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&zero_tiles(2, 2));
    builder.add_item(LAYER, 0, &TileLayer::game(-2, 2, data).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::InvalidLayer { index: 0, .. })
    ));
}

#[test]
fn test_missing_data_reference() {
    let mut builder = minimal_map();
    builder.add_item(LAYER, 1, &TileLayer::new(TELE, 2, 2).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::InvalidLayer { index: 1, .. })
    ));
}

#[test]
fn test_data_index_out_of_range() {
    let mut builder = DatafileBuilder::new();
    builder.add_item(LAYER, 0, &TileLayer::game(2, 2, 3).words());
    let bytes = builder.build().unwrap();

    assert!(matches!(
        Map::parse(&bytes),
        Err(Error::Datafile(ddmap_datafile::Error::DataIndexOutOfRange { index: 3, count: 0 }))
    ));
}

#[test]
fn test_info_and_settings() {
    let mut builder = minimal_map();
    let author = builder.add_data(b"Ravie\0");
    let version = builder.add_data(b"1.2\0");
    let settings = builder.add_data(b"sv_deepfly 0\0tune gravity 0.5\0sv_team 1\0");
    builder.add_item(INFO, 0, &[1, author, version, -1, -1, settings]);
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    assert_eq!(
        map.settings(),
        &["sv_deepfly 0", "tune gravity 0.5", "sv_team 1"]
    );
    assert_eq!(map.info().author.as_deref(), Some("Ravie"));
    assert_eq!(map.info().version.as_deref(), Some("1.2"));
    assert_eq!(map.info().credits, None);
}

#[test]
fn test_empty_settings_block() {
    let mut builder = minimal_map();
    let settings = builder.add_data(&[]);
    builder.add_item(INFO, 0, &[1, -1, -1, -1, -1, settings]);
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    assert!(map.settings().is_empty());
}

#[test]
fn test_layer_summaries() {
    let mut builder = DatafileBuilder::new();
    let data = builder.add_data(&zero_tiles(2, 2));
    let mut group = vec![3, 0, 0, 100, 100, 0, 2, 0, 0, 0, 0, 0];
    group.extend(str_to_ints("Game"));
    builder.add_item(GROUP, 0, &group);
    builder.add_item(LAYER, 0, &TileLayer::new(0, 2, 2).name("Background").words());
    builder.add_item(LAYER, 1, &TileLayer::game(2, 2, data).name("Game").words());
    builder.add_item(LAYER, 2, &[0, 3, 0, 2, -1, 0]);
    let bytes = builder.build().unwrap();

    let map = Map::parse(&bytes).unwrap();
    let layers = map.layers();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].kind, TileLayerKind::Design);
    assert_eq!(layers[0].name.as_deref(), Some("Background"));
    assert!(!layers[0].selected);
    assert_eq!(layers[1].kind, TileLayerKind::Game);
    assert_eq!(layers[1].name.as_deref(), Some("Game"));
    assert_eq!(layers[1].group, Some(0));
    assert!(layers[1].selected);
}

#[test]
fn test_unknown_items_are_skipped() {
    let mut builder = minimal_map();
    builder.add_item(0xffff, 1, &[0x6c9f_7ad4, 0, 0, 0]);
    builder.add_item(42, 0, &[]);
    let bytes = builder.build().unwrap();

    assert!(Map::parse(&bytes).is_ok());
}

#[test]
fn test_block_limit() {
    let bytes = minimal_map().build().unwrap();
    let limits = Limits::default().with_max_block_size(8);

    assert!(matches!(
        ddmap::parse_with(&bytes, limits),
        Err(Error::Datafile(ddmap_datafile::Error::BlockTooLarge { size: 16, limit: 8, .. }))
    ));
    assert!(ddmap::parse_with(&bytes, Limits::unlimited()).is_ok());
}

#[test]
fn test_parse_is_deterministic() {
    let bytes = minimal_map().build().unwrap();
    assert_eq!(ddmap::parse(&bytes).unwrap(), ddmap::parse(&bytes).unwrap());
}

#[test]
fn test_load_from_file() {
    let bytes = minimal_map().build().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let map = Map::load(file.path()).unwrap();
    assert_eq!((map.width(), map.height()), (2, 2));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Map::load(dir.path().join("missing.map")),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_map_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Map>();
}
