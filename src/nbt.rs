//! Zone file binary format.
//!
//! Zones persist as a small custom binary with a `.nbt` extension:
//!
//! ```text
//! magic "PAPSZON\0" | version u8 | width u32 LE | height u32 LE
//! flags u8 (bit0 = anchor, bit1 = teleporters)
//! [anchor: f64 x, f64 y]
//! width*height tile bytes (row-major)
//! teleporter count u32, then per record:
//!     r i32 | c i32 | target_type u8 | name_len u16 | name bytes
//!     [target_type == 1: target r i32, target c i32]
//! ```
//!
//! All integers little-endian. The format is load-compatible with zone
//! files written by the map editor, so it must stay bit-exact.

use crate::zone::{Teleporter, TileGrid};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 8] = b"PAPSZON\x00";
const VERSION: u8 = 1;

const FLAG_ANCHOR: u8 = 0x01;
const FLAG_TELEPORTERS: u8 = 0x02;

/// Errors from zone/portal file loading.
#[derive(Debug)]
pub enum ZoneIoError {
    /// Underlying file or stream error.
    Io(io::Error),
    /// The magic bytes did not match - not a zone file.
    BadMagic,
    /// The version byte is not one this build understands.
    UnsupportedVersion(u8),
    /// Structured data failed to parse.
    Parse {
        what: &'static str,
        detail: String,
    },
}

impl fmt::Display for ZoneIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneIoError::Io(e) => write!(f, "zone io error: {e}"),
            ZoneIoError::BadMagic => write!(f, "not a zone file (bad magic)"),
            ZoneIoError::UnsupportedVersion(v) => {
                write!(f, "unsupported zone format version {v}")
            }
            ZoneIoError::Parse { what, detail } => write!(f, "failed to parse {what}: {detail}"),
        }
    }
}

impl std::error::Error for ZoneIoError {}

impl From<io::Error> for ZoneIoError {
    fn from(e: io::Error) -> Self {
        ZoneIoError::Io(e)
    }
}

/// Serialize a zone grid into the binary format.
pub fn write_zone<W: Write>(w: &mut W, grid: &TileGrid) -> Result<(), ZoneIoError> {
    w.write_all(MAGIC)?;
    w.write_all(&[VERSION])?;
    w.write_all(&grid.width.to_le_bytes())?;
    w.write_all(&grid.height.to_le_bytes())?;

    let mut flags = 0u8;
    if grid.anchor.is_some() {
        flags |= FLAG_ANCHOR;
    }
    if !grid.teleporters.is_empty() {
        flags |= FLAG_TELEPORTERS;
    }
    w.write_all(&[flags])?;

    if let Some((ax, ay)) = grid.anchor {
        w.write_all(&ax.to_le_bytes())?;
        w.write_all(&ay.to_le_bytes())?;
    }

    w.write_all(&grid.tiles)?;

    w.write_all(&(grid.teleporters.len() as u32).to_le_bytes())?;
    for t in &grid.teleporters {
        w.write_all(&t.row.to_le_bytes())?;
        w.write_all(&t.col.to_le_bytes())?;
        let target_type: u8 = if t.target_tile.is_some() { 1 } else { 0 };
        w.write_all(&[target_type])?;
        let name = t.target_zone.as_bytes();
        w.write_all(&(name.len() as u16).to_le_bytes())?;
        w.write_all(name)?;
        if let Some((tr, tc)) = t.target_tile {
            w.write_all(&tr.to_le_bytes())?;
            w.write_all(&tc.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Deserialize a zone grid from the binary format.
pub fn read_zone<R: Read>(r: &mut R) -> Result<TileGrid, ZoneIoError> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ZoneIoError::BadMagic);
    }
    let version = read_u8(r)?;
    if version != VERSION {
        return Err(ZoneIoError::UnsupportedVersion(version));
    }

    let width = read_u32(r)?;
    let height = read_u32(r)?;
    let flags = read_u8(r)?;

    let anchor = if flags & FLAG_ANCHOR != 0 {
        Some((read_f64(r)?, read_f64(r)?))
    } else {
        None
    };

    let mut tiles = vec![0u8; (width as usize) * (height as usize)];
    r.read_exact(&mut tiles)?;

    let count = read_u32(r)?;
    let mut teleporters = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let row = read_i32(r)?;
        let col = read_i32(r)?;
        let target_type = read_u8(r)?;
        let name_len = read_u16(r)? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let target_zone = String::from_utf8(name).map_err(|e| ZoneIoError::Parse {
            what: "teleporter zone name",
            detail: e.to_string(),
        })?;
        let target_tile = if target_type == 1 {
            Some((read_i32(r)?, read_i32(r)?))
        } else {
            None
        };
        teleporters.push(Teleporter {
            row,
            col,
            target_zone,
            target_tile,
        });
    }

    Ok(TileGrid {
        width,
        height,
        tiles,
        anchor,
        teleporters,
    })
}

/// Save a zone to `<dir>/<name>.nbt`.
pub fn save_zone_file(dir: &Path, name: &str, grid: &TileGrid) -> Result<(), ZoneIoError> {
    std::fs::create_dir_all(dir)?;
    let mut file = std::fs::File::create(dir.join(format!("{name}.nbt")))?;
    write_zone(&mut file, grid)
}

/// Load a zone from a `.nbt` file.
pub fn load_zone_file(path: &Path) -> Result<TileGrid, ZoneIoError> {
    let mut file = std::fs::File::open(path)?;
    read_zone(&mut file)
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_f64<R: Read>(r: &mut R) -> io::Result<f64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(f64::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{TILE_GRASS, TILE_TELEPORTER, TILE_WALL};

    #[test]
    fn test_zone_roundtrip() {
        let mut grid = TileGrid::new(12, 7, TILE_GRASS);
        grid.wall_border();
        grid.set_tile(3, 4, TILE_TELEPORTER);
        grid.anchor = Some((4.5, 3.25));
        grid.teleporters.push(Teleporter {
            row: 3,
            col: 4,
            target_zone: "settlement".to_string(),
            target_tile: Some((2, 2)),
        });
        grid.teleporters.push(Teleporter {
            row: 5,
            col: 1,
            target_zone: "ruins".to_string(),
            target_tile: None,
        });

        let mut buf = Vec::new();
        write_zone(&mut buf, &grid).unwrap();
        let restored = read_zone(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.width, grid.width);
        assert_eq!(restored.height, grid.height);
        assert_eq!(restored.tiles, grid.tiles);
        assert_eq!(restored.anchor, grid.anchor);
        assert_eq!(restored.teleporters, grid.teleporters);
        assert_eq!(restored.tile(0, 0), Some(TILE_WALL));
    }

    #[test]
    fn test_no_anchor_no_teleporters() {
        let grid = TileGrid::new(3, 3, TILE_GRASS);
        let mut buf = Vec::new();
        write_zone(&mut buf, &grid).unwrap();
        let restored = read_zone(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.anchor, None);
        assert!(restored.teleporters.is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let buf = b"NOTAZONE.....".to_vec();
        match read_zone(&mut buf.as_slice()) {
            Err(ZoneIoError::BadMagic) => {}
            other => panic!("expected BadMagic, got {other:?}"),
        }
    }
}
