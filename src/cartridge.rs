use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::LoadError;
use crate::memory::RDRAM_SIZE;

pub const HEADER_SIZE: usize = 0x40;
/// Header plus IPL3 boot code; PIF copies this into SP DMEM.
pub const BOOT_CODE_END: usize = 0x1000;
/// Bytes the boot code copies from ROM `0x1000` to the entry point.
pub const BOOT_COPY_SIZE: usize = 0x10_0000;
pub const MIN_ROM_SIZE: usize = 0x10_0000;
pub const MAX_ROM_SIZE: usize = 0x400_0000;

const READ_CHUNK: usize = 0x4_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `.z64`: native big-endian.
    BigEndian,
    /// `.v64`: 16-bit words swapped.
    ByteSwapped,
    /// `.n64`: 32-bit words little-endian.
    LittleEndian,
}

impl ByteOrder {
    fn detect(first_word: [u8; 4]) -> Option<Self> {
        match first_word {
            [0x80, 0x37, 0x12, 0x40] => Some(ByteOrder::BigEndian),
            [0x37, 0x80, 0x40, 0x12] => Some(ByteOrder::ByteSwapped),
            [0x40, 0x12, 0x37, 0x80] => Some(ByteOrder::LittleEndian),
            _ => None,
        }
    }

    fn normalize(self, data: &mut [u8]) {
        match self {
            ByteOrder::BigEndian => {}
            ByteOrder::ByteSwapped => data.chunks_exact_mut(2).for_each(|c| c.swap(0, 1)),
            ByteOrder::LittleEndian => data.chunks_exact_mut(4).for_each(|c| c.reverse()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RomHeader {
    pub pi_config: u32,
    pub clock_rate: u32,
    pub entry_point: u32,
    pub release: u32,
    pub crc: [u32; 2],
    pub title: String,
    /// Media format, cartridge id and region (`0x3B..=0x3E`).
    pub game_code: [u8; 4],
    pub version: u8,
}

impl RomHeader {
    fn parse(rom: &[u8]) -> Self {
        let word = |offset: usize| {
            u32::from_be_bytes([rom[offset], rom[offset + 1], rom[offset + 2], rom[offset + 3]])
        };
        RomHeader {
            pi_config: word(0x00),
            clock_rate: word(0x04),
            entry_point: word(0x08),
            release: word(0x0C),
            crc: [word(0x10), word(0x14)],
            title: normalize_header_title(&rom[0x20..0x34]),
            game_code: [rom[0x3B], rom[0x3C], rom[0x3D], rom[0x3E]],
            version: rom[0x3F],
        }
    }

    pub fn game_id(&self) -> String {
        self.game_code
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RomIdentity {
    pub display_name: String,
    pub size_bytes: usize,
}

/// An immutable, validated cartridge image in big-endian order.
#[derive(Debug, Clone)]
pub struct RomImage {
    data: Arc<[u8]>,
    header: RomHeader,
    source_order: ByteOrder,
    display_name: String,
}

impl RomImage {
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        cancel: Option<&CancelToken>,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if len > MAX_ROM_SIZE as u64 {
            return Err(LoadError::InvalidImage(format!(
                "{} bytes exceeds the {} MiB cartridge limit",
                len,
                MAX_ROM_SIZE >> 20
            )));
        }

        let mut data = Vec::with_capacity(len as usize);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(LoadError::Cancelled);
            }
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if data.len() + n > MAX_ROM_SIZE {
                return Err(LoadError::InvalidImage(
                    "file grew past the cartridge limit while reading".to_string(),
                ));
            }
            data.extend_from_slice(&chunk[..n]);
        }

        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| String::from("(unknown)"));
        Ok(Self::from_bytes(data)?.with_display_name(name))
    }

    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self, LoadError> {
        validate_size(data.len())?;

        let first_word = [data[0], data[1], data[2], data[3]];
        let source_order = match ByteOrder::detect(first_word) {
            Some(order) => order,
            None => {
                log::warn!(
                    "Unrecognized PI configuration word {:02X?}; assuming big-endian image",
                    first_word
                );
                ByteOrder::BigEndian
            }
        };
        source_order.normalize(&mut data);

        let header = RomHeader::parse(&data);
        validate_entry_point(header.entry_point, boot_copy_len(data.len()))?;

        let display_name = if looks_like_valid_title(&header.title) {
            header.title.clone()
        } else {
            String::from("(Unknown Title)")
        };

        Ok(RomImage {
            data: data.into(),
            header,
            source_order,
            display_name,
        })
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.display_name = name;
        }
        self
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn header(&self) -> &RomHeader {
        &self.header
    }

    pub fn source_order(&self) -> ByteOrder {
        self.source_order
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn identity(&self) -> RomIdentity {
        RomIdentity {
            display_name: self.display_name.clone(),
            size_bytes: self.data.len(),
        }
    }

    /// The code segment the boot process copies to the entry point.
    pub fn boot_segment(&self) -> &[u8] {
        &self.data[BOOT_CODE_END..BOOT_CODE_END + boot_copy_len(self.data.len())]
    }
}

fn boot_copy_len(rom_len: usize) -> usize {
    BOOT_COPY_SIZE.min(rom_len - BOOT_CODE_END)
}

fn validate_size(len: usize) -> Result<(), LoadError> {
    if len < MIN_ROM_SIZE {
        return Err(LoadError::InvalidImage(format!(
            "{} bytes is smaller than the 1 MiB minimum",
            len
        )));
    }
    if len > MAX_ROM_SIZE {
        return Err(LoadError::InvalidImage(format!(
            "{} bytes exceeds the {} MiB cartridge limit",
            len,
            MAX_ROM_SIZE >> 20
        )));
    }
    if len % 4 != 0 {
        return Err(LoadError::InvalidImage(format!(
            "{} bytes is not a whole number of 32-bit words",
            len
        )));
    }
    Ok(())
}

fn validate_entry_point(entry: u32, copy_len: usize) -> Result<(), LoadError> {
    // KSEG0 or KSEG1, landing in the base 4 MiB of RDRAM
    if !(0x8000_0000..0xC000_0000).contains(&entry) || entry % 4 != 0 {
        return Err(LoadError::InvalidImage(format!(
            "entry point {:#010x} is not a direct-mapped kernel address",
            entry
        )));
    }
    let phys = (entry & 0x1FFF_FFFF) as usize;
    if phys + copy_len > RDRAM_SIZE {
        return Err(LoadError::InvalidImage(format!(
            "entry point {:#010x} leaves no room for the boot segment",
            entry
        )));
    }
    Ok(())
}

fn normalize_header_title(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .map(|&b| if b.is_ascii() && !b.is_ascii_control() { b as char } else { ' ' })
        .collect();
    // Collapse consecutive spaces
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for ch in text.trim().chars() {
        let is_space = ch == ' ';
        if !(is_space && prev_space) {
            out.push(ch);
        }
        prev_space = is_space;
    }
    out
}

fn looks_like_valid_title(t: &str) -> bool {
    !t.is_empty() && t.chars().any(|c| c.is_ascii_alphanumeric())
}

/// Shared flag that aborts an in-progress ROM read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_accepts_supported_sizes() {
        for mib in [1usize, 2, 4, 8, 12, 16, 32, 64] {
            let image = RomImage::from_bytes(test_rom(mib << 20, &[])).unwrap();
            assert_eq!(image.len(), mib << 20);
            assert_eq!(image.identity().size_bytes, mib << 20);
        }
    }

    #[test]
    fn test_rejects_bad_sizes() {
        for len in [0usize, 0x1000, MIN_ROM_SIZE - 4, MIN_ROM_SIZE + 2, MAX_ROM_SIZE + 4] {
            let mut data = vec![0u8; len];
            if len >= 4 {
                data[0..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
            }
            match RomImage::from_bytes(data) {
                Err(LoadError::InvalidImage(_)) => {}
                other => panic!("size {} accepted: {:?}", len, other.map(|i| i.len())),
            }
        }
    }

    #[test]
    fn test_rejects_entry_outside_kernel_segments() {
        let mut rom = test_rom(MIN_ROM_SIZE, &[]);
        rom[8..12].copy_from_slice(&0x0000_0400u32.to_be_bytes());
        assert!(matches!(
            RomImage::from_bytes(rom),
            Err(LoadError::InvalidImage(_))
        ));

        let mut rom = test_rom(MIN_ROM_SIZE, &[]);
        rom[8..12].copy_from_slice(&0x803F_0000u32.to_be_bytes());
        assert!(matches!(
            RomImage::from_bytes(rom),
            Err(LoadError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_header_fields() {
        let image = RomImage::from_bytes(test_rom(MIN_ROM_SIZE, &[0x2400_0000])).unwrap();
        let header = image.header();
        assert_eq!(header.entry_point, TEST_ENTRY);
        assert_eq!(header.title, "N64 CORE TEST");
        assert_eq!(header.game_id(), "NTEE");
        assert_eq!(image.display_name(), "N64 CORE TEST");
        assert_eq!(&image.boot_segment()[0..4], &[0x24, 0x00, 0x00, 0x00]);
        assert_eq!(image.boot_segment().len(), BOOT_COPY_SIZE - BOOT_CODE_END);
    }

    #[test]
    fn test_byte_swapped_images_are_normalized() {
        let native = test_rom(MIN_ROM_SIZE, &[0x1234_5678]);

        let mut v64 = native.clone();
        v64.chunks_exact_mut(2).for_each(|c| c.swap(0, 1));
        let image = RomImage::from_bytes(v64).unwrap();
        assert_eq!(image.source_order(), ByteOrder::ByteSwapped);
        assert_eq!(&image.bytes()[..], &native[..]);

        let mut n64 = native.clone();
        n64.chunks_exact_mut(4).for_each(|c| c.reverse());
        let image = RomImage::from_bytes(n64).unwrap();
        assert_eq!(image.source_order(), ByteOrder::LittleEndian);
        assert_eq!(&image.bytes()[..], &native[..]);
    }

    #[test]
    fn test_unknown_title_falls_back() {
        let mut rom = test_rom(MIN_ROM_SIZE, &[]);
        rom[0x20..0x34].fill(0);
        let image = RomImage::from_bytes(rom).unwrap();
        assert_eq!(image.display_name(), "(Unknown Title)");
        assert_eq!(image.with_display_name("game.z64").display_name(), "game.z64");
    }

    #[test]
    fn test_load_from_file_uses_file_name() {
        let path = std::env::temp_dir().join(format!("n64-core-cart-{}.z64", std::process::id()));
        std::fs::write(&path, test_rom(MIN_ROM_SIZE, &[])).unwrap();
        let image = RomImage::load_from_file(&path, None).unwrap();
        assert_eq!(
            image.display_name(),
            path.file_name().unwrap().to_str().unwrap()
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            RomImage::load_from_file(&path, Some(&cancel)),
            Err(LoadError::Cancelled)
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            RomImage::load_from_file("/nonexistent/dir/game.z64", None),
            Err(LoadError::Io(_))
        ));
    }
}
