//! Firmware images in Intel HEX or raw binary format.

use crate::engine::{abstract_avr::MachineError, AbstractAvr};
use bytesize::ByteSize;
use log::{debug, trace};
use regex::Regex;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Highest byte address a 22-bit AVR program counter can reach.
pub const MAX_IMAGE_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("failed to read firmware from {path}")]
    Io { path: PathBuf, source: io::Error },

    #[error("line {line}: malformed Intel HEX record")]
    Malformed { line: usize },

    #[error("line {line}: checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    Checksum { line: usize, expected: u8, found: u8 },

    #[error("line {line}: unsupported record type {kind:#04x}")]
    UnsupportedRecord { line: usize, kind: u8 },

    #[error("line {line}: address {address:#x} exceeds the program address space")]
    AddressOutOfRange { line: usize, address: usize },

    #[error("missing end-of-file record")]
    MissingEndOfFile,

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Firmware {
    image: Vec<u8>,
}

impl Firmware {
    pub fn from_binary(image: Vec<u8>) -> Self {
        Self { image }
    }

    /// Parses Intel HEX text into a flat image starting at address 0. Gaps are zero-filled.
    pub fn parse(text: &str) -> Result<Self, FirmwareError> {
        let record = Regex::new(
            r"^:([0-9A-Fa-f]{2})([0-9A-Fa-f]{4})([0-9A-Fa-f]{2})((?:[0-9A-Fa-f]{2})*)([0-9A-Fa-f]{2})$",
        )?;

        let mut image = Vec::new();
        let mut base = 0_usize;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();

            if raw.is_empty() {
                continue;
            }

            let captures = record
                .captures(raw)
                .ok_or(FirmwareError::Malformed { line })?;
            let field = |i: usize| captures.get(i).map_or("", |m| m.as_str());

            let count = hex_byte(field(1), line)?;
            let offset = u16::from_str_radix(field(2), 16)
                .map_err(|_| FirmwareError::Malformed { line })?;
            let kind = hex_byte(field(3), line)?;
            let data = hex_bytes(field(4), line)?;
            let found = hex_byte(field(5), line)?;

            if data.len() != count as usize {
                return Err(FirmwareError::Malformed { line });
            }

            let sum = data
                .iter()
                .fold(count.wrapping_add(kind), |acc, b| acc.wrapping_add(*b))
                .wrapping_add((offset >> 8) as u8)
                .wrapping_add(offset as u8);
            let expected = sum.wrapping_neg();

            if expected != found {
                return Err(FirmwareError::Checksum {
                    line,
                    expected,
                    found,
                });
            }

            trace!("line {}: type {:02x} at {:#06x}, {} bytes", line, kind, offset, count);

            match kind {
                0x00 => {
                    let start = base + offset as usize;
                    let end = start + data.len();
                    if end > MAX_IMAGE_SIZE {
                        return Err(FirmwareError::AddressOutOfRange {
                            line,
                            address: start,
                        });
                    }
                    if image.len() < end {
                        image.resize(end, 0);
                    }
                    image[start..end].copy_from_slice(&data);
                }
                0x01 => {
                    debug!(
                        "parsed Intel HEX firmware of {}",
                        ByteSize::b(image.len() as u64)
                    );
                    return Ok(Self { image });
                }
                0x02 | 0x04 if data.len() == 2 => {
                    let value = (data[0] as usize) << 8 | data[1] as usize;
                    base = if kind == 0x02 { value << 4 } else { value << 16 };
                }
                // start address records carry no image data
                0x03 | 0x05 => {}
                _ => return Err(FirmwareError::UnsupportedRecord { line, kind }),
            }
        }

        Err(FirmwareError::MissingEndOfFile)
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn upload_to(&self, avr: &mut AbstractAvr) -> Result<(), MachineError> {
        avr.upload(&self.image)
    }
}

/// Loads a firmware file. Files ending in `.hex` or `.ihex` are parsed as Intel HEX,
/// everything else is taken as a raw flash image.
pub fn load_file(path: &Path) -> Result<Firmware, FirmwareError> {
    let io_error = |source| FirmwareError::Io {
        path: path.to_path_buf(),
        source,
    };

    let is_hex = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("hex") || e.eq_ignore_ascii_case("ihex"));

    if is_hex {
        Firmware::parse(&fs::read_to_string(path).map_err(io_error)?)
    } else {
        Ok(Firmware::from_binary(fs::read(path).map_err(io_error)?))
    }
}

fn hex_byte(s: &str, line: usize) -> Result<u8, FirmwareError> {
    u8::from_str_radix(s, 16).map_err(|_| FirmwareError::Malformed { line })
}

fn hex_bytes(s: &str, line: usize) -> Result<Vec<u8>, FirmwareError> {
    (0..s.len())
        .step_by(2)
        .map(|i| hex_byte(&s[i..i + 2], line))
        .collect()
}
