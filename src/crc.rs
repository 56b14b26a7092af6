use crc::Crc;

/// The link CRC is CRC-16/XMODEM: polynomial 0x1021, initial value 0x0000,
/// no reflection. It is computed over every frame byte that follows the CRC
/// field and travels big-endian on the wire.
pub const LINK_CRC16: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_XMODEM);
