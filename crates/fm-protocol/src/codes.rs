//! Wire codes understood by the FM receiver service
//!
//! Every enum here maps one-to-one onto an integer code carried over the
//! receiver link. `code()` produces the wire value and `from_code()` parses
//! it back, rejecting values the chip does not define.

use std::fmt;
use std::ops::BitOr;

use crate::error::ProtocolError;

/// Default minimum RSSI used by seek operations
pub const MIN_SIGNAL_STRENGTH_DEFAULT: u8 = 105;

/// Default live audio quality polling interval in milliseconds
pub const SIGNAL_POLL_INTERVAL_DEFAULT_MS: u32 = 100;

/// Lowest accepted SNR threshold
pub const SNR_THRESHOLD_MIN: u8 = 0;

/// Highest accepted SNR threshold
pub const SNR_THRESHOLD_MAX: u8 = 31;

/// Full-scale volume
pub const VOLUME_MAX: u8 = 255;

/// Synchronous acceptance code returned by the link for every submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AcceptanceCode {
    /// Command queued
    Ok = 0,
    /// Command refused
    Fail = 1,
    /// The service behind the link failed or is unreachable
    ServerFail = 2,
    /// Command not allowed in the current state
    IllegalCommand = 3,
    /// Command parameters out of range
    IllegalParameters = 4,
}

impl AcceptanceCode {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Fail),
            2 => Ok(Self::ServerFail),
            3 => Ok(Self::IllegalCommand),
            4 => Ok(Self::IllegalParameters),
            other => Err(ProtocolError::unknown("acceptance", other.into())),
        }
    }

    /// Whether the command was accepted
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for AcceptanceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Fail => "FAIL",
            Self::ServerFail => "SERVER_FAIL",
            Self::IllegalCommand => "ILLEGAL_COMMAND",
            Self::IllegalParameters => "ILLEGAL_PARAMETERS",
        };
        f.write_str(name)
    }
}

/// Seek direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanDirection {
    /// Toward lower frequencies
    Down,
    /// Toward higher frequencies
    Up,
}

/// Seek algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanMethod {
    /// Full-precision seek
    #[default]
    Normal,
    /// Coarse fast seek
    Fast,
}

/// Combined scan mode as sent with seek commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanMode {
    /// Single seek in one direction
    Seek {
        /// Direction to move
        direction: ScanDirection,
        /// Seek algorithm
        method: ScanMethod,
    },
    /// Whole-band scan
    Full,
}

impl ScanMode {
    const NORMAL: u8 = 0x00;
    const FAST: u8 = 0x01;
    const DOWN: u8 = 0x00;
    const UP: u8 = 0x80;
    const FULL: u8 = 0x82;

    /// Normal-precision seek in the given direction
    pub fn seek(direction: ScanDirection) -> Self {
        Self::Seek {
            direction,
            method: ScanMethod::Normal,
        }
    }

    /// Wire value
    pub fn code(self) -> u8 {
        match self {
            Self::Full => Self::FULL,
            Self::Seek { direction, method } => {
                let dir = match direction {
                    ScanDirection::Down => Self::DOWN,
                    ScanDirection::Up => Self::UP,
                };
                let method = match method {
                    ScanMethod::Normal => Self::NORMAL,
                    ScanMethod::Fast => Self::FAST,
                };
                dir | method
            }
        }
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        if code == Self::FULL {
            return Ok(Self::Full);
        }
        if code & !(Self::UP | Self::FAST) != 0 {
            return Err(ProtocolError::unknown("scan mode", code.into()));
        }
        let direction = if code & Self::UP != 0 {
            ScanDirection::Up
        } else {
            ScanDirection::Down
        };
        let method = if code & Self::FAST != 0 {
            ScanMethod::Fast
        } else {
            ScanMethod::Normal
        };
        Ok(Self::Seek { direction, method })
    }

    /// Direction of travel; a full scan sweeps upward
    pub fn direction(self) -> ScanDirection {
        match self {
            Self::Seek { direction, .. } => direction,
            Self::Full => ScanDirection::Up,
        }
    }
}

/// Minimum tuning step used while seeking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StepSize {
    /// 100 kHz
    #[default]
    Khz100 = 0x00,
    /// 50 kHz
    Khz50 = 0x10,
}

impl StepSize {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0x00 => Ok(Self::Khz100),
            0x10 => Ok(Self::Khz50),
            other => Err(ProtocolError::unknown("step size", other.into())),
        }
    }

    /// Step in link frequency units (10 kHz); 50 kHz rounds to 5
    pub fn units(self) -> u32 {
        match self {
            Self::Khz100 => 10,
            Self::Khz50 => 5,
        }
    }
}

/// Stereo/mono output selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AudioMode {
    /// Automatic stereo/mono blend
    #[default]
    Auto = 0,
    /// Forced stereo
    Stereo = 1,
    /// Forced mono
    Mono = 2,
    /// Switch (formerly blend) activated
    Switch = 3,
}

impl AudioMode {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Auto),
            1 => Ok(Self::Stereo),
            2 => Ok(Self::Mono),
            3 => Ok(Self::Switch),
            other => Err(ProtocolError::unknown("audio mode", other.into())),
        }
    }
}

/// Where decoded audio is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AudioPath {
    /// No routing
    #[default]
    None = 0,
    /// DAC output
    Analog = 1,
    /// I2S output
    Digital = 2,
}

impl AudioPath {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Analog),
            2 => Ok(Self::Digital),
            other => Err(ProtocolError::unknown("audio path", other.into())),
        }
    }
}

/// RDS decoder mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RdsMode {
    /// Decoder off
    #[default]
    Off = 0,
    /// Decoder on with the region's default standard
    Default = 1,
    /// RDS (Europe)
    Rds = 2,
    /// RBDS (North America)
    Rbds = 3,
}

impl RdsMode {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::Default),
            2 => Ok(Self::Rds),
            3 => Ok(Self::Rbds),
            other => Err(ProtocolError::unknown("rds mode", other.into())),
        }
    }

    /// Whether the decoder is running
    pub fn is_on(self) -> bool {
        self != Self::Off
    }
}

/// Set of RDS fields the decoder should parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RdsFeatures(u8);

impl RdsFeatures {
    /// Program Service name
    pub const PS: Self = Self(4);
    /// Program Type
    pub const PTY: Self = Self(8);
    /// Traffic Program flag
    pub const TP: Self = Self(16);
    /// Program Type Name
    pub const PTYN: Self = Self(32);
    /// Radio Text
    pub const RT: Self = Self(64);

    const ALL: u8 = 4 | 8 | 16 | 32 | 64;

    /// No features
    pub fn empty() -> Self {
        Self(0)
    }

    /// Raw bit field
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Parse a raw bit field, rejecting undefined bits
    pub fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        if bits & !Self::ALL != 0 {
            return Err(ProtocolError::unknown("rds feature", bits.into()));
        }
        Ok(Self(bits))
    }

    /// Whether every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RdsFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Alternate-frequency following
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AfMode {
    /// AF disabled
    #[default]
    Off = 0,
    /// AF enabled
    On = 1,
}

impl AfMode {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::On),
            other => Err(ProtocolError::unknown("af mode", other.into())),
        }
    }
}

/// Noise floor estimation precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum NflLevel {
    /// Low
    Low = 0,
    /// Medium
    #[default]
    Medium = 1,
    /// Fine
    Fine = 2,
}

impl NflLevel {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Low),
            1 => Ok(Self::Medium),
            2 => Ok(Self::Fine),
            other => Err(ProtocolError::unknown("nfl level", other.into())),
        }
    }
}

/// World frequency region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Region {
    /// North America
    #[default]
    Na = 0,
    /// Europe
    Eur = 1,
    /// Japan
    Jp = 2,
    /// Japan, upper band
    JpII = 3,
}

impl Region {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Na),
            1 => Ok(Self::Eur),
            2 => Ok(Self::Jp),
            3 => Ok(Self::JpII),
            other => Err(ProtocolError::unknown("region", other.into())),
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Na => "North America",
            Self::Eur => "Europe",
            Self::Jp => "Japan",
            Self::JpII => "Japan II",
        }
    }
}

/// Receive-side deemphasis time constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Deemphasis {
    /// 50 µs (Europe, Japan)
    Us50 = 0,
    /// 75 µs (North America)
    #[default]
    Us75 = 0x40,
}

impl Deemphasis {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Us50),
            0x40 => Ok(Self::Us75),
            other => Err(ProtocolError::unknown("deemphasis", other.into())),
        }
    }
}

/// RDS condition used by RDS-aware seeks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RdsCondition {
    /// Any station
    #[default]
    None = 0,
    /// Match a program type
    Pty = 1,
    /// Require the traffic program flag
    Tp = 2,
}

impl RdsCondition {
    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Kind of text carried by an RDS data event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RdsDataType {
    /// Program Type
    Pty,
    /// Program Service name
    Ps,
    /// Program Type Name
    Ptyn,
    /// Radio Text
    Rt,
    /// Any type the control core does not interpret
    Other(u8),
}

impl RdsDataType {
    /// Wire value
    pub fn code(self) -> u8 {
        match self {
            Self::Pty => 2,
            Self::Ps => 7,
            Self::Ptyn => 8,
            Self::Rt => 9,
            Self::Other(code) => code,
        }
    }

    /// Parse a wire value; unknown values map to `Other`
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Self::Pty,
            7 => Self::Ps,
            8 => Self::Ptyn,
            9 => Self::Rt,
            other => Self::Other(other),
        }
    }
}

/// Functionality mask passed to turn-on
///
/// Bits 0-2 carry the region; bit 4 RDS, bit 5 RBDS, bit 6 AF, bit 8 soft mute.
/// RDS and RBDS cannot both be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct FunctionalityMask(u16);

impl FunctionalityMask {
    const REGION_BITS: u16 = 0x07;
    const RDS: u16 = 1 << 4;
    const RBDS: u16 = 1 << 5;
    const AF: u16 = 1 << 6;
    const SOFTMUTE: u16 = 1 << 8;
    const DEFINED: u16 = Self::REGION_BITS | Self::RDS | Self::RBDS | Self::AF | Self::SOFTMUTE;

    /// Mask with only a region selected
    pub fn new(region: Region) -> Self {
        Self(region.code() as u16)
    }

    /// Bundle used when powering up: NA with RBDS, AF and soft mute
    pub fn power_up_default() -> Self {
        Self::new(Region::Na).with_rbds().with_af().with_softmute()
    }

    /// Enable RDS, clearing RBDS
    pub fn with_rds(self) -> Self {
        Self((self.0 & !Self::RBDS) | Self::RDS)
    }

    /// Enable RBDS, clearing RDS
    pub fn with_rbds(self) -> Self {
        Self((self.0 & !Self::RDS) | Self::RBDS)
    }

    /// Enable alternate frequency following
    pub fn with_af(self) -> Self {
        Self(self.0 | Self::AF)
    }

    /// Enable soft mute
    pub fn with_softmute(self) -> Self {
        Self(self.0 | Self::SOFTMUTE)
    }

    /// Parse raw bits, enforcing RDS/RBDS exclusivity
    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        if bits & !Self::DEFINED != 0 {
            return Err(ProtocolError::unknown("functionality", bits.into()));
        }
        if bits & Self::RDS != 0 && bits & Self::RBDS != 0 {
            return Err(ProtocolError::InvalidParameter(
                "RDS and RBDS are mutually exclusive".into(),
            ));
        }
        Region::from_code((bits & Self::REGION_BITS) as u8)?;
        Ok(Self(bits))
    }

    /// Raw bits
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Selected region
    pub fn region(self) -> Region {
        // from_bits and the builders only ever store a valid region
        Region::from_code((self.0 & Self::REGION_BITS) as u8).unwrap_or_default()
    }

    pub fn rds(self) -> bool {
        self.0 & Self::RDS != 0
    }

    pub fn rbds(self) -> bool {
        self.0 & Self::RBDS != 0
    }

    pub fn af(self) -> bool {
        self.0 & Self::AF != 0
    }

    pub fn softmute(self) -> bool {
        self.0 & Self::SOFTMUTE != 0
    }
}

impl Default for FunctionalityMask {
    fn default() -> Self {
        Self::power_up_default()
    }
}

impl TryFrom<u16> for FunctionalityMask {
    type Error = ProtocolError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<FunctionalityMask> for u16 {
    fn from(mask: FunctionalityMask) -> u16 {
        mask.0
    }
}
