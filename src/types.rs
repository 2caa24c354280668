//! Shared value types, tag enumerations and version constants.
//!
//! Every tag stored in the metrics file is a raw u32 on the wire. Tags decode
//! through `from_u32` with an `Unknown(u32)` fallback so files written by a
//! newer catalog still load, and re-encode byte-identically via `as_u32`.

/// Major number of the API version this build implements.
pub const API_MAJOR_CURRENT: u32 = 1;
/// Minor number of the API version this build implements.
pub const API_MINOR_CURRENT: u32 = 13;
/// Build number of the API version this build implements.
pub const API_BUILD_CURRENT: u32 = 0;

/// API minor version that introduced the per-set GT mask field.
pub const API_MINOR_GT_MASK: u32 = 4;
/// API minor version that introduced the per-set availability equation.
pub const API_MINOR_AVAILABILITY_EQUATION: u32 = 11;

/// Size in bytes of a platform-applicability byte array.
pub const PLATFORM_MASK_BYTES: usize = 32;

/// GT-type mask accepting every hardware sub-variant.
pub const GT_TYPE_ALL: u32 = u32::MAX;

/// Three-part API version as stored in the device and in saved files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl ApiVersion {
    pub fn current() -> Self {
        Self {
            major: API_MAJOR_CURRENT,
            minor: API_MINOR_CURRENT,
            build: API_BUILD_CURRENT,
        }
    }

    /// True when a file field gated on `major.minor` is present in a file
    /// written by a device running this version.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Typed value held by a global symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    U32(u32),
    U64(u64),
    F32(f32),
    Bool(bool),
    CString(String),
    ByteArray(Vec<u8>),
    ByteArrayArray(Vec<Vec<u8>>),
}

impl TypedValue {
    /// Wire tag written ahead of the payload.
    pub fn tag(&self) -> u32 {
        match self {
            Self::U32(_) => 0,
            Self::U64(_) => 1,
            Self::F32(_) => 2,
            Self::Bool(_) => 3,
            Self::CString(_) => 4,
            Self::ByteArray(_) => 5,
            Self::ByteArrayArray(_) => 6,
        }
    }
}

/// How a global symbol obtained its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Immediate,
    Detect,
    Dynamic,
    Unknown(u32),
}

impl SymbolKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Immediate,
            1 => Self::Detect,
            2 => Self::Dynamic,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Immediate => 0,
            Self::Detect => 1,
            Self::Dynamic => 2,
            Self::Unknown(value) => *value,
        }
    }
}

/// Layout of the raw hardware report produced by a metric set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Oa,
    Gp,
    PipelineStats,
    Oam,
    Unknown(u32),
}

impl ReportType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Oa,
            1 => Self::Gp,
            2 => Self::PipelineStats,
            3 => Self::Oam,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Oa => 0,
            Self::Gp => 1,
            Self::PipelineStats => 2,
            Self::Oam => 3,
            Self::Unknown(value) => *value,
        }
    }
}

/// Semantic class of a metric's processed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    DurationRaw,
    DurationNorm,
    EventRate,
    Event,
    Throughput,
    Timestamp,
    Flag,
    Ratio,
    Raw,
    Unknown(u32),
}

impl MetricType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::DurationRaw,
            1 => Self::DurationNorm,
            2 => Self::EventRate,
            3 => Self::Event,
            4 => Self::Throughput,
            5 => Self::Timestamp,
            6 => Self::Flag,
            7 => Self::Ratio,
            8 => Self::Raw,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::DurationRaw => 0,
            Self::DurationNorm => 1,
            Self::EventRate => 2,
            Self::Event => 3,
            Self::Throughput => 4,
            Self::Timestamp => 5,
            Self::Flag => 6,
            Self::Ratio => 7,
            Self::Raw => 8,
            Self::Unknown(value) => *value,
        }
    }
}

/// Machine representation of a metric's computed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    U32,
    U64,
    Bool,
    F32,
    Unknown(u32),
}

impl ResultType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::U32,
            1 => Self::U64,
            2 => Self::Bool,
            3 => Self::F32,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::U32 => 0,
            Self::U64 => 1,
            Self::Bool => 2,
            Self::F32 => 3,
            Self::Unknown(value) => *value,
        }
    }
}

/// Hardware unit a metric is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwUnitType {
    Gpu,
    Slice,
    Subslice,
    SubsliceBank,
    EuUnit,
    EuDual,
    EuSingle,
    Uncore,
    DualSubslice,
    Unknown(u32),
}

impl HwUnitType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Gpu,
            1 => Self::Slice,
            2 => Self::Subslice,
            3 => Self::SubsliceBank,
            4 => Self::EuUnit,
            5 => Self::EuDual,
            6 => Self::EuSingle,
            7 => Self::Uncore,
            8 => Self::DualSubslice,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Gpu => 0,
            Self::Slice => 1,
            Self::Subslice => 2,
            Self::SubsliceBank => 3,
            Self::EuUnit => 4,
            Self::EuDual => 5,
            Self::EuSingle => 6,
            Self::Uncore => 7,
            Self::DualSubslice => 8,
            Self::Unknown(value) => *value,
        }
    }
}

/// Kind of data carried by an information item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InformationType {
    ReportReason,
    Value,
    Flag,
    Timestamp,
    ContextIdTag,
    SamplePhase,
    GpuNode,
    Unknown(u32),
}

impl InformationType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::ReportReason,
            1 => Self::Value,
            2 => Self::Flag,
            3 => Self::Timestamp,
            4 => Self::ContextIdTag,
            5 => Self::SamplePhase,
            6 => Self::GpuNode,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::ReportReason => 0,
            Self::Value => 1,
            Self::Flag => 2,
            Self::Timestamp => 3,
            Self::ContextIdTag => 4,
            Self::SamplePhase => 5,
            Self::GpuNode => 6,
            Self::Unknown(value) => *value,
        }
    }
}

/// How a raw counter accumulates or wraps between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaFunctionKind {
    Null,
    NBits,
    BoolOr,
    BoolXor,
    GetPrevious,
    GetLast,
    NsTime,
    Unknown(u32),
}

impl DeltaFunctionKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::NBits,
            2 => Self::BoolOr,
            3 => Self::BoolXor,
            4 => Self::GetPrevious,
            5 => Self::GetLast,
            6 => Self::NsTime,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Null => 0,
            Self::NBits => 1,
            Self::BoolOr => 2,
            Self::BoolXor => 3,
            Self::GetPrevious => 4,
            Self::GetLast => 5,
            Self::NsTime => 6,
            Self::Unknown(value) => *value,
        }
    }
}

/// Delta/overflow function descriptor: the function kind plus the counter
/// bit width it operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaFunction {
    pub kind: DeltaFunctionKind,
    pub bits: u32,
}

impl Default for DeltaFunctionKind {
    fn default() -> Self {
        Self::Null
    }
}

/// Role of a register configuration set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    Common,
    Snapshot,
    Query,
    Unknown(u32),
}

impl ConfigType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Common,
            1 => Self::Snapshot,
            2 => Self::Query,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Common => 0,
            Self::Snapshot => 1,
            Self::Query => 2,
            Self::Unknown(value) => *value,
        }
    }
}

/// Hardware block a register write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterType {
    Oa,
    Noa,
    Flex,
    Pm,
    Mmio,
    Unknown(u32),
}

impl RegisterType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Oa,
            1 => Self::Noa,
            2 => Self::Flex,
            3 => Self::Pm,
            4 => Self::Mmio,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Oa => 0,
            Self::Noa => 1,
            Self::Flex => 2,
            Self::Pm => 3,
            Self::Mmio => 4,
            Self::Unknown(value) => *value,
        }
    }
}

/// Platform-applicability byte array. Bit `i` set means platform index `i`
/// is applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMask {
    bytes: Vec<u8>,
}

impl PlatformMask {
    /// Mask with every platform bit set.
    pub fn all() -> Self {
        Self {
            bytes: vec![0xff; PLATFORM_MASK_BYTES],
        }
    }

    /// Mask with no platform bit set.
    pub fn empty() -> Self {
        Self {
            bytes: vec![0; PLATFORM_MASK_BYTES],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Synthesize a byte-array mask from the legacy u32 bitmask field used
    /// by file versions older than 3.
    pub fn from_legacy_bitmask(mask: u32) -> Self {
        let mut bytes = vec![0u8; PLATFORM_MASK_BYTES];
        bytes[..4].copy_from_slice(&mask.to_le_bytes());
        Self { bytes }
    }

    pub fn set(&mut self, platform_index: u32) {
        let byte = (platform_index / 8) as usize;
        if byte < self.bytes.len() {
            self.bytes[byte] |= 1 << (platform_index % 8);
        }
    }

    pub fn contains(&self, platform_index: u32) -> bool {
        let byte = (platform_index / 8) as usize;
        byte < self.bytes.len() && (self.bytes[byte] & (1 << (platform_index % 8))) != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A single (offset, value, type) register write, 12 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub offset: u32,
    pub value: u32,
    pub kind: RegisterType,
}

/// Byte span of one register record in the file.
pub const REGISTER_RECORD_BYTES: usize = 12;
