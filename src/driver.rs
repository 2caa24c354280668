//! Boundary to the GPU driver capability transport.
//!
//! The catalog never talks to hardware directly; it asks an implementation of
//! [`DriverInterface`] for typed scalars keyed by [`DeviceParam`]. A failed
//! query is never fatal to catalog construction, the corresponding field just
//! keeps its default.

use crate::error::CatalogError;

/// Capability parameters a device may query at construction or lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceParam {
    PlatformIndex,
    GtTypeIndex,
    OaBufferCount,
}

/// GPU and CPU timestamps sampled together.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuCpuTimestamps {
    pub gpu_ns: u64,
    pub cpu_ns: u64,
    pub cpu_id: u32,
    pub correlation_indicator_ns: u64,
}

pub trait DriverInterface {
    /// Query a scalar capability value.
    fn query_u32(&self, param: DeviceParam) -> Result<u32, CatalogError>;

    /// Sample correlated GPU/CPU timestamps.
    fn gpu_cpu_timestamps(&self) -> Result<GpuCpuTimestamps, CatalogError>;
}

/// Driver stub for catalogs built purely from files. Every query reports
/// NotSupported.
#[derive(Debug, Default)]
pub struct NullDriver;

impl DriverInterface for NullDriver {
    fn query_u32(&self, param: DeviceParam) -> Result<u32, CatalogError> {
        Err(CatalogError::NotSupported(format!("{param:?} query without a driver")))
    }

    fn gpu_cpu_timestamps(&self) -> Result<GpuCpuTimestamps, CatalogError> {
        Err(CatalogError::NotSupported("timestamp query without a driver".into()))
    }
}
