//! GPU performance-counter metrics catalog with a versioned binary file
//! format.
//!
//! The catalog is a tree: a [`Device`] owns a global [`SymbolTable`] and a
//! list of [`ConcurrentGroup`]s; each group owns [`MetricSet`]s; each set owns
//! its [`Metric`]s, [`InformationItem`]s and [`RegisterSet`]s. The whole tree
//! serializes to a little-endian binary file whose header identifies one of
//! three format versions, and loading merges the file's content into the
//! existing tree instead of duplicating entities.
//!
//! ```no_run
//! use metrics_catalog::{Device, NullDriver};
//!
//! # fn main() -> Result<(), metrics_catalog::CatalogError> {
//! let mut device = Device::new("gpu0", 0, Box::new(NullDriver));
//! device.open_from_file("custom_metrics.bin")?;
//! for group in device.groups() {
//!     for set in group.sets() {
//!         println!("{}: {} metrics", set.symbol_name, set.metrics().len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod format;
pub mod symbols;
pub mod types;

pub use catalog::{
    ApiSpecificId, ConcurrentGroup, Device, InformationItem, Metric, MetricSet, MetricSetParams,
    RegisterSet,
};
pub use driver::{DeviceParam, DriverInterface, GpuCpuTimestamps, NullDriver};
pub use error::CatalogError;
pub use format::{FileVersion, FILE_KEY_V1, FILE_KEY_V2, FILE_KEY_V3, MIN_FILE_SIZE};
pub use symbols::{GlobalSymbol, SymbolTable};
pub use types::{
    ApiVersion, ConfigType, DeltaFunction, DeltaFunctionKind, HwUnitType, InformationType,
    MetricType, PlatformMask, Register, RegisterType, ReportType, ResultType, SymbolKind,
    TypedValue, GT_TYPE_ALL,
};
