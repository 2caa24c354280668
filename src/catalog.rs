//! In-memory metrics catalog tree.
//!
//! A [`Device`] owns the symbol table and an ordered list of
//! [`ConcurrentGroup`]s; each group owns its [`MetricSet`]s, and each set owns
//! its metrics, information items and register-config sets. Children never
//! outlive their parent and complementary-set links are plain names resolved
//! by lookup, never ownership.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::driver::{DeviceParam, DriverInterface, GpuCpuTimestamps};
use crate::error::CatalogError;
use crate::format;
use crate::symbols::SymbolTable;
use crate::types::{
    ApiVersion, ConfigType, DeltaFunction, HwUnitType, InformationType, MetricType, PlatformMask,
    Register, ReportType, ResultType,
};

/// Ticks are masked to 32 bits before scaling to stay in sync with the
/// timestamps embedded in hardware reports.
const GPU_TIMESTAMP_MASK_32: u64 = 0xffff_ffff;
const SECOND_IN_NS: u64 = 1_000_000_000;

/// API-specific identifier bundle attached to every metric set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSpecificId {
    pub d3d9_query_id: u32,
    pub d3d9_fourcc: u32,
    pub d3d1x_query_id: u32,
    pub d3d1x_dev_dependent_id: u32,
    pub d3d1x_dev_dependent_name: String,
    pub ogl_query_intel_id: u32,
    pub ogl_query_intel_name: String,
    pub ogl_query_arb_target_id: u32,
    pub ocl_query_id: u32,
    pub hw_config_id: u32,
}

/// A single hardware counter definition owned by one metric set.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub symbol_name: String,
    pub short_name: String,
    pub long_name: String,
    pub group_name: String,
    pub group_id: u32,
    pub usage_flags_mask: u32,
    pub api_mask: u32,
    pub metric_type: MetricType,
    pub result_type: ResultType,
    pub result_units: String,
    pub low_watermark: u64,
    pub high_watermark: u64,
    pub hw_unit_type: HwUnitType,
    pub dx_to_ogl_alias: String,
    pub signal_name: String,
    pub availability_equation: Option<String>,
    pub delta_function: DeltaFunction,
    pub snapshot_report_read_equation: Option<String>,
    pub delta_report_read_equation: Option<String>,
    pub normalization_equation: Option<String>,
    pub max_value_equation: Option<String>,
}

/// Side-band data item (timestamps, report reasons, flags) owned by a set.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationItem {
    pub symbol_name: String,
    pub short_name: String,
    pub long_name: String,
    pub group_name: String,
    pub api_mask: u32,
    pub info_type: InformationType,
    pub info_units: String,
    pub availability_equation: Option<String>,
    pub overflow_function: DeltaFunction,
    pub snapshot_report_read_equation: Option<String>,
    pub delta_report_read_equation: Option<String>,
}

/// One alternative hardware programming for a set: a prioritised sequence of
/// register writes gated by an availability equation.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSet {
    pub config_id: u32,
    pub config_priority: u32,
    pub config_type: ConfigType,
    pub availability_equation: Option<String>,
    pub registers: Vec<Register>,
}

impl RegisterSet {
    pub fn new(
        config_id: u32,
        config_priority: u32,
        config_type: ConfigType,
        availability_equation: Option<String>,
    ) -> Self {
        Self {
            config_id,
            config_priority,
            config_type,
            availability_equation,
            registers: Vec::new(),
        }
    }
}

/// Construction parameters for a metric set.
#[derive(Debug, Clone)]
pub struct MetricSetParams {
    pub symbol_name: String,
    pub short_name: String,
    pub api_mask: u32,
    pub category_mask: u32,
    pub raw_report_size: u32,
    pub query_report_size: u32,
    pub report_type: ReportType,
    pub platform_mask: PlatformMask,
    pub gt_mask: u32,
    pub availability_equation: Option<String>,
}

/// A fixed hardware counter configuration producing one report layout.
///
/// Identity within a group is the composite key
/// (symbol name, platform mask, GT mask).
#[derive(Debug)]
pub struct MetricSet {
    pub symbol_name: String,
    pub short_name: String,
    pub api_mask: u32,
    pub category_mask: u32,
    pub raw_report_size: u32,
    pub query_report_size: u32,
    pub report_type: ReportType,
    pub platform_mask: PlatformMask,
    pub gt_mask: u32,
    pub availability_equation: Option<String>,
    pub api_specific_id: ApiSpecificId,
    metrics: Vec<Metric>,
    metric_index: FxHashMap<String, usize>,
    information: Vec<InformationItem>,
    information_index: FxHashMap<String, usize>,
    start_register_sets: Vec<RegisterSet>,
    complementary_sets: Vec<String>,
    // config id -> index of the highest-priority start register set,
    // recomputed by refresh_config_registers after a load.
    active_configs: FxHashMap<u32, usize>,
}

impl MetricSet {
    pub fn new(params: MetricSetParams) -> Self {
        Self {
            symbol_name: params.symbol_name,
            short_name: params.short_name,
            api_mask: params.api_mask,
            category_mask: params.category_mask,
            raw_report_size: params.raw_report_size,
            query_report_size: params.query_report_size,
            report_type: params.report_type,
            platform_mask: params.platform_mask,
            gt_mask: params.gt_mask,
            availability_equation: params.availability_equation,
            api_specific_id: ApiSpecificId::default(),
            metrics: Vec::new(),
            metric_index: FxHashMap::default(),
            information: Vec::new(),
            information_index: FxHashMap::default(),
            start_register_sets: Vec::new(),
            complementary_sets: Vec::new(),
            active_configs: FxHashMap::default(),
        }
    }

    pub fn is_metric_added(&self, symbol_name: &str) -> bool {
        self.metric_index.contains_key(symbol_name)
    }

    /// Append a metric. The caller is responsible for the dedup decision;
    /// duplicate names keep the first entry reachable by lookup.
    pub fn add_metric(&mut self, metric: Metric) -> &mut Metric {
        self.metric_index
            .entry(metric.symbol_name.clone())
            .or_insert(self.metrics.len());
        self.metrics.push(metric);
        self.metrics.last_mut().unwrap()
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn metric_by_name(&self, symbol_name: &str) -> Option<&Metric> {
        self.metric_index.get(symbol_name).map(|&i| &self.metrics[i])
    }

    pub fn is_information_added(&self, symbol_name: &str) -> bool {
        self.information_index.contains_key(symbol_name)
    }

    pub fn add_information(&mut self, item: InformationItem) -> &mut InformationItem {
        self.information_index
            .entry(item.symbol_name.clone())
            .or_insert(self.information.len());
        self.information.push(item);
        self.information.last_mut().unwrap()
    }

    pub fn information(&self) -> &[InformationItem] {
        &self.information
    }

    pub fn information_by_name(&self, symbol_name: &str) -> Option<&InformationItem> {
        self.information_index.get(symbol_name).map(|&i| &self.information[i])
    }

    pub fn add_start_register_set(&mut self, set: RegisterSet) -> &mut RegisterSet {
        self.start_register_sets.push(set);
        self.start_register_sets.last_mut().unwrap()
    }

    pub fn start_register_sets(&self) -> &[RegisterSet] {
        &self.start_register_sets
    }

    pub fn add_complementary_set(&mut self, symbol_name: &str) {
        self.complementary_sets.push(symbol_name.to_string());
    }

    pub fn complementary_sets(&self) -> &[String] {
        &self.complementary_sets
    }

    /// Recompute which start config set wins for each config id. Called after
    /// registers are loaded from a file; among sets sharing a config id the
    /// highest priority wins, first one on ties.
    pub fn refresh_config_registers(&mut self) {
        self.active_configs.clear();
        for (index, set) in self.start_register_sets.iter().enumerate() {
            match self.active_configs.get(&set.config_id) {
                Some(&current) if self.start_register_sets[current].config_priority >= set.config_priority => {}
                _ => {
                    self.active_configs.insert(set.config_id, index);
                }
            }
        }
    }

    /// The winning start register set for a config id, if any.
    pub fn active_config(&self, config_id: u32) -> Option<&RegisterSet> {
        self.active_configs.get(&config_id).map(|&i| &self.start_register_sets[i])
    }

    /// True when this set matches the composite dedup key used on load.
    pub fn matches(&self, symbol_name: &str, platform_mask: &PlatformMask, gt_mask: u32) -> bool {
        self.symbol_name == symbol_name && self.platform_mask == *platform_mask && self.gt_mask == gt_mask
    }
}

/// A named collection of metric sets that can be sampled simultaneously.
#[derive(Debug)]
pub struct ConcurrentGroup {
    pub symbol_name: String,
    pub short_name: String,
    pub measurement_type_mask: u32,
    sets: Vec<MetricSet>,
}

impl ConcurrentGroup {
    fn new(symbol_name: &str, short_name: &str, measurement_type_mask: u32) -> Self {
        Self {
            symbol_name: symbol_name.to_string(),
            short_name: short_name.to_string(),
            measurement_type_mask,
            sets: Vec::new(),
        }
    }

    pub fn add_metric_set(&mut self, params: MetricSetParams) -> &mut MetricSet {
        self.sets.push(MetricSet::new(params));
        self.sets.last_mut().unwrap()
    }

    pub fn sets(&self) -> &[MetricSet] {
        &self.sets
    }

    pub fn set(&self, index: usize) -> Option<&MetricSet> {
        self.sets.get(index)
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Find the set with the given composite key. Two sets may share a name
    /// as long as their platform/GT applicability differs, so this is the
    /// only lookup the merge path may use.
    pub fn matching_set_index(
        &self,
        symbol_name: &str,
        platform_mask: &PlatformMask,
        gt_mask: u32,
    ) -> Option<usize> {
        self.sets
            .iter()
            .position(|set| set.matches(symbol_name, platform_mask, gt_mask))
    }

    pub fn set_mut(&mut self, index: usize) -> Option<&mut MetricSet> {
        self.sets.get_mut(index)
    }

    pub fn set_by_name(&self, symbol_name: &str) -> Option<&MetricSet> {
        self.sets.iter().find(|set| set.symbol_name == symbol_name)
    }
}

/// GPU metrics root object: symbol table plus concurrent group tree for one
/// open hardware/sub-device context.
pub struct Device {
    name: String,
    version: ApiVersion,
    platform_index: u32,
    gt_type_mask: u32,
    sub_device_index: u32,
    opened_from_file: bool,
    oa_buffer_count: u32,
    symbols: SymbolTable,
    groups: Vec<ConcurrentGroup>,
    group_index: FxHashMap<String, usize>,
    driver: Box<dyn DriverInterface>,
}

impl Device {
    /// Create an empty device and discover platform identity through the
    /// driver. Failed capability queries leave fields at their defaults.
    pub fn new(name: &str, sub_device_index: u32, driver: Box<dyn DriverInterface>) -> Self {
        let mut platform_index = 0;
        let mut gt_type_mask = 0;

        match driver.query_u32(DeviceParam::PlatformIndex) {
            Ok(index) => {
                platform_index = index;
                info!(platform_index, "device platform index");
            }
            Err(err) => debug!(%err, "platform index unavailable"),
        }
        match driver.query_u32(DeviceParam::GtTypeIndex) {
            Ok(index) => {
                gt_type_mask = 1u32 << (index & 31);
                info!(gt_type_mask, "device GT type");
            }
            Err(err) => debug!(%err, "GT type unavailable"),
        }

        Self {
            name: name.to_string(),
            version: ApiVersion::current(),
            platform_index,
            gt_type_mask,
            sub_device_index,
            opened_from_file: false,
            oa_buffer_count: 0,
            symbols: SymbolTable::new(),
            groups: Vec::new(),
            group_index: FxHashMap::default(),
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api_version(&self) -> ApiVersion {
        self.version
    }

    pub fn platform_index(&self) -> u32 {
        self.platform_index
    }

    pub fn gt_type_mask(&self) -> u32 {
        self.gt_type_mask
    }

    pub fn sub_device_index(&self) -> u32 {
        self.sub_device_index
    }

    pub fn opened_from_file(&self) -> bool {
        self.opened_from_file
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// True when the device's GT type intersects `gt_mask` and its platform
    /// index is present in `platform_mask`.
    pub fn is_platform_type_of(&self, platform_mask: &PlatformMask, gt_mask: u32) -> bool {
        (self.gt_type_mask & gt_mask) != 0 && platform_mask.contains(self.platform_index)
    }

    /// Add a concurrent group after checking platform applicability. Nothing
    /// is allocated when the platform mask excludes this device. Group names
    /// are unique; adding a name that already exists returns the existing
    /// group unchanged.
    pub fn add_concurrent_group(
        &mut self,
        symbol_name: &str,
        short_name: &str,
        measurement_type_mask: u32,
        platform_mask: &PlatformMask,
    ) -> Result<&mut ConcurrentGroup, CatalogError> {
        if !platform_mask.contains(self.platform_index) {
            warn!(group = symbol_name, "concurrent group not supported on this platform");
            return Err(CatalogError::NotSupported(format!(
                "concurrent group {symbol_name} is not applicable to platform {}",
                self.platform_index
            )));
        }

        if let Some(index) = self.group_index.get(symbol_name).copied() {
            debug!(group = symbol_name, "concurrent group already exists");
            return self.groups.get_mut(index).ok_or(CatalogError::InvalidParameter);
        }

        self.group_index.insert(symbol_name.to_string(), self.groups.len());
        self.groups.push(ConcurrentGroup::new(symbol_name, short_name, measurement_type_mask));
        Ok(self.groups.last_mut().unwrap())
    }

    pub fn groups(&self) -> &[ConcurrentGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&ConcurrentGroup> {
        self.groups.get(index)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_by_name(&self, symbol_name: &str) -> Option<&ConcurrentGroup> {
        self.group_index.get(symbol_name).map(|&i| &self.groups[i])
    }

    pub(crate) fn group_index_by_name(&self, symbol_name: &str) -> Option<usize> {
        self.group_index.get(symbol_name).copied()
    }

    pub(crate) fn group_mut(&mut self, index: usize) -> Option<&mut ConcurrentGroup> {
        self.groups.get_mut(index)
    }

    /// OA hardware buffer count, queried through the driver on first use and
    /// cached afterwards.
    pub fn oa_buffer_count(&mut self) -> u32 {
        if self.oa_buffer_count == 0 {
            match self.driver.query_u32(DeviceParam::OaBufferCount) {
                Ok(count) => {
                    self.oa_buffer_count = count;
                    debug!(count, "OA buffer count");
                }
                Err(err) => debug!(%err, "OA buffer count unavailable"),
            }
        }
        self.oa_buffer_count
    }

    /// Correlated GPU/CPU timestamps, passed through to the driver.
    pub fn gpu_cpu_timestamps(&self) -> Result<GpuCpuTimestamps, CatalogError> {
        self.driver.gpu_cpu_timestamps()
    }

    /// Convert a raw GPU timestamp to nanoseconds. Frequency 0 yields 0.
    pub fn convert_gpu_timestamp_to_ns(&self, ticks: u64, frequency: u64) -> u64 {
        if frequency == 0 {
            return 0;
        }
        (ticks & GPU_TIMESTAMP_MASK_32) * SECOND_IN_NS / frequency
    }

    /// Serialize the catalog to `path` in the current file format.
    ///
    /// `min_major`/`min_minor` record the API version a reader must provide;
    /// they gate readers, not this device's own version. A non-success return
    /// means the file is corrupt and must be discarded.
    pub fn save_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        min_major: u32,
        min_minor: u32,
    ) -> Result<(), CatalogError> {
        let bytes = format::encode_device(self, min_major, min_minor)?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load a saved catalog and merge it into this device.
    ///
    /// On failure the catalog may retain entities merged before the error;
    /// discard the device if consistency matters. `opened_from_file` is set
    /// only on full success.
    pub fn open_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CatalogError> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len() as usize;
        if file_size < format::MIN_FILE_SIZE {
            return Err(CatalogError::InvalidParameter);
        }

        // Scratch buffer for the whole file, owned by this call and dropped
        // on every exit path.
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(file_size).map_err(|_| CatalogError::NoMemory)?;
        file.read_to_end(&mut scratch)?;

        format::decode_into(self, &scratch)?;
        self.opened_from_file = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;
    use crate::types::DeltaFunctionKind;

    fn empty_device() -> Device {
        Device::new("test-adapter", 0, Box::new(NullDriver))
    }

    fn basic_set_params(name: &str, gt_mask: u32) -> MetricSetParams {
        MetricSetParams {
            symbol_name: name.to_string(),
            short_name: name.to_string(),
            api_mask: 0xffff_ffff,
            category_mask: 1,
            raw_report_size: 256,
            query_report_size: 512,
            report_type: ReportType::Oa,
            platform_mask: PlatformMask::all(),
            gt_mask,
            availability_equation: None,
        }
    }

    #[test]
    fn group_rejected_when_platform_not_in_mask() {
        let mut device = empty_device();
        let mut mask = PlatformMask::empty();
        mask.set(device.platform_index() + 1);
        let err = device.add_concurrent_group("OA", "OA", 1, &mask).unwrap_err();
        assert!(matches!(err, CatalogError::NotSupported(_)));
        assert_eq!(device.group_count(), 0);
    }

    #[test]
    fn duplicate_group_name_returns_the_existing_group() {
        let mut device = empty_device();
        device
            .add_concurrent_group("OA", "OA Unit Metrics", 0x3, &PlatformMask::all())
            .unwrap();
        let group = device
            .add_concurrent_group("OA", "different short name", 0x7, &PlatformMask::all())
            .unwrap();

        // The first definition wins and no second group is allocated.
        assert_eq!(group.short_name, "OA Unit Metrics");
        assert_eq!(group.measurement_type_mask, 0x3);
        assert_eq!(device.group_count(), 1);
        assert_eq!(
            device.group_by_name("OA").unwrap().short_name,
            "OA Unit Metrics"
        );
    }

    #[test]
    fn set_lookup_uses_composite_key() {
        let mut device = empty_device();
        let group = device
            .add_concurrent_group("OA", "OA", 1, &PlatformMask::all())
            .unwrap();
        group.add_metric_set(basic_set_params("RenderBasic", GT_MASK_A));
        group.add_metric_set(basic_set_params("RenderBasic", GT_MASK_B));

        assert_eq!(group.set_count(), 2);
        assert_eq!(
            group.matching_set_index("RenderBasic", &PlatformMask::all(), GT_MASK_B),
            Some(1)
        );
        assert_eq!(
            group.matching_set_index("RenderBasic", &PlatformMask::empty(), GT_MASK_A),
            None
        );
    }

    const GT_MASK_A: u32 = 0x1;
    const GT_MASK_B: u32 = 0x2;

    #[test]
    fn metric_names_dedup_by_lookup_but_order_is_kept() {
        let mut device = empty_device();
        let group = device
            .add_concurrent_group("OA", "OA", 1, &PlatformMask::all())
            .unwrap();
        let set = group.add_metric_set(basic_set_params("RenderBasic", GT_MASK_A));

        set.add_metric(test_metric("GpuTime"));
        set.add_metric(test_metric("EuActive"));
        assert!(set.is_metric_added("GpuTime"));
        assert!(!set.is_metric_added("GpuBusy"));
        assert_eq!(set.metrics()[0].symbol_name, "GpuTime");
        assert_eq!(set.metrics()[1].symbol_name, "EuActive");
    }

    fn test_metric(name: &str) -> Metric {
        Metric {
            symbol_name: name.to_string(),
            short_name: name.to_string(),
            long_name: name.to_string(),
            group_name: "GPU".to_string(),
            group_id: 0,
            usage_flags_mask: 0,
            api_mask: 0xffff_ffff,
            metric_type: MetricType::DurationRaw,
            result_type: ResultType::U64,
            result_units: "ns".to_string(),
            low_watermark: 0,
            high_watermark: u64::MAX,
            hw_unit_type: HwUnitType::Gpu,
            dx_to_ogl_alias: String::new(),
            signal_name: String::new(),
            availability_equation: None,
            delta_function: DeltaFunction { kind: DeltaFunctionKind::NBits, bits: 32 },
            snapshot_report_read_equation: None,
            delta_report_read_equation: None,
            normalization_equation: None,
            max_value_equation: None,
        }
    }

    #[test]
    fn refresh_picks_highest_priority_config_per_id() {
        let mut device = empty_device();
        let group = device
            .add_concurrent_group("OA", "OA", 1, &PlatformMask::all())
            .unwrap();
        let set = group.add_metric_set(basic_set_params("RenderBasic", GT_MASK_A));

        let mut low = RegisterSet::new(7, 1, ConfigType::Common, None);
        low.registers.push(Register { offset: 0x9888, value: 0x1, kind: crate::types::RegisterType::Noa });
        let mut high = RegisterSet::new(7, 5, ConfigType::Common, None);
        high.registers.push(Register { offset: 0x9888, value: 0x2, kind: crate::types::RegisterType::Noa });
        set.add_start_register_set(low);
        set.add_start_register_set(high);
        set.refresh_config_registers();

        let active = set.active_config(7).unwrap();
        assert_eq!(active.config_priority, 5);
        assert_eq!(active.registers[0].value, 0x2);
        assert!(set.active_config(8).is_none());
    }

    #[test]
    fn timestamp_conversion_masks_to_32_bits() {
        let device = empty_device();
        assert_eq!(device.convert_gpu_timestamp_to_ns(0, 12_000_000), 0);
        assert_eq!(device.convert_gpu_timestamp_to_ns(24, 12_000_000), 2000);
        // High bits above 32 are ignored.
        assert_eq!(
            device.convert_gpu_timestamp_to_ns((1 << 40) | 24, 12_000_000),
            2000
        );
        assert_eq!(device.convert_gpu_timestamp_to_ns(1234, 0), 0);
    }
}
