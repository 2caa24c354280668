//! Versioned binary codec for the metrics catalog file format.
//!
//! Four format versions exist. Version 0 means "not a recognised file";
//! versions 1-3 are distinguished solely by which fixed ASCII header matched.
//! The encoder always writes the current (version 3) layout; the decoder
//! accepts all three and merges the file's content into a pre-populated
//! catalog without duplicating entities that already exist.
//!
//! Decode failures abort immediately and are propagated unchanged. Catalog
//! state merged before the failing field is deliberately left in place;
//! callers that need consistency discard the whole device.

use tracing::{debug, warn};

use crate::buffer::{FileBuffer, FileWriter};
use crate::catalog::{
    ApiSpecificId, Device, InformationItem, Metric, MetricSetParams, RegisterSet,
};
use crate::error::CatalogError;
use crate::types::{
    ApiVersion, ConfigType, DeltaFunction, DeltaFunctionKind, HwUnitType, InformationType,
    MetricType, PlatformMask, Register, RegisterType, ReportType, ResultType, SymbolKind,
    TypedValue, API_MAJOR_CURRENT, API_MINOR_AVAILABILITY_EQUATION, API_MINOR_CURRENT,
    API_MINOR_GT_MASK, GT_TYPE_ALL, REGISTER_RECORD_BYTES,
};

/// Version-1 header, including the trailing newline and NUL the original
/// writers emitted.
pub const FILE_KEY_V1: &[u8] = b"CUSTOM_METRICS_FILE\n\0";
/// Version-2 header.
pub const FILE_KEY_V2: &[u8] = b"CUSTOM_METRICS_FILE_2_0\n\0";
/// Version-3 (current) header.
pub const FILE_KEY_V3: &[u8] = b"CUSTOM_METRICS_FILE_3_0\n\0";

/// Smallest byte count a file can have and still carry a recognisable header.
pub const MIN_FILE_SIZE: usize = FILE_KEY_V1.len();

/// Detected file-format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileVersion {
    V1,
    V2,
    V3,
}

impl FileVersion {
    /// Sniff the header. `None` is the "version 0 / not a metrics file"
    /// outcome.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(FILE_KEY_V3) {
            Some(Self::V3)
        } else if data.starts_with(FILE_KEY_V2) {
            Some(Self::V2)
        } else if data.starts_with(FILE_KEY_V1) {
            Some(Self::V1)
        } else {
            None
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            Self::V1 => FILE_KEY_V1.len(),
            Self::V2 => FILE_KEY_V2.len(),
            Self::V3 => FILE_KEY_V3.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serialize a device to the current file layout.
///
/// `min_major`/`min_minor` are the API floor a reader must provide. Output is
/// not rolled back on failure; treat any error as "discard the bytes".
pub fn encode_device(device: &Device, min_major: u32, min_minor: u32) -> Result<Vec<u8>, CatalogError> {
    let mut w = FileWriter::new();

    w.write_raw(FILE_KEY_V3);
    w.write_u32(min_major);
    w.write_u32(min_minor);
    w.write_u32(device.platform_index());

    let version = device.api_version();
    w.write_u32(version.major);
    w.write_u32(version.minor);
    w.write_u32(version.build);

    write_symbols(&mut w, device);

    w.write_u32(device.group_count() as u32);
    for group in device.groups() {
        w.write_cstring(&group.symbol_name);
        w.write_cstring(&group.short_name);
        w.write_u32(group.measurement_type_mask);

        w.write_u32(group.set_count() as u32);
        for set in group.sets() {
            w.write_cstring(&set.symbol_name);
            w.write_cstring(&set.short_name);
            w.write_u32(set.api_mask);
            w.write_u32(set.category_mask);
            w.write_u32(set.raw_report_size);
            w.write_u32(set.query_report_size);
            w.write_u32(legacy_bits(&set.platform_mask));
            w.write_u32(set.gt_mask);
            w.write_equation(set.availability_equation.as_deref());
            w.write_u32(set.report_type.as_u32());
            // The current format always stores the byte-array form; the
            // legacy bitmask field above is kept for old readers.
            w.write_byte_array(set.platform_mask.as_bytes());

            write_api_specific_id(&mut w, &set.api_specific_id);

            w.write_u32(set.metrics().len() as u32);
            for metric in set.metrics() {
                write_metric(&mut w, metric);
            }

            w.write_u32(set.information().len() as u32);
            for item in set.information() {
                write_information(&mut w, item);
            }

            w.write_u32(set.start_register_sets().len() as u32);
            for reg_set in set.start_register_sets() {
                write_register_set(&mut w, reg_set);
            }
            // Stop registers are write-obsolete; the count stays for old
            // readers and is always zero.
            w.write_u32(0);

            w.write_u32(set.complementary_sets().len() as u32);
            for name in set.complementary_sets() {
                w.write_cstring(name);
            }
        }
    }

    Ok(w.into_bytes())
}

/// First 32 bits of the platform byte array, the field legacy readers use.
fn legacy_bits(mask: &PlatformMask) -> u32 {
    let bytes = mask.as_bytes();
    let mut word = [0u8; 4];
    for (i, byte) in bytes.iter().take(4).enumerate() {
        word[i] = *byte;
    }
    u32::from_le_bytes(word)
}

fn write_symbols(w: &mut FileWriter, device: &Device) {
    let symbols = device.symbols();
    w.write_u32(symbols.len() as u32);
    for symbol in symbols.iter() {
        w.write_cstring(&symbol.name);
        write_typed_value(w, &symbol.value);
        w.write_u32(symbol.kind.as_u32());
    }
}

fn write_typed_value(w: &mut FileWriter, value: &TypedValue) {
    w.write_u32(value.tag());
    match value {
        TypedValue::U32(v) => w.write_u32(*v),
        TypedValue::U64(v) => w.write_u64(*v),
        TypedValue::F32(v) => w.write_f32(*v),
        TypedValue::Bool(v) => w.write_u32(*v as u32),
        TypedValue::CString(v) => w.write_cstring(v),
        TypedValue::ByteArray(v) => w.write_byte_array(v),
        TypedValue::ByteArrayArray(arrays) => {
            w.write_u32(arrays.len() as u32);
            for array in arrays {
                w.write_byte_array(array);
            }
        }
    }
}

fn write_api_specific_id(w: &mut FileWriter, id: &ApiSpecificId) {
    w.write_u32(id.d3d9_query_id);
    w.write_u32(id.d3d9_fourcc);
    w.write_u32(id.d3d1x_query_id);
    w.write_u32(id.d3d1x_dev_dependent_id);
    w.write_cstring(&id.d3d1x_dev_dependent_name);
    w.write_u32(id.ogl_query_intel_id);
    w.write_cstring(&id.ogl_query_intel_name);
    w.write_u32(id.ogl_query_arb_target_id);
    w.write_u32(id.ocl_query_id);
    w.write_u32(id.hw_config_id);
}

fn write_metric(w: &mut FileWriter, metric: &Metric) {
    w.write_u32(metric.group_id);
    w.write_cstring(&metric.symbol_name);
    w.write_cstring(&metric.short_name);
    w.write_cstring(&metric.group_name);
    w.write_cstring(&metric.long_name);
    w.write_cstring(&metric.dx_to_ogl_alias);
    w.write_u32(metric.usage_flags_mask);
    w.write_u32(metric.api_mask);
    w.write_u32(metric.result_type.as_u32());
    w.write_cstring(&metric.result_units);
    w.write_u32(metric.metric_type.as_u32());
    w.write_u32(metric.hw_unit_type.as_u32());
    w.write_i64(metric.low_watermark as i64);
    w.write_i64(metric.high_watermark as i64);
    w.write_cstring(&metric.signal_name);
    w.write_equation(metric.availability_equation.as_deref());

    w.write_u32(metric.delta_function.kind.as_u32());
    w.write_u32(metric.delta_function.bits);
    w.write_equation(metric.snapshot_report_read_equation.as_deref());
    w.write_equation(metric.delta_report_read_equation.as_deref());
    w.write_equation(metric.normalization_equation.as_deref());
    w.write_equation(metric.max_value_equation.as_deref());
}

fn write_information(w: &mut FileWriter, item: &InformationItem) {
    w.write_cstring(&item.symbol_name);
    w.write_cstring(&item.short_name);
    w.write_cstring(&item.group_name);
    w.write_cstring(&item.long_name);
    w.write_u32(item.api_mask);
    w.write_u32(item.info_type.as_u32());
    w.write_cstring(&item.info_units);
    w.write_equation(item.availability_equation.as_deref());

    w.write_u32(item.overflow_function.kind.as_u32());
    w.write_u32(item.overflow_function.bits);
    w.write_equation(item.snapshot_report_read_equation.as_deref());
    w.write_equation(item.delta_report_read_equation.as_deref());
}

fn write_register_set(w: &mut FileWriter, reg_set: &RegisterSet) {
    w.write_u32(reg_set.config_id);
    w.write_u32(reg_set.config_priority);
    w.write_u32(reg_set.config_type.as_u32());
    w.write_equation(reg_set.availability_equation.as_deref());

    w.write_u32(reg_set.registers.len() as u32);
    for reg in &reg_set.registers {
        w.write_u32(reg.offset);
        w.write_u32(reg.value);
        w.write_u32(reg.kind.as_u32());
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode a complete file buffer into `device`, merging into entities that
/// already exist. The caller owns the buffer; nothing is retained from it.
pub fn decode_into(device: &mut Device, data: &[u8]) -> Result<(), CatalogError> {
    let Some(file_version) = FileVersion::detect(data) else {
        warn!("metrics file header not recognised");
        return Err(CatalogError::InvalidFormat("unrecognised file header".into()));
    };
    debug!(?file_version, "metrics file format detected");

    let mut buf = FileBuffer::new(data);
    buf.skip(file_version.header_len())?;

    if file_version > FileVersion::V1 {
        let min_major = buf.read_u32()?;
        let min_minor = buf.read_u32()?;
        let too_new = min_major > API_MAJOR_CURRENT
            || (min_major == API_MAJOR_CURRENT && min_minor > API_MINOR_CURRENT);
        if too_new {
            warn!(
                required = %format!("{min_major}.{min_minor}"),
                current = %format!("{API_MAJOR_CURRENT}.{API_MINOR_CURRENT}"),
                "metrics file requires a newer API"
            );
            return Err(CatalogError::NotSupported(format!(
                "file requires API {min_major}.{min_minor}, current is {API_MAJOR_CURRENT}.{API_MINOR_CURRENT}"
            )));
        }
    }

    // Platform identifier: raw index since version 3, legacy one-hot bitmask
    // before that.
    if file_version >= FileVersion::V3 {
        let saved_platform = buf.read_u32()?;
        debug!(saved_platform, current = device.platform_index(), "file platform index");
    } else {
        let bitmask = buf.read_u32()?;
        match (0..32).find(|bit| bitmask & (1 << bit) != 0) {
            Some(index) => {
                debug!(saved_platform = index, current = device.platform_index(), "file platform (legacy mask)");
            }
            None => warn!("legacy platform mask in metrics file is empty"),
        }
    }

    // Embedded writer version; informational here, but it gates which
    // per-set fields are present further down.
    let file_api = ApiVersion {
        major: buf.read_u32()?,
        minor: buf.read_u32()?,
        build: buf.read_u32()?,
    };
    debug!(file_api = %file_api, current = %ApiVersion::current(), "metrics file API version");

    read_symbols(&mut buf, device)?;
    read_concurrent_groups(&mut buf, device, file_api, file_version)?;

    Ok(())
}

fn read_symbols(buf: &mut FileBuffer<'_>, device: &mut Device) -> Result<(), CatalogError> {
    let count = buf.read_u32()?;
    for _ in 0..count {
        let name = buf.read_cstring()?;
        let value = read_typed_value(buf)?;
        let kind = SymbolKind::from_u32(buf.read_u32()?);

        // First writer wins; a rejected value (and any byte-array payload it
        // owns) is dropped here.
        if !device.symbols_mut().add(&name, value, kind) {
            debug!(symbol = %name, "duplicate global symbol ignored");
        }
    }
    Ok(())
}

fn read_typed_value(buf: &mut FileBuffer<'_>) -> Result<TypedValue, CatalogError> {
    let tag = buf.read_u32()?;
    match tag {
        0 => Ok(TypedValue::U32(buf.read_u32()?)),
        1 => Ok(TypedValue::U64(buf.read_u64()?)),
        2 => Ok(TypedValue::F32(buf.read_f32()?)),
        3 => Ok(TypedValue::Bool(buf.read_u32()? != 0)),
        4 => Ok(TypedValue::CString(buf.read_cstring()?)),
        5 => Ok(TypedValue::ByteArray(buf.read_byte_array()?)),
        6 => {
            let count = buf.read_u32()?;
            // The count is untrusted; each element costs at least a 4-byte
            // length prefix, so anything beyond remaining/4 cannot exist and
            // must not be preallocated.
            let mut arrays = Vec::with_capacity((count as usize).min(buf.remaining() / 4));
            for _ in 0..count {
                arrays.push(buf.read_byte_array()?);
            }
            Ok(TypedValue::ByteArrayArray(arrays))
        }
        // An unknown tag has an unknown payload span; the decode cannot
        // continue past it.
        other => Err(CatalogError::InvalidFormat(format!("unknown typed-value tag {other}"))),
    }
}

fn read_concurrent_groups(
    buf: &mut FileBuffer<'_>,
    device: &mut Device,
    file_api: ApiVersion,
    file_version: FileVersion,
) -> Result<(), CatalogError> {
    let count = buf.read_u32()?;
    for _ in 0..count {
        let symbol_name = buf.read_cstring()?;
        let short_name = buf.read_cstring()?;
        let measurement_type_mask = buf.read_u32()?;

        // Duplicate group names resolve to the existing group; groups loaded
        // from a file are created with an all-platforms mask, only metric
        // sets carry real platform filtering on this path.
        let group_index = match device.group_index_by_name(&symbol_name) {
            Some(index) => index,
            None => {
                device.add_concurrent_group(
                    &symbol_name,
                    &short_name,
                    measurement_type_mask,
                    &PlatformMask::all(),
                )?;
                device.group_count() - 1
            }
        };

        read_metric_sets(buf, device, group_index, file_api, file_version)?;
    }
    Ok(())
}

fn read_metric_sets(
    buf: &mut FileBuffer<'_>,
    device: &mut Device,
    group_index: usize,
    file_api: ApiVersion,
    file_version: FileVersion,
) -> Result<(), CatalogError> {
    let count = buf.read_u32()?;
    for _ in 0..count {
        let symbol_name = buf.read_cstring()?;
        let short_name = buf.read_cstring()?;
        let api_mask = buf.read_u32()?;
        let category_mask = buf.read_u32()?;
        let raw_report_size = buf.read_u32()?;
        let query_report_size = buf.read_u32()?;
        let legacy_platform_bits = buf.read_u32()?;

        // Version-gated fields: absent in files written by older APIs.
        let gt_mask = if file_api.at_least(1, API_MINOR_GT_MASK) {
            buf.read_u32()?
        } else {
            GT_TYPE_ALL
        };
        let availability_equation = if file_api.at_least(1, API_MINOR_AVAILABILITY_EQUATION) {
            buf.read_equation()?
        } else {
            None
        };

        let report_type = ReportType::from_u32(buf.read_u32()?);

        let platform_mask = if file_version >= FileVersion::V3 {
            PlatformMask::from_bytes(buf.read_byte_array()?)
        } else {
            PlatformMask::from_legacy_bitmask(legacy_platform_bits)
        };

        let group = device.group_mut(group_index).ok_or(CatalogError::InvalidParameter)?;
        let existing_index = group.matching_set_index(&symbol_name, &platform_mask, gt_mask);
        let is_set_new = existing_index.is_none();
        let set_index = match existing_index {
            Some(index) => {
                debug!(set = %short_name, "metric set already present, merging");
                index
            }
            None => {
                debug!(set = %short_name, "adding metric set");
                group.add_metric_set(MetricSetParams {
                    symbol_name,
                    short_name,
                    api_mask,
                    category_mask,
                    raw_report_size,
                    query_report_size,
                    report_type,
                    platform_mask,
                    gt_mask,
                    availability_equation,
                });
                group.set_count() - 1
            }
        };

        // Everything below is consumed unconditionally so the cursor stays
        // aligned even when the set was deduplicated; materialisation is a
        // separate decision per sub-record.
        let api_specific_id = read_api_specific_id(buf)?;
        if is_set_new {
            let set = group.set_mut(set_index).ok_or(CatalogError::InvalidParameter)?;
            set.api_specific_id = api_specific_id;
        }

        read_metrics(buf, device, group_index, set_index, is_set_new)?;
        read_information(buf, device, group_index, set_index, is_set_new)?;
        read_registers(buf, device, group_index, set_index, is_set_new)?;

        // Complementary metric sets: stored as names, resolved lazily.
        let complementary_count = buf.read_u32()?;
        for _ in 0..complementary_count {
            let name = buf.read_cstring()?;
            if is_set_new {
                let group = device.group_mut(group_index).ok_or(CatalogError::InvalidParameter)?;
                let set = group.set_mut(set_index).ok_or(CatalogError::InvalidParameter)?;
                set.add_complementary_set(&name);
            }
        }
    }
    Ok(())
}

fn read_api_specific_id(buf: &mut FileBuffer<'_>) -> Result<ApiSpecificId, CatalogError> {
    Ok(ApiSpecificId {
        d3d9_query_id: buf.read_u32()?,
        d3d9_fourcc: buf.read_u32()?,
        d3d1x_query_id: buf.read_u32()?,
        d3d1x_dev_dependent_id: buf.read_u32()?,
        d3d1x_dev_dependent_name: buf.read_cstring()?,
        ogl_query_intel_id: buf.read_u32()?,
        ogl_query_intel_name: buf.read_cstring()?,
        ogl_query_arb_target_id: buf.read_u32()?,
        ocl_query_id: buf.read_u32()?,
        hw_config_id: buf.read_u32()?,
    })
}

fn read_metrics(
    buf: &mut FileBuffer<'_>,
    device: &mut Device,
    group_index: usize,
    set_index: usize,
    is_set_new: bool,
) -> Result<(), CatalogError> {
    let count = buf.read_u32()?;
    for _ in 0..count {
        // The whole record is always decoded; a duplicate is dropped after
        // the cursor has moved past it.
        let group_id = buf.read_u32()?;
        let symbol_name = buf.read_cstring()?;
        let short_name = buf.read_cstring()?;
        let group_name = buf.read_cstring()?;
        let long_name = buf.read_cstring()?;
        let dx_to_ogl_alias = buf.read_cstring()?;
        let usage_flags_mask = buf.read_u32()?;
        let api_mask = buf.read_u32()?;
        let result_type = ResultType::from_u32(buf.read_u32()?);
        let result_units = buf.read_cstring()?;
        let metric_type = MetricType::from_u32(buf.read_u32()?);
        let hw_unit_type = HwUnitType::from_u32(buf.read_u32()?);
        let low_watermark = buf.read_i64()? as u64;
        let high_watermark = buf.read_i64()? as u64;
        let signal_name = buf.read_cstring()?;
        let availability_equation = buf.read_equation()?;

        let delta_function = DeltaFunction {
            kind: DeltaFunctionKind::from_u32(buf.read_u32()?),
            bits: buf.read_u32()?,
        };
        let snapshot_report_read_equation = buf.read_equation()?;
        let delta_report_read_equation = buf.read_equation()?;
        let normalization_equation = buf.read_equation()?;
        let max_value_equation = buf.read_equation()?;

        let group = device.group_mut(group_index).ok_or(CatalogError::InvalidParameter)?;
        let set = group.set_mut(set_index).ok_or(CatalogError::InvalidParameter)?;
        if is_set_new || !set.is_metric_added(&symbol_name) {
            set.add_metric(Metric {
                symbol_name,
                short_name,
                long_name,
                group_name,
                group_id,
                usage_flags_mask,
                api_mask,
                metric_type,
                result_type,
                result_units,
                low_watermark,
                high_watermark,
                hw_unit_type,
                dx_to_ogl_alias,
                signal_name,
                availability_equation,
                delta_function,
                snapshot_report_read_equation,
                delta_report_read_equation,
                normalization_equation,
                max_value_equation,
            });
        }
    }
    Ok(())
}

fn read_information(
    buf: &mut FileBuffer<'_>,
    device: &mut Device,
    group_index: usize,
    set_index: usize,
    is_set_new: bool,
) -> Result<(), CatalogError> {
    let count = buf.read_u32()?;
    for _ in 0..count {
        let symbol_name = buf.read_cstring()?;
        let short_name = buf.read_cstring()?;
        let group_name = buf.read_cstring()?;
        let long_name = buf.read_cstring()?;
        let api_mask = buf.read_u32()?;
        let info_type = InformationType::from_u32(buf.read_u32()?);
        let info_units = buf.read_cstring()?;
        let availability_equation = buf.read_equation()?;

        let overflow_function = DeltaFunction {
            kind: DeltaFunctionKind::from_u32(buf.read_u32()?),
            bits: buf.read_u32()?,
        };
        let snapshot_report_read_equation = buf.read_equation()?;
        let delta_report_read_equation = buf.read_equation()?;

        let group = device.group_mut(group_index).ok_or(CatalogError::InvalidParameter)?;
        let set = group.set_mut(set_index).ok_or(CatalogError::InvalidParameter)?;
        if is_set_new || !set.is_information_added(&symbol_name) {
            set.add_information(InformationItem {
                symbol_name,
                short_name,
                long_name,
                group_name,
                api_mask,
                info_type,
                info_units,
                availability_equation,
                overflow_function,
                snapshot_report_read_equation,
                delta_report_read_equation,
            });
        }
    }
    Ok(())
}

fn read_registers(
    buf: &mut FileBuffer<'_>,
    device: &mut Device,
    group_index: usize,
    set_index: usize,
    is_set_new: bool,
) -> Result<(), CatalogError> {
    // Start register sets.
    let set_count = buf.read_u32()?;
    for _ in 0..set_count {
        let config_id = buf.read_u32()?;
        let config_priority = buf.read_u32()?;
        let config_type = ConfigType::from_u32(buf.read_u32()?);
        let availability_equation = buf.read_equation()?;

        let mut reg_set = RegisterSet::new(config_id, config_priority, config_type, availability_equation);

        let reg_count = buf.read_u32()?;
        for _ in 0..reg_count {
            let offset = buf.read_u32()?;
            let value = buf.read_u32()?;
            let kind = RegisterType::from_u32(buf.read_u32()?);
            reg_set.registers.push(Register { offset, value, kind });
        }

        // Register configs belong to the file's snapshot of the set; an
        // already-present set keeps its own and the decoded one is dropped.
        if is_set_new {
            let group = device.group_mut(group_index).ok_or(CatalogError::InvalidParameter)?;
            let set = group.set_mut(set_index).ok_or(CatalogError::InvalidParameter)?;
            set.add_start_register_set(reg_set);
        }
    }

    // Stop register sets are obsolete. Old files still contain them, so the
    // bytes are consumed for cursor alignment and never materialised.
    let stop_set_count = buf.read_u32()?;
    for _ in 0..stop_set_count {
        let _config_id = buf.read_u32()?;
        let _config_priority = buf.read_u32()?;
        let _config_type = buf.read_u32()?;
        let _equation = buf.read_equation()?;

        let reg_count = buf.read_u32()? as usize;
        buf.skip(reg_count * REGISTER_RECORD_BYTES)?;
    }

    if is_set_new {
        let group = device.group_mut(group_index).ok_or(CatalogError::InvalidParameter)?;
        let set = group.set_mut(set_index).ok_or(CatalogError::InvalidParameter)?;
        set.refresh_config_registers();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;

    fn empty_device() -> Device {
        Device::new("test-adapter", 0, Box::new(NullDriver))
    }

    #[test]
    fn detect_all_three_headers() {
        assert_eq!(FileVersion::detect(FILE_KEY_V1), Some(FileVersion::V1));
        assert_eq!(FileVersion::detect(FILE_KEY_V2), Some(FileVersion::V2));
        assert_eq!(FileVersion::detect(FILE_KEY_V3), Some(FileVersion::V3));
        assert_eq!(FileVersion::detect(b"CUSTOM_METRICS_FILE_4_0\n\0"), None);
        assert_eq!(FileVersion::detect(b""), None);
    }

    #[test]
    fn unrecognised_magic_is_invalid_format_and_allocates_nothing() {
        let mut device = empty_device();
        let data = vec![0u8; 64];
        let err = decode_into(&mut device, &data).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidFormat(_)));
        assert_eq!(device.group_count(), 0);
        assert!(device.symbols().is_empty());
    }

    #[test]
    fn newer_required_api_is_rejected_before_any_mutation() {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V3);
        w.write_u32(API_MAJOR_CURRENT);
        w.write_u32(API_MINOR_CURRENT + 1);
        // Anything after the gate must never be reached.
        w.write_u32(0xdead_beef);
        let data = w.into_bytes();

        let mut device = empty_device();
        let err = decode_into(&mut device, &data).unwrap_err();
        assert!(matches!(err, CatalogError::NotSupported(_)));
        assert_eq!(device.group_count(), 0);
        assert!(device.symbols().is_empty());
        assert!(!device.opened_from_file());
    }

    #[test]
    fn greater_major_is_rejected_even_with_zero_minor() {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V2);
        w.write_u32(API_MAJOR_CURRENT + 1);
        w.write_u32(0);
        let data = w.into_bytes();

        let mut device = empty_device();
        assert!(matches!(
            decode_into(&mut device, &data).unwrap_err(),
            CatalogError::NotSupported(_)
        ));
    }

    #[test]
    fn truncated_symbol_table_keeps_symbols_before_the_cut() {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V3);
        w.write_u32(0); // min major
        w.write_u32(0); // min minor
        w.write_u32(0); // platform index
        w.write_u32(1); // api version
        w.write_u32(13);
        w.write_u32(0);
        w.write_u32(5); // declares five symbols, carries two
        for name in ["EuCoresTotalCount", "SamplersTotalCount"] {
            w.write_cstring(name);
            w.write_u32(0); // typed value tag: u32
            w.write_u32(96);
            w.write_u32(1); // kind: detect
        }
        let data = w.into_bytes();

        let mut device = empty_device();
        let err = decode_into(&mut device, &data).unwrap_err();
        assert!(err.is_overrun());
        assert_eq!(device.symbols().len(), 2);
        assert!(device.symbols().contains("EuCoresTotalCount"));
        assert!(device.symbols().contains("SamplersTotalCount"));
    }

    #[test]
    fn duplicate_symbols_in_file_keep_first_value() {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V3);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(1);
        w.write_u32(13);
        w.write_u32(0);
        w.write_u32(2);
        for value in [111u32, 222] {
            w.write_cstring("EuCoresTotalCount");
            w.write_u32(0);
            w.write_u32(value);
            w.write_u32(1);
        }
        w.write_u32(0); // no groups
        let data = w.into_bytes();

        let mut device = empty_device();
        decode_into(&mut device, &data).unwrap();
        assert_eq!(device.symbols().len(), 1);
        assert_eq!(
            device.symbols().value_by_name("EuCoresTotalCount"),
            Some(&TypedValue::U32(111))
        );
    }

    /// Build a version-1 file by hand: no minimum-API pair, one-hot platform
    /// bitmask, writer API 1.3 so neither the GT mask nor the availability
    /// equation is present, no per-set platform byte array, and a legacy
    /// stop-register section that must be consumed and discarded.
    fn v1_file() -> Vec<u8> {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V1);
        legacy_file_body(&mut w);
        w.into_bytes()
    }

    /// Same content behind a version-2 header, which additionally carries the
    /// minimum-API pair before the legacy platform bitmask.
    fn v2_file() -> Vec<u8> {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V2);
        w.write_u32(1);
        w.write_u32(0);
        legacy_file_body(&mut w);
        w.into_bytes()
    }

    fn legacy_file_body(w: &mut FileWriter) {
        w.write_u32(1 << 0); // legacy platform bitmask: platform 0
        w.write_u32(1); // writer API 1.3.0
        w.write_u32(3);
        w.write_u32(0);
        w.write_u32(0); // no symbols

        w.write_u32(1); // one group
        w.write_cstring("OA");
        w.write_cstring("OA Unit Metrics");
        w.write_u32(0x3);

        w.write_u32(1); // one set
        w.write_cstring("RenderBasic");
        w.write_cstring("Render Metrics Basic");
        w.write_u32(0xffff_ffff); // api mask
        w.write_u32(1); // category mask
        w.write_u32(256); // raw report size
        w.write_u32(512); // query report size
        w.write_u32(1 << 0); // legacy per-set platform bitmask
        // API 1.3: no GT mask, no availability equation.
        w.write_u32(0); // report type: OA
        // File version 1: no platform byte array.

        write_api_specific_id(w, &ApiSpecificId::default());

        w.write_u32(0); // no metrics
        w.write_u32(0); // no information
        w.write_u32(0); // no start register sets

        w.write_u32(1); // one obsolete stop register set
        w.write_u32(3); // config id
        w.write_u32(1); // priority
        w.write_u32(0); // config type
        w.write_equation(None);
        w.write_u32(2); // two raw registers to skip
        for _ in 0..2 {
            w.write_u32(0x9888);
            w.write_u32(0x0);
            w.write_u32(1);
        }

        w.write_u32(0); // no complementary sets
    }

    #[test]
    fn version_1_file_loads_through_legacy_paths() {
        let mut device = empty_device();
        decode_into(&mut device, &v1_file()).unwrap();

        assert_eq!(device.group_count(), 1);
        let group = device.group_by_name("OA").unwrap();
        assert_eq!(group.set_count(), 1);
        let set = group.set(0).unwrap();
        assert_eq!(set.symbol_name, "RenderBasic");
        // Fields absent from the old format take their defaults.
        assert_eq!(set.gt_mask, GT_TYPE_ALL);
        assert_eq!(set.availability_equation, None);
        // Legacy bitmask synthesised into the byte-array form.
        assert!(set.platform_mask.contains(0));
        assert!(!set.platform_mask.contains(1));
        // Stop registers were discarded, not materialised.
        assert!(set.start_register_sets().is_empty());
    }

    #[test]
    fn version_2_file_matches_the_version_1_result() {
        let mut from_v1 = empty_device();
        decode_into(&mut from_v1, &v1_file()).unwrap();
        let mut from_v2 = empty_device();
        decode_into(&mut from_v2, &v2_file()).unwrap();

        let v1_set = from_v1.group_by_name("OA").unwrap().set(0).unwrap();
        let v2_set = from_v2.group_by_name("OA").unwrap().set(0).unwrap();
        assert_eq!(v2_set.symbol_name, v1_set.symbol_name);
        assert_eq!(v2_set.platform_mask, v1_set.platform_mask);
        assert_eq!(v2_set.gt_mask, v1_set.gt_mask);
        assert_eq!(v2_set.availability_equation, v1_set.availability_equation);
    }

    #[test]
    fn version_1_truncated_inside_stop_registers_overruns() {
        let data = v1_file();
        // Cut inside the raw stop-register records.
        let mut device = empty_device();
        let err = decode_into(&mut device, &data[..data.len() - 10]).unwrap_err();
        assert!(err.is_overrun());
    }

    #[test]
    fn hostile_byte_array_array_count_fails_without_huge_allocation() {
        let mut w = FileWriter::new();
        w.write_raw(FILE_KEY_V3);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(1);
        w.write_u32(13);
        w.write_u32(0);
        w.write_u32(1); // one symbol
        w.write_cstring("GtMaskArray");
        w.write_u32(6); // typed value tag: array of byte arrays
        w.write_u32(u32::MAX); // declared element count far beyond the buffer
        let data = w.into_bytes();

        let mut device = empty_device();
        let err = decode_into(&mut device, &data).unwrap_err();
        assert!(err.is_overrun());
        assert!(device.symbols().is_empty());
    }

    #[test]
    fn typed_values_round_trip_through_symbol_section() {
        let mut device = empty_device();
        device.symbols_mut().add("QueryMode", TypedValue::U32(2), SymbolKind::Immediate);
        device.symbols_mut().add(
            "GpuTimestampFrequency",
            TypedValue::U64(19_200_000),
            SymbolKind::Detect,
        );
        device.symbols_mut().add("EuThreadsCount", TypedValue::F32(7.5), SymbolKind::Detect);
        device.symbols_mut().add("PavpDisabled", TypedValue::Bool(true), SymbolKind::Dynamic);
        device.symbols_mut().add(
            "DeviceName",
            TypedValue::CString("test-adapter".into()),
            SymbolKind::Immediate,
        );
        device.symbols_mut().add(
            "PlatformMask",
            TypedValue::ByteArray(vec![0xff, 0x01]),
            SymbolKind::Immediate,
        );
        device.symbols_mut().add(
            "GtMaskArray",
            TypedValue::ByteArrayArray(vec![vec![1], vec![2, 3]]),
            SymbolKind::Immediate,
        );

        let bytes = encode_device(&device, 0, 0).unwrap();
        let mut restored = empty_device();
        decode_into(&mut restored, &bytes).unwrap();

        assert_eq!(restored.symbols().len(), device.symbols().len());
        for symbol in device.symbols().iter() {
            assert_eq!(
                restored.symbols().value_by_name(&symbol.name),
                Some(&symbol.value),
                "symbol {} did not round-trip",
                symbol.name
            );
        }
    }
}
