//! Built-in pipeline node implementations.

pub mod color_neg_invert;
pub mod sequence_reader;
pub mod sequence_writer;
pub mod test_pattern;

pub use color_neg_invert::ColorNegInvertNode;
pub use sequence_reader::SequenceReaderNode;
pub use sequence_writer::SequenceWriterNode;
pub use test_pattern::TestPatternNode;

use crate::config::ConfigValue;
use crate::pipeline::error::{PipelineError, PipelineResult};

pub const TEST_PATTERN_ID: &str = "kaliscope.testpattern";
pub const SEQUENCE_READER_ID: &str = "kaliscope.sequencereader";
pub const COLOR_NEG_INVERT_ID: &str = "kaliscope.colorneginvert";
pub const COLOR_MASK_REMOVER_ID: &str = "kaliscope.colormaskremover";
pub const SEQUENCE_WRITER_ID: &str = "kaliscope.sequencewriter";

/// Reader parameter seeded from `EngineConfig::default_frame_rate`
pub const PARAM_FRAME_RATE: &str = "Frame rate";

// Parameter coercion shared by the built-in nodes.

pub(crate) fn expect_int(key: &str, value: &ConfigValue) -> PipelineResult<i64> {
    match value {
        ConfigValue::Int(v) => Ok(*v),
        ConfigValue::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
        other => Err(PipelineError::invalid_parameter(
            key,
            format!("expected an integer, got {:?}", other),
        )),
    }
}

pub(crate) fn expect_positive(key: &str, value: &ConfigValue) -> PipelineResult<u32> {
    let v = expect_int(key, value)?;
    u32::try_from(v)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| PipelineError::invalid_parameter(key, format!("{} is out of range", v)))
}

pub(crate) fn expect_float(key: &str, value: &ConfigValue) -> PipelineResult<f64> {
    value.as_float().ok_or_else(|| {
        PipelineError::invalid_parameter(key, format!("expected a number, got {:?}", value))
    })
}

pub(crate) fn expect_bool(key: &str, value: &ConfigValue) -> PipelineResult<bool> {
    value.as_bool().ok_or_else(|| {
        PipelineError::invalid_parameter(key, format!("expected a boolean, got {:?}", value))
    })
}

pub(crate) fn expect_string(key: &str, value: &ConfigValue) -> PipelineResult<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        PipelineError::invalid_parameter(key, format!("expected a string, got {:?}", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_int_accepts_integral_float() {
        assert_eq!(expect_int("w", &ConfigValue::Float(12.0)).unwrap(), 12);
        assert!(expect_int("w", &ConfigValue::Float(12.5)).is_err());
        assert!(expect_int("w", &ConfigValue::String("12".into())).is_err());
    }

    #[test]
    fn test_expect_positive_rejects_zero_and_negative() {
        assert_eq!(expect_positive("w", &ConfigValue::Int(3)).unwrap(), 3);
        assert!(expect_positive("w", &ConfigValue::Int(0)).is_err());
        assert!(expect_positive("w", &ConfigValue::Int(-1)).is_err());
    }
}
