//! Test plugins registered next to the built-ins

use kaliscope_rs::config::ConfigValue;
use kaliscope_rs::pipeline::{
    EffectNode, Frame, PipelineError, PipelineResult, PluginDescriptor, PluginKind,
    PluginRegistry, TimeDomain,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const COUNTING_WRITER_ID: &str = "test.countingwriter";
pub const FLAKY_EFFECT_ID: &str = "test.flakyeffect";
pub const BROKEN_READER_ID: &str = "test.brokenreader";
pub const SLOW_EFFECT_ID: &str = "test.sloweffect";

/// Frame indices received by every counting writer of one registry
pub type WriterLog = Arc<Mutex<Vec<u64>>>;

/// Writer that records the indices it receives and passes frames through
pub struct CountingWriter {
    log: WriterLog,
}

impl EffectNode for CountingWriter {
    fn identifier(&self) -> &str {
        COUNTING_WRITER_ID
    }

    fn set_parameter(&mut self, _key: &str, _value: &ConfigValue) -> PipelineResult<bool> {
        Ok(false)
    }

    fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        let frame = input.ok_or_else(|| PipelineError::frame(frame_index, "writer needs an input"))?;
        self.log.lock().unwrap().push(frame_index);
        Ok(frame.clone())
    }
}

/// Effect that fails on one frame index
pub struct FlakyEffect {
    fail_on: u64,
}

impl EffectNode for FlakyEffect {
    fn identifier(&self) -> &str {
        FLAKY_EFFECT_ID
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        if key != "Fail on" {
            return Ok(false);
        }
        let v = value
            .as_int()
            .ok_or_else(|| PipelineError::invalid_parameter(key, "expected an integer"))?;
        self.fail_on = v as u64;
        Ok(true)
    }

    fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        if frame_index == self.fail_on {
            return Err(PipelineError::frame(frame_index, "flaky effect refused the frame"));
        }
        input
            .cloned()
            .ok_or_else(|| PipelineError::frame(frame_index, "effect needs an input"))
    }
}

/// Pass-through effect that sleeps before every frame
pub struct SlowEffect {
    delay: Duration,
}

impl EffectNode for SlowEffect {
    fn identifier(&self) -> &str {
        SLOW_EFFECT_ID
    }

    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        if key != "Delay ms" {
            return Ok(false);
        }
        let v = value
            .as_int()
            .ok_or_else(|| PipelineError::invalid_parameter(key, "expected an integer"))?;
        self.delay = Duration::from_millis(v as u64);
        Ok(true)
    }

    fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        thread::sleep(self.delay);
        input
            .cloned()
            .ok_or_else(|| PipelineError::frame(frame_index, "effect needs an input"))
    }
}

/// Reader whose `open` always fails
pub struct BrokenReader;

impl EffectNode for BrokenReader {
    fn identifier(&self) -> &str {
        BROKEN_READER_ID
    }

    fn set_parameter(&mut self, _key: &str, _value: &ConfigValue) -> PipelineResult<bool> {
        Ok(false)
    }

    fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        Err(PipelineError::GraphFatal("scanner is not connected".to_string()))
    }

    fn process(&mut self, frame_index: u64, _input: Option<&Frame>) -> PipelineResult<Frame> {
        Err(PipelineError::frame(frame_index, "never opened"))
    }
}

/// Built-in registry plus the test plugins above
pub fn test_registry() -> (Arc<PluginRegistry>, WriterLog) {
    let log: WriterLog = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::with_builtins();

    let writer_log = log.clone();
    registry.register(
        PluginDescriptor::new(COUNTING_WRITER_ID, "Counting writer", PluginKind::Writer),
        move || {
            let node: Box<dyn EffectNode> = Box::new(CountingWriter {
                log: writer_log.clone(),
            });
            Ok(node.into())
        },
    );
    registry.register(
        PluginDescriptor::new(FLAKY_EFFECT_ID, "Flaky effect", PluginKind::Effect)
            .with_parameter("Fail on", 2i64),
        || {
            let node: Box<dyn EffectNode> = Box::new(FlakyEffect { fail_on: 2 });
            Ok(node.into())
        },
    );
    registry.register(
        PluginDescriptor::new(SLOW_EFFECT_ID, "Slow effect", PluginKind::Effect)
            .with_parameter("Delay ms", 300i64),
        || {
            let node: Box<dyn EffectNode> = Box::new(SlowEffect {
                delay: Duration::from_millis(300),
            });
            Ok(node.into())
        },
    );
    registry.register(
        PluginDescriptor::new(BROKEN_READER_ID, "Broken reader", PluginKind::Reader),
        || {
            let node: Box<dyn EffectNode> = Box::new(BrokenReader);
            Ok(node.into())
        },
    );

    (Arc::new(registry), log)
}
