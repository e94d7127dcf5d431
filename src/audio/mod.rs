//! Audio subsystem: media decoding, the pan/gain graph and device output

pub mod device;
pub mod graph;
pub mod media;
pub mod processor;
pub mod ramp;

pub use device::{list_devices, AudioDeviceInfo};
pub use graph::{volume_to_gain, AudioGraph, GraphStatus, MediaLoad};
pub use media::MediaBuffer;
pub use processor::{GraphCommand, GraphMeters, GraphProcessor};
pub use ramp::LinearRamp;
