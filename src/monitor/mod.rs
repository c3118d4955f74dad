//! Fixed-cadence acquisition: the sampler abstraction over the instrument
//! drivers and the polling engine that drives them.

pub mod engine;
pub mod samplers;

pub use engine::{MonitorEngine, RunSummary};
pub use samplers::{
    ChannelSampler, DepositionSampler, DisabledChannel, PressureSampler, TemperatureSampler,
};
