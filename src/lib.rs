#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod bounds;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod http;
pub mod lib_cpu;
pub mod lib_mem;
pub mod logs;
pub mod metrics;
pub mod probes;
pub mod ramp;
pub mod service;
pub mod validation;
pub mod worker;

pub use bounds::HostBounds;
pub use config::{AgentConfig, ConfigLoader};
pub use domain::{AppState, Resource};
pub use error::{AgentError, AgentResult};
pub use http::{error_response, routes, serve};
pub use metrics::Metrics;
pub use ramp::{RampPlan, RampSpec};
pub use service::{EngineSettings, LoadService, LoadStatus};
