#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use crate::domain::Resource;
use crate::error::{AgentError, AgentResult};
use crate::ramp::RampSpec;

/// Longest ramp accepted, in seconds.
pub const MAX_RAMP_DURATION_SECONDS: u32 = 3600;

pub fn validate_magnitude(resource: Resource, value: f64, bound: f64) -> AgentResult<()> {
    // a value too small to yield any worker would record load that nothing applies
    if !value.is_finite() || value <= 0.0 || resource.worker_magnitudes(value).is_empty() {
        return Err(AgentError::validation(format!(
            "{resource} load must be greater than 0"
        )));
    }
    if value > bound {
        return Err(AgentError::validation(match resource {
            Resource::Cpu => format!("CPU load cannot exceed system CPU count ({bound})"),
            Resource::Memory => format!("Memory load cannot exceed system memory ({bound}MB)"),
        }));
    }
    Ok(())
}

pub fn validate_duration(duration_seconds: u32) -> AgentResult<()> {
    if duration_seconds == 0 || duration_seconds > MAX_RAMP_DURATION_SECONDS {
        return Err(AgentError::validation(format!(
            "Duration must be between 1 and {MAX_RAMP_DURATION_SECONDS} seconds"
        )));
    }
    Ok(())
}

/// Checks a ramp as a whole so that no scheduled step can fail validation later.
pub fn validate_ramp(resource: Resource, spec: &RampSpec, bound: f64) -> AgentResult<()> {
    validate_duration(spec.duration_seconds)?;
    if !spec.start.is_finite() || spec.start < 0.0 {
        return Err(AgentError::validation("Start value must not be negative"));
    }
    if !spec.end.is_finite() || spec.end < spec.start {
        return Err(AgentError::validation(
            "End value must be greater than or equal to start value",
        ));
    }
    validate_magnitude(resource, spec.end, bound)
}
