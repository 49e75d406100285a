//! Output buffer descriptor — the planner's view of how a task should
//! fan out its output.

use serde::{Deserialize, Serialize};

/// How a task's output rows are distributed to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferType {
    Broadcast,
    Partitioned,
    Arbitrary,
}

/// A single named output buffer and which downstream task reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBufferDescriptor {
    pub buffer_id: String,
    pub partition: u32,
}

/// The output-buffer assignment for a task, carrying its own monotonic
/// version so [`TaskHandle::set_output_buffers`](../../../remote_task_controller/struct.TaskHandle.html)
/// can discard stale updates without consulting the rest of the intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBuffers {
    pub version: u64,
    pub buffer_type: BufferType,
    pub buffers: Vec<OutputBufferDescriptor>,
    pub no_more_buffer_ids: bool,
}

impl OutputBuffers {
    pub fn empty(buffer_type: BufferType) -> Self {
        Self {
            version: 0,
            buffer_type,
            buffers: Vec::new(),
            no_more_buffer_ids: false,
        }
    }

    /// True if `other` is newer-or-equal by version — the rule
    /// `TaskHandle::set_output_buffers` uses to discard stale descriptors.
    pub fn is_newer_or_equal(&self, current: &OutputBuffers) -> bool {
        self.version >= current.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_version_is_not_newer_or_equal() {
        let current = OutputBuffers {
            version: 5,
            ..OutputBuffers::empty(BufferType::Partitioned)
        };
        let stale = OutputBuffers {
            version: 3,
            ..OutputBuffers::empty(BufferType::Partitioned)
        };
        assert!(!stale.is_newer_or_equal(&current));
    }

    #[test]
    fn equal_version_counts_as_newer_or_equal() {
        let current = OutputBuffers {
            version: 5,
            ..OutputBuffers::empty(BufferType::Partitioned)
        };
        let same = OutputBuffers {
            version: 5,
            ..OutputBuffers::empty(BufferType::Partitioned)
        };
        assert!(same.is_newer_or_equal(&current));
    }
}
