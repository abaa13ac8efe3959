use std::future::Future;
use thiserror::Error;

/// One poll of the focus/idle probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Idle { idle_seconds: u64 },
    Active { label: String, detail: String },
}

impl Sample {
    pub fn active(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Active {
            label: label.into(),
            detail: detail.into(),
        }
    }

    pub fn idle(idle_seconds: u64) -> Self {
        Self::Idle { idle_seconds }
    }
}

/// Every variant means "no sample this tick".
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("probe `{probe}` timed out")]
    Timeout { probe: String },
}

pub trait Sampler {
    fn sample(&mut self) -> impl Future<Output = Result<Sample, SamplerError>> + Send;
}

#[cfg(test)]
pub mod scripted {
    use super::{Sample, Sampler, SamplerError};
    use std::collections::VecDeque;

    /// Replays a fixed list of poll results, then times out forever.
    pub struct ScriptedSampler {
        script: VecDeque<Result<Sample, SamplerError>>,
    }

    impl ScriptedSampler {
        pub fn new(script: Vec<Result<Sample, SamplerError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl Sampler for ScriptedSampler {
        async fn sample(&mut self) -> Result<Sample, SamplerError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| {
                    Err(SamplerError::Timeout {
                        probe: "script".to_string(),
                    })
                })
        }
    }
}
