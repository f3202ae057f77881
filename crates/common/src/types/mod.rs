//! Shared value types passed between the poll loop and its observers

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// 单次轮询周期的结果
///
/// Only lives for the duration of one cycle; it drives the log line and the
/// `poll_cycles_total{outcome}` counter and is then dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The HTTP request failed, timed out or returned a non-2xx status.
    FetchFailed,
    /// The body was not a usable target group list.
    ValidationFailed,
    /// The body was handed to the persister. Write errors are reported separately.
    Persisted,
}

impl PollOutcome {
    pub const ALL: [PollOutcome; 3] = [
        PollOutcome::FetchFailed,
        PollOutcome::ValidationFailed,
        PollOutcome::Persisted,
    ];

    pub fn as_label(&self) -> &'static str {
        self.into()
    }
}
