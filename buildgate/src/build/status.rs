//! Build status, start type and channel enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The status of a build instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Waiting to be scheduled.
    Queued,
    /// Executing; a paused manual review also reports this.
    Running,
    /// Finished successfully.
    Succeed,
    /// Finished with a failure.
    Failed,
    /// Cancelled by a user.
    Canceled,
    /// Terminated by the engine.
    Terminate,
    /// Aborted by a reviewer.
    ReviewAbort,
    /// Blocked by a quality gate.
    QualityCheckFail,
    /// Exceeded its execution timeout.
    ExecTimeout,
    /// Lost its worker heartbeat.
    HeartbeatTimeout,
}

impl Default for BuildStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl BuildStatus {
    /// Returns true for statuses a retry may start from.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failed
                | Self::Canceled
                | Self::Terminate
                | Self::ReviewAbort
                | Self::QualityCheckFail
                | Self::ExecTimeout
                | Self::HeartbeatTimeout
        )
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub fn is_finished(self) -> bool {
        self == Self::Succeed || self.is_failure()
    }

    /// Upper snake case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeed => "SUCCEED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Terminate => "TERMINATE",
            Self::ReviewAbort => "REVIEW_ABORT",
            Self::QualityCheckFail => "QUALITY_CHECK_FAIL",
            Self::ExecTimeout => "EXEC_TIMEOUT",
            Self::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a build was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartType {
    /// A user pressed start.
    Manual,
    /// A remote call with a trigger token.
    Remote,
    /// A code host webhook.
    WebHook,
    /// A timer.
    TimeTrigger,
    /// Another build's sub-pipeline task.
    Pipeline,
    /// Another service.
    Service,
}

impl StartType {
    /// Upper snake case name, as stamped into start parameters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Remote => "REMOTE",
            Self::WebHook => "WEB_HOOK",
            Self::TimeTrigger => "TIME_TRIGGER",
            Self::Pipeline => "PIPELINE",
            Self::Service => "SERVICE",
        }
    }
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(Self::Manual),
            "REMOTE" => Ok(Self::Remote),
            "WEB_HOOK" => Ok(Self::WebHook),
            "TIME_TRIGGER" => Ok(Self::TimeTrigger),
            "PIPELINE" => Ok(Self::Pipeline),
            "SERVICE" => Ok(Self::Service),
            other => Err(format!("unknown start type '{other}'")),
        }
    }
}

/// The product channel a pipeline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelCode {
    /// The main CI product.
    Bs,
    /// The plugin market.
    Am,
    /// Code analysis.
    Codecc,
    /// Internal code hosting.
    Gongfeng,
    /// Git-driven CI.
    Gitci,
}

impl Default for ChannelCode {
    fn default() -> Self {
        Self::Bs
    }
}

impl ChannelCode {
    /// Upper case name, as stamped into start parameters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bs => "BS",
            Self::Am => "AM",
            Self::Codecc => "CODECC",
            Self::Gongfeng => "GONGFENG",
            Self::Gitci => "GITCI",
        }
    }
}

impl fmt::Display for ChannelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
