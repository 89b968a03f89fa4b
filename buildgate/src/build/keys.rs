//! Reserved bookkeeping keys of the start parameter map.
//!
//! Orchestration writes these next to user-declared parameters. Declared
//! parameters may not use any of them.

use std::fmt;

/// Prefix of the synthesized per-element skip keys.
pub const SKIP_ELEMENT_PREFIX: &str = "pipeline.skip.element.";

/// Builds the skip key of an element. A value of `"true"` under this key
/// tells the engine to bypass the element.
#[must_use]
pub fn skip_element_key(element_id: &str) -> String {
    format!("{SKIP_ELEMENT_PREFIX}{element_id}")
}

/// Returns true if `key` is a synthesized skip key.
#[must_use]
pub fn is_skip_key(key: &str) -> bool {
    key.starts_with(SKIP_ELEMENT_PREFIX)
}

/// Keys written by the orchestration core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    /// Model version the build is pinned to.
    Version,
    /// Id of the user the build runs as.
    StartUserId,
    /// Display identity of the starter, resolved per start type.
    StartUserName,
    /// [`super::StartType`] name.
    StartType,
    /// [`super::ChannelCode`] name.
    StartChannel,
    /// Whether the start came from a mobile client.
    StartMobile,
    /// Pipeline display name.
    PipelineName,
    /// User that triggered the upstream build of a sub-pipeline.
    StartPipelineUserId,
    /// Upstream pipeline id of a sub-pipeline.
    ParentPipelineId,
    /// Upstream build id of a sub-pipeline.
    ParentBuildId,
    /// Upstream task id of a sub-pipeline.
    ParentBuildTaskId,
    /// User reported by a webhook.
    StartWebhookUserId,
    /// Element a task-scoped retry resumes from.
    RetryStartTaskId,
    /// Number of task-scoped retries so far.
    RetryCount,
    /// The build a retry was created from.
    RetryBuildId,
}

impl ReservedKey {
    /// Every reserved key.
    pub const ALL: [Self; 15] = [
        Self::Version,
        Self::StartUserId,
        Self::StartUserName,
        Self::StartType,
        Self::StartChannel,
        Self::StartMobile,
        Self::PipelineName,
        Self::StartPipelineUserId,
        Self::ParentPipelineId,
        Self::ParentBuildId,
        Self::ParentBuildTaskId,
        Self::StartWebhookUserId,
        Self::RetryStartTaskId,
        Self::RetryCount,
        Self::RetryBuildId,
    ];

    /// The key string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "pipeline.version",
            Self::StartUserId => "pipeline.start.user.id",
            Self::StartUserName => "pipeline.start.user.name",
            Self::StartType => "pipeline.start.type",
            Self::StartChannel => "pipeline.start.channel",
            Self::StartMobile => "pipeline.start.isMobile",
            Self::PipelineName => "pipeline.name",
            Self::StartPipelineUserId => "pipeline.start.pipeline.user.id",
            Self::ParentPipelineId => "pipeline.start.parent.pipeline.id",
            Self::ParentBuildId => "pipeline.start.parent.build.id",
            Self::ParentBuildTaskId => "pipeline.start.parent.build.task.id",
            Self::StartWebhookUserId => "pipeline.start.webhook.user.id",
            Self::RetryStartTaskId => "pipeline.retry.start.task.id",
            Self::RetryCount => "pipeline.retry.count",
            Self::RetryBuildId => "pipeline.retry.build.id",
        }
    }

    /// Looks up a reserved key by its string.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Returns true if `key` is reserved or a skip key.
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        Self::parse(key).is_some() || is_skip_key(key)
    }
}

impl fmt::Display for ReservedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<&str> = ReservedKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), ReservedKey::ALL.len());
    }

    #[test]
    fn test_parse_and_reserved() {
        assert_eq!(ReservedKey::parse("pipeline.retry.count"), Some(ReservedKey::RetryCount));
        assert!(ReservedKey::is_reserved("pipeline.version"));
        assert!(ReservedKey::is_reserved(&skip_element_key("e-1")));
        assert!(!ReservedKey::is_reserved("env"));
    }

    #[test]
    fn test_skip_key() {
        let key = skip_element_key("e-9");
        assert_eq!(key, "pipeline.skip.element.e-9");
        assert!(is_skip_key(&key));
    }
}
