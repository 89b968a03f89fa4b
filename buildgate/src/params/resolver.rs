//! Turns declared parameters and caller values into a start parameter map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::build::{is_skip_key, skip_element_key, ParamMap, ReservedKey};
use crate::errors::{Result, ValidationError};
use crate::model::{BuildFormProperty, PipelineModel};
use crate::ports::{BuildRuntime, StartupParamStore};

/// What the manual start form needs to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualStartupInfo {
    /// Whether an enabled manual trigger exists.
    pub can_manual_startup: bool,
    /// Whether users may skip elements.
    pub can_element_skip: bool,
    /// Whether defaults were taken from the last completed build.
    pub use_latest_parameters: bool,
    /// Declared parameters with effective defaults.
    pub params: Vec<BuildFormProperty>,
}

/// One entry of a build's start parameter snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildParameter {
    /// Parameter key.
    pub key: String,
    /// Parameter value.
    pub value: serde_json::Value,
}

/// Resolves start parameters against the declared trigger parameters.
#[derive(Clone)]
pub struct ParameterResolver {
    runtime: Arc<dyn BuildRuntime>,
    param_store: Arc<dyn StartupParamStore>,
}

impl std::fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterResolver").finish_non_exhaustive()
    }
}

impl ParameterResolver {
    /// Creates a resolver.
    pub fn new(runtime: Arc<dyn BuildRuntime>, param_store: Arc<dyn StartupParamStore>) -> Self {
        Self { runtime, param_store }
    }

    /// Replaces declared defaults with the values of the last completed
    /// build when the manual trigger asks for it.
    ///
    /// Leaves the model unchanged when there is no such build, no snapshot,
    /// or the snapshot cannot be parsed.
    pub async fn apply_latest_parameters(&self, pipeline_id: &str, model: &mut PipelineModel) -> Result<()> {
        if !matches!(model.manual_trigger_settings(), Some((_, true))) {
            return Ok(());
        }

        let Some(last) = self.runtime.get_last_completed_build(pipeline_id).await? else {
            return Ok(());
        };
        let Some(json) = self.param_store.get(&last.build_id).await? else {
            return Ok(());
        };

        let latest: ParamMap = match serde_json::from_str(&json) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(pipeline_id = %pipeline_id, build_id = %last.build_id, error = %e, "unreadable parameter snapshot, keeping declared defaults");
                return Ok(());
            }
        };

        let Some(params) = model.trigger_container_mut().and_then(|c| c.params_mut()) else {
            return Ok(());
        };

        for param in params.iter_mut() {
            let Some(value) = latest.get(&param.id) else {
                continue;
            };
            param.default_value = if param.is_boolean() {
                serde_json::Value::Bool(value_as_string(value).eq_ignore_ascii_case("true"))
            } else {
                value.clone()
            };
        }

        debug!(pipeline_id = %pipeline_id, build_id = %last.build_id, "applied latest build parameters");
        Ok(())
    }

    /// Resolves a manual start.
    ///
    /// Supplied values win over defaults; a required parameter without a
    /// supplied value fails. Skip flags set to `"true"` for executable
    /// elements are carried through. Other supplied keys are ignored.
    pub fn resolve_manual(&self, model: &PipelineModel, values: &HashMap<String, String>) -> Result<ParamMap> {
        let mut resolved = ParamMap::new();

        for param in model.trigger_params() {
            ensure_not_reserved(param)?;
            match values.get(&param.id) {
                Some(value) => {
                    resolved.insert(param.id.clone(), serde_json::Value::String(value.clone()));
                }
                None if param.required => {
                    return Err(ValidationError::MissingRequiredParameter(param.id.clone()).into());
                }
                None => {
                    resolved.insert(param.id.clone(), param.default_value.clone());
                }
            }
        }

        for (_, _, element) in model.executable_elements() {
            let key = skip_element_key(&element.id);
            if values.get(&key).is_some_and(|v| v == "true") {
                resolved.insert(key, serde_json::Value::String("true".to_string()));
            }
        }

        Ok(resolved)
    }

    /// Resolves a start that carries its own values (timer, sub-pipeline):
    /// absent declared parameters take their defaults, nothing is required.
    pub fn resolve_with_defaults(&self, model: &PipelineModel, supplied: ParamMap) -> Result<ParamMap> {
        let mut resolved = supplied;
        for param in model.trigger_params() {
            ensure_not_reserved(param)?;
            resolved
                .entry(param.id.clone())
                .or_insert_with(|| param.default_value.clone());
        }
        Ok(resolved)
    }

    /// Describes the manual start form of a model.
    pub async fn startup_info(&self, pipeline_id: &str, model: &PipelineModel) -> Result<ManualStartupInfo> {
        let mut model = model.clone();
        self.apply_latest_parameters(pipeline_id, &mut model).await?;

        let settings = model.manual_trigger_settings();
        Ok(ManualStartupInfo {
            can_manual_startup: settings.is_some(),
            can_element_skip: settings.is_some_and(|(skip, _)| skip),
            use_latest_parameters: settings.is_some_and(|(_, latest)| latest),
            params: model.trigger_params().to_vec(),
        })
    }

    /// Lists the start parameters a build was launched with, without skip
    /// flags, sorted by key.
    pub async fn build_parameters(&self, build_id: &str) -> Result<Vec<BuildParameter>> {
        let json = match self.param_store.get(build_id).await? {
            Some(json) if !json.trim().is_empty() => json,
            _ => return Ok(Vec::new()),
        };

        let snapshot: ParamMap = serde_json::from_str(&json)?;
        let mut parameters: Vec<BuildParameter> = snapshot
            .into_iter()
            .filter(|(key, _)| !is_skip_key(key))
            .map(|(key, value)| BuildParameter { key, value })
            .collect();
        parameters.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(parameters)
    }
}

fn ensure_not_reserved(param: &BuildFormProperty) -> Result<()> {
    if ReservedKey::is_reserved(&param.id) {
        return Err(ValidationError::ReservedParameterId(param.id.clone()).into());
    }
    Ok(())
}

fn value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildStatus;
    use crate::errors::BuildError;
    use crate::testing::{InMemoryBuildRuntime, InMemoryStartupParamStore, ModelFixture};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        runtime: Arc<InMemoryBuildRuntime>,
        store: Arc<InMemoryStartupParamStore>,
        resolver: ParameterResolver,
    }

    fn fixture() -> Fixture {
        let runtime = Arc::new(InMemoryBuildRuntime::new());
        let store = Arc::new(InMemoryStartupParamStore::new());
        let resolver = ParameterResolver::new(runtime.clone(), store.clone());
        Fixture { runtime, store, resolver }
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_resolve_manual_required_and_defaults() {
        let fx = fixture();
        let model = ModelFixture::new("demo")
            .with_param(BuildFormProperty::new("env", json!("dev")).required())
            .with_param(BuildFormProperty::new("region", json!("eu")))
            .build();

        let err = fx.resolver.resolve_manual(&model, &values(&[])).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::MissingRequiredParameter(ref id)) if id == "env"
        ));

        let resolved = fx
            .resolver
            .resolve_manual(&model, &values(&[("env", "prod"), ("unrelated", "x")]))
            .unwrap();
        assert_eq!(
            resolved,
            ParamMap::from([
                ("env".to_string(), json!("prod")),
                ("region".to_string(), json!("eu")),
            ])
        );
    }

    #[test]
    fn test_resolve_manual_skip_flags() {
        let fx = fixture();
        let model = ModelFixture::new("demo").with_job("job-1", &["t-1", "t-2"]).build();

        let resolved = fx
            .resolver
            .resolve_manual(
                &model,
                &values(&[
                    ("pipeline.skip.element.t-1", "true"),
                    ("pipeline.skip.element.t-2", "false"),
                    ("pipeline.skip.element.manual", "true"),
                ]),
            )
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["pipeline.skip.element.t-1"], json!("true"));
    }

    #[test]
    fn test_reserved_parameter_id_rejected() {
        let fx = fixture();
        let model = ModelFixture::new("demo")
            .with_param(BuildFormProperty::new("pipeline.version", json!("1")))
            .build();

        let err = fx.resolver.resolve_manual(&model, &values(&[])).unwrap_err();
        assert!(matches!(err, BuildError::Validation(ValidationError::ReservedParameterId(_))));
        assert!(fx.resolver.resolve_with_defaults(&model, ParamMap::new()).is_err());
    }

    #[test]
    fn test_resolve_with_defaults_keeps_supplied() {
        let fx = fixture();
        let model = ModelFixture::new("demo")
            .with_param(BuildFormProperty::new("env", json!("dev")).required())
            .with_param(BuildFormProperty::new("region", json!("eu")))
            .build();

        let supplied = ParamMap::from([
            ("region".to_string(), json!("us")),
            ("extra".to_string(), json!(1)),
        ]);
        let resolved = fx.resolver.resolve_with_defaults(&model, supplied).unwrap();

        assert_eq!(resolved["env"], json!("dev"));
        assert_eq!(resolved["region"], json!("us"));
        assert_eq!(resolved["extra"], json!(1));
    }

    #[tokio::test]
    async fn test_latest_parameters_coerce_booleans() {
        let fx = fixture();
        let last = fx.runtime.insert_build("p-1", 1, BuildStatus::Succeed);
        fx.store.insert(&last, r#"{"deploy": "TRUE", "env": "staging", "dry": "nope"}"#);

        let mut model = ModelFixture::new("demo")
            .with_latest_parameters()
            .with_param(BuildFormProperty::new("deploy", json!(false)))
            .with_param(BuildFormProperty::new("dry", json!(true)))
            .with_param(BuildFormProperty::new("env", json!("dev")))
            .with_param(BuildFormProperty::new("region", json!("eu")))
            .build();

        fx.resolver.apply_latest_parameters("p-1", &mut model).await.unwrap();

        let defaults: HashMap<&str, serde_json::Value> = model
            .trigger_params()
            .iter()
            .map(|p| (p.id.as_str(), p.default_value.clone()))
            .collect();
        assert_eq!(defaults["deploy"], json!(true));
        assert_eq!(defaults["dry"], json!(false));
        assert_eq!(defaults["env"], json!("staging"));
        assert_eq!(defaults["region"], json!("eu"));
    }

    #[tokio::test]
    async fn test_latest_parameters_ignored_without_flag_or_snapshot() {
        let fx = fixture();
        let base = ModelFixture::new("demo")
            .with_param(BuildFormProperty::new("env", json!("dev")))
            .build();

        let last = fx.runtime.insert_build("p-1", 1, BuildStatus::Succeed);
        fx.store.insert(&last, r#"{"env": "staging"}"#);

        let mut model = base.clone();
        fx.resolver.apply_latest_parameters("p-1", &mut model).await.unwrap();
        assert_eq!(model, base);

        let mut model = ModelFixture::new("demo")
            .with_latest_parameters()
            .with_param(BuildFormProperty::new("env", json!("dev")))
            .build();
        let expected = model.clone();
        fx.store.insert(&last, "not json");
        fx.resolver.apply_latest_parameters("p-1", &mut model).await.unwrap();
        assert_eq!(model, expected);
    }

    #[tokio::test]
    async fn test_startup_info() {
        let fx = fixture();
        let model = ModelFixture::new("demo")
            .with_param(BuildFormProperty::new("env", json!("dev")))
            .build();
        let info = fx.resolver.startup_info("p-1", &model).await.unwrap();
        assert!(info.can_manual_startup);
        assert!(!info.can_element_skip);
        assert_eq!(info.params.len(), 1);

        let model = ModelFixture::new("demo").without_manual_trigger().build();
        let info = fx.resolver.startup_info("p-1", &model).await.unwrap();
        assert!(!info.can_manual_startup);
    }

    #[tokio::test]
    async fn test_build_parameters_hide_skip_keys() {
        let fx = fixture();
        assert!(fx.resolver.build_parameters("b-none").await.unwrap().is_empty());

        fx.store.insert(
            "b-1",
            r#"{"env": "prod", "pipeline.skip.element.t-1": "true", "pipeline.version": 3}"#,
        );
        let params = fx.resolver.build_parameters("b-1").await.unwrap();
        let keys: Vec<&str> = params.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["env", "pipeline.version"]);

        fx.store.insert("b-2", "{broken");
        assert!(matches!(
            fx.resolver.build_parameters("b-2").await,
            Err(BuildError::Serialization(_))
        ));
    }
}
