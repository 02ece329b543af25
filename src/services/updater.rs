use crate::obs::{ControlApi, ControlError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Input setting holding the file path of an OBS image source
pub const DEFAULT_PATH_FIELD: &str = "file";

/// Result of a single path update within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The remote source now points at this path
    Applied(String),

    /// The update failed; the reason is the rendered [`UpdateError`]
    Failed(String),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

/// Errors that can occur while updating a source
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Failed to update source '{source_name}': {cause}")]
    UpdateFailed {
        source_name: String,
        #[source]
        cause: ControlError,
    },
}

impl UpdateError {
    pub fn source_name(&self) -> &str {
        match self {
            UpdateError::UpdateFailed { source_name, .. } => source_name,
        }
    }
}

/// Changes the file path of one remote source at a time
///
/// Each update is a read-modify-write of the source's settings bag: only the
/// path field changes, everything else is written back as it was read. The
/// write uses `overlay = false` so the bag sent is exactly the bag OBS keeps.
#[derive(Clone)]
pub struct SourceUpdater {
    api: Arc<dyn ControlApi>,
    path_field: String,
}

impl SourceUpdater {
    /// Create an updater writing the default `file` setting
    pub fn new(api: Arc<dyn ControlApi>) -> Self {
        Self::with_path_field(api, DEFAULT_PATH_FIELD)
    }

    pub fn with_path_field(api: Arc<dyn ControlApi>, path_field: impl Into<String>) -> Self {
        Self {
            api,
            path_field: path_field.into(),
        }
    }

    pub fn path_field(&self) -> &str {
        &self.path_field
    }

    /// The control connection shared by every update
    pub fn api(&self) -> &Arc<dyn ControlApi> {
        &self.api
    }

    /// Point `source_name` at `new_path`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::UpdateFailed`] if either the read or the write fails. A
    /// failed read means no write is attempted.
    pub fn update_path(&self, source_name: &str, new_path: &str) -> Result<(), UpdateError> {
        let fail = |cause| UpdateError::UpdateFailed {
            source_name: source_name.to_string(),
            cause,
        };

        let mut settings = self.api.get_input_settings(source_name).map_err(fail)?;

        settings.insert(
            self.path_field.clone(),
            Value::String(new_path.to_string()),
        );

        self.api
            .set_input_settings(source_name, settings, false)
            .map_err(fail)?;

        tracing::info!("Set path of source '{}' to {}", source_name, new_path);
        Ok(())
    }

    /// Like [`update_path`](Self::update_path) but never fails: errors are
    /// logged and returned as [`UpdateOutcome::Failed`].
    pub fn apply(&self, source_name: &str, new_path: &str) -> UpdateOutcome {
        match self.update_path(source_name, new_path) {
            Ok(()) => UpdateOutcome::Applied(new_path.to_string()),
            Err(e) => {
                tracing::warn!("{}", e);
                UpdateOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::{InputSettings, MockControlApi};
    use mockall::predicate::eq;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> InputSettings {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_update_path_rewrites_only_the_path_field() {
        let mut api = MockControlApi::new();

        api.expect_get_input_settings()
            .with(eq("imgA"))
            .times(1)
            .returning(|_| {
                Ok(settings(json!({
                    "file": "/p/old.png",
                    "unload": true,
                    "linear_alpha": false
                })))
            });

        api.expect_set_input_settings()
            .withf(|name, bag, overlay| {
                name == "imgA"
                    && !*overlay
                    && bag
                        == &settings(json!({
                            "file": "/p/new1.png",
                            "unload": true,
                            "linear_alpha": false
                        }))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let updater = SourceUpdater::new(Arc::new(api));
        assert!(updater.update_path("imgA", "/p/new1.png").is_ok());
    }

    #[test]
    fn test_update_path_adds_field_when_missing() {
        let mut api = MockControlApi::new();

        api.expect_get_input_settings()
            .returning(|_| Ok(InputSettings::new()));
        api.expect_set_input_settings()
            .withf(|_, bag, _| bag.get("file") == Some(&json!("/p/a.png")) && bag.len() == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let updater = SourceUpdater::new(Arc::new(api));
        assert!(updater.update_path("imgA", "/p/a.png").is_ok());
    }

    #[test]
    fn test_custom_path_field() {
        let mut api = MockControlApi::new();

        api.expect_get_input_settings()
            .returning(|_| Ok(settings(json!({ "local_file": "/old.mp4" }))));
        api.expect_set_input_settings()
            .withf(|_, bag, _| bag.get("local_file") == Some(&json!("/new.mp4")))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let updater = SourceUpdater::with_path_field(Arc::new(api), "local_file");
        assert_eq!(updater.path_field(), "local_file");
        assert!(updater.update_path("media", "/new.mp4").is_ok());
    }

    #[test]
    fn test_failed_read_skips_write() {
        let mut api = MockControlApi::new();

        api.expect_get_input_settings()
            .returning(|_| Err(ControlError::NotConnected));
        api.expect_set_input_settings().times(0);

        let updater = SourceUpdater::new(Arc::new(api));
        let error = updater.update_path("imgA", "/p/new1.png").unwrap_err();

        assert_eq!(error.source_name(), "imgA");
        assert!(matches!(
            error,
            UpdateError::UpdateFailed {
                cause: ControlError::NotConnected,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_write_is_update_failed() {
        let mut api = MockControlApi::new();

        api.expect_get_input_settings()
            .returning(|_| Ok(InputSettings::new()));
        api.expect_set_input_settings().returning(|_, _, _| {
            Err(ControlError::Request {
                request_type: "SetInputSettings".to_string(),
                code: 600,
                comment: "No source was found".to_string(),
            })
        });

        let updater = SourceUpdater::new(Arc::new(api));
        let error = updater.update_path("ghost", "/p/x.png").unwrap_err();

        assert_eq!(error.source_name(), "ghost");
        assert!(error.to_string().contains("No source was found"));
    }

    #[test]
    fn test_apply_converts_errors_to_outcomes() {
        let mut api = MockControlApi::new();

        api.expect_get_input_settings()
            .with(eq("good"))
            .returning(|_| Ok(InputSettings::new()));
        api.expect_get_input_settings()
            .with(eq("bad"))
            .returning(|_| Err(ControlError::NotConnected));
        api.expect_set_input_settings()
            .returning(|_, _, _| Ok(()));

        let updater = SourceUpdater::new(Arc::new(api));

        assert_eq!(
            updater.apply("good", "/p/a.png"),
            UpdateOutcome::Applied("/p/a.png".to_string())
        );

        let outcome = updater.apply("bad", "/p/b.png");
        assert!(!outcome.is_applied());
        assert!(matches!(outcome, UpdateOutcome::Failed(reason) if reason.contains("bad")));
    }
}
