use crate::error::Result;
use crate::language_model::CodexLanguageModel;
use crate::settings_merge::merge_settings;
use crate::types::settings::CodexCliSettings;

/// Factory for [`CodexLanguageModel`]s sharing a set of default settings.
#[derive(Debug, Clone, Default)]
pub struct CodexCliProvider {
    default_settings: CodexCliSettings,
}

impl CodexCliProvider {
    pub fn new(default_settings: CodexCliSettings) -> Self {
        Self { default_settings }
    }

    pub fn default_settings(&self) -> &CodexCliSettings {
        &self.default_settings
    }

    /// A model using the provider defaults.
    pub fn language_model(&self, model_id: impl Into<String>) -> Result<CodexLanguageModel> {
        CodexLanguageModel::new(model_id, self.default_settings.clone())
    }

    /// A model whose settings are merged over the provider defaults.
    pub fn language_model_with(
        &self,
        model_id: impl Into<String>,
        settings: CodexCliSettings,
    ) -> Result<CodexLanguageModel> {
        let merged = merge_settings(&self.default_settings, Some(&settings));
        CodexLanguageModel::new(model_id, merged)
    }
}
