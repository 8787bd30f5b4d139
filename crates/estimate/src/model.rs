use ulink_settings::Settings;

/// Mutable model state handed to the maximisation step.
#[derive(Debug, Clone)]
pub struct Model {
    settings: Settings,
}

impl Model {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn current_settings(&self) -> &Settings {
        &self.settings
    }

    pub fn current_settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }
}
