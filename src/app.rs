use crate::session::Settings;

const MAX_STATUS_LINES: usize = 8;

/// Which generation parameter the settings panel has selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Duration,
    Tempo,
    Density,
}

impl SettingsField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duration => "Duration",
            Self::Tempo => "Target BPM",
            Self::Density => "Density",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Duration => Self::Tempo,
            Self::Tempo => Self::Density,
            Self::Density => Self::Duration,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            Self::Duration => Self::Density,
            Self::Tempo => Self::Duration,
            Self::Density => Self::Tempo,
        }
    }
}

/// Presentation-side state: the input buffer, operator status lines and the
/// settings panel. Conversation content lives in the session and is read
/// from there; events carry notifications only.
#[derive(Debug)]
pub struct AppState {
    pub input: String,
    pub status_lines: Vec<String>,
    pub show_settings: bool,
    pub selected_setting: SettingsField,
    pub playing_turn: Option<usize>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            input: String::new(),
            status_lines: Vec::new(),
            show_settings: false,
            selected_setting: SettingsField::Duration,
            playing_turn: None,
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Info(message) => self.push_status_line(message),
            AppEvent::Error(message) => self.push_status_line(format!("Error: {message}")),
            AppEvent::PlaybackStarted { turn } => {
                self.playing_turn = Some(turn);
                self.push_status_line("Playback started".to_string());
            }
            AppEvent::PlaybackStopped => {
                self.playing_turn = None;
            }
        }
    }

    pub fn push_status_line(&mut self, line: String) {
        self.status_lines.push(line);
        if self.status_lines.len() > MAX_STATUS_LINES {
            let overflow = self.status_lines.len() - MAX_STATUS_LINES;
            self.status_lines.drain(0..overflow);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifications from the controller task to the UI loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Info(String),
    Error(String),
    PlaybackStarted { turn: usize },
    PlaybackStopped,
}

/// User intents raised by the UI loop toward the controller task.
#[derive(Debug, Clone)]
pub enum AppCommand {
    SubmitPrompt { prompt: String },
    PlayTurn { turn: usize },
    StopPlayback,
    OpenStudio { turn: usize },
}

/// Parameter line shown under a finished track, e.g. `15s • 90 BPM • Density 0.5`.
pub fn settings_summary(settings: Settings) -> String {
    format!(
        "{}s • {} BPM • Density {}",
        settings.duration_seconds(),
        settings.tempo_bpm(),
        settings.density()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_summary_matches_display_format() {
        let mut settings = Settings::default();
        settings.set_duration(15);
        settings.set_tempo(90);
        settings.set_density(0.5);
        assert_eq!(settings_summary(settings), "15s • 90 BPM • Density 0.5");

        settings.set_density(1.0);
        assert_eq!(settings_summary(settings), "15s • 90 BPM • Density 1");
    }

    #[test]
    fn status_lines_are_bounded() {
        let mut app = AppState::new();
        for index in 0..20 {
            app.push_status_line(format!("line {index}"));
        }
        assert_eq!(app.status_lines.len(), MAX_STATUS_LINES);
        assert_eq!(app.status_lines.first().map(String::as_str), Some("line 12"));
    }

    #[test]
    fn playback_events_track_the_playing_turn() {
        let mut app = AppState::new();
        app.handle_event(AppEvent::PlaybackStarted { turn: 3 });
        assert_eq!(app.playing_turn, Some(3));

        app.handle_event(AppEvent::PlaybackStopped);
        assert_eq!(app.playing_turn, None);
    }

    #[test]
    fn settings_field_cycle_is_closed() {
        let mut field = SettingsField::Duration;
        for _ in 0..3 {
            field = field.next();
        }
        assert_eq!(field, SettingsField::Duration);
        assert_eq!(SettingsField::Duration.prev(), SettingsField::Density);
    }
}
