use crate::calendar::ViewMode;
use crate::models::DEFAULT_EVENT_COLOR;
use chrono::Weekday;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ENV_CONFIG: &str = "SCHEDULER_CONFIG";
const ENV_DATA_DIR: &str = "SCHEDULER_DATA_DIR";
const ENV_SUPABASE_URL: &str = "SCHEDULER_SUPABASE_URL";
const ENV_SUPABASE_KEY: &str = "SCHEDULER_SUPABASE_ANON_KEY";

pub fn key_match(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings
        .iter()
        .filter_map(|binding| parse_binding(binding))
        .any(|(code, modifiers)| binding_matches(key, code, modifiers))
}

fn parse_binding(binding: &str) -> Option<(KeyCode, KeyModifiers)> {
    let binding = binding.to_lowercase();
    let mut modifiers = KeyModifiers::NONE;
    let mut code = None;

    for part in binding.split('+') {
        match part {
            "ctrl" => modifiers.insert(KeyModifiers::CONTROL),
            "opt" | "alt" => modifiers.insert(KeyModifiers::ALT),
            "shift" => modifiers.insert(KeyModifiers::SHIFT),
            "enter" => code = Some(KeyCode::Enter),
            "esc" => code = Some(KeyCode::Esc),
            "backspace" => code = Some(KeyCode::Backspace),
            "tab" => code = Some(KeyCode::Tab),
            "backtab" => code = Some(KeyCode::BackTab),
            "space" => code = Some(KeyCode::Char(' ')),
            "up" => code = Some(KeyCode::Up),
            "down" => code = Some(KeyCode::Down),
            "left" => code = Some(KeyCode::Left),
            "right" => code = Some(KeyCode::Right),
            "home" => code = Some(KeyCode::Home),
            "end" => code = Some(KeyCode::End),
            "pageup" => code = Some(KeyCode::PageUp),
            "pagedown" => code = Some(KeyCode::PageDown),
            "delete" => code = Some(KeyCode::Delete),
            c if c.chars().count() == 1 => code = c.chars().next().map(KeyCode::Char),
            // A lone "+" splits into two empty parts.
            "" if binding == "+" => code = Some(KeyCode::Char('+')),
            _ => {}
        }
    }

    code.map(|code| (code, modifiers))
}

fn binding_matches(key: &KeyEvent, code: KeyCode, modifiers: KeyModifiers) -> bool {
    let code_matches = match (key.code, code) {
        (KeyCode::Char(pressed), KeyCode::Char(bound)) => {
            pressed.to_lowercase().next() == Some(bound)
        }
        (pressed, bound) => pressed == bound,
    };
    if !code_matches {
        return false;
    }

    // Enter compares modifiers exactly; elsewhere Shift only matters when bound.
    if code == KeyCode::Enter {
        return key.modifiers == modifiers;
    }
    let mut pressed = key.modifiers;
    if !modifiers.contains(KeyModifiers::SHIFT) {
        pressed.remove(KeyModifiers::SHIFT);
    }
    pressed == modifiers
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "meghendra", "scheduler")
}

pub fn data_dir() -> PathBuf {
    if let Some(path) = std::env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.data_dir().to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".scheduler")
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(ENV_CONFIG) {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.config_dir().join("config.toml");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".scheduler-config.toml")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub auth: AuthConfig,
    pub data: DataConfig,
    pub calendar: CalendarConfig,
    pub logging: LoggingConfig,
    pub keybindings: KeyBindings,
    pub theme: Theme,
    /// Problems found while loading, reported once logging is up.
    #[serde(skip)]
    pub notices: Vec<String>,
}

/// Supabase project settings. Either value missing means local-only mode.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present =
            |name: &str| lookup(name).filter(|value: &String| !value.trim().is_empty());
        if let Some(url) = present(ENV_SUPABASE_URL) {
            self.url = url;
        }
        if let Some(key) = present(ENV_SUPABASE_KEY) {
            self.anon_key = key;
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth provider passed to Supabase Auth.
    pub provider: String,
    /// Loopback port for the sign-in redirect; 0 picks a free one.
    pub callback_port: u16,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            callback_port: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub events_path: PathBuf,
    pub session_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        let dir = data_dir();
        Self {
            events_path: dir.join("events.json"),
            session_path: dir.join("session.json"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    pub fn weekday(self) -> Weekday {
        match self {
            WeekStart::Sunday => Weekday::Sun,
            WeekStart::Monday => Weekday::Mon,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CalendarConfig {
    pub week_start: WeekStart,
    pub default_view: ViewMode,
    pub default_color: String,
    pub default_start_hour: u32,
    pub default_duration_minutes: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            week_start: WeekStart::Sunday,
            default_view: ViewMode::Month,
            default_color: DEFAULT_EVENT_COLOR.to_string(),
            default_start_hour: 9,
            default_duration_minutes: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: data_dir().join("scheduler.log"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KeyBindings {
    pub global: GlobalBindings,
    pub calendar: CalendarBindings,
    pub form: FormBindings,
    pub popup: PopupBindings,
}

fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GlobalBindings {
    pub quit: Vec<String>,
    pub help: Vec<String>,
    pub account: Vec<String>,
    pub status: Vec<String>,
    pub refresh: Vec<String>,
    pub dismiss: Vec<String>,
}

impl Default for GlobalBindings {
    fn default() -> Self {
        Self {
            quit: keys(&["ctrl+q", "q"]),
            help: keys(&["?"]),
            account: keys(&["u"]),
            status: keys(&["s"]),
            refresh: keys(&["r"]),
            dismiss: keys(&["esc"]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CalendarBindings {
    pub prev: Vec<String>,
    pub next: Vec<String>,
    pub today: Vec<String>,
    pub day_view: Vec<String>,
    pub week_view: Vec<String>,
    pub month_view: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub next_event: Vec<String>,
    pub prev_event: Vec<String>,
    pub add: Vec<String>,
    pub edit: Vec<String>,
    pub delete: Vec<String>,
}

impl Default for CalendarBindings {
    fn default() -> Self {
        Self {
            prev: keys(&["[", "p"]),
            next: keys(&["]", "n"]),
            today: keys(&["t"]),
            day_view: keys(&["d"]),
            week_view: keys(&["w"]),
            month_view: keys(&["m"]),
            left: keys(&["h", "left"]),
            right: keys(&["l", "right"]),
            up: keys(&["k", "up"]),
            down: keys(&["j", "down"]),
            next_event: keys(&["tab"]),
            prev_event: keys(&["backtab"]),
            add: keys(&["a"]),
            edit: keys(&["e", "enter"]),
            delete: keys(&["x", "delete"]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FormBindings {
    pub submit: Vec<String>,
    pub cancel: Vec<String>,
    pub next_field: Vec<String>,
    pub prev_field: Vec<String>,
    pub delete: Vec<String>,
}

impl Default for FormBindings {
    fn default() -> Self {
        Self {
            submit: keys(&["enter", "ctrl+s"]),
            cancel: keys(&["esc"]),
            next_field: keys(&["tab", "down"]),
            prev_field: keys(&["backtab", "up"]),
            delete: keys(&["ctrl+d"]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PopupBindings {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for PopupBindings {
    fn default() -> Self {
        Self {
            confirm: keys(&["enter", "y"]),
            cancel: keys(&["esc", "n"]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    pub border_default: String,
    pub border_focus: String,
    pub selection_bg: String,
    pub today: String,
    pub muted: String,
    pub banner_error: String,
    pub toast: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            border_default: "Reset".to_string(),
            border_focus: "Cyan".to_string(),
            selection_bg: "50,50,50".to_string(),
            today: "Yellow".to_string(),
            muted: "DarkGray".to_string(),
            banner_error: "LightRed".to_string(),
            toast: "Green".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let path = config_path();
        let mut config = Self::read_from_path(&path);

        let changed = config.normalize();
        if (changed || !path.exists())
            && let Err(err) = config.save_to_path(&path)
        {
            config
                .notices
                .push(format!("Failed to write {}: {err}", path.display()));
        }

        // Env overrides apply after saving so secrets never land in the file.
        config.remote.apply_env();
        config
    }

    fn read_from_path(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(err) => {
                let mut config = Self::default();
                config.notices.push(format!(
                    "Failed to parse {}, using defaults: {err}",
                    path.display()
                ));
                config
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    /// Makes relative data paths absolute under the data dir and repairs
    /// out-of-range calendar values. Returns whether anything changed.
    fn normalize(&mut self) -> bool {
        let mut changed = false;
        let base = data_dir();
        let defaults = DataConfig::default();

        for (path, fallback) in [
            (&mut self.data.events_path, &defaults.events_path),
            (&mut self.data.session_path, &defaults.session_path),
        ] {
            if path.as_os_str().is_empty() {
                *path = fallback.clone();
                changed = true;
            } else if path.is_relative() {
                *path = base.join(&*path);
                changed = true;
            }
        }

        if self.logging.path.as_os_str().is_empty() {
            self.logging.path = LoggingConfig::default().path;
            changed = true;
        }

        if self.calendar.default_start_hour > 23 {
            self.calendar.default_start_hour = 9;
            changed = true;
        }
        if self.calendar.default_duration_minutes <= 0 {
            self.calendar.default_duration_minutes = 60;
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn char_bindings_ignore_case_and_implicit_shift() {
        let bindings = keys(&["?"]);
        assert!(key_match(&key(KeyCode::Char('?'), KeyModifiers::SHIFT), &bindings));
        assert!(key_match(&key(KeyCode::Char('T'), KeyModifiers::SHIFT), &keys(&["t"])));
        assert!(!key_match(&key(KeyCode::Char('t'), KeyModifiers::CONTROL), &keys(&["t"])));
    }

    #[test]
    fn modifier_bindings_require_modifier() {
        let bindings = keys(&["ctrl+s"]);
        assert!(key_match(&key(KeyCode::Char('s'), KeyModifiers::CONTROL), &bindings));
        assert!(!key_match(&key(KeyCode::Char('s'), KeyModifiers::NONE), &bindings));
    }

    #[test]
    fn enter_matches_modifiers_exactly() {
        let bindings = keys(&["enter"]);
        assert!(key_match(&key(KeyCode::Enter, KeyModifiers::NONE), &bindings));
        assert!(!key_match(&key(KeyCode::Enter, KeyModifiers::SHIFT), &bindings));
    }

    #[test]
    fn named_keys_parse() {
        assert!(key_match(&key(KeyCode::BackTab, KeyModifiers::SHIFT), &keys(&["backtab"])));
        assert!(key_match(&key(KeyCode::Char('+'), KeyModifiers::NONE), &keys(&["+"])));
        assert!(!key_match(&key(KeyCode::Char('x'), KeyModifiers::NONE), &keys(&["bogus"])));
    }

    #[test]
    fn remote_requires_both_values() {
        let mut remote = RemoteConfig::default();
        assert!(!remote.is_configured());
        remote.url = "https://example.supabase.co/".to_string();
        assert!(!remote.is_configured());
        remote.anon_key = "anon".to_string();
        assert!(remote.is_configured());
        assert_eq!(remote.base_url(), "https://example.supabase.co");
    }

    #[test]
    fn env_overrides_fill_remote() {
        let mut remote = RemoteConfig {
            url: "https://file.supabase.co".to_string(),
            anon_key: String::new(),
        };
        remote.apply_overrides(|name| match name {
            ENV_SUPABASE_KEY => Some("from-env".to_string()),
            ENV_SUPABASE_URL => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(remote.url, "https://file.supabase.co");
        assert_eq!(remote.anon_key, "from-env");
        assert!(remote.is_configured());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            "[calendar]\nweek_start = \"monday\"\ndefault_view = \"week\"\n",
        )
        .expect("parse");
        assert_eq!(config.calendar.week_start.weekday(), Weekday::Mon);
        assert_eq!(config.calendar.default_view, ViewMode::Week);
        assert_eq!(config.calendar.default_color, DEFAULT_EVENT_COLOR);
        assert_eq!(config.keybindings.global.quit, keys(&["ctrl+q", "q"]));
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn normalize_repairs_paths_and_ranges() {
        let mut config = Config::default();
        config.data.events_path = PathBuf::from("mine.json");
        config.calendar.default_start_hour = 40;
        assert!(config.normalize());
        assert_ne!(config.data.events_path, PathBuf::from("mine.json"));
        assert!(config.data.events_path.ends_with("mine.json"));
        assert_eq!(config.calendar.default_start_hour, 9);
        assert!(!config.normalize());
    }

    #[test]
    fn config_round_trips_through_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("scheduler-config-test-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.auth.callback_port = 54321;
        config.save_to_path(&path).expect("save");
        let loaded = Config::read_from_path(&path);
        assert_eq!(loaded.auth.callback_port, 54321);
        assert_eq!(loaded.auth.provider, "google");
        assert!(loaded.notices.is_empty());

        fs::write(&path, "calendar = 3").expect("write");
        let broken = Config::read_from_path(&path);
        assert_eq!(broken.notices.len(), 1);
        let _ = fs::remove_file(path);
    }
}
