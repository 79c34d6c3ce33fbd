use crate::config::Theme;
use crate::ui::color_parser::parse_color;
use ratatui::style::Color;

#[derive(Debug, Clone)]
pub struct ThemeTokens {
    pub ui_border_default: Color,
    pub ui_border_focus: Color,
    pub ui_selection_bg: Color,
    pub ui_today: Color,
    pub ui_muted: Color,
    pub ui_banner_error: Color,
    pub ui_toast: Color,
}

impl ThemeTokens {
    pub fn from_theme(theme: &Theme) -> Self {
        Self {
            ui_border_default: parse_color(&theme.border_default),
            ui_border_focus: parse_color(&theme.border_focus),
            ui_selection_bg: parse_color(&theme.selection_bg),
            ui_today: parse_color(&theme.today),
            ui_muted: parse_color(&theme.muted),
            ui_banner_error: parse_color(&theme.banner_error),
            ui_toast: parse_color(&theme.toast),
        }
    }
}
