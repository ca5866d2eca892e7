//! Custom theme for cliclack prompts

use cliclack::ThemeState;
use console::Style;

/// Green for committed work, red for errors
#[derive(Debug, Clone, Default)]
pub struct DevloopTheme;

impl cliclack::Theme for DevloopTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().green(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green(),
        }
    }
}

pub fn init_theme() {
    cliclack::set_theme(DevloopTheme);
}
