//! Interactive takeover prompt for terminal sessions.

use dialoguer::{theme::ColorfulTheme, Select};
use relay_runtime::host::{TakeoverChoice, TakeoverPrompt, TakeoverRequest};
use tracing::warn;

/// Asks on the terminal with `dialoguer`. Escape or errors mean "stay".
pub struct TerminalPrompt;

impl TakeoverPrompt for TerminalPrompt {
    fn choose(&self, request: &TakeoverRequest) -> TakeoverChoice {
        let options = [TakeoverChoice::Switch, TakeoverChoice::Stay];
        let labels = options.map(TakeoverChoice::label);
        let default_index = options
            .iter()
            .position(|choice| *choice == request.default)
            .unwrap_or(1);
        let theme = ColorfulTheme::default();
        match Select::with_theme(&theme)
            .with_prompt(&request.message)
            .items(&labels[..])
            .default(default_index)
            .interact_opt()
        {
            Ok(Some(index)) => options.get(index).copied().unwrap_or(TakeoverChoice::Stay),
            Ok(None) => TakeoverChoice::Stay,
            Err(err) => {
                warn!("takeover prompt failed: {err}");
                TakeoverChoice::Stay
            }
        }
    }
}
