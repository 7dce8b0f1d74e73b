use std::collections::HashMap;
use tracing::debug;

/// Built-in action aliases; anything not listed passes through unchanged
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("temp_up", "small_heart"),
    ("temp_down", "small_heart"),
    ("fan_horizontal", "horizontal"),
    ("fan_mode", "mode"),
    ("fan_stronger", "stronger"),
    ("fan_timer", "timer"),
    ("fan_vertical", "vertical"),
    ("fan_weaker", "weaker"),
    ("ac_temp_down", "ac_tempDOWN"),
    ("ac_temp_up", "ac_tempUP"),
    ("tv_channel_up", "tv_channelUP"),
    ("tv_channel_down", "tv_channelDOWN"),
];

/// Maps recognized voice actions to voice channel commands
#[derive(Debug, Clone)]
pub struct VoiceCommandMapper {
    aliases: HashMap<String, String>,
}

impl VoiceCommandMapper {
    /// Built-in table extended (and overridden) by `extra`
    pub fn new(extra: &HashMap<String, String>) -> Self {
        let mut aliases: HashMap<String, String> = DEFAULT_ALIASES
            .iter()
            .map(|(action, command)| (action.to_string(), command.to_string()))
            .collect();
        aliases.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { aliases }
    }

    /// Command for an action, `None` for empty or "none" actions
    pub fn map(&self, action: &str) -> Option<String> {
        let action = action.trim();
        if action.is_empty() || action.eq_ignore_ascii_case("none") {
            debug!("Ignoring empty voice action");
            return None;
        }

        Some(
            self.aliases
                .get(action)
                .cloned()
                .unwrap_or_else(|| action.to_string()),
        )
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

impl Default for VoiceCommandMapper {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}
