//! Model Router (spec §4.3): a pure decision function, no I/O, no state.

use klipnote_core::Model;

/// Case-insensitive Chinese language-hint set that routes to `belle2`.
const CHINESE_SET: &[&str] = &["zh", "zh-cn", "zh-tw", "cmn", "mandarin"];

/// `Route(language_hint, configured_default) -> model`.
///
/// Policy, evaluated in order:
/// 1. `configured_default` pins the deployment to one model, if set.
/// 2. A Chinese `language_hint` routes to `belle2`.
/// 3. Otherwise `whisperx`.
pub fn route(language_hint: Option<&str>, configured_default: Option<Model>) -> Model {
    if let Some(pinned) = configured_default {
        return pinned;
    }
    if let Some(hint) = language_hint {
        let normalized = hint.to_lowercase();
        if CHINESE_SET.contains(&normalized.as_str()) {
            return Model::Belle2;
        }
    }
    Model::WhisperX
}
