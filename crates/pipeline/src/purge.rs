//! Removal of one literal sequence, run through the regular repair engine.

use mojifix_core::error::CoreError;
use mojifix_core::replacement_map::ReplacementMap;

/// A map with the single substring entry `sequence -> ""`.
pub fn purge_map(sequence: &str) -> Result<ReplacementMap, CoreError> {
    if sequence.trim().is_empty() {
        return Err(CoreError::Validation(
            "Purge sequence must not be blank".to_string(),
        ));
    }
    ReplacementMap::builder().substring(sequence, "").build()
}
