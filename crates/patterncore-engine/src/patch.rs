use patterncore_model::{Environment, ModelError, Result as ModelResult, Session};
use serde_json::Value;

/// RFC 7396 JSON Merge Patch: objects merge key-by-key recursively, a
/// `null` value deletes the key, anything else (scalar, array) replaces it
/// wholesale. Used for every partial update the apply boundary carries
/// (`environment`, track `params`) so patches compose the same way
/// regardless of which field they touch.
pub fn merge_patch(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    target_map.remove(&key);
                } else {
                    merge_patch(
                        target_map.entry(key).or_insert(Value::Null),
                        patch_value,
                    );
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

pub fn apply_environment_patch(session: &mut Session, patch: Value) -> ModelResult<()> {
    let mut value = serde_json::to_value(&session.environment)
        .map_err(|e| ModelError::Deserialize(e.to_string()))?;
    merge_patch(&mut value, patch);
    let environment: Environment =
        serde_json::from_value(value).map_err(|e| ModelError::Deserialize(e.to_string()))?;
    environment.validate()?;
    session.environment = environment;
    Ok(())
}

/// Merges `patch` into the named track's mutable fields (an `AudioTrack`'s
/// `params`, or a `MidiTrack` in full) and re-validates it in place.
pub fn apply_track_patch(session: &mut Session, track_id: &str, patch: Value) -> ModelResult<()> {
    if let Some(track) = session.tracks.get_mut(track_id) {
        let mut value = serde_json::to_value(&track.params)
            .map_err(|e| ModelError::Deserialize(e.to_string()))?;
        merge_patch(&mut value, patch);
        let params = serde_json::from_value(value)
            .map_err(|e| ModelError::Deserialize(e.to_string()))?;
        track.params = params;
        return track.validate();
    }
    if let Some(track) = session.tracks_midi.get_mut(track_id) {
        let mut value =
            serde_json::to_value(&*track).map_err(|e| ModelError::Deserialize(e.to_string()))?;
        merge_patch(&mut value, patch);
        let patched = serde_json::from_value(value)
            .map_err(|e| ModelError::Deserialize(e.to_string()))?;
        *track = patched;
        return track.validate();
    }
    Err(ModelError::DanglingReference {
        field: "track_id".into(),
        id: track_id.into(),
    })
}
