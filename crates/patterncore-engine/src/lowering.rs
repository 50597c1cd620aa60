use std::collections::HashSet;

use patterncore_model::Session;

/// Resolves which audio tracks are currently audible under solo/mute
/// rules: if any track in the set has `solo == true`, only solo'd tracks
/// sound; otherwise tracks with `mute == true` are silenced. Mixer-line
/// solo/mute then applies an additional gate over the `include` set — a
/// mixer line silenced by this same rule silences every track it lists,
/// on top of that track's own resolution.
pub fn audible_audio_tracks(session: &Session) -> HashSet<String> {
    let mut audible = resolve(session.tracks.iter().map(|(id, t)| (id, t.meta.solo, t.meta.mute)));
    let muted_lines = muted_mixer_lines(session);
    if !muted_lines.is_empty() {
        for line_id in &muted_lines {
            if let Some(line) = session.mixer_lines.get(line_id) {
                for track_id in &line.include {
                    audible.remove(track_id);
                }
            }
        }
    }
    audible
}

pub fn audible_midi_tracks(session: &Session) -> HashSet<String> {
    resolve(
        session
            .tracks_midi
            .iter()
            .map(|(id, t)| (id, t.solo, t.mute)),
    )
}

/// Mixer lines that are *not* audible under the same solo-over-mute rule,
/// i.e. ones whose `include` set should be gated off.
fn muted_mixer_lines(session: &Session) -> HashSet<String> {
    let audible = resolve(
        session
            .mixer_lines
            .iter()
            .map(|(id, line)| (id, line.solo, line.mute)),
    );
    session
        .mixer_lines
        .keys()
        .filter(|id| !audible.contains(id.as_str()))
        .cloned()
        .collect()
}

fn resolve<'a, I>(entries: I) -> HashSet<String>
where
    I: Iterator<Item = (&'a String, bool, bool)> + Clone,
{
    let any_solo = entries.clone().any(|(_, solo, _)| solo);
    entries
        .filter(|(_, solo, mute)| if any_solo { *solo } else { !*mute })
        .map(|(id, _, _)| id.clone())
        .collect()
}
