use super::*;

/// Consistent view of the session on the sink, or of the paused one.
pub(crate) fn audio_manager_handle_get_current_wave(ctx: &ActorContext) -> Option<CurrentWave> {
    if let Some(session) = ctx.shared.active_session() {
        return Some(CurrentWave {
            path: session.path.clone(),
            owner: session.owner.clone(),
            region: session.region,
            bounds_start: session.bounds.0,
            bounds_end: session.bounds.1,
            sample_rate: session.sample_rate,
            is_playing: true,
        });
    }
    ctx.paused.as_ref().map(|paused| CurrentWave {
        path: paused.path.clone(),
        owner: paused.owner.clone(),
        region: paused.region,
        bounds_start: paused.bounds.0,
        bounds_end: paused.bounds.1,
        sample_rate: paused.sample_rate,
        is_playing: false,
    })
}
