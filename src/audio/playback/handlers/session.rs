use super::*;

/// What a play request resolves to before the pipeline is built.
#[derive(Debug, Clone)]
pub(crate) struct PlayRequest {
    pub(crate) path: String,
    pub(crate) region: PlaybackRegion,
    pub(crate) bounds: (u64, u64),
    pub(crate) start_sample: Option<u64>,
    pub(crate) owner: Option<String>,
}

pub(crate) async fn audio_manager_handle_play(
    ctx: &mut ActorContext,
    path: String,
    looping: bool,
    start_sample: Option<u64>,
    end_sample: Option<u64>,
    owner: Option<String>,
) -> Result<(), PlaybackError> {
    let snapshot = require_metadata(&ctx.cache, &path)?;
    let start = start_sample.unwrap_or(0);
    if let Some(end) = end_sample {
        if end <= start {
            return Err(PlaybackError::InvalidBounds { start, end });
        }
    }
    // Files without a frame count in the header are trimmed after decode.
    let end = end_sample.unwrap_or(match snapshot.sample_count() {
        0 => u64::MAX,
        count => count,
    });
    let request = PlayRequest {
        path,
        region: PlaybackRegion::new(start, end, looping),
        bounds: (start, end),
        start_sample: None,
        owner,
    };
    begin_playback(ctx, request).await
}

pub(crate) async fn audio_manager_handle_play_with_state(
    ctx: &mut ActorContext,
    mut state: PlaybackState,
) -> Result<(), PlaybackError> {
    state.validate()?;
    require_metadata(&ctx.cache, &state.path)?;
    let region = state.playback_region();
    let request = PlayRequest {
        path: state.path.clone(),
        region,
        bounds: (state.bounds_start, state.bounds_end),
        start_sample: Some(state.cursor_sample()),
        owner: state.owner.clone(),
    };
    log::debug!(
        "Audio Manager: Play with state for '{}' ({:?}, region {}..{})",
        state.path,
        state.repeat_mode,
        region.start,
        region.end
    );
    ctx.shared.cursors.insert(state.path.clone(), state.cursor_sample());
    ctx.shared.regions.insert(state.path.clone(), region);
    ctx.shared.states.insert(state.path.clone(), state);
    begin_playback(ctx, request).await
}

/// Decodes (or reuses) the samples and starts the session. Without an
/// explicit start the remembered cursor is used when it lies inside the
/// region.
pub(crate) async fn begin_playback(ctx: &mut ActorContext, request: PlayRequest) -> Result<(), PlaybackError> {
    let audio = load_pcm(ctx, &request.path).await?;
    let region = request.region.limited_to(audio.len());
    if region.is_empty() {
        return Err(PlaybackError::NoSamplesInRange {
            path: request.path,
            start: request.region.start,
            end: request.region.end,
        });
    }
    let start = request
        .start_sample
        .or_else(|| ctx.shared.remembered_cursor(&request.path))
        .filter(|cursor| region.contains(*cursor))
        .unwrap_or(region.start);
    let bounds = (request.bounds.0, request.bounds.1.min(audio.len()));
    start_session(ctx, &request.path, region, bounds, start, request.owner, &audio)
}

/// Puts a new session on the sink, replacing whatever was there.
pub(crate) fn start_session(
    ctx: &mut ActorContext,
    path: &str,
    region: PlaybackRegion,
    bounds: (u64, u64),
    start_sample: u64,
    owner: Option<String>,
    audio: &DecodedAudio,
) -> Result<(), PlaybackError> {
    if let Some(previous) = take_session(ctx) {
        if previous.session.path != path {
            announce_stop(ctx, &previous, EventKind::Stopped);
            set_state_flags(&ctx.shared, &previous.session.path, false, false);
        }
    }
    if let Some(paused) = ctx.paused.take_if(|paused| paused.path != path) {
        log::info!("Audio Manager: Stopped paused '{}' for '{}'", paused.path, path);
        stop_paused(ctx, &paused);
    }

    let tracker = Arc::new(ProgressTracker::new(region, start_sample));
    let pipeline = build_pipeline(
        audio,
        region,
        start_sample,
        Arc::clone(&ctx.shared.volume),
        Arc::clone(&tracker),
    );
    if let Err(e) = ctx.sink.play(pipeline) {
        log::error!("Audio Manager: Output refused session for '{}': {}", path, e);
        ctx.shared.is_playing.store(false, Ordering::Relaxed);
        ctx.shared.current_path.store(None);
        return Err(e);
    }

    ctx.next_session_id += 1;
    let session = Arc::new(ActiveSession {
        id: ctx.next_session_id,
        path: path.to_string(),
        owner,
        tracker: Arc::clone(&tracker),
        region,
        bounds,
        sample_rate: audio.sample_rate,
    });
    ctx.shared.session.store(Some(Arc::clone(&session)));
    ctx.shared.current_path.store(Some(Arc::new(path.to_string())));
    ctx.shared.is_playing.store(true, Ordering::Relaxed);
    ctx.shared.is_paused.store(false, Ordering::Relaxed);
    ctx.shared.regions.insert(path.to_string(), region);
    ctx.shared.cursors.insert(path.to_string(), tracker.absolute_position());
    set_state_flags(&ctx.shared, path, true, false);
    ctx.paused = None;
    ctx.last_path = Some(path.to_string());

    tokio::spawn(run_session_monitor(
        Arc::clone(&session),
        Arc::clone(&ctx.shared),
        Arc::clone(&ctx.notifier),
        ctx.commands.clone(),
        ctx.timing,
    ));

    log::info!(
        "Audio Manager: Session {} playing '{}' from {} in {}..{}{}",
        session.id,
        path,
        tracker.absolute_position(),
        region.start,
        region.end,
        if region.looping { " (looping)" } else { "" }
    );
    emit_playback_event(
        ctx.notifier.as_ref(),
        EventKind::Started,
        path,
        tracker.progress(),
        tracker.absolute_position(),
        region.len(),
        session.owner.as_deref(),
    );
    Ok(())
}

/// A session just removed from the sink, with its cursor already recorded.
pub(crate) struct EndedSession {
    pub(crate) session: Arc<ActiveSession>,
    pub(crate) cursor: u64,
}

/// Unpublishes the current session and silences the sink.
pub(crate) fn take_session(ctx: &mut ActorContext) -> Option<EndedSession> {
    let session = ctx.shared.session.swap(None)?;
    ctx.sink.stop();
    let cursor = session.region.clamp(session.tracker.absolute_position());
    ctx.shared.cursors.insert(session.path.clone(), cursor);
    ctx.shared.is_playing.store(false, Ordering::Relaxed);
    Some(EndedSession { session, cursor })
}

fn announce_stop(ctx: &ActorContext, ended: &EndedSession, kind: EventKind) {
    let region = ended.session.region;
    emit_playback_event(
        ctx.notifier.as_ref(),
        kind,
        &ended.session.path,
        region.progress_at(ended.cursor),
        ended.cursor,
        region.len(),
        ended.session.owner.as_deref(),
    );
}

/// Ends a paused session that is no longer on the sink.
fn stop_paused(ctx: &ActorContext, paused: &PausedSession) {
    let cursor = ctx.shared.remembered_cursor(&paused.path).unwrap_or(paused.region.start);
    set_state_flags(&ctx.shared, &paused.path, false, false);
    emit_playback_event(
        ctx.notifier.as_ref(),
        EventKind::Stopped,
        &paused.path,
        paused.region.progress_at(cursor),
        cursor,
        paused.region.len(),
        paused.owner.as_deref(),
    );
}

pub(crate) fn audio_manager_handle_stop(ctx: &mut ActorContext) -> Result<(), PlaybackError> {
    if let Some(ended) = take_session(ctx) {
        log::info!("Audio Manager: Stopped '{}' at {}", ended.session.path, ended.cursor);
        set_state_flags(&ctx.shared, &ended.session.path, false, false);
        announce_stop(ctx, &ended, EventKind::Stopped);
    } else if let Some(paused) = ctx.paused.take() {
        log::info!("Audio Manager: Stopped paused '{}'", paused.path);
        stop_paused(ctx, &paused);
    } else {
        log::debug!("Audio Manager: Stop ignored, nothing playing");
    }
    ctx.shared.is_paused.store(false, Ordering::Relaxed);
    ctx.shared.current_path.store(None);
    Ok(())
}

pub(crate) fn audio_manager_handle_pause(ctx: &mut ActorContext) -> Result<(), PlaybackError> {
    let Some(ended) = take_session(ctx) else {
        log::debug!("Audio Manager: Pause ignored, nothing playing");
        return Ok(());
    };
    log::info!("Audio Manager: Paused '{}' at {}", ended.session.path, ended.cursor);
    ctx.paused = Some(PausedSession {
        path: ended.session.path.clone(),
        owner: ended.session.owner.clone(),
        region: ended.session.region,
        bounds: ended.session.bounds,
        sample_rate: ended.session.sample_rate,
    });
    ctx.shared.is_paused.store(true, Ordering::Relaxed);
    set_state_flags(&ctx.shared, &ended.session.path, false, true);
    announce_stop(ctx, &ended, EventKind::Paused);
    Ok(())
}

pub(crate) async fn audio_manager_handle_resume(ctx: &mut ActorContext) -> Result<(), PlaybackError> {
    let Some(paused) = ctx.paused.clone() else {
        log::debug!("Audio Manager: Resume ignored, nothing paused");
        return Ok(());
    };
    let audio = load_pcm(ctx, &paused.path).await?;
    let start = ctx
        .shared
        .remembered_cursor(&paused.path)
        .unwrap_or(paused.region.start);
    start_session(
        ctx,
        &paused.path,
        paused.region,
        paused.bounds,
        start,
        paused.owner,
        &audio,
    )
}

/// Restarts the current session's wave with a new region and position.
pub(crate) async fn restart_session(
    ctx: &mut ActorContext,
    session: &ActiveSession,
    region: PlaybackRegion,
    bounds: (u64, u64),
    start_sample: u64,
) -> Result<(), PlaybackError> {
    let audio = load_pcm(ctx, &session.path).await?;
    let region = region.limited_to(audio.len());
    if region.is_empty() {
        return Err(PlaybackError::NoSamplesInRange {
            path: session.path.clone(),
            start: region.start,
            end: region.end,
        });
    }
    start_session(
        ctx,
        &session.path,
        region,
        bounds,
        region.clamp(start_sample),
        session.owner.clone(),
        &audio,
    )
}

pub(crate) async fn audio_manager_handle_session_finished(ctx: &mut ActorContext, session_id: u64) {
    let Some(session) = ctx.shared.active_session() else {
        return;
    };
    if session.id != session_id {
        log::trace!("Audio Manager: Ignoring finish of stale session {}", session_id);
        return;
    }

    let region = session.region;
    if region.looping {
        // The pipeline wraps on its own; reaching here means the decoded
        // audio ran out early.
        log::debug!("Audio Manager: Looping session {} ended, restarting at {}", session.id, region.start);
        if let Err(e) = restart_session(ctx, &session, region, session.bounds, region.start).await {
            log::error!("Audio Manager: Failed to restart loop for '{}': {}", session.path, e);
        }
        return;
    }

    if take_session(ctx).is_none() {
        return;
    }
    ctx.shared.cursors.insert(session.path.clone(), region.start);
    ctx.shared.current_path.store(None);
    ctx.shared.is_paused.store(false, Ordering::Relaxed);
    set_state_flags(&ctx.shared, &session.path, false, false);
    if let Some(mut state) = ctx.shared.states.get_mut(&session.path) {
        state.set_cursor(region.start);
    }
    log::info!("Audio Manager: Session {} finished '{}'", session.id, session.path);
    emit_playback_event(
        ctx.notifier.as_ref(),
        EventKind::Finished,
        &session.path,
        1.0,
        session.tracker.absolute_position(),
        region.len(),
        session.owner.as_deref(),
    );
}
