use super::*;

fn sanitize_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return 0.0;
    }
    fraction.clamp(0.0, 1.0)
}

fn position_in(region: PlaybackRegion, fraction: f64) -> u64 {
    region.clamp(region.start + (fraction * region.len() as f64) as u64)
}

/// Moves the cursor to `fraction` of the active region. A playing session
/// restarts there; otherwise only the remembered cursor changes.
pub(crate) async fn audio_manager_handle_seek(ctx: &mut ActorContext, fraction: f64) -> Result<(), PlaybackError> {
    let fraction = sanitize_fraction(fraction);
    if let Some(session) = ctx.shared.active_session() {
        let target = position_in(session.region, fraction);
        log::debug!("Audio Manager: Seek '{}' to {} ({:.3})", session.path, target, fraction);
        return restart_session(ctx, &session, session.region, session.bounds, target).await;
    }

    let (path, region) = match (&ctx.paused, &ctx.last_path) {
        (Some(paused), _) => (paused.path.clone(), paused.region),
        (None, Some(path)) => match ctx.shared.regions.get(path) {
            Some(region) => (path.clone(), *region),
            None => return Ok(()),
        },
        (None, None) => {
            log::debug!("Audio Manager: Seek ignored, no wave to seek in");
            return Ok(());
        }
    };
    let target = position_in(region, fraction);
    ctx.shared.cursors.insert(path.clone(), target);
    if let Some(mut state) = ctx.shared.states.get_mut(&path) {
        state.set_cursor(target);
    }
    log::debug!("Audio Manager: Remembered cursor {} for '{}'", target, path);
    Ok(())
}

/// Sets the cursor of `path` to `fraction` of `[start_sample, end_sample)`.
pub(crate) async fn audio_manager_handle_set_cursor(
    ctx: &mut ActorContext,
    path: String,
    fraction: f64,
    start_sample: u64,
    end_sample: u64,
) -> Result<(), PlaybackError> {
    if end_sample <= start_sample {
        return Err(PlaybackError::InvalidBounds {
            start: start_sample,
            end: end_sample,
        });
    }
    let span = PlaybackRegion::new(start_sample, end_sample, false);
    let position = position_in(span, sanitize_fraction(fraction));

    if let Some(session) = ctx.shared.active_session().filter(|s| s.path == path) {
        let target = session.region.clamp(position);
        log::debug!("Audio Manager: Cursor of playing '{}' moved to {}", path, target);
        return restart_session(ctx, &session, session.region, session.bounds, target).await;
    }

    let stored = match ctx.shared.states.get_mut(&path) {
        Some(mut state) => {
            state.set_cursor(position);
            state.cursor_sample()
        }
        None => position,
    };
    ctx.shared.cursors.insert(path, stored);
    Ok(())
}

/// Queues an interactive edit. Commits happen in `commit_due_edits` once
/// the edit has been quiet for the debounce window.
pub(crate) fn audio_manager_handle_update_playback_state(
    ctx: &mut ActorContext,
    mut state: PlaybackState,
) -> Result<(), PlaybackError> {
    state.validate()?;
    let window = ctx.edit_window;
    let committed = ctx.shared.states.get(&state.path).map(|s| s.layout());
    let debouncer = ctx
        .edits
        .entry(state.path.clone())
        .or_insert_with(|| match committed {
            Some(layout) => Debouncer::with_committed(window, layout),
            None => Debouncer::new(window),
        });
    debouncer.submit(state.layout(), Instant::now());
    Ok(())
}

pub(crate) async fn commit_due_edits(ctx: &mut ActorContext, now: Instant) {
    let mut due: Vec<PlaybackState> = Vec::new();
    ctx.edits.retain(|_, debouncer| {
        if let Some(layout) = debouncer.poll(now) {
            due.push(layout);
        }
        debouncer.has_pending()
    });
    for layout in due {
        let path = layout.path.clone();
        if let Err(e) = apply_edit(ctx, layout).await {
            log::warn!("Audio Manager: Dropped edit for '{}': {}", path, e);
        }
    }
}

/// Folds a committed layout into the stored state and restarts the session
/// when its region changed.
async fn apply_edit(ctx: &mut ActorContext, layout: PlaybackState) -> Result<(), PlaybackError> {
    let path = layout.path.clone();
    let mut state = ctx
        .shared
        .states
        .get(&path)
        .map(|s| s.clone())
        .unwrap_or_else(|| layout.clone());
    let previous_slice = state.slice_index;
    state.repeat_mode = layout.repeat_mode;
    if layout.owner.is_some() {
        state.owner = layout.owner.clone();
    }
    state.update_bounds_and_slices(
        layout.bounds_start,
        layout.bounds_end,
        &layout.slice_markers,
        layout.samples_per_bin,
    )?;
    // A new slice starts at its first sample; other edits keep the cursor.
    let slice_changed = layout.slice_index != previous_slice;
    if slice_changed {
        let index = layout.slice_index.min(state.marker_samples().len());
        state.navigate_to_slice(index)?;
    } else if let Some(cursor) = ctx.shared.remembered_cursor(&path) {
        state.set_cursor(cursor);
    }
    let cursor = state.cursor_sample();
    let region = state.playback_region();
    let bounds = (state.bounds_start, state.bounds_end);
    log::debug!(
        "Audio Manager: Committed edit for '{}': bounds {}..{}, {} marker(s), {:?}",
        path,
        bounds.0,
        bounds.1,
        state.slice_markers.len(),
        state.repeat_mode
    );
    ctx.shared.regions.insert(path.clone(), region);
    ctx.shared.cursors.insert(path.clone(), cursor);
    ctx.shared.states.insert(path.clone(), state);

    if let Some(paused) = ctx.paused.as_mut().filter(|p| p.path == path) {
        paused.region = region;
        paused.bounds = bounds;
        return Ok(());
    }
    let Some(session) = ctx.shared.active_session().filter(|s| s.path == path) else {
        return Ok(());
    };
    let audio = load_pcm(ctx, &path).await?;
    let limited = region.limited_to(audio.len());
    let bounds = (bounds.0, bounds.1.min(audio.len()));
    if limited == session.region && bounds == session.bounds {
        return Ok(());
    }
    let position = if slice_changed {
        limited.clamp(cursor)
    } else {
        limited.clamp(session.tracker.absolute_position())
    };
    restart_session(ctx, &session, region, bounds, position).await
}
