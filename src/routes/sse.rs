use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures_util::{Stream, StreamExt};

use crate::{
    extractors::auth_extractor::RequiredUser,
    utils::{app_error::AppError, real_time_event_management::NOTIFICATION_EVENT_NAME},
    AppState,
};

/// Streams the caller's new notifications as server-sent events.
pub async fn notifications_stream_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = app_state.event_tracker.subscribe(auth_user.id).await;

    let stream = receiver.map(|content| {
        Ok::<_, Infallible>(Event::default().event(NOTIFICATION_EVENT_NAME).data(content))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
