use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::{
    error::AppError,
    models::{Poll, PostId, Vote, VoteRequest},
    state,
    tally::Tally,
    utils::{client_id, parse_post_id},
};

#[derive(Serialize)]
pub struct PollView {
    #[serde(flatten)]
    pub poll: Poll,
    #[serde(flatten)]
    pub tally: Tally,
    #[serde(rename = "hasVoted")]
    pub has_voted: bool,
}

fn invalid_option() -> AppError {
    AppError::BadRequest("Invalid option index".to_string())
}

async fn find_poll(state: &state::State, post_id: PostId) -> Result<Poll, AppError> {
    state
        .store
        .poll_for_post(post_id)
        .await?
        .ok_or(AppError::NotFound("Poll not found"))
}

pub async fn get_poll_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PollView>, AppError> {
    let post_id = parse_post_id(&id)?;
    let poll = find_poll(&state, post_id).await?;

    let votes = state.store.list_votes(poll.id).await?;
    let tally = poll.tally(&votes);

    let has_voted = match client_id(&headers) {
        Some(client) => state.voted_polls.has_voted(&client, poll.id).await?,
        None => false,
    };

    Ok(Json(PollView {
        poll,
        tally,
        has_voted,
    }))
}

/// Records a vote and answers with the recomputed tally. Repeat votes from
/// the same client are accepted; the voted flag is only a hint for clients.
#[instrument(skip(state, headers, payload))]
pub async fn vote_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<Tally>, AppError> {
    let post_id = parse_post_id(&id)?;
    let Json(payload) = payload.map_err(|_| invalid_option())?;

    let option_index = payload.option_index;

    let poll = find_poll(&state, post_id).await?;
    let in_range = usize::try_from(option_index).is_ok_and(|index| index < poll.options.len());
    if !in_range {
        return Err(invalid_option());
    }

    state
        .store
        .insert_vote(Vote {
            poll_id: poll.id,
            option_index,
        })
        .await?;

    if let Some(client) = client_id(&headers) {
        if let Err(e) = state.voted_polls.mark(&client, poll.id).await {
            warn!("Could not flag poll {} as voted: {e}", poll.id);
        }
    }

    let votes = state.store.list_votes(poll.id).await?;

    Ok(Json(poll.tally(&votes)))
}
