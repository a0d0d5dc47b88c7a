use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::{ApiError, CloverApi};
use crate::puzzle::{FeedbackVector, Placement, Puzzle, PuzzleId};
use crate::state::{BoardState, ClientId, RemoteState};

const LOG_TARGET: &str = "clover::api::http";

/// Header naming the session on every request; the backend records it as the
/// writer of pushed state.
pub const CLIENT_HEADER: &str = "x-clover-client";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpCloverApi {
    http: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
struct PushBody<'a> {
    data: &'a BoardState,
}

#[derive(Serialize)]
struct GuessBody<'a> {
    answer: &'a [Placement],
}

impl HttpCloverApi {
    pub fn new(base: Url, client_id: &ClientId) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(client_id.as_str())
            .map_err(|err| ApiError::Config(format!("client id is not a valid header: {err}")))?;
        headers.insert(CLIENT_HEADER, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base: normalize_base(base),
        })
    }

    fn endpoint(&self, puzzle_id: &PuzzleId, suffix: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(&format!("games/{puzzle_id}/{suffix}"))?)
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            endpoint: response.url().path().to_string(),
        })
    }
}

#[async_trait]
impl CloverApi for HttpCloverApi {
    async fn fetch_puzzle(&self, puzzle_id: &PuzzleId) -> Result<Puzzle, ApiError> {
        let url = self.endpoint(puzzle_id, "")?;
        debug!(target: LOG_TARGET, %url, "fetching puzzle");
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(puzzle_id.clone()));
        }
        Ok(ensure_success(response)?.json().await?)
    }

    async fn fetch_remote_state(
        &self,
        puzzle_id: &PuzzleId,
    ) -> Result<Option<RemoteState>, ApiError> {
        let url = self.endpoint(puzzle_id, "client_state/")?;
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            _ => Ok(ensure_success(response)?.json().await?),
        }
    }

    async fn push_remote_state(
        &self,
        puzzle_id: &PuzzleId,
        board: &BoardState,
    ) -> Result<RemoteState, ApiError> {
        let url = self.endpoint(puzzle_id, "client_state/")?;
        let response = self
            .http
            .put(url)
            .json(&PushBody { data: board })
            .send()
            .await?;
        Ok(ensure_success(response)?.json().await?)
    }

    async fn submit_guess(
        &self,
        puzzle_id: &PuzzleId,
        placements: &[Placement],
    ) -> Result<FeedbackVector, ApiError> {
        let url = self.endpoint(puzzle_id, "guess/")?;
        let response = self
            .http
            .post(url)
            .json(&GuessBody { answer: placements })
            .send()
            .await?;
        Ok(ensure_success(response)?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_hang_off_the_api_base() {
        let api = HttpCloverApi::new(
            Url::parse("http://clover.test/api").unwrap(),
            &ClientId::new("session-1"),
        )
        .unwrap();
        let id = PuzzleId::new("42");
        assert_eq!(
            api.endpoint(&id, "").unwrap().as_str(),
            "http://clover.test/api/games/42/"
        );
        assert_eq!(
            api.endpoint(&id, "client_state/").unwrap().as_str(),
            "http://clover.test/api/games/42/client_state/"
        );
    }

    #[test]
    fn client_ids_must_be_header_safe() {
        let result = HttpCloverApi::new(
            Url::parse("http://clover.test/").unwrap(),
            &ClientId::new("bad\nid"),
        );
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn guess_body_sends_placement_pairs() {
        let placements = [Placement::upright(3), Placement::upright(1)];
        let body = serde_json::to_string(&GuessBody {
            answer: &placements,
        })
        .unwrap();
        assert_eq!(body, r#"{"answer":[[3,0],[1,0]]}"#);
    }
}
