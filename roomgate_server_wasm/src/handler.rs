//! HTTP routing for the entry service
//!
//! [`route`] maps a buffered request onto [`ServerState`] and returns a
//! [`Reply`]; [`handle_request`] is the thin wstd adapter around it. Every
//! room route takes the room name, percent-decoded, as the last path
//! segment.

use std::borrow::Cow;
use std::str::Utf8Error;

use bytes::{Buf, Bytes};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};
use wstd::http::{Body, HeaderValue, Method, Request, Response, StatusCode};

use crate::codec::{ResponseCode, decode_join_seed, response_code_bytes};
use crate::error::{DirectoryError, EntryError};
use crate::rendezvous::{CompleteOutcome, PollOutcome};
use crate::room::LEGACY_PROPERTY_KEY;
use crate::state::ServerState;

const CREATE_PREFIX: &str = "/room/create/";
const POLL_PREFIX: &str = "/room/join_prepare_polling/";
const COMPLETE_PREFIX: &str = "/room/join_prepare_complete/";
const PROP_PREFIX: &str = "/room/prop/";

/// Status and body of a routed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Reply {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }

    fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    /// A bare response code followed by a zero `u16`.
    fn code(status: StatusCode, code: ResponseCode) -> Self {
        Self {
            status,
            body: response_code_bytes(code),
        }
    }

    fn read_failed() -> Self {
        Self::code(StatusCode::INTERNAL_SERVER_ERROR, ResponseCode::NgRequestReadFailed)
    }

    fn not_found() -> Self {
        Self::empty(StatusCode::NOT_FOUND)
    }
}

/// Percent-decoded room name at the end of `path`, if `path` starts with
/// `prefix`.
fn extract_name<'a>(path: &'a str, prefix: &str) -> Option<Result<Cow<'a, str>, Utf8Error>> {
    path.strip_prefix(prefix).map(|raw| percent_decode_str(raw).decode_utf8())
}

/// Get query parameter from URI
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

fn version(user_agent: Option<&str>, state: &ServerState) -> Reply {
    match user_agent.and_then(|ua| state.config().client_versions.for_user_agent(ua)) {
        Some(version) => Reply::ok(version.to_string()),
        None => {
            debug!(?user_agent, "version requested by unknown client");
            Reply::empty(StatusCode::BAD_REQUEST)
        }
    }
}

fn list_rooms(state: &ServerState) -> Reply {
    match state.list_rooms() {
        Ok(body) => Reply::ok(body),
        Err(e) => {
            warn!("encoding room list failed: {e}");
            Reply::code(StatusCode::INTERNAL_SERVER_ERROR, ResponseCode::NgResponseWriteFailed)
        }
    }
}

fn create_room(name: &str, mut body: &[u8], state: &ServerState) -> Reply {
    if body.remaining() < 2 {
        debug!(name, len = body.len(), "create request body too short");
        return Reply::read_failed();
    }
    let max_players = body.get_u16_le();

    match state.create_room(name, max_players) {
        Ok((_, body)) => Reply::ok(body),
        Err(EntryError::Directory(DirectoryError::PoolExhausted)) => Reply::code(
            StatusCode::INTERNAL_SERVER_ERROR,
            ResponseCode::NgCreateRoomCapacityOver,
        ),
        Err(EntryError::Directory(e)) => {
            debug!(name, "create rejected: {e}");
            Reply::read_failed()
        }
        Err(EntryError::Codec(e)) => {
            warn!(name, "encoding create response failed: {e}");
            Reply::code(StatusCode::INTERNAL_SERVER_ERROR, ResponseCode::NgResponseWriteFailed)
        }
    }
}

fn join_prepare_polling(name: &str, mut body: &[u8], state: &ServerState) -> Reply {
    let Ok(seed) = decode_join_seed(&mut body) else {
        return Reply::empty(StatusCode::BAD_REQUEST);
    };
    match state.join_prepare_polling(name, &seed) {
        Ok(PollOutcome::Prepared(payload)) => Reply::ok(payload),
        Ok(PollOutcome::KeepPolling) => Reply::empty(StatusCode::ACCEPTED),
        Ok(PollOutcome::RoomFull) => Reply::empty(StatusCode::SERVICE_UNAVAILABLE),
        Ok(PollOutcome::TimedOut) => Reply::empty(StatusCode::REQUEST_TIMEOUT),
        Err(EntryError::Directory(_)) => Reply::not_found(),
        Err(EntryError::Codec(_)) => Reply::empty(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn join_prepare_complete(name: &str, mut body: &[u8], state: &ServerState) -> Reply {
    let Ok(seed) = decode_join_seed(&mut body) else {
        return Reply::empty(StatusCode::BAD_REQUEST);
    };
    match state.join_prepare_complete(name, &seed) {
        Ok(CompleteOutcome::Completed) => Reply::empty(StatusCode::OK),
        Ok(CompleteOutcome::SeedMismatch) => Reply::empty(StatusCode::CONFLICT),
        Err(_) => Reply::not_found(),
    }
}

fn room_property(name: &str, query: Option<&str>, state: &ServerState) -> Reply {
    let key = get_query_param(query, "key").unwrap_or(LEGACY_PROPERTY_KEY);
    match state.room_property(name, key) {
        Ok(body) => Reply::ok(body),
        Err(EntryError::Directory(_)) => Reply::not_found(),
        Err(EntryError::Codec(e)) => {
            warn!(name, key, "encoding property failed: {e}");
            Reply::code(StatusCode::INTERNAL_SERVER_ERROR, ResponseCode::NgResponseWriteFailed)
        }
    }
}

/// Route one buffered request.
pub fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    user_agent: Option<&str>,
    body: &[u8],
    state: &ServerState,
) -> Reply {
    match path {
        "/version" if *method == Method::GET => return version(user_agent, state),
        "/logon" | "/logoff" if *method == Method::POST => return Reply::ok("OK"),
        "/rooms" if *method == Method::GET => return list_rooms(state),
        _ => {}
    }

    let routed = [
        (CREATE_PREFIX, Method::POST),
        (POLL_PREFIX, Method::PUT),
        (COMPLETE_PREFIX, Method::POST),
        (PROP_PREFIX, Method::GET),
    ]
    .into_iter()
    .find_map(|(prefix, expected)| {
        let name = extract_name(path, prefix).filter(|_| *method == expected)?;
        Some((prefix, name))
    });
    let Some((prefix, name)) = routed else {
        debug!(%method, path, "no route");
        return Reply::not_found();
    };

    let name = match name {
        Ok(name) => name,
        Err(e) => {
            debug!(path, "room name is not UTF-8: {e}");
            return match prefix {
                CREATE_PREFIX => Reply::read_failed(),
                _ => Reply::empty(StatusCode::BAD_REQUEST),
            };
        }
    };
    match prefix {
        CREATE_PREFIX => create_room(&name, body, state),
        POLL_PREFIX => join_prepare_polling(&name, body, state),
        COMPLETE_PREFIX => join_prepare_complete(&name, body, state),
        _ => room_property(&name, query, state),
    }
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut body = request.into_body();
    let contents = body.contents().await?.to_vec();

    let reply = route(
        &method,
        uri.path(),
        uri.query(),
        user_agent.as_deref(),
        &contents,
        state,
    );
    debug!(%method, path = uri.path(), status = %reply.status, len = reply.body.len(), "reply");

    let mut response = Response::new(Body::from(reply.body.to_vec()));
    *response.status_mut() = reply.status;
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}
