use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use pretty_assertions::assert_eq;

use super::*;
use crate::{
    backoff::RetryPolicy,
    codec::FrameError,
    commands::{FetchSchema, TsCell, TsDelete, UpdateCounter},
    transport::{BoxFuture, Transport},
};

/// Replays canned results in order and records every request it sees.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<WireResponse, TransportError>>>,
    seen: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    fn new(script: impl IntoIterator<Item = Result<WireResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::default(),
        }
    }

    fn sends(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, TransportError>> {
        self.seen.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| Err(TransportError::Frame(FrameError::Closed)))
        })
    }
}

/// Never answers.
struct SilentTransport;

impl Transport for SilentTransport {
    fn send(&self, _request: WireRequest) -> BoxFuture<'_, Result<WireResponse, TransportError>> {
        Box::pin(std::future::pending())
    }
}

fn io_error() -> TransportError {
    TransportError::Frame(FrameError::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "reset",
    )))
}

fn deleted() -> Result<WireResponse, TransportError> {
    Ok(WireResponse::new(MessageCode::TsDelResp, Vec::new()))
}

/// Collects every callback invocation.
fn recorder() -> (
    impl FnOnce(Result<bool, CommandError>) + Send + 'static,
    Arc<Mutex<Vec<Result<bool, CommandError>>>>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    (move |result| sink.lock().unwrap().push(result), calls)
}

fn delete(callback: impl FnOnce(Result<bool, CommandError>) + Send + 'static) -> Command<TsDelete> {
    TsDelete::builder()
        .with_table("GeoCheckin")
        .with_key([TsCell::varchar("hash1"), TsCell::Timestamp(1)])
        .with_callback(callback)
        .build()
        .unwrap()
}

#[tokio::test]
async fn success_fires_callback_once() {
    let transport = ScriptedTransport::new([deleted()]);
    let (callback, calls) = recorder();

    let state = delete(callback)
        .execute(&transport, &RetryPolicy::immediate())
        .await;

    assert_eq!(state, CommandState::Succeeded);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], Ok(true)));
    assert_eq!(transport.sends(), 1);
}

#[tokio::test]
async fn delete_with_one_retry_fails_after_two_sends() {
    let transport = ScriptedTransport::new([Err(io_error()), Err(io_error())]);
    let (callback, calls) = recorder();

    let cmd = delete(callback);
    assert_eq!(cmd.remaining_retries(), 1);
    let state = cmd.execute(&transport, &RetryPolicy::immediate()).await;

    assert_eq!(state, CommandState::FatalFailed);
    assert_eq!(transport.sends(), 2);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Err(CommandError::Transport { attempts, .. }) => assert_eq!(*attempts, 2),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn retry_budget_bounds_sends() {
    for budget in [0u32, 1, 3] {
        let transport = ScriptedTransport::new((0..10).map(|_| Err(io_error())));
        let (callback, calls) = recorder();
        let cmd = TsDelete::builder()
            .with_table("t")
            .with_key([TsCell::Sint64(1)])
            .with_max_retries(budget)
            .with_callback(callback)
            .build()
            .unwrap();

        cmd.execute(&transport, &RetryPolicy::immediate()).await;

        assert_eq!(transport.sends(), budget as usize + 1, "budget {budget}");
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn retry_recovers_after_transient_error() {
    let transport = ScriptedTransport::new([Err(io_error()), deleted()]);
    let (callback, calls) = recorder();

    let state = delete(callback)
        .execute(&transport, &RetryPolicy::immediate())
        .await;

    assert_eq!(state, CommandState::Succeeded);
    assert_eq!(transport.sends(), 2);
    assert!(matches!(calls.lock().unwrap()[0], Ok(true)));
}

#[tokio::test]
async fn retried_request_is_identical() {
    let transport = ScriptedTransport::new([Err(io_error()), deleted()]);
    delete(|_| {})
        .execute(&transport, &RetryPolicy::immediate())
        .await;

    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let error = WireResponse::encode(
        MessageCode::ErrorResp,
        &pb::RpbErrorResp {
            errmsg: Some(b"table not found".to_vec()),
            errcode: Some(1),
        },
    );
    let transport = ScriptedTransport::new([Ok(error), deleted()]);
    let (callback, calls) = recorder();

    let state = delete(callback)
        .execute(&transport, &RetryPolicy::immediate())
        .await;

    assert_eq!(state, CommandState::FatalFailed);
    assert_eq!(transport.sends(), 1);
    match &calls.lock().unwrap()[0] {
        Err(CommandError::Server { code, message }) => {
            assert_eq!(*code, 1);
            assert_eq!(message, "table not found");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_response_code_is_fatal() {
    let transport = ScriptedTransport::new([Ok(WireResponse::new(
        MessageCode::DtFetchResp,
        Vec::new(),
    ))]);
    let (callback, calls) = recorder();

    delete(callback)
        .execute(&transport, &RetryPolicy::immediate())
        .await;

    assert_eq!(transport.sends(), 1);
    match &calls.lock().unwrap()[0] {
        Err(CommandError::UnexpectedResponse { expected, actual }) => {
            assert_eq!(*expected, MessageCode::TsDelResp);
            assert_eq!(*actual, MessageCode::DtFetchResp.as_u8());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn non_retryable_transport_error_fails_immediately() {
    let transport = ScriptedTransport::new([
        Err(TransportError::Frame(FrameError::TooLarge { len: usize::MAX })),
        deleted(),
    ]);
    let (callback, calls) = recorder();

    let cmd = delete(callback);
    assert_eq!(cmd.remaining_retries(), 1);
    let state = cmd.execute(&transport, &RetryPolicy::immediate()).await;

    assert_eq!(state, CommandState::FatalFailed);
    assert_eq!(transport.sends(), 1);
    assert!(calls.lock().unwrap()[0].as_ref().is_err_and(|e| e.is_transport()));
}

#[tokio::test]
async fn dropping_in_flight_command_reports_abandoned() {
    let (callback, calls) = recorder();
    let cmd = delete(callback);

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        cmd.execute(&SilentTransport, &RetryPolicy::immediate()),
    )
    .await;
    assert!(outcome.is_err());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], Err(CommandError::Abandoned)));
}

#[tokio::test]
async fn dropping_unsent_command_does_not_fire() {
    let (callback, calls) = recorder();
    drop(delete(callback));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_delete_reports_true_both_times() {
    let transport = ScriptedTransport::new([deleted(), deleted()]);
    let results = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let results = Arc::clone(&results);
        delete(move |r| {
            if matches!(r, Ok(true)) {
                results.fetch_add(1, Ordering::SeqCst);
            }
        })
        .execute(&transport, &RetryPolicy::immediate())
        .await;
    }

    assert_eq!(results.load(Ordering::SeqCst), 2);
    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen[0], seen[1]);
}

#[test]
fn missing_callback_is_a_validation_error() {
    let err = FetchSchema::builder()
        .with_schema_name("my_schema")
        .build()
        .unwrap_err();
    assert_eq!(err, crate::validate::ValidationError::missing("callback"));
    assert_eq!(err.to_string(), "callback is required");
}

#[test]
fn max_retries_overrides_kind_default() {
    let cmd = UpdateCounter::builder()
        .with_bucket("b")
        .with_increment(1)
        .with_max_retries(4)
        .with_callback(|_| {})
        .build()
        .unwrap();
    assert_eq!(cmd.remaining_retries(), 4);
    assert_eq!(cmd.state(), CommandState::Validated);
}

#[test]
fn default_retries_follow_idempotence() {
    for kind in CommandKind::ALL {
        let expected = match kind {
            CommandKind::UpdateCounter | CommandKind::UpdateMap => 0,
            _ => 1,
        };
        assert_eq!(kind.default_retries(), expected, "{kind}");
    }
}

#[test]
fn kinds_round_trip_through_names() {
    for kind in CommandKind::ALL {
        assert_eq!(kind.name().parse::<CommandKind>(), Ok(kind));
        assert!(!kind.options().is_empty());
    }
    assert!("fetch_list".parse::<CommandKind>().is_err());
}

#[test]
fn completion_channel_delivers_result() {
    let (callback, mut rx) = completion_channel::<bool>();
    callback(Ok(true));
    assert!(matches!(rx.try_recv(), Ok(Ok(true))));
}
