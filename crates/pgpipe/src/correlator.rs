//! Request/response correlation for a pipelined connection.
//!
//! A single frontend submission routinely provokes a variable number of
//! backend messages: a startup packet is answered by an authentication
//! request, a run of `ParameterStatus` messages, `BackendKeyData` and finally
//! `ReadyForQuery`. The [`Correlator`] pairs those responses with the exchange
//! that caused them.
//!
//! Exchanges are answered strictly in submission order. Each one carries a
//! predicate that inspects every incoming message and decides whether the
//! exchange is complete. The result is delivered through a oneshot slot
//! wrapped by [`ExchangeHandle`].
//!
//! Flow control runs in both directions:
//!
//! - Output: queued frontend messages are handed to the [`OutputSink`] one
//!   per unit of demand granted through [`Correlator::request`].
//! - Input: the correlator advertises how many backend messages it is ready
//!   for ([`Correlator::input_demand`]). The driver must not deliver more.
//!
//! The correlator is a plain single-threaded state object; it performs no
//! I/O and never blocks.

// The Error type is intentionally large to carry full context
#![allow(clippy::result_large_err)]

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use pgpipe_core::error::{ConnectionErrorKind, Error, ServerError};
use pgpipe_core::protocol::{BackendMessage, FrontendMessage};

/// Completion predicate: `Ok(true)` completes the exchange, `Ok(false)` asks
/// for another message, `Err` fails the exchange.
pub type InputPredicate = Box<dyn FnMut(&BackendMessage) -> Result<bool, Error> + Send>;

/// Recognizes the last message the server sends for a failed exchange.
pub type SettlePredicate = Box<dyn FnMut(&BackendMessage) -> bool + Send>;

/// What an exchange resolves to.
pub type ExchangeResult = Result<Vec<BackendMessage>, Error>;

/// Downstream consumer of frontend messages released by the correlator.
pub trait OutputSink {
    fn deliver(&mut self, msg: FrontendMessage);
}

impl OutputSink for Vec<FrontendMessage> {
    fn deliver(&mut self, msg: FrontendMessage) {
        self.push(msg);
    }
}

/// One request/response unit: the messages to send and how to recognize the
/// end of the answer.
pub struct Exchange {
    messages: Vec<FrontendMessage>,
    on_input: InputPredicate,
    settle: Option<SettlePredicate>,
}

impl Exchange {
    pub fn new<F>(messages: Vec<FrontendMessage>, on_input: F) -> Self
    where
        F: FnMut(&BackendMessage) -> Result<bool, Error> + Send + 'static,
    {
        Self {
            messages,
            on_input: Box::new(on_input),
            settle: None,
        }
    }

    /// Exchange that completes on `ReadyForQuery` and fails on
    /// `ErrorResponse`. After a failure the trailing messages up to and
    /// including the `ReadyForQuery` are discarded.
    pub fn until_ready(messages: Vec<FrontendMessage>) -> Self {
        Self::new(messages, |msg| match msg {
            BackendMessage::ReadyForQuery(_) => Ok(true),
            BackendMessage::ErrorResponse(fields) => {
                Err(Error::Server(ServerError::from_fields(fields.clone())))
            }
            _ => Ok(false),
        })
        .settle_on(|msg| matches!(msg, BackendMessage::ReadyForQuery(_)))
    }

    /// Drain trailing responses after a failure until `settle` accepts one.
    ///
    /// Without a settle predicate the next pending exchange becomes current
    /// as soon as this one fails.
    pub fn settle_on<F>(mut self, settle: F) -> Self
    where
        F: FnMut(&BackendMessage) -> bool + Send + 'static,
    {
        self.settle = Some(Box::new(settle));
        self
    }

    pub fn messages(&self) -> &[FrontendMessage] {
        &self.messages
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("messages", &self.messages)
            .field("settles", &self.settle.is_some())
            .finish_non_exhaustive()
    }
}

/// Caller's side of an exchange's result slot.
#[derive(Debug)]
pub struct ExchangeHandle {
    id: u64,
    rx: oneshot::Receiver<ExchangeResult>,
}

impl ExchangeHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the result if the exchange has completed.
    ///
    /// Returns the result at most once; later calls report a closed slot.
    pub fn try_take(&mut self) -> Option<ExchangeResult> {
        match self.rx.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(slot_dropped(self.id))),
        }
    }
}

impl Future for ExchangeHandle {
    type Output = ExchangeResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|oneshot::Canceled| Err(slot_dropped(id))))
    }
}

fn slot_dropped(id: u64) -> Error {
    Error::connection(
        ConnectionErrorKind::Disconnected,
        format!("exchange {id} was dropped before it completed"),
    )
}

struct PendingExchange {
    id: u64,
    on_input: InputPredicate,
    settle: Option<SettlePredicate>,
    responses: Vec<BackendMessage>,
    tx: oneshot::Sender<ExchangeResult>,
}

impl PendingExchange {
    fn resolve(self, result: ExchangeResult) {
        let ok = result.is_ok();
        if self.tx.send(result).is_err() {
            tracing::debug!(exchange = self.id, "Exchange handle dropped; result discarded");
        } else {
            tracing::debug!(exchange = self.id, ok, "Exchange resolved");
        }
    }
}

/// An exchange that failed and is now discarding its trailing responses.
struct Draining {
    id: u64,
    settle: SettlePredicate,
}

/// Asymmetric request/response queue.
///
/// Owns the queued output, the pending exchanges and both demand counters.
/// All mutation goes through `&mut self`, so one connection's correlator is
/// driven from one task.
pub struct Correlator<S: OutputSink> {
    sink: S,
    outbox: VecDeque<FrontendMessage>,
    pending: VecDeque<PendingExchange>,
    current: Option<PendingExchange>,
    draining: Option<Draining>,
    output_demand: u64,
    input_demand: u64,
    next_id: u64,
    closed: Option<String>,
}

impl<S: OutputSink> fmt::Debug for Correlator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("queued_output", &self.outbox.len())
            .field("pending_exchanges", &self.pending_exchanges())
            .field("draining", &self.draining.as_ref().map(|d| d.id))
            .field("output_demand", &self.output_demand)
            .field("input_demand", &self.input_demand)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S: OutputSink> Correlator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            outbox: VecDeque::new(),
            pending: VecDeque::new(),
            current: None,
            draining: None,
            output_demand: 0,
            input_demand: 0,
            next_id: 1,
            closed: None,
        }
    }

    /// Queue `messages` and register an exchange completed by `on_input`.
    pub fn enqueue<F>(&mut self, messages: Vec<FrontendMessage>, on_input: F) -> ExchangeHandle
    where
        F: FnMut(&BackendMessage) -> Result<bool, Error> + Send + 'static,
    {
        self.submit(Exchange::new(messages, on_input))
    }

    /// Queue an exchange.
    ///
    /// Its messages go to the back of the output queue, the exchange goes to
    /// the back of the pending queue, and one unit of input demand is added.
    /// Queued output is flushed as far as current demand allows.
    pub fn submit(&mut self, exchange: Exchange) -> ExchangeHandle {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        let handle = ExchangeHandle { id, rx };

        if let Some(reason) = &self.closed {
            tracing::debug!(exchange = id, "Exchange rejected; pipeline is closed");
            let _ = tx.send(Err(Error::connection(
                ConnectionErrorKind::Disconnected,
                format!("pipeline is closed: {reason}"),
            )));
            return handle;
        }

        let Exchange {
            messages,
            on_input,
            settle,
        } = exchange;
        let count = messages.len();
        self.outbox.extend(messages);
        self.pending.push_back(PendingExchange {
            id,
            on_input,
            settle,
            responses: Vec::new(),
            tx,
        });
        self.input_demand += 1;

        tracing::debug!(
            exchange = id,
            messages = count,
            pending = self.pending_exchanges(),
            "Exchange enqueued"
        );

        self.flush();
        handle
    }

    /// Grant `n` more units of output demand and flush.
    pub fn request(&mut self, n: u64) {
        self.output_demand = self.output_demand.saturating_add(n);
        tracing::trace!(
            granted = n,
            demand = self.output_demand,
            "Output demand granted"
        );
        self.flush();
    }

    /// Downstream cancellation.
    ///
    /// Accepted but not acted on: nothing already queued or pending is
    /// released, and the exchanges keep consuming their responses.
    pub fn cancel(&mut self) {
        tracing::debug!(
            pending = self.pending_exchanges(),
            queued_output = self.outbox.len(),
            "Downstream cancel ignored"
        );
    }

    fn flush(&mut self) {
        while self.output_demand > 0 {
            let Some(msg) = self.outbox.pop_front() else {
                break;
            };
            self.output_demand -= 1;
            tracing::trace!(message = msg.name(), "Delivering frontend message");
            self.sink.deliver(msg);
        }
    }

    /// Route one backend message to the current exchange.
    ///
    /// Delivering input the correlator did not ask for is a contract
    /// violation: every pending exchange fails, the correlator closes, and
    /// the violation is returned as a protocol error.
    pub fn on_input(&mut self, msg: BackendMessage) -> Result<(), Error> {
        if let Some(reason) = &self.closed {
            return Err(Error::protocol(format!(
                "{} received after the pipeline closed: {reason}",
                msg.name()
            )));
        }
        if self.input_demand == 0 {
            return Err(self.violation(format!("{} received without input demand", msg.name())));
        }
        self.input_demand -= 1;

        if let Some(draining) = self.draining.as_mut() {
            if (draining.settle)(&msg) {
                tracing::trace!(exchange = draining.id, "Failed exchange settled");
                self.draining = None;
            } else {
                tracing::warn!(
                    exchange = draining.id,
                    message = msg.name(),
                    "Discarding trailing response of failed exchange"
                );
                self.input_demand += 1;
            }
            return Ok(());
        }

        if self.current.is_none() {
            self.current = self.pending.pop_front();
        }
        let Some(exchange) = self.current.as_mut() else {
            return Err(self.violation(format!(
                "{} received with no pending exchange",
                msg.name()
            )));
        };

        tracing::trace!(exchange = exchange.id, message = msg.name(), "Routing response");
        let verdict = (exchange.on_input)(&msg);
        exchange.responses.push(msg);

        match verdict {
            Ok(false) => self.input_demand += 1,
            Ok(true) => {
                if let Some(mut exchange) = self.current.take() {
                    let responses = std::mem::take(&mut exchange.responses);
                    exchange.resolve(Ok(responses));
                }
            }
            Err(err) => {
                if let Some(mut exchange) = self.current.take() {
                    let responses = std::mem::take(&mut exchange.responses);
                    if let Some(mut settle) = exchange.settle.take() {
                        let settled = responses.last().is_some_and(|last| settle(last));
                        if !settled {
                            self.draining = Some(Draining {
                                id: exchange.id,
                                settle,
                            });
                            self.input_demand += 1;
                        }
                    }
                    tracing::debug!(exchange = exchange.id, error = %err, "Exchange failed");
                    exchange.resolve(Err(err.with_responses(responses)));
                }
            }
        }
        Ok(())
    }

    /// Fail every pending exchange and close the correlator.
    ///
    /// `make_error` is called once per failed exchange. Queued output is
    /// dropped and later submissions resolve immediately with a
    /// `Disconnected` error.
    pub fn fail_all(&mut self, mut make_error: impl FnMut() -> Error) {
        if self.closed.is_none() {
            self.closed = Some(make_error().to_string());
        }
        let dropped_output = self.outbox.len();
        self.outbox.clear();
        self.draining = None;
        self.input_demand = 0;

        let mut failed = 0usize;
        for mut exchange in self.current.take().into_iter().chain(self.pending.drain(..)) {
            let responses = std::mem::take(&mut exchange.responses);
            exchange.resolve(Err(make_error().with_responses(responses)));
            failed += 1;
        }

        tracing::warn!(
            failed,
            dropped_output,
            reason = self.closed.as_deref().unwrap_or_default(),
            "Pipeline closed"
        );
    }

    fn violation(&mut self, message: String) -> Error {
        tracing::warn!(violation = %message, "Correlator contract violated");
        self.fail_all(|| Error::protocol(message.clone()));
        Error::protocol(message)
    }

    /// Backend messages the correlator is ready to accept.
    pub fn input_demand(&self) -> u64 {
        self.input_demand
    }

    pub fn wants_input(&self) -> bool {
        self.input_demand > 0
    }

    /// Output demand granted but not yet used.
    pub fn output_demand(&self) -> u64 {
        self.output_demand
    }

    /// Frontend messages waiting for output demand.
    pub fn queued_output(&self) -> usize {
        self.outbox.len()
    }

    /// Exchanges not yet resolved, including the current one.
    pub fn pending_exchanges(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    /// Whether a failed exchange is still discarding trailing responses.
    pub fn is_draining(&self) -> bool {
        self.draining.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgpipe_core::protocol::{ErrorFields, TransactionStatus};

    fn query(sql: &str) -> FrontendMessage {
        FrontendMessage::Query(sql.to_string())
    }

    fn status(name: &str, value: &str) -> BackendMessage {
        BackendMessage::ParameterStatus {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn ready() -> BackendMessage {
        BackendMessage::ReadyForQuery(TransactionStatus::Idle)
    }

    fn complete(tag: &str) -> BackendMessage {
        BackendMessage::CommandComplete(tag.to_string())
    }

    fn error(code: &str) -> BackendMessage {
        BackendMessage::ErrorResponse(ErrorFields::new("ERROR", code, "boom"))
    }

    fn done(handle: &mut ExchangeHandle) -> Vec<BackendMessage> {
        handle.try_take().expect("exchange resolved").expect("exchange ok")
    }

    fn failed(handle: &mut ExchangeHandle) -> Error {
        handle
            .try_take()
            .expect("exchange resolved")
            .expect_err("exchange failed")
    }

    #[test]
    fn test_enqueue_waits_for_demand() {
        let mut correlator = Correlator::new(Vec::new());
        let _handle = correlator.enqueue(vec![query("SELECT 1"), query("SELECT 2")], |_| Ok(true));

        assert!(correlator.sink().is_empty());
        assert_eq!(correlator.queued_output(), 2);
        assert_eq!(correlator.input_demand(), 1);
        assert!(correlator.wants_input());
    }

    #[test]
    fn test_output_respects_demand() {
        let mut correlator = Correlator::new(Vec::new());
        let _a = correlator.enqueue(vec![query("a"), query("b")], |_| Ok(true));
        let _b = correlator.enqueue(vec![query("c")], |_| Ok(true));

        correlator.request(1);
        assert_eq!(correlator.sink(), &vec![query("a")]);
        assert_eq!(correlator.output_demand(), 0);

        correlator.request(5);
        assert_eq!(correlator.sink(), &vec![query("a"), query("b"), query("c")]);
        assert_eq!(correlator.output_demand(), 3);
        assert_eq!(correlator.queued_output(), 0);

        // Leftover demand is spent on the next enqueue.
        let _c = correlator.enqueue(vec![query("d")], |_| Ok(true));
        assert_eq!(correlator.sink().len(), 4);
        assert_eq!(correlator.output_demand(), 2);
    }

    #[test]
    fn test_zero_demand_never_delivers() {
        let mut correlator = Correlator::new(Vec::new());
        let _handle = correlator.enqueue(vec![query("a")], |_| Ok(true));
        correlator.request(0);
        assert!(correlator.sink().is_empty());
        assert_eq!(correlator.queued_output(), 1);
    }

    #[test]
    fn test_startup_exchange_collects_until_ready() {
        let mut correlator = Correlator::new(Vec::new());
        let mut handle = correlator.submit(Exchange::until_ready(vec![query("startup")]));
        correlator.request(1);

        correlator.on_input(status("server_version", "16.2")).unwrap();
        assert!(handle.try_take().is_none());
        correlator.on_input(status("client_encoding", "UTF8")).unwrap();
        correlator.on_input(ready()).unwrap();

        assert_eq!(
            done(&mut handle),
            vec![
                status("server_version", "16.2"),
                status("client_encoding", "UTF8"),
                ready()
            ]
        );
        assert_eq!(correlator.pending_exchanges(), 0);
        assert!(!correlator.wants_input());
    }

    #[test]
    fn test_fifo_correlation() {
        let mut correlator = Correlator::new(Vec::new());
        let mut first = correlator.submit(Exchange::until_ready(vec![query("one")]));
        let mut second = correlator.submit(Exchange::until_ready(vec![query("two")]));
        correlator.request(2);
        assert_eq!(correlator.input_demand(), 2);

        correlator.on_input(complete("SELECT 1")).unwrap();
        correlator.on_input(ready()).unwrap();
        assert!(second.try_take().is_none());
        correlator.on_input(complete("SELECT 2")).unwrap();
        correlator.on_input(ready()).unwrap();

        assert_eq!(done(&mut first), vec![complete("SELECT 1"), ready()]);
        assert_eq!(done(&mut second), vec![complete("SELECT 2"), ready()]);
    }

    #[test]
    fn test_predicate_true_does_not_request_more_input() {
        let mut correlator = Correlator::new(Vec::new());
        let _handle = correlator.enqueue(vec![query("x")], |_| Ok(true));
        correlator.on_input(complete("X")).unwrap();
        assert_eq!(correlator.input_demand(), 0);
    }

    #[test]
    fn test_error_fails_only_current_exchange() {
        let mut correlator = Correlator::new(Vec::new());
        let mut first = correlator.submit(Exchange::until_ready(vec![query("bad")]));
        let mut second = correlator.submit(Exchange::until_ready(vec![query("good")]));

        correlator.on_input(error("42P01")).unwrap();
        let err = failed(&mut first);
        assert_eq!(err.sqlstate(), Some("42P01"));
        assert_eq!(err.responses(), &[error("42P01")]);

        // The ReadyForQuery closing the failed exchange is not handed to the next one.
        assert!(correlator.is_draining());
        correlator.on_input(ready()).unwrap();
        assert!(!correlator.is_draining());
        assert!(second.try_take().is_none());

        correlator.on_input(complete("SELECT 1")).unwrap();
        correlator.on_input(ready()).unwrap();
        assert_eq!(done(&mut second), vec![complete("SELECT 1"), ready()]);
    }

    #[test]
    fn test_failure_keeps_partial_responses() {
        let mut correlator = Correlator::new(Vec::new());
        let mut handle = correlator.submit(Exchange::until_ready(vec![query("q")]));

        correlator.on_input(complete("SELECT 3")).unwrap();
        correlator.on_input(error("22012")).unwrap();

        let err = failed(&mut handle);
        assert_eq!(err.responses(), &[complete("SELECT 3"), error("22012")]);
        let server = err.server_error().unwrap();
        assert_eq!(server.responses.len(), 2);
        assert_eq!(server.fields.message, "boom");
    }

    #[test]
    fn test_without_settle_next_exchange_sees_trailing_messages() {
        let mut correlator = Correlator::new(Vec::new());
        let mut first = correlator.enqueue(vec![query("a")], |msg| match msg {
            BackendMessage::ErrorResponse(_) => Err(Error::protocol("rejected")),
            _ => Ok(true),
        });
        let mut second = correlator.enqueue(vec![query("b")], |_| Ok(true));

        correlator.on_input(error("XX000")).unwrap();
        assert!(matches!(failed(&mut first), Error::Protocol(_)));
        assert!(!correlator.is_draining());

        correlator.on_input(ready()).unwrap();
        assert_eq!(done(&mut second), vec![ready()]);
    }

    #[test]
    fn test_draining_discards_until_settled() {
        let mut correlator = Correlator::new(Vec::new());
        let mut handle = correlator.submit(Exchange::until_ready(vec![query("q")]));
        correlator.on_input(error("40001")).unwrap();
        assert!(handle.try_take().unwrap().is_err());

        let notice = BackendMessage::NoticeResponse(ErrorFields::new("NOTICE", "00000", "n"));
        correlator.on_input(notice).unwrap();
        assert!(correlator.is_draining());
        assert_eq!(correlator.input_demand(), 1);

        correlator.on_input(ready()).unwrap();
        assert!(!correlator.is_draining());
        assert_eq!(correlator.input_demand(), 0);
    }

    #[test]
    fn test_input_without_exchange_is_fatal() {
        let mut correlator = Correlator::new(Vec::new());
        let err = correlator.on_input(ready()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(correlator.is_closed());

        let mut late = correlator.enqueue(vec![query("late")], |_| Ok(true));
        let err = failed(&mut late);
        assert!(err.is_connection_error());
        assert!(correlator.sink().is_empty());
    }

    #[test]
    fn test_predicate_false_requests_one_more() {
        let mut correlator = Correlator::new(Vec::new());
        let mut seen = 0;
        let mut handle = correlator.enqueue(vec![query("c")], move |_| {
            seen += 1;
            Ok(seen == 3)
        });

        correlator.on_input(complete("C1")).unwrap();
        assert_eq!(correlator.input_demand(), 1);
        correlator.on_input(complete("C2")).unwrap();
        assert!(handle.try_take().is_none());
        correlator.on_input(complete("C3")).unwrap();

        assert_eq!(
            done(&mut handle),
            vec![complete("C1"), complete("C2"), complete("C3")]
        );
        assert_eq!(correlator.input_demand(), 0);
    }

    #[test]
    fn test_input_after_completion_is_fatal() {
        let mut correlator = Correlator::new(Vec::new());
        let mut first = correlator.enqueue(vec![query("a")], |_| Ok(true));
        correlator.on_input(complete("A")).unwrap();
        assert_eq!(done(&mut first), vec![complete("A")]);

        let err = correlator.on_input(complete("stray")).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(correlator.is_closed());
    }

    #[test]
    fn test_fail_all_resolves_everything() {
        let mut correlator = Correlator::new(Vec::new());
        let mut first = correlator.submit(Exchange::until_ready(vec![query("a")]));
        let mut second = correlator.submit(Exchange::until_ready(vec![query("b")]));
        correlator.request(1);
        correlator.on_input(complete("SELECT 1")).unwrap();

        correlator.fail_all(|| {
            Error::connection(ConnectionErrorKind::Disconnected, "connection reset")
        });

        let err = failed(&mut first);
        assert!(err.is_connection_error());
        assert!(failed(&mut second).is_connection_error());
        assert_eq!(correlator.queued_output(), 0);
        assert_eq!(correlator.pending_exchanges(), 0);
        assert!(!correlator.wants_input());
        assert!(correlator.is_closed());
        assert!(correlator.on_input(ready()).is_err());
    }

    #[test]
    fn test_cancel_releases_nothing() {
        let mut correlator = Correlator::new(Vec::new());
        let mut handle = correlator.submit(Exchange::until_ready(vec![query("a")]));
        correlator.cancel();
        assert_eq!(correlator.pending_exchanges(), 1);
        assert_eq!(correlator.queued_output(), 1);

        correlator.on_input(ready()).unwrap();
        assert_eq!(done(&mut handle), vec![ready()]);
    }

    #[test]
    fn test_dropped_handle_still_consumes_its_responses() {
        let mut correlator = Correlator::new(Vec::new());
        drop(correlator.submit(Exchange::until_ready(vec![query("a")])));
        let mut second = correlator.submit(Exchange::until_ready(vec![query("b")]));

        correlator.on_input(complete("A")).unwrap();
        correlator.on_input(ready()).unwrap();
        correlator.on_input(complete("B")).unwrap();
        correlator.on_input(ready()).unwrap();
        assert_eq!(done(&mut second), vec![complete("B"), ready()]);
    }

    #[test]
    fn test_handle_is_a_future() {
        use asupersync::runtime::RuntimeBuilder;

        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");

        let mut correlator = Correlator::new(Vec::new());
        let handle = correlator.submit(Exchange::until_ready(vec![query("a")]));
        correlator.on_input(ready()).unwrap();

        let responses = rt.block_on(handle).unwrap();
        assert_eq!(responses, vec![ready()]);
    }
}
