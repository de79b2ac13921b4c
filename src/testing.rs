//! Scripted transport for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Once};

use async_trait::async_trait;

use crate::client::Transport;
use crate::error::ConnectionError;
use crate::providers::ec2::ArpTable;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Body(String),
    Fail(ConnectionError),
    /// Never answers.
    Hang,
}

/// Answers each URI with its queued replies in order; the last one repeats.
/// Unknown URIs get a 404.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, uri: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn body(self, uri: &str, body: &str) -> Self {
        self.reply(uri, Reply::Body(body.to_string()))
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, uri: &str) -> Result<String, ConnectionError> {
        self.calls.lock().unwrap().push(uri.to_string());
        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(uri) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(ConnectionError::Http(404)),
        }
    }
}

/// ARP table with fixed contents.
#[derive(Debug)]
pub(crate) struct StaticArp(pub(crate) Option<&'static str>);

#[async_trait]
impl ArpTable for StaticArp {
    async fn entries(&self, _windows: bool) -> Option<String> {
        self.0.map(str::to_string)
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps records on the thread that logged them, so parallel tests stay apart.
struct ThreadLogger;

impl log::Log for ThreadLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()));
        });
    }

    fn flush(&self) {}
}

static LOGGER: ThreadLogger = ThreadLogger;

/// Log records captured on the current thread since [`capture_logs`].
pub(crate) struct LogCapture(());

impl LogCapture {
    pub(crate) fn contains(&self, level: log::Level, needle: &str) -> bool {
        RECORDS.with(|records| {
            records
                .borrow()
                .iter()
                .any(|(l, message)| *l == level && message.contains(needle))
        })
    }
}

/// Start capturing log records on this thread. Tests must run on a
/// current-thread runtime.
pub(crate) fn capture_logs() -> LogCapture {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    });
    RECORDS.with(|records| records.borrow_mut().clear());
    LogCapture(())
}
