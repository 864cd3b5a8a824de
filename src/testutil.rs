//! In-memory test doubles for the transport and sleeper seams.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;
use crate::http::{HttpResponse, ProgressFn, Transport};
use crate::upload::retry::Sleeper;

#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    pub body: String,
}

/// Scripted [`Transport`]: PUTs succeed with a synthetic ETag unless a
/// status is queued for the URL; POSTs answer with configured bodies.
/// Everything sent is recorded for assertions.
#[derive(Default)]
pub struct FakeTransport {
    puts: Mutex<Vec<RecordedPut>>,
    posts: Mutex<Vec<RecordedPost>>,
    put_statuses: Mutex<HashMap<String, VecDeque<u16>>>,
    post_responses: Mutex<HashMap<String, (u16, String)>>,
    put_delay: Mutex<Option<Duration>>,
    put_delays: Mutex<HashMap<String, Duration>>,
    no_etags: Mutex<bool>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    etag_counter: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to POSTs on `url` with 200 and the given body.
    pub fn set_post_response(&self, url: &str, body: &str) {
        self.post_responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (200, body.to_string()));
    }

    pub fn set_post_status(&self, url: &str, status: u16, body: &str) {
        self.post_responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    /// Queue a status for the next PUT to `url`; once the queue drains,
    /// further PUTs succeed.
    pub fn queue_put_status(&self, url: &str, status: u16) {
        self.put_statuses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_put_delay_for(&self, url: &str, delay: Duration) {
        self.put_delays
            .lock()
            .unwrap()
            .insert(url.to_string(), delay);
    }

    /// Make successful PUTs omit the ETag header.
    pub fn suppress_etags(&self) {
        *self.no_etags.lock().unwrap() = true;
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }

    /// Highest number of PUTs observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_put_status(&self, url: &str) -> u16 {
        self.put_statuses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(200)
    }

    fn put_delay_for(&self, url: &str) -> Option<Duration> {
        self.put_delays
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .or(*self.put_delay.lock().unwrap())
    }
}

impl Transport for FakeTransport {
    fn put<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
        body: Bytes,
        progress: Option<ProgressFn>,
    ) -> BoxFuture<'a, Result<HttpResponse>> {
        Box::pin(async move {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay) = self.put_delay_for(url) {
                tokio::time::sleep(delay).await;
            }

            self.puts.lock().unwrap().push(RecordedPut {
                url: url.to_string(),
                headers: headers.to_vec(),
                len: body.len(),
            });

            let status = self.next_put_status(url);
            if status < 300 {
                if let Some(report) = progress {
                    report(body.len() as u64);
                }
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let etag = if *self.no_etags.lock().unwrap() || status >= 300 {
                None
            } else {
                let n = self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1;
                Some(format!("\"etag-{n}\""))
            };
            Ok(HttpResponse {
                status,
                etag,
                body: String::new(),
            })
        })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
        content_type: &'a str,
        body: String,
    ) -> BoxFuture<'a, Result<HttpResponse>> {
        Box::pin(async move {
            self.posts.lock().unwrap().push(RecordedPost {
                url: url.to_string(),
                headers: headers.to_vec(),
                content_type: content_type.to_string(),
                body,
            });
            let (status, body) = self
                .post_responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or((200, "{}".to_string()));
            Ok(HttpResponse {
                status,
                etag: None,
                body,
            })
        })
    }
}

/// [`Sleeper`] that records requested delays without waiting.
#[derive(Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.slept.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}
