//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::transport::{HttpReply, HttpTransport, TransportError};

struct Route {
    pattern: String,
    /// Replies served in order; the last one repeats.
    replies: VecDeque<Result<HttpReply, String>>,
}

/// Answers requests from routes matched by URL substring (first match wins).
/// Unmatched requests get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, replies: Vec<HttpReply>) -> Self {
        let replies = replies.into_iter().map(Ok).collect();
        self.routes.lock().unwrap().push(Route { pattern: pattern.to_string(), replies });
        self
    }

    pub fn json(self, pattern: &str, body: serde_json::Value) -> Self {
        self.route(pattern, vec![HttpReply::ok(body.to_string())])
    }

    pub fn failing(self, pattern: &str, reason: &str) -> Self {
        let replies = VecDeque::from([Err(reason.to_string())]);
        self.routes.lock().unwrap().push(Route { pattern: pattern.to_string(), replies });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn posted_bodies(&self) -> Vec<serde_json::Value> {
        self.bodies.lock().unwrap().clone()
    }

    fn answer(&self, url: &str) -> Result<HttpReply, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.pattern)) else {
            return Ok(HttpReply::status(404));
        };
        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        match reply {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(TransportError::Network(reason)),
            None => Ok(HttpReply::status(404)),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, TransportError> {
        self.answer(url)
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        self.bodies.lock().unwrap().push(body.clone());
        self.answer(url)
    }
}
