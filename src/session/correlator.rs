//! Request/response correlation
//!
//! Replies are paired with requests strictly 1:1 and in send order. A
//! message is a request iff it carries an `id` field; a notification is
//! sent and never read for. A server that answers notifications shifts
//! every later pairing by one line, which is detected here rather than
//! silently misattributed.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{timeout, Instant};

use crate::common::{Error, Result};
use crate::protocol::{describe_id, Message, Response};
use crate::transport::{Shutdown, Transport};

/// Result of pushing one message through the transport
#[derive(Debug)]
pub enum Exchange {
    /// Notification sent; nothing was read
    Sent,
    /// Request answered by a parseable line
    Replied { line: String, response: Response },
    /// Request answered by a line that is not a JSON object; the line is consumed
    Malformed { line: String, error: Error },
    /// The line read for this request evidently belongs to another message
    Desynchronized {
        line: String,
        response: Response,
        reason: String,
    },
}

/// Pairs replies with the requests that produced them
#[derive(Debug, Default)]
pub struct Correlator {
    /// Ids of requests whose reply has already been consumed
    answered_ids: Vec<Value>,
    /// Notifications sent since the last reply was read
    pending_notifications: usize,
    requests_sent: usize,
    replies_read: usize,
    desync: Option<String>,
}

/// Number of reply lines a conformant server produces for these messages
pub fn expected_replies(messages: &[Message]) -> usize {
    messages.iter().filter(|m| m.is_request()).count()
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests_sent(&self) -> usize {
        self.requests_sent
    }

    pub fn replies_read(&self) -> usize {
        self.replies_read
    }

    /// Reason the session lost sync, if it has
    pub fn desynchronized(&self) -> Option<&str> {
        self.desync.as_deref()
    }

    /// Send one message and, if it is a request, read exactly one line for it
    ///
    /// `budget` covers the write and the read together; a server that
    /// stops draining its input times out like one that never answers.
    pub async fn exchange(
        &mut self,
        transport: &mut dyn Transport,
        message: &Message,
        budget: Duration,
    ) -> Result<Exchange> {
        let started = Instant::now();
        timeout(budget, transport.send(message))
            .await
            .map_err(|_| Error::Timeout(budget.as_millis() as u64))??;

        let Some(expected) = message.id() else {
            self.pending_notifications += 1;
            tracing::debug!(method = ?message.method(), "Notification sent, not waiting for a reply");
            return Ok(Exchange::Sent);
        };
        self.requests_sent += 1;

        let remaining = budget.saturating_sub(started.elapsed());
        let line = match transport.receive_line(remaining).await {
            Ok(line) => line,
            Err(Error::MalformedResponse(detail)) => {
                self.consume_reply(expected);
                return Ok(Exchange::Malformed {
                    line: String::new(),
                    error: Error::MalformedResponse(detail),
                });
            }
            Err(Error::Timeout(_)) => return Err(Error::Timeout(budget.as_millis() as u64)),
            Err(e) => return Err(e),
        };
        let notifications = self.consume_reply(expected);

        let response = match Response::parse(&line) {
            Ok(response) => response,
            Err(error) => return Ok(Exchange::Malformed { line, error }),
        };

        if let Some(reason) = self.check_sync(expected, &response, notifications) {
            tracing::warn!(%reason, "Session desynchronized");
            self.desync = Some(reason.clone());
            return Ok(Exchange::Desynchronized {
                line,
                response,
                reason,
            });
        }

        Ok(Exchange::Replied { line, response })
    }

    /// Record that a line was consumed for the request with this id
    fn consume_reply(&mut self, expected: &Value) -> usize {
        self.replies_read += 1;
        self.answered_ids.push(expected.clone());
        std::mem::take(&mut self.pending_notifications)
    }

    /// Decide whether a reply with a wrong id means the stream is shifted
    ///
    /// An id that is merely wrong is the validator's business. The stream
    /// is considered shifted only when the reply carries no usable id right
    /// after notifications were sent, or repeats the id of a request that
    /// was already answered.
    fn check_sync(&self, expected: &Value, response: &Response, notifications: usize) -> Option<String> {
        match response.id() {
            Some(actual) if actual == expected => None,
            None | Some(Value::Null) if notifications > 0 => Some(format!(
                "reply read for request {} has id {}; it most likely answers one of the {} notification(s) sent before it",
                expected,
                describe_id(response.id()),
                notifications
            )),
            Some(actual) if self.answered_ids[..self.answered_ids.len() - 1].contains(actual) => {
                Some(format!(
                    "reply read for request {} carries id {} of a request that was already answered",
                    expected, actual
                ))
            }
            _ => None,
        }
    }

    /// Close the books on a session given the lines nobody asked for
    ///
    /// Returns a session-level desynchronization description if the server
    /// produced more output than there were requests.
    pub fn finish(&self, leftover: &[String]) -> Option<String> {
        if leftover.is_empty() {
            return None;
        }
        let preview: Vec<&str> = leftover.iter().map(|l| truncate(l, 200)).collect();
        Some(format!(
            "{} unsolicited line(s) after {} expected repl{}: {}",
            leftover.len(),
            self.requests_sent,
            if self.requests_sent == 1 { "y" } else { "ies" },
            preview.join(" | ")
        ))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
