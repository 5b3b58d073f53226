//! comment.rs: input record and the three-way verdict.
//!
//! `CommentRecord` is what the submission pipeline hands over; `Verdict` is the only
//! thing it needs back. Both serialize so the HTTP layer can pass them through as-is.

use serde::{Deserialize, Serialize};

/// Final classification of one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Moderate,
    Rejected,
}

impl Verdict {
    /// Stable label used by counters, metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Moderate => "moderate",
            Verdict::Rejected => "rejected",
        }
    }

    /// The host must keep the comment out of the public listing.
    pub fn is_held(self) -> bool {
        self == Verdict::Moderate
    }

    /// The host must abort the submission.
    pub fn is_discarded(self) -> bool {
        self == Verdict::Rejected
    }
}

/// One submitted comment, owned by the caller for the duration of an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Author display name.
    pub name: String,
    pub email: String,
    /// Declared website; empty string and `None` are treated the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub body: String,
    /// Submitter network address, used only for the history lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl CommentRecord {
    pub fn new(name: impl Into<String>, email: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            website: None,
            body: body.into(),
            ip: None,
        }
    }

    pub fn with_website(mut self, url: impl Into<String>) -> Self {
        self.website = Some(url.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Declared website, `None` when absent or empty.
    pub fn website_url(&self) -> Option<&str> {
        self.website.as_deref().filter(|w| !w.is_empty())
    }

    /// Submitter address, `None` when absent or empty.
    pub fn ip_addr(&self) -> Option<&str> {
        self.ip.as_deref().filter(|ip| !ip.is_empty())
    }

    /// Body as analysed: the submission pipeline slashes quotes, so backslashes are dropped.
    pub fn raw_body(&self) -> String {
        self.body.replace('\\', "")
    }
}
