//! Parsing of magic review refs.
//!
//! A push to `refs/for/<branch>` asks for review on `<branch>` instead of
//! updating it; `refs/drafts/<branch>` does the same with the draft flag
//! preset. The branch part may carry a topic after a `/`, and a trailing
//! `%opt,opt,...` list tunes the request:
//!
//! ```text
//! refs/for/master
//! refs/for/stable/2.15/my-topic
//! refs/drafts/master
//! refs/for/master%topic=t,r=bob@example.com,l=Verified+1,submit
//! ```
//!
//! Because branch names themselves contain `/`, the branch/topic split is
//! resolved by longest-prefix match against the project's existing branches.
//! Parsing is pure: it consults only the branch snapshot handed in and never
//! touches the repository.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::NotifyMode;

/// Prefix of review pushes.
pub const R_FOR: &str = "refs/for/";
/// Prefix of draft review pushes.
pub const R_DRAFTS: &str = "refs/drafts/";

/// Whether a pushed ref name requests review rather than a direct update.
#[must_use]
pub fn is_magic(ref_name: &str) -> bool {
    ref_name.starts_with(R_FOR) || ref_name.starts_with(R_DRAFTS)
}

/// One option from the `%`-suffix. The set is closed: anything else is a
/// parse error, never a silent skip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushOption {
    /// `draft` — create or extend the change as a draft.
    Draft,
    /// `submit` — submit the change immediately after intake.
    Submit,
    /// `private` — restrict the change to its owner.
    Private,
    /// `topic=<t>` — set the topic, overriding any path-embedded topic.
    Topic(String),
    /// `r=<email>` — add a reviewer.
    Reviewer(String),
    /// `cc=<email>` — add a CC.
    Cc(String),
    /// `l=<Label><signed-int>` — cast a vote while pushing.
    Label {
        /// Label name as written.
        name: String,
        /// Requested value. A bare label with no sign votes `+1`.
        value: i16,
    },
    /// `notify=<mode>` — who to notify about this update.
    Notify(NotifyMode),
    /// `m=<text>` / `message=<text>` — cover message for the patch set,
    /// percent-decoded with `_` standing for space.
    Message(String),
}

/// A syntactically invalid magic ref.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An option outside the closed set, or a known option with a malformed
    /// shape.
    #[error("unknown option: {option}")]
    InvalidOption {
        /// The option text as pushed.
        option: String,
    },
    /// An `l=` value whose vote part is not a signed integer.
    #[error("invalid label vote: {value}")]
    InvalidLabelSyntax {
        /// The `l=` payload as pushed.
        value: String,
    },
    /// Nothing between the magic prefix and the option list.
    #[error("ref must name a destination branch")]
    MissingBranch,
}

/// The decoded intent of a review push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushIntent {
    /// Destination branch, short name. When no existing branch matched the
    /// pushed path the whole path is kept here so intake can report it.
    pub branch: String,
    /// Whether `branch` was found in the branch snapshot.
    pub branch_exists: bool,
    /// Topic, from the path remainder or `topic=`.
    pub topic: Option<String>,
    /// Draft flag, from the `refs/drafts/` prefix or `draft`.
    pub draft: bool,
    /// Submit-after-intake flag.
    pub submit: bool,
    /// Owner-only visibility flag.
    pub private: bool,
    /// Reviewer emails in push order.
    pub reviewers: Vec<String>,
    /// CC emails in push order.
    pub ccs: Vec<String>,
    /// Votes in push order.
    pub votes: Vec<(String, i16)>,
    /// Notification fan-out.
    pub notify: NotifyMode,
    /// Cover message for the created patch set.
    pub message: Option<String>,
}

/// Parse a magic ref name against a snapshot of existing short branch names.
///
/// Branch existence is not enforced here: an unmatched path is carried
/// through in `branch` with `branch_exists` false, so the caller can reject
/// it with the proper message after permission checks.
pub fn parse_magic_ref(
    ref_name: &str,
    branches: &BTreeSet<String>,
) -> Result<PushIntent, ParseError> {
    let (path, draft) = match ref_name.strip_prefix(R_FOR) {
        Some(rest) => (rest, false),
        None => match ref_name.strip_prefix(R_DRAFTS) {
            Some(rest) => (rest, true),
            None => return Err(ParseError::MissingBranch),
        },
    };

    let (path, opts) = match path.split_once('%') {
        Some((p, o)) => (p, Some(o)),
        None => (path, None),
    };
    if path.is_empty() {
        return Err(ParseError::MissingBranch);
    }

    let (branch, branch_exists, mut topic) = split_branch_topic(path, branches);

    let mut intent = PushIntent {
        branch,
        branch_exists,
        topic: None,
        draft,
        submit: false,
        private: false,
        reviewers: Vec::new(),
        ccs: Vec::new(),
        votes: Vec::new(),
        notify: NotifyMode::All,
        message: None,
    };

    if let Some(opts) = opts {
        for raw in opts.split(',') {
            match parse_option(raw)? {
                PushOption::Draft => intent.draft = true,
                PushOption::Submit => intent.submit = true,
                PushOption::Private => intent.private = true,
                PushOption::Topic(t) => topic = Some(t),
                PushOption::Reviewer(r) => intent.reviewers.push(r),
                PushOption::Cc(c) => intent.ccs.push(c),
                PushOption::Label { name, value } => intent.votes.push((name, value)),
                PushOption::Notify(n) => intent.notify = n,
                PushOption::Message(m) => intent.message = Some(m),
            }
        }
    }
    intent.topic = topic.filter(|t| !t.is_empty());
    Ok(intent)
}

/// Longest-prefix branch match. Starting from the full path, shorten at the
/// last `/` until a known branch matches; the remainder is the topic.
fn split_branch_topic(
    path: &str,
    branches: &BTreeSet<String>,
) -> (String, bool, Option<String>) {
    let mut candidate = path;
    loop {
        if branches.contains(candidate) {
            let topic = path[candidate.len()..]
                .strip_prefix('/')
                .map(str::to_owned);
            return (candidate.to_owned(), true, topic);
        }
        match candidate.rfind('/') {
            Some(at) => candidate = &candidate[..at],
            None => return (path.to_owned(), false, None),
        }
    }
}

fn parse_option(raw: &str) -> Result<PushOption, ParseError> {
    let invalid = || ParseError::InvalidOption {
        option: raw.to_owned(),
    };
    if let Some(value) = raw.strip_prefix("topic=") {
        return Ok(PushOption::Topic(value.to_owned()));
    }
    if let Some(value) = raw.strip_prefix("r=") {
        return Ok(PushOption::Reviewer(value.to_owned()));
    }
    if let Some(value) = raw.strip_prefix("cc=") {
        return Ok(PushOption::Cc(value.to_owned()));
    }
    if let Some(value) = raw.strip_prefix("l=") {
        return parse_label_vote(value);
    }
    if let Some(value) = raw.strip_prefix("notify=") {
        return NotifyMode::parse(value).map(PushOption::Notify).ok_or_else(invalid);
    }
    if let Some(value) = raw.strip_prefix("m=").or_else(|| raw.strip_prefix("message=")) {
        return Ok(PushOption::Message(decode_message(value)));
    }
    match raw {
        "draft" => Ok(PushOption::Draft),
        "submit" => Ok(PushOption::Submit),
        "private" => Ok(PushOption::Private),
        _ => Err(invalid()),
    }
}

/// `Code-Review+2` → (`Code-Review`, 2). A label with no trailing vote means
/// `+1`. Hyphens are legal inside label names, so a `-` only starts a vote
/// when everything after it is digits; a `+` always must.
fn parse_label_vote(value: &str) -> Result<PushOption, ParseError> {
    let invalid = || ParseError::InvalidLabelSyntax {
        value: value.to_owned(),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let (name, vote) = if let Some(at) = value.rfind('+') {
        if !digits(&value[at + 1..]) {
            return Err(invalid());
        }
        (&value[..at], value[at..].parse::<i16>().map_err(|_| invalid())?)
    } else if let Some(at) = value.rfind('-').filter(|at| digits(&value[at + 1..])) {
        (&value[..at], value[at..].parse::<i16>().map_err(|_| invalid())?)
    } else {
        (value, 1)
    };
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return Err(invalid());
    }
    Ok(PushOption::Label {
        name: name.to_owned(),
        value: vote,
    })
}

/// Cover messages ride in a ref name, so spaces arrive as `_` and anything
/// else percent-encoded. Decoding is lenient: a malformed escape is kept
/// verbatim.
fn decode_message(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match hex_pair(bytes[i + 1], bytes[i + 2]) {
                Some(b) => {
                    out.push(b);
                    i += 3;
                }
                None => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hex = |b: u8| match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    };
    Some(hex(hi)? << 4 | hex(lo)?)
}
