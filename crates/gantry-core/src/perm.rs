//! Access control over refs.
//!
//! The engine consults a [`PermissionBackend`] before every ref mutation and
//! while filtering advertisements. [`RuleSet`] is the in-memory
//! implementation: an ordered list of allow/deny rules with glob patterns
//! over ref names, first match wins, falling back to per-access defaults.

use std::fmt;

use gantry_git::RefName;
use glob::Pattern;
use thiserror::Error;

use crate::model::AccountId;

/// The access checks the engine performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// See a ref in the advertisement and fetch it.
    Read,
    /// Update a ref (create, fast-forward, delete with force).
    Push,
    /// Rewind or delete a ref. Never granted by default.
    ForcePush,
    /// Submit a change to this branch.
    Submit,
    /// Upload draft changes. Ref-independent.
    UploadDrafts,
    /// See other users' private changes. Ref-independent.
    ViewPrivateChanges,
    /// Bypass all visibility rules. Ref-independent.
    AccessDatabase,
}

/// What the engine asks about an identity.
pub trait PermissionBackend: Send + Sync {
    fn can_read(&self, who: AccountId, name: &RefName) -> bool;
    fn can_push(&self, who: AccountId, name: &RefName, force: bool) -> bool;
    fn can_submit(&self, who: AccountId, name: &RefName) -> bool;
    fn can_upload_drafts(&self, who: AccountId) -> bool;
    fn can_view_private_changes(&self, who: AccountId) -> bool;
    fn can_access_database(&self, who: AccountId) -> bool;
}

#[derive(Clone, Debug)]
struct Rule {
    account: Option<AccountId>,
    access: Access,
    pattern: Pattern,
    allow: bool,
}

/// Ordered allow/deny rules over ref-name globs.
#[derive(Clone, Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

/// A rule pattern that is not a valid glob.
#[derive(Debug, Error)]
#[error("invalid ref pattern {pattern:?}: {source}")]
pub struct PatternError {
    /// The pattern as given.
    pub pattern: String,
    source: glob::PatternError,
}

impl RuleSet {
    /// The permissive baseline: everyone may read, push, submit, and upload
    /// drafts anywhere. Force-push and the private-change capabilities still
    /// require explicit grants.
    #[must_use]
    pub fn open() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append an allow rule. `account` of `None` matches everyone.
    pub fn allow(
        self,
        account: Option<AccountId>,
        access: Access,
        pattern: &str,
    ) -> Result<Self, PatternError> {
        self.rule(account, access, pattern, true)
    }

    /// Append a deny rule. `account` of `None` matches everyone.
    pub fn deny(
        self,
        account: Option<AccountId>,
        access: Access,
        pattern: &str,
    ) -> Result<Self, PatternError> {
        self.rule(account, access, pattern, false)
    }

    fn rule(
        mut self,
        account: Option<AccountId>,
        access: Access,
        pattern: &str,
        allow: bool,
    ) -> Result<Self, PatternError> {
        let compiled = Pattern::new(pattern).map_err(|source| PatternError {
            pattern: pattern.to_owned(),
            source,
        })?;
        self.rules.push(Rule {
            account,
            access,
            pattern: compiled,
            allow,
        });
        Ok(self)
    }

    /// First matching rule wins; no match falls back to the access default.
    fn decide(&self, who: AccountId, access: Access, name: Option<&RefName>) -> bool {
        for rule in &self.rules {
            if rule.access != access {
                continue;
            }
            if rule.account.is_some_and(|a| a != who) {
                continue;
            }
            if let Some(name) = name {
                if !rule.pattern.matches(name.as_str()) {
                    continue;
                }
            }
            return rule.allow;
        }
        default_for(access)
    }
}

const fn default_for(access: Access) -> bool {
    match access {
        Access::Read | Access::Push | Access::Submit | Access::UploadDrafts => true,
        Access::ForcePush | Access::ViewPrivateChanges | Access::AccessDatabase => false,
    }
}

impl PermissionBackend for RuleSet {
    fn can_read(&self, who: AccountId, name: &RefName) -> bool {
        self.decide(who, Access::Read, Some(name))
    }

    fn can_push(&self, who: AccountId, name: &RefName, force: bool) -> bool {
        if force {
            self.decide(who, Access::ForcePush, Some(name))
        } else {
            self.decide(who, Access::Push, Some(name))
        }
    }

    fn can_submit(&self, who: AccountId, name: &RefName) -> bool {
        self.decide(who, Access::Submit, Some(name))
    }

    fn can_upload_drafts(&self, who: AccountId) -> bool {
        self.decide(who, Access::UploadDrafts, None)
    }

    fn can_view_private_changes(&self, who: AccountId) -> bool {
        self.decide(who, Access::ViewPrivateChanges, None)
    }

    fn can_access_database(&self, who: AccountId) -> bool {
        self.decide(who, Access::AccessDatabase, None)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Push => "push",
            Self::ForcePush => "force-push",
            Self::Submit => "submit",
            Self::UploadDrafts => "upload-drafts",
            Self::ViewPrivateChanges => "view-private-changes",
            Self::AccessDatabase => "access-database",
        };
        f.write_str(s)
    }
}
