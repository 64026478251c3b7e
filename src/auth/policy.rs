use std::collections::HashSet;

use crate::auth::repo_types::User;

/// Decides which resolved users may perform operator actions.
///
/// Membership is an exact, case-sensitive email match.
#[derive(Debug, Clone, Default)]
pub struct OperatorPolicy {
    emails: HashSet<String>,
}

impl OperatorPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { emails: emails.into_iter().map(Into::into).collect() }
    }

    pub fn allows(&self, user: &User) -> bool {
        self.emails.contains(&user.email)
    }
}
