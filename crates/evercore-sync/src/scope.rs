//! The two kinds of sync scope: the user's own data, and one linked notebook.

use std::fmt;

use evercore_core::domain::Guid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncScope {
    UserOwn,
    LinkedNotebook(Guid),
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::UserOwn => write!(f, "user-own"),
            SyncScope::LinkedNotebook(guid) => write!(f, "linked-notebook({guid})"),
        }
    }
}
