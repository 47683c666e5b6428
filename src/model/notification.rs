use std::fmt;

/// Transient swap outcome messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Loading,
    Success(String),
    Failure(String),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Notification::Loading => write!(f, "Loading..."),
            Notification::Success(text) | Notification::Failure(text) => {
                write!(f, "{}", text)
            },
        }
    }
}
