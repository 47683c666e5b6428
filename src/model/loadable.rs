use crate::error::Error;

/// Remote data as seen by a view: not fetched yet, fetched, or failed while
/// still holding whatever was fetched before.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Loadable<T> {
    #[default]
    NotLoaded,
    Loaded(T),
    Failed { error: String, last: Option<T> },
}

impl<T> Loadable<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Loadable::NotLoaded => None,
            Loadable::Loaded(value) => Some(value),
            Loadable::Failed { last, .. } => last.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Loadable::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn fail(self, error: &Error) -> Loadable<T> {
        let last = match self {
            Loadable::NotLoaded => None,
            Loadable::Loaded(value) => Some(value),
            Loadable::Failed { last, .. } => last,
        };

        Loadable::Failed {
            error: error.to_string(),
            last,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Loadable::Loaded(_))
    }
}
