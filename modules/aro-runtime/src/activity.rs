//! Business-activity labels.
//!
//! The label after a feature set's name says what triggers it:
//!
//! ```text
//! "OrderUpdated Handler"                  → domain event
//! "OrderUpdated Handler<status:shipped>"  → domain event + state guards
//! "user-repository Observer"              → repository change
//! "status StateObserver<draft_to_placed>" → field state transition
//! anything else                           → no implicit trigger
//! ```

use crate::guard::{GuardParseError, StateGuardSet};

pub const APPLICATION_START: &str = "Application-Start";
pub const APPLICATION_END: &str = "Application-End";

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityBinding {
    Event {
        event_type: String,
        guards: StateGuardSet,
    },
    RepositoryObserver {
        repository: String,
    },
    StateObserver {
        field: String,
        transition: Option<(String, String)>,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActivityError {
    #[error("'{0}' names no subject before its trigger keyword")]
    MissingSubject(String),

    #[error("invalid guard in '{label}': {source}")]
    Guard {
        label: String,
        #[source]
        source: GuardParseError,
    },

    #[error("transition '{0}' must look like <from>_to_<to>")]
    Transition(String),
}

impl ActivityBinding {
    pub fn parse(label: &str) -> Result<Self, ActivityError> {
        let label = label.trim();
        let (head, suffix) = split_suffix(label);

        let mut words: Vec<&str> = head.split_whitespace().collect();
        let Some(keyword) = words.pop() else {
            return Ok(ActivityBinding::None);
        };
        let keyword = keyword.to_ascii_lowercase();
        if !matches!(keyword.as_str(), "handler" | "observer" | "stateobserver") {
            return Ok(ActivityBinding::None);
        }
        let subject = words.join(" ");
        if subject.is_empty() {
            return Err(ActivityError::MissingSubject(label.to_string()));
        }

        match keyword.as_str() {
            "handler" => {
                let guards = match suffix {
                    Some(expr) => StateGuardSet::parse(expr).map_err(|source| ActivityError::Guard {
                        label: label.to_string(),
                        source,
                    })?,
                    None => StateGuardSet::empty(),
                };
                Ok(ActivityBinding::Event {
                    event_type: subject,
                    guards,
                })
            }
            "observer" => Ok(ActivityBinding::RepositoryObserver {
                repository: subject,
            }),
            _ => {
                let transition = match suffix {
                    Some(t) => {
                        let (from, to) = t
                            .split_once("_to_")
                            .filter(|(f, t)| !f.trim().is_empty() && !t.trim().is_empty())
                            .ok_or_else(|| ActivityError::Transition(t.to_string()))?;
                        Some((from.trim().to_string(), to.trim().to_string()))
                    }
                    None => None,
                };
                Ok(ActivityBinding::StateObserver {
                    field: subject,
                    transition,
                })
            }
        }
    }
}

/// Split `"Head<inner>"` into `("Head", Some("inner"))`.
fn split_suffix(label: &str) -> (&str, Option<&str>) {
    if let (Some(open), true) = (label.find('<'), label.ends_with('>')) {
        (&label[..open], Some(&label[open + 1..label.len() - 1]))
    } else {
        (label, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_handlers_with_and_without_guards() {
        assert_eq!(
            ActivityBinding::parse("UserCreated Handler").unwrap(),
            ActivityBinding::Event {
                event_type: "UserCreated".into(),
                guards: StateGuardSet::empty(),
            }
        );
        let ActivityBinding::Event { event_type, guards } =
            ActivityBinding::parse("OrderUpdated Handler<status:paid,shipped>").unwrap()
        else {
            panic!("expected event binding");
        };
        assert_eq!(event_type, "OrderUpdated");
        assert_eq!(guards, StateGuardSet::parse("status:paid,shipped").unwrap());
    }

    #[test]
    fn observers() {
        assert_eq!(
            ActivityBinding::parse("user-repository Observer").unwrap(),
            ActivityBinding::RepositoryObserver {
                repository: "user-repository".into()
            }
        );
        assert_eq!(
            ActivityBinding::parse("status StateObserver<draft_to_placed>").unwrap(),
            ActivityBinding::StateObserver {
                field: "status".into(),
                transition: Some(("draft".into(), "placed".into())),
            }
        );
        assert_eq!(
            ActivityBinding::parse("status StateObserver").unwrap(),
            ActivityBinding::StateObserver {
                field: "status".into(),
                transition: None,
            }
        );
    }

    #[test]
    fn plain_labels_bind_nothing() {
        assert_eq!(ActivityBinding::parse("User API").unwrap(), ActivityBinding::None);
        assert_eq!(ActivityBinding::parse("").unwrap(), ActivityBinding::None);
    }

    #[test]
    fn malformed_labels_fail() {
        assert!(matches!(
            ActivityBinding::parse("Handler"),
            Err(ActivityError::MissingSubject(_))
        ));
        assert!(matches!(
            ActivityBinding::parse("E Handler<status>"),
            Err(ActivityError::Guard { .. })
        ));
        assert!(matches!(
            ActivityBinding::parse("status StateObserver<draft>"),
            Err(ActivityError::Transition(_))
        ));
    }
}
