//! Per-task behaviour plugged into a [`WorkerChannel`].
//!
//! A strategy names the payload schema a channel fetches, parses the
//! task-specific fields of a request, and post-processes the delivered
//! payload. The pipeline itself is shared by every task.
//!
//! [`WorkerChannel`]: crate::channel::WorkerChannel

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use roster_core::{DirectoryPayload, InvariantError, ResponseSchema, UserRecord, UsersPayload};

use crate::protocol::{RequestMessage, TaskKind};

pub trait TaskStrategy: Send + Sync + 'static {
    type Payload: ResponseSchema;
    type Extras: fmt::Debug + Send + 'static;

    const TASK: TaskKind;

    /// Read the task-specific fields of `message`.
    fn parse_extras(&self, message: &RequestMessage) -> Result<Self::Extras, InvariantError>;

    /// Shape the payload delivered to the caller. The cached copy is not affected.
    fn post_process(&self, payload: Self::Payload, _extras: &Self::Extras) -> Self::Payload {
        payload
    }
}

fn reject_arrangement(message: &RequestMessage, task: TaskKind) -> Result<(), InvariantError> {
    if message.arrange_by_field.is_some() || message.arrange_by_direction.is_some() {
        return Err(InvariantError::InvalidValue {
            field: "arrangeByField".to_string(),
            reason: format!("not supported by the {} task", task),
        });
    }
    Ok(())
}

// ============================================================================
// DIRECTORY
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryFetchTask;

impl TaskStrategy for DirectoryFetchTask {
    type Payload = DirectoryPayload;
    type Extras = ();

    const TASK: TaskKind = TaskKind::DirectoryFetch;

    fn parse_extras(&self, message: &RequestMessage) -> Result<(), InvariantError> {
        reject_arrangement(message, Self::TASK)
    }
}

// ============================================================================
// USERS
// ============================================================================

/// Sortable [`UserRecord`] fields, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Username,
    Email,
    FirstName,
    LastName,
    JobPosition,
    Department,
    StoreLocation,
    Active,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::JobPosition => "jobPosition",
            Self::Department => "department",
            Self::StoreLocation => "storeLocation",
            Self::Active => "active",
            Self::CreatedAt => "createdAt",
            Self::UpdatedAt => "updatedAt",
        }
    }

    fn compare(&self, a: &UserRecord, b: &UserRecord) -> Ordering {
        fn text(a: &str, b: &str) -> Ordering {
            a.to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b))
        }
        match self {
            Self::Username => text(&a.username, &b.username),
            Self::Email => text(&a.email, &b.email),
            Self::FirstName => text(&a.first_name, &b.first_name),
            Self::LastName => text(&a.last_name, &b.last_name),
            Self::JobPosition => text(&a.job_position, &b.job_position),
            Self::Department => text(&a.department, &b.department),
            Self::StoreLocation => match (&a.store_location, &b.store_location) {
                (Some(a), Some(b)) => text(a, b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            },
            Self::Active => a.active.cmp(&b.active),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

impl FromStr for SortField {
    type Err = InvariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "username" => Self::Username,
            "email" => Self::Email,
            "firstName" => Self::FirstName,
            "lastName" => Self::LastName,
            "jobPosition" => Self::JobPosition,
            "department" => Self::Department,
            "storeLocation" => Self::StoreLocation,
            "active" => Self::Active,
            "createdAt" => Self::CreatedAt,
            "updatedAt" => Self::UpdatedAt,
            other => {
                return Err(InvariantError::InvalidValue {
                    field: "arrangeByField".to_string(),
                    reason: format!("cannot sort by '{}'", other),
                })
            }
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = InvariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" => Ok(Self::Ascending),
            "descending" => Ok(Self::Descending),
            other => Err(InvariantError::InvalidValue {
                field: "arrangeByDirection".to_string(),
                reason: format!("expected 'ascending' or 'descending', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrangement {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Arrangement {
    /// Stable sort of `records`.
    pub fn apply(&self, records: &mut [UserRecord]) {
        records.sort_by(|a, b| {
            let ordering = self.field.compare(a, b);
            match self.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsersFetchTask;

impl TaskStrategy for UsersFetchTask {
    type Payload = UsersPayload;
    type Extras = Option<Arrangement>;

    const TASK: TaskKind = TaskKind::UsersFetch;

    fn parse_extras(&self, message: &RequestMessage) -> Result<Self::Extras, InvariantError> {
        match (&message.arrange_by_field, &message.arrange_by_direction) {
            (None, None) => Ok(None),
            (Some(field), Some(direction)) => Ok(Some(Arrangement {
                field: field.parse()?,
                direction: direction.parse()?,
            })),
            (Some(_), None) => Err(InvariantError::RequiredFieldMissing {
                field: "arrangeByDirection".to_string(),
            }),
            (None, Some(_)) => Err(InvariantError::RequiredFieldMissing {
                field: "arrangeByField".to_string(),
            }),
        }
    }

    fn post_process(&self, mut payload: UsersPayload, extras: &Self::Extras) -> UsersPayload {
        if let Some(arrangement) = extras {
            arrangement.apply(&mut payload.data);
        }
        payload
    }
}

// ============================================================================
// PREFETCH
// ============================================================================

/// Warms the cache for an upcoming query. Any schema, no extras.
pub struct PrefetchTask<P> {
    _payload: PhantomData<fn() -> P>,
}

impl<P> PrefetchTask<P> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<P> Default for PrefetchTask<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for PrefetchTask<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchTask").finish()
    }
}

impl<P: ResponseSchema> TaskStrategy for PrefetchTask<P> {
    type Payload = P;
    type Extras = ();

    const TASK: TaskKind = TaskKind::Prefetch;

    fn parse_extras(&self, message: &RequestMessage) -> Result<(), InvariantError> {
        reject_arrangement(message, Self::TASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_test_utils::fixtures;

    fn usernames(payload: &UsersPayload) -> Vec<&str> {
        payload.data.iter().map(|u| u.username.as_str()).collect()
    }

    fn users_message() -> RequestMessage {
        RequestMessage::get(fixtures::users_key().as_str(), "users", "tok")
    }

    #[test]
    fn test_users_extras_require_both_fields() {
        let task = UsersFetchTask;
        assert_eq!(task.parse_extras(&users_message()).unwrap(), None);

        let mut message = users_message();
        message.arrange_by_field = Some("username".to_string());
        assert!(task.parse_extras(&message).is_err());

        let message = users_message().arrange_by("username", "sideways");
        assert!(task.parse_extras(&message).is_err());

        let message = users_message().arrange_by("password", "ascending");
        assert!(task.parse_extras(&message).is_err());
    }

    #[test]
    fn test_users_sort_both_directions() {
        let task = UsersFetchTask;
        let extras = task
            .parse_extras(&users_message().arrange_by("username", "ascending"))
            .unwrap();
        let sorted = task.post_process(fixtures::users_payload(), &extras);
        assert_eq!(usernames(&sorted), vec!["alice", "bob", "carol"]);

        let extras = task
            .parse_extras(&users_message().arrange_by("createdAt", "descending"))
            .unwrap();
        let sorted = task.post_process(fixtures::users_payload(), &extras);
        assert_eq!(usernames(&sorted), vec!["carol", "bob", "alice"]);
    }

    #[test]
    fn test_users_without_arrangement_keeps_server_order() {
        let task = UsersFetchTask;
        let payload = task.post_process(fixtures::users_payload(), &None);
        assert_eq!(usernames(&payload), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_directory_and_prefetch_reject_arrangement() {
        let message = RequestMessage::get(fixtures::directory_key().as_str(), "directory", "tok")
            .arrange_by("username", "ascending");
        assert!(DirectoryFetchTask.parse_extras(&message).is_err());
        assert!(PrefetchTask::<UsersPayload>::new()
            .parse_extras(&message)
            .is_err());
    }

    #[test]
    fn test_sort_field_names_round_trip() {
        for name in ["username", "email", "lastName", "createdAt", "storeLocation"] {
            assert_eq!(name.parse::<SortField>().unwrap().as_str(), name);
        }
    }
}
