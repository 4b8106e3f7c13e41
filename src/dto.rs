use crate::domain::queries::{
    self, DocumentFilter, FieldProjection, ListParams, SortSpec, lenient_page_param,
};
use crate::domain::{task, user};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Request body for creating or fully replacing a task. The same shape serves POST and PUT
/// since replacement rewrites every caller-editable field.
///
/// `assignedUserName` is accepted for wire compatibility but never stored verbatim — the
/// stored value is always derived from the resolved assignee.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[cfg_attr(test, derive(serde::Serialize))]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(required)]
    #[serde(default, deserialize_with = "deserialize_deadline")]
    pub deadline: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    pub assigned_user: Option<String>,
    pub assigned_user_name: Option<String>,
}

impl TaskBody {
    /// Converts to the domain request. Assumes [Validate::validate] has passed, so the
    /// required fields are present.
    pub fn into_create(self) -> task::CreateTask {
        task::CreateTask {
            content: task::TaskContent {
                name: self.name.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
                deadline: self.deadline.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                completed: self.completed.unwrap_or(false),
            },
            assigned_user: self.assigned_user.unwrap_or_default(),
        }
    }
}

/// Deadlines arrive as RFC 3339 timestamps or bare dates (midnight UTC).
fn deserialize_deadline<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) => queries::parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("unrecognized deadline format: {raw}"))),
    }
}

/// Request body for creating or fully replacing a user.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[cfg_attr(test, derive(serde::Serialize))]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[validate(required, length(min = 1))]
    pub email: Option<String>,
    pub pending_tasks: Option<Vec<String>>,
}

impl UserBody {
    /// Converts to the domain request. Assumes [Validate::validate] has passed.
    pub fn into_content(self) -> user::UserContent {
        user::UserContent {
            name: self.name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            pending_tasks: self.pending_tasks.unwrap_or_default(),
        }
    }
}

/// Raw dynamic-query parameters for the list endpoints. Everything arrives as an optional
/// string; interpretation (and its deliberate leniency) lives in [queries].
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingParams {
    /// JSON filter over the collection, e.g. `{"completed": true}`
    #[serde(rename = "where")]
    pub filter: Option<String>,
    /// JSON sort spec, e.g. `{"deadline": -1}`
    pub sort: Option<String>,
    /// JSON field projection, e.g. `{"name": 1, "_id": 0}`
    pub select: Option<String>,
    /// Number of matching documents to skip
    pub skip: Option<String>,
    /// Cap on returned documents
    pub limit: Option<String>,
    /// When exactly "true", return a count of matching documents instead of a listing
    pub count: Option<String>,
}

impl ListingParams {
    pub fn into_query(self) -> ListParams {
        ListParams {
            count_only: self.count.as_deref() == Some("true"),
            filter: DocumentFilter::lenient(self.filter.as_deref()),
            sort: SortSpec::lenient(self.sort.as_deref()),
            projection: FieldProjection::lenient(self.select.as_deref()),
            skip: lenient_page_param(self.skip.as_deref()),
            limit: lenient_page_param(self.limit.as_deref()),
        }
    }
}

/// Query parameters for the single-resource lookups, where `select` parses strictly.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SingleParams {
    /// JSON field projection; unusable input is a caller error on these endpoints
    pub select: Option<String>,
}
