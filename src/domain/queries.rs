use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use derive_more::{Display, Error};
use serde_json::{Map, Value};

/// A caller-supplied filter over one collection, kept as the parsed JSON object and handed
/// to the storage layer for interpretation. An empty filter matches every document.
///
/// Filters are parsed leniently: anything that is not a JSON object silently degrades to
/// "match all" rather than erroring back to the caller.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentFilter(pub Map<String, Value>);

impl DocumentFilter {
    pub fn match_all() -> Self {
        Self(Map::new())
    }

    pub fn lenient(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::match_all();
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(conditions)) => Self(conditions),
            _ => Self::match_all(),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SortDirection {
    #[display("ASC")]
    Ascending,
    #[display("DESC")]
    Descending,
}

/// An ordered list of (field, direction) sort keys. Parsed leniently: an unparsable sort
/// spec degrades to "no sort", and entries whose direction cannot be understood are skipped.
/// Directions follow the usual document-store convention: a negative number or
/// "desc"/"descending" sorts descending, a positive number or "asc"/"ascending" ascending.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortSpec(pub Vec<(String, SortDirection)>);

impl SortSpec {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn lenient(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::none();
        };
        let Ok(Value::Object(spec)) = serde_json::from_str::<Value>(raw) else {
            return Self::none();
        };

        let mut keys = Vec::new();
        for (field, direction) in &spec {
            let parsed_direction = match direction {
                Value::Number(magnitude) => match magnitude.as_f64() {
                    Some(magnitude) if magnitude > 0.0 => SortDirection::Ascending,
                    Some(magnitude) if magnitude < 0.0 => SortDirection::Descending,
                    _ => continue,
                },
                Value::String(word) => match word.as_str() {
                    "asc" | "ascending" => SortDirection::Ascending,
                    "desc" | "descending" => SortDirection::Descending,
                    _ => continue,
                },
                _ => continue,
            };
            keys.push((field.clone(), parsed_direction));
        }

        Self(keys)
    }
}

#[derive(Debug, Display, Error)]
pub enum ProjectionParseError {
    #[display("projection was not valid JSON: {_0}")]
    BadJson(#[error(not(source))] serde_json::Error),
    #[display("projection must be a JSON object")]
    NotAnObject,
}

/// A field projection applied to documents after they're fetched. Mirrors document-store
/// projection rules: any truthy value switches the projection to include-mode (the id is kept
/// unless explicitly excluded), otherwise listed fields are excluded from the full document.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FieldProjection {
    #[default]
    All,
    Include {
        fields: Vec<String>,
        with_id: bool,
    },
    Exclude {
        fields: Vec<String>,
    },
}

impl FieldProjection {
    /// Parses a projection, failing on unusable input. List endpoints don't use this —
    /// only the single-resource lookups treat a bad projection as a caller error.
    pub fn strict(raw: &str) -> Result<Self, ProjectionParseError> {
        let parsed: Value = serde_json::from_str(raw).map_err(ProjectionParseError::BadJson)?;
        let Value::Object(spec) = parsed else {
            return Err(ProjectionParseError::NotAnObject);
        };

        Ok(Self::from_spec(&spec))
    }

    pub fn lenient(raw: Option<&str>) -> Self {
        match raw {
            None => Self::All,
            Some(raw) => Self::strict(raw).unwrap_or(Self::All),
        }
    }

    fn from_spec(spec: &Map<String, Value>) -> Self {
        let mut id_flag: Option<bool> = None;
        let mut included = Vec::new();
        let mut excluded = Vec::new();

        for (field, flag) in spec {
            let truthy = projection_flag(flag);
            if field == "_id" {
                id_flag = Some(truthy);
            } else if truthy {
                included.push(field.clone());
            } else {
                excluded.push(field.clone());
            }
        }

        if !included.is_empty() || id_flag == Some(true) {
            Self::Include {
                fields: included,
                with_id: id_flag.unwrap_or(true),
            }
        } else if id_flag == Some(false) {
            excluded.push("_id".to_owned());
            Self::Exclude { fields: excluded }
        } else if !excluded.is_empty() {
            Self::Exclude { fields: excluded }
        } else {
            Self::All
        }
    }

    /// Reduces a serialized document to the projected field set. Non-object values pass
    /// through untouched.
    pub fn apply(&self, mut document: Value) -> Value {
        let Value::Object(ref mut fields) = document else {
            return document;
        };

        match self {
            Self::All => {}
            Self::Include {
                fields: kept,
                with_id,
            } => {
                fields.retain(|field, _| {
                    (field == "_id" && *with_id) || kept.iter().any(|keep| keep == field)
                });
            }
            Self::Exclude { fields: dropped } => {
                fields.retain(|field, _| !dropped.iter().any(|drop| drop == field));
            }
        }

        document
    }
}

fn projection_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(magnitude) => magnitude.as_f64().map(|m| m != 0.0).unwrap_or(true),
        _ => true,
    }
}

/// Lenient skip/limit parsing: anything that isn't a positive integer degrades to "absent".
/// Zero counts as absent so a `limit=0` request still gets a collection's default page size.
pub fn lenient_page_param(raw: Option<&str>) -> Option<u64> {
    let parsed = raw?.trim().parse::<u64>().ok()?;
    (parsed > 0).then_some(parsed)
}

/// Timestamps in caller-supplied filter values and deadlines: RFC 3339, or a bare date
/// interpreted as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// The fully parsed dynamic-query parameter set for a list endpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListParams {
    pub filter: DocumentFilter,
    pub sort: SortSpec,
    pub projection: FieldProjection,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub count_only: bool,
}

/// The outcome of a list operation: matching documents, or just how many matched when the
/// caller asked for a count.
#[derive(Clone, Debug, PartialEq)]
pub enum Listing {
    Documents(Vec<Value>),
    Count(i64),
}

impl Listing {
    pub fn into_value(self) -> Value {
        match self {
            Self::Documents(documents) => Value::Array(documents),
            Self::Count(total) => Value::from(total),
        }
    }
}
