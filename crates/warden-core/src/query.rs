//! The list-query DSL: boundary parameters, the strict intermediate
//! representation, per-resource column allow-lists and pagination.
//!
//! Raw `filters` / `sort` JSON is parsed exactly once, here, against a
//! [`ResourceSchema`]. Anything that does not match the schema or the
//! expected shape is dropped rather than rejected. Only `&'static str`
//! column ids taken from the schema survive into a [`ListQuery`]; values are
//! kept as data for the store to bind as parameters.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Boundary parameters ─────────────────────────────────────────────────────

/// Query-string parameters accepted by every list endpoint.
///
/// `page` and `per_page` are kept as strings so that garbage degrades to the
/// defaults instead of failing extraction.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListParams {
  pub search:   Option<String>,
  /// JSON array of `{"id": .., "value": [..] | {"start": .., "end": ..}}`.
  pub filters:  Option<String>,
  /// JSON array of `{"id": .., "desc": bool}`.
  pub sort:     Option<String>,
  /// `"with"` or `"only"`.
  pub deleted:  Option<String>,
  pub page:     Option<String>,
  pub per_page: Option<String>,
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// The resources that share the list DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
  Users,
  Roles,
  ActivityLogs,
}

/// How a column may be filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
  /// Not filterable.
  None,
  /// Multi-value equality (`IN`).
  Values,
  /// Inclusive date range from a `{start, end}` object.
  Range,
  /// Membership test against a related entity's display field.
  Relation,
}

/// One allow-listed pseudo-column.
#[derive(Debug, Clone, Copy)]
pub struct Column {
  pub id:       &'static str,
  pub filter:   FilterMode,
  pub sortable: bool,
  /// Sorts through a join; rows without the relation sort last.
  pub relation: bool,
}

const fn col(
  id: &'static str,
  filter: FilterMode,
  sortable: bool,
  relation: bool,
) -> Column {
  Column { id, filter, sortable, relation }
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
  pub resource:     Resource,
  /// Columns OR-ed together for free-text search.
  pub searchable:   &'static [&'static str],
  pub columns:      &'static [Column],
  pub soft_deletes: bool,
}

impl ResourceSchema {
  pub fn column(&self, id: &str) -> Option<&'static Column> {
    self.columns.iter().find(|c| c.id == id)
  }
}

pub const USERS: ResourceSchema = ResourceSchema {
  resource:     Resource::Users,
  searchable:   &["name", "email"],
  columns:      &[
    col("id", FilterMode::None, true, false),
    col("name", FilterMode::None, true, false),
    col("email", FilterMode::None, true, false),
    col("status", FilterMode::Values, true, false),
    col("role", FilterMode::Relation, true, true),
    col("email_verified_at", FilterMode::Range, true, false),
    col("created_at", FilterMode::Range, true, false),
    col("updated_at", FilterMode::Range, true, false),
    col("deleted_at", FilterMode::Range, true, false),
  ],
  soft_deletes: true,
};

pub const ROLES: ResourceSchema = ResourceSchema {
  resource:     Resource::Roles,
  searchable:   &["name"],
  columns:      &[
    col("id", FilterMode::None, true, false),
    col("name", FilterMode::Values, true, false),
    col("permission", FilterMode::Relation, false, false),
    col("users_count", FilterMode::None, true, false),
    col("permissions_count", FilterMode::None, true, false),
    col("created_at", FilterMode::Range, true, false),
    col("updated_at", FilterMode::None, true, false),
  ],
  soft_deletes: false,
};

pub const ACTIVITY_LOGS: ResourceSchema = ResourceSchema {
  resource:     Resource::ActivityLogs,
  searchable:   &["log_name", "event", "description"],
  columns:      &[
    col("id", FilterMode::None, true, false),
    col("log_name", FilterMode::Values, true, false),
    col("event", FilterMode::Values, true, false),
    col("subject_type", FilterMode::Values, true, false),
    col("causer", FilterMode::Relation, true, true),
    col("created_at", FilterMode::Range, true, false),
  ],
  soft_deletes: false,
};

// ─── Intermediate representation ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  Equality {
    column: &'static str,
    values: Vec<String>,
  },
  /// Both bounds inclusive.
  Range {
    column: &'static str,
    start:  DateTime<Utc>,
    end:    DateTime<Utc>,
  },
  Relation {
    relation: &'static str,
    values:   Vec<String>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
  pub column:     &'static str,
  pub descending: bool,
  pub relation:   bool,
}

/// Which rows of a soft-deleting resource to include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedScope {
  /// Live rows only.
  #[default]
  Live,
  /// Soft-deleted rows only.
  Only,
  /// Live and soft-deleted rows.
  With,
}

impl DeletedScope {
  pub fn parse(raw: Option<&str>) -> Self {
    match raw {
      Some("only") => Self::Only,
      Some("with") => Self::With,
      _ => Self::Live,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
  pub page:     u64,
  pub per_page: u64,
}

impl Pagination {
  pub const MAX_PER_PAGE: u64 = 100;
  /// Keeps `offset()` well inside the signed 64-bit range stores bind.
  pub const MAX_PAGE: u64 = 10_000_000;

  pub fn new(page: Option<u64>, per_page: Option<u64>, default_per_page: u64) -> Self {
    let per_page = per_page
      .unwrap_or(default_per_page)
      .clamp(1, Self::MAX_PER_PAGE);
    Self { page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE), per_page }
  }

  pub fn offset(&self) -> u64 { self.page.saturating_sub(1).saturating_mul(self.per_page) }
}

/// A validated list request, ready to be rendered by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
  pub resource:   Resource,
  pub search:     Option<String>,
  pub filters:    Vec<Filter>,
  pub sort:       Vec<SortKey>,
  pub deleted:    DeletedScope,
  pub pagination: Pagination,
}

impl ListQuery {
  /// An unfiltered first page.
  pub fn all(schema: &ResourceSchema, default_per_page: u64) -> Self {
    Self::parse(&ListParams::default(), schema, default_per_page)
  }

  /// Parse boundary parameters against `schema`. Never fails.
  pub fn parse(params: &ListParams, schema: &ResourceSchema, default_per_page: u64) -> Self {
    let search = params
      .search
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned);

    let filters = params
      .filters
      .as_deref()
      .map(|raw| parse_filters(raw, schema))
      .unwrap_or_default();

    let sort = params
      .sort
      .as_deref()
      .map(|raw| parse_sort(raw, schema))
      .unwrap_or_default();

    let deleted = if schema.soft_deletes {
      DeletedScope::parse(params.deleted.as_deref())
    } else {
      DeletedScope::Live
    };

    let pagination = Pagination::new(
      parse_number(params.page.as_deref()),
      parse_number(params.per_page.as_deref()),
      default_per_page,
    );

    Self { resource: schema.resource, search, filters, sort, deleted, pagination }
  }
}

fn parse_number(raw: Option<&str>) -> Option<u64> {
  raw.and_then(|s| s.trim().parse().ok())
}

fn parse_filters(raw: &str, schema: &ResourceSchema) -> Vec<Filter> {
  let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
    return Vec::new();
  };

  entries
    .iter()
    .filter_map(|entry| {
      let id = entry.get("id")?.as_str()?;
      let value = entry.get("value")?;
      let column = schema.column(id)?;
      match column.filter {
        FilterMode::None => None,
        FilterMode::Values => Some(Filter::Equality {
          column: column.id,
          values: scalar_list(value)?,
        }),
        FilterMode::Relation => Some(Filter::Relation {
          relation: column.id,
          values:   scalar_list(value)?,
        }),
        FilterMode::Range => {
          let (start, end) = date_range(value)?;
          Some(Filter::Range { column: column.id, start, end })
        }
      }
    })
    .collect()
}

/// A non-empty array of strings or numbers. Anything else is not a
/// discrete-value filter.
fn scalar_list(value: &Value) -> Option<Vec<String>> {
  let items = value.as_array()?;
  let values: Vec<String> = items
    .iter()
    .filter_map(|v| match v {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    })
    .collect();
  (!values.is_empty()).then_some(values)
}

fn date_range(value: &Value) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
  let start = parse_day(value.get("start")?.as_str()?)?;
  let end = parse_day(value.get("end")?.as_str()?)?;
  Some((start_of_day(start), end_of_day(end)))
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp; only the UTC calendar
/// day is kept.
fn parse_day(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
    DateTime::parse_from_rfc3339(raw)
      .ok()
      .map(|dt| dt.with_timezone(&Utc).date_naive())
  })
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
  day.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
  let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
  day.and_time(last).and_utc()
}

fn parse_sort(raw: &str, schema: &ResourceSchema) -> Vec<SortKey> {
  let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
    return Vec::new();
  };

  entries
    .iter()
    .filter_map(|entry| {
      let id = entry.get("id")?.as_str()?;
      let descending = entry.get("desc")?.as_bool()?;
      let column = schema.column(id).filter(|c| c.sortable)?;
      Some(SortKey { column: column.id, descending, relation: column.relation })
    })
    .collect()
}

// ─── Result page ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
  pub current_page: u64,
  pub per_page:     u64,
  pub total:        u64,
  pub last_page:    u64,
  /// 1-based index of the first row on this page; `None` when empty.
  pub from:         Option<u64>,
  pub to:           Option<u64>,
}

impl PageMeta {
  pub fn new(pagination: Pagination, total: u64, rows_on_page: u64) -> Self {
    let last_page = total.div_ceil(pagination.per_page.max(1)).max(1);
    let from = pagination.offset().checked_add(1).filter(|_| rows_on_page > 0);
    let to = from.and_then(|from| from.checked_add(rows_on_page - 1));
    Self {
      current_page: pagination.page,
      per_page: pagination.per_page,
      total,
      last_page,
      from,
      to,
    }
  }
}

/// One page of a list result with its total-count metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub data: Vec<T>,
  pub meta: PageMeta,
}

impl<T> Page<T> {
  pub fn new(data: Vec<T>, total: u64, pagination: Pagination) -> Self {
    let meta = PageMeta::new(pagination, total, data.len() as u64);
    Self { data, meta }
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page { data: self.data.into_iter().map(f).collect(), meta: self.meta }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(filters: Option<&str>, sort: Option<&str>) -> ListParams {
    ListParams {
      filters: filters.map(str::to_owned),
      sort: sort.map(str::to_owned),
      ..ListParams::default()
    }
  }

  #[test]
  fn empty_params_give_live_first_page() {
    let q = ListQuery::all(&USERS, 10);
    assert_eq!(q.search, None);
    assert!(q.filters.is_empty());
    assert!(q.sort.is_empty());
    assert_eq!(q.deleted, DeletedScope::Live);
    assert_eq!(q.pagination, Pagination { page: 1, per_page: 10 });
  }

  #[test]
  fn filters_are_typed_by_schema() {
    let q = ListQuery::parse(
      &params(
        Some(
          r#"[
            {"id":"status","value":["approved","pending"]},
            {"id":"role","value":["editor"]},
            {"id":"created_at","value":{"start":"2024-01-01","end":"2024-01-02"}}
          ]"#,
        ),
        None,
      ),
      &USERS,
      10,
    );
    assert_eq!(q.filters.len(), 3);
    assert_eq!(q.filters[0], Filter::Equality {
      column: "status",
      values: vec!["approved".into(), "pending".into()],
    });
    assert_eq!(q.filters[1], Filter::Relation {
      relation: "role",
      values:   vec!["editor".into()],
    });
    let Filter::Range { column, start, end } = &q.filters[2] else {
      panic!("expected range filter");
    };
    assert_eq!(*column, "created_at");
    assert_eq!(start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    assert_eq!(
      end.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
      "2024-01-02T23:59:59.999999Z"
    );
  }

  #[test]
  fn unknown_and_malformed_filters_are_dropped() {
    let q = ListQuery::parse(
      &params(
        Some(
          r#"[
            {"id":"password","value":["x"]},
            {"id":"status; DROP TABLE users","value":["x"]},
            {"id":"status","value":"approved"},
            {"id":"status","value":[{"nested":true}]},
            {"id":"created_at","value":["2024-01-01"]},
            {"id":"created_at","value":{"start":"yesterday","end":"2024-01-01"}},
            {"value":["x"]},
            "status"
          ]"#,
        ),
        None,
      ),
      &USERS,
      10,
    );
    assert!(q.filters.is_empty(), "{:?}", q.filters);

    let q = ListQuery::parse(&params(Some("not json"), Some("{}")), &USERS, 10);
    assert!(q.filters.is_empty());
    assert!(q.sort.is_empty());
  }

  #[test]
  fn sort_keeps_array_order_and_flags_relations() {
    let q = ListQuery::parse(
      &params(
        None,
        Some(r#"[{"id":"role","desc":true},{"id":"name","desc":false},{"id":"password","desc":true},{"id":"email"}]"#),
      ),
      &USERS,
      10,
    );
    assert_eq!(q.sort, vec![
      SortKey { column: "role", descending: true, relation: true },
      SortKey { column: "name", descending: false, relation: false },
    ]);
  }

  #[test]
  fn non_sortable_columns_are_ignored() {
    let q = ListQuery::parse(&params(None, Some(r#"[{"id":"permission","desc":false}]"#)), &ROLES, 10);
    assert!(q.sort.is_empty());
  }

  #[test]
  fn deleted_scope_only_applies_to_soft_deleting_resources() {
    let mut p = ListParams::default();
    p.deleted = Some("only".into());
    assert_eq!(ListQuery::parse(&p, &USERS, 10).deleted, DeletedScope::Only);
    assert_eq!(ListQuery::parse(&p, &ROLES, 10).deleted, DeletedScope::Live);
    p.deleted = Some("with".into());
    assert_eq!(ListQuery::parse(&p, &USERS, 10).deleted, DeletedScope::With);
    p.deleted = Some("everything".into());
    assert_eq!(ListQuery::parse(&p, &USERS, 10).deleted, DeletedScope::Live);
  }

  #[test]
  fn pagination_is_bounded() {
    let mut p = ListParams::default();
    p.page = Some("0".into());
    p.per_page = Some("5000".into());
    let q = ListQuery::parse(&p, &USERS, 10);
    assert_eq!(q.pagination, Pagination { page: 1, per_page: 100 });

    p.page = Some("three".into());
    p.per_page = Some("0".into());
    let q = ListQuery::parse(&p, &USERS, 15);
    assert_eq!(q.pagination, Pagination { page: 1, per_page: 1 });

    p.page = Some(u64::MAX.to_string());
    p.per_page = None;
    let q = ListQuery::parse(&p, &USERS, 10);
    assert_eq!(q.pagination.page, Pagination::MAX_PAGE);
    assert!(i64::try_from(q.pagination.offset()).is_ok());
  }

  #[test]
  fn blank_search_is_none() {
    let mut p = ListParams::default();
    p.search = Some("   ".into());
    assert_eq!(ListQuery::parse(&p, &USERS, 10).search, None);
    p.search = Some(" ali ".into());
    assert_eq!(ListQuery::parse(&p, &USERS, 10).search.as_deref(), Some("ali"));
  }

  #[test]
  fn page_meta() {
    let meta = PageMeta::new(Pagination { page: 2, per_page: 10 }, 25, 10);
    assert_eq!(meta.last_page, 3);
    assert_eq!(meta.from, Some(11));
    assert_eq!(meta.to, Some(20));

    let empty = PageMeta::new(Pagination { page: 1, per_page: 10 }, 0, 0);
    assert_eq!(empty.last_page, 1);
    assert_eq!(empty.from, None);
  }

  #[test]
  fn page_meta_saturates_instead_of_overflowing() {
    let far = Pagination { page: u64::MAX, per_page: 100 };
    assert_eq!(far.offset(), u64::MAX);
    let meta = PageMeta::new(far, 3, 2);
    assert_eq!(meta.from, None);
    assert_eq!(meta.to, None);
    assert_eq!(meta.last_page, 1);

    let zero = PageMeta::new(Pagination { page: 0, per_page: 10 }, 5, 5);
    assert_eq!(zero.from, Some(1));
    assert_eq!(zero.to, Some(5));
  }
}
