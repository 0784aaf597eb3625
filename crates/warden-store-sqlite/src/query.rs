//! Rendering of [`ListQuery`] into parameterised SQL.
//!
//! Only `&'static str` fragments from the [`Source`] tables below are ever
//! spliced into SQL text; every user-supplied value is bound as a parameter.
//!
//! Every statement built from [`Conditions`] starts with [`SCOPE_CTE`], whose
//! single parameter is the hidden role name (NULL when nothing is hidden).
//! Sources refer to `hidden_role` and `hidden_users` wherever a filter, count
//! or join could otherwise reveal a protected row.

use rusqlite::types::Value;
use warden_core::{
  identity::PROTECTED_ROLE,
  query::{DeletedScope, Filter, ListQuery, Resource},
  visibility::Visibility,
};

use crate::encode::encode_dt;

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Prefix of every scoped statement. Binds the first parameter.
pub const SCOPE_CTE: &str = "WITH hidden_role(name) AS (SELECT ?),
   hidden_users(user_id) AS (
     SELECT x.user_id FROM user_roles x JOIN roles h ON h.id = x.role_id
     WHERE h.name IN (SELECT name FROM hidden_role)
   )";

/// `sql` with the visibility CTE in front.
pub fn scoped(sql: &str) -> String { format!("{SCOPE_CTE} {sql}") }

/// How one resource maps onto tables.
pub struct Source {
  pub select:         &'static str,
  pub from:           &'static str,
  pub id:             &'static str,
  pub deleted_at:     Option<&'static str>,
  /// Clause excluding protected rows.
  pub hide_protected: Option<&'static str>,
  pub default_order:  &'static str,
  pub search:         &'static [&'static str],
  column:             fn(&str) -> Option<&'static str>,
  /// Membership clause with an `{in}` marker for the placeholder list.
  relation:           fn(&str) -> Option<&'static str>,
}

pub const USERS: Source = Source {
  select:         "u.id, u.name, u.email, u.status, ur.role_name, u.email_verified_at, \
                   u.created_at, u.updated_at, u.deleted_at",
  from:           "users u
     LEFT JOIN (
       SELECT x.user_id, MIN(r.name) AS role_name
       FROM user_roles x JOIN roles r ON r.id = x.role_id
       GROUP BY x.user_id
     ) ur ON ur.user_id = u.id",
  id:             "u.id",
  deleted_at:     Some("u.deleted_at"),
  hide_protected: Some("u.id NOT IN (SELECT user_id FROM hidden_users)"),
  default_order:  "u.id ASC",
  search:         &["u.name", "u.email"],
  column:         |id| {
    Some(match id {
      "id" => "u.id",
      "name" => "u.name",
      "email" => "u.email",
      "status" => "u.status",
      "role" => "ur.role_name",
      "email_verified_at" => "u.email_verified_at",
      "created_at" => "u.created_at",
      "updated_at" => "u.updated_at",
      "deleted_at" => "u.deleted_at",
      _ => return None,
    })
  },
  relation:       |id| match id {
    "role" => Some(
      "EXISTS (SELECT 1 FROM user_roles x JOIN roles r ON r.id = x.role_id \
       WHERE x.user_id = u.id AND r.name IN ({in}))",
    ),
    _ => None,
  },
};

pub const ROLES: Source = Source {
  select:         "r.id, r.name,
     (SELECT group_concat(p.name) FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id WHERE rp.role_id = r.id),
     (SELECT COUNT(*) FROM user_roles x JOIN users u ON u.id = x.user_id
        WHERE x.role_id = r.id AND u.deleted_at IS NULL
          AND u.id NOT IN (SELECT user_id FROM hidden_users)),
     (SELECT COUNT(*) FROM role_permissions rp WHERE rp.role_id = r.id),
     r.created_at, r.updated_at",
  from:           "roles r",
  id:             "r.id",
  deleted_at:     None,
  hide_protected: Some("r.name NOT IN (SELECT name FROM hidden_role)"),
  default_order:  "r.id ASC",
  search:         &["r.name"],
  column:         |id| {
    Some(match id {
      "id" => "r.id",
      "name" => "r.name",
      "users_count" => {
        "(SELECT COUNT(*) FROM user_roles x JOIN users u ON u.id = x.user_id \
         WHERE x.role_id = r.id AND u.deleted_at IS NULL \
         AND u.id NOT IN (SELECT user_id FROM hidden_users))"
      }
      "permissions_count" => {
        "(SELECT COUNT(*) FROM role_permissions rp WHERE rp.role_id = r.id)"
      }
      "created_at" => "r.created_at",
      "updated_at" => "r.updated_at",
      _ => return None,
    })
  },
  relation:       |id| match id {
    "permission" => Some(
      "EXISTS (SELECT 1 FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id \
       WHERE rp.role_id = r.id AND p.name IN ({in}))",
    ),
    _ => None,
  },
};

pub const ACTIVITY_LOGS: Source = Source {
  select:         "a.id, a.log_name, a.description, a.event, a.subject_type, a.subject_id, \
                   CASE WHEN a.causer_id IN (SELECT user_id FROM hidden_users) \
                     THEN NULL ELSE a.causer_id END, \
                   c.name, c.email, a.properties, a.batch_uuid, a.created_at, a.updated_at",
  // Hidden causers never join, so they read as NULL and drop out of causer
  // filters and sorts.
  from:           "activity_log a LEFT JOIN users c ON c.id = a.causer_id \
                   AND c.id NOT IN (SELECT user_id FROM hidden_users)",
  id:             "a.id",
  deleted_at:     None,
  hide_protected: None,
  default_order:  "a.created_at DESC, a.id DESC",
  search:         &["a.log_name", "a.event", "a.description"],
  column:         |id| {
    Some(match id {
      "id" => "a.id",
      "log_name" => "a.log_name",
      "event" => "a.event",
      "subject_type" => "a.subject_type",
      "causer" => "c.email",
      "created_at" => "a.created_at",
      _ => return None,
    })
  },
  relation:       |id| match id {
    "causer" => Some("c.email IN ({in})"),
    _ => None,
  },
};

pub fn source(resource: Resource) -> &'static Source {
  match resource {
    Resource::Users => &USERS,
    Resource::Roles => &ROLES,
    Resource::ActivityLogs => &ACTIVITY_LOGS,
  }
}

// ─── Conditions ──────────────────────────────────────────────────────────────

/// An AND-ed list of WHERE clauses with their bound values, in order.
///
/// The first bound value always belongs to [`SCOPE_CTE`], so statements
/// using these conditions must be built with [`scoped`].
#[derive(Debug)]
pub struct Conditions {
  clauses: Vec<String>,
  params:  Vec<Value>,
}

impl Default for Conditions {
  fn default() -> Self { Self { clauses: Vec::new(), params: vec![Value::Null] } }
}

pub fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

impl Conditions {
  pub fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
    self.clauses.push(clause.into());
    self.params.extend(params);
  }

  /// `column IN (ids..)`.
  pub fn ids(&mut self, column: &str, ids: &[i64]) {
    self.push(
      format!("{column} IN ({})", placeholders(ids.len())),
      ids.iter().map(|id| Value::Integer(*id)),
    );
  }

  pub fn deleted(&mut self, source: &Source, scope: DeletedScope) {
    let Some(column) = source.deleted_at else { return };
    match scope {
      DeletedScope::Live => self.push(format!("{column} IS NULL"), std::iter::empty()),
      DeletedScope::Only => self.push(format!("{column} IS NOT NULL"), std::iter::empty()),
      DeletedScope::With => {}
    }
  }

  /// Scope the statement to `visibility`: fills the CTE parameter and, for
  /// sources with protected rows of their own, excludes them.
  pub fn visibility(&mut self, source: &Source, visibility: Visibility) {
    if !visibility.hides_protected() {
      return;
    }
    self.scope_only(visibility);
    if let Some(clause) = source.hide_protected {
      self.push(clause, std::iter::empty());
    }
  }

  /// Fill the CTE parameter without excluding any row of the source itself.
  pub fn scope_only(&mut self, visibility: Visibility) {
    if visibility.hides_protected() {
      self.params[0] = Value::Text(PROTECTED_ROLE.to_owned());
    }
  }

  pub fn where_sql(&self) -> String {
    if self.clauses.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.clauses.join(" AND "))
    }
  }

  pub fn params(&self) -> &[Value] { &self.params }
}

// ─── List rendering ──────────────────────────────────────────────────────────

/// A rendered list query: shared WHERE for the count and page statements.
#[derive(Debug)]
pub struct Rendered {
  pub conditions: Conditions,
  pub order_by:   String,
}

impl Rendered {
  pub fn count_sql(&self, source: &Source) -> String {
    scoped(&format!("SELECT COUNT(*) FROM {} {}", source.from, self.conditions.where_sql()))
  }

  /// The page statement; binds two extra parameters, LIMIT then OFFSET.
  pub fn page_sql(&self, source: &Source) -> String {
    scoped(&format!(
      "SELECT {} FROM {} {} ORDER BY {} LIMIT ? OFFSET ?",
      source.select,
      source.from,
      self.conditions.where_sql(),
      self.order_by
    ))
  }
}

fn escape_like(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len() + 2);
  out.push('%');
  for c in raw.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

/// Search, then filters, then the deleted scope, then the visibility scope.
pub fn render(query: &ListQuery, visibility: Visibility) -> Rendered {
  let source = source(query.resource);
  let mut conditions = Conditions::default();

  if let Some(term) = &query.search {
    let pattern = escape_like(term);
    let clause = source
      .search
      .iter()
      .map(|column| format!("{column} LIKE ? ESCAPE '\\'"))
      .collect::<Vec<_>>()
      .join(" OR ");
    conditions.push(
      format!("({clause})"),
      source.search.iter().map(|_| Value::Text(pattern.clone())),
    );
  }

  for filter in &query.filters {
    match filter {
      Filter::Equality { column, values } => {
        let Some(expr) = (source.column)(column) else { continue };
        conditions.push(
          format!("{expr} IN ({})", placeholders(values.len())),
          values.iter().cloned().map(Value::Text),
        );
      }
      Filter::Range { column, start, end } => {
        let Some(expr) = (source.column)(column) else { continue };
        conditions.push(
          format!("{expr} BETWEEN ? AND ?"),
          [Value::Text(encode_dt(*start)), Value::Text(encode_dt(*end))],
        );
      }
      Filter::Relation { relation, values } => {
        let Some(template) = (source.relation)(relation) else { continue };
        conditions.push(
          template.replace("{in}", &placeholders(values.len())),
          values.iter().cloned().map(Value::Text),
        );
      }
    }
  }

  conditions.deleted(source, query.deleted);
  conditions.visibility(source, visibility);

  let mut order: Vec<String> = query
    .sort
    .iter()
    .filter_map(|key| {
      let expr = (source.column)(key.column)?;
      let direction = if key.descending { "DESC" } else { "ASC" };
      Some(if key.relation {
        format!("{expr} IS NULL, {expr} {direction}")
      } else {
        format!("{expr} {direction}")
      })
    })
    .collect();
  if order.is_empty() {
    order.push(source.default_order.to_owned());
  }
  order.push(format!("{} ASC", source.id));

  Rendered { conditions, order_by: order.join(", ") }
}

#[cfg(test)]
mod tests {
  use warden_core::query::{self, ListParams};

  use super::*;

  fn parse(params: ListParams) -> ListQuery { ListQuery::parse(&params, &query::USERS, 10) }

  #[test]
  fn hostile_input_never_reaches_sql_text() {
    let q = parse(ListParams {
      search: Some("'; DROP TABLE users; --".into()),
      filters: Some(r#"[{"id":"status","value":["x') OR 1=1 --"]}]"#.into()),
      sort: Some(r#"[{"id":"name; DROP TABLE users","desc":true}]"#.into()),
      ..ListParams::default()
    });
    let rendered = render(&q, Visibility::HideProtected);
    let sql = rendered.page_sql(&USERS);
    assert!(!sql.contains("DROP"));
    assert!(!sql.contains("OR 1=1"));
    // The hidden-role name, two search columns, one status value.
    assert_eq!(rendered.conditions.params().len(), 1 + 2 + 1);
    assert_eq!(rendered.conditions.params()[0], Value::Text(PROTECTED_ROLE.to_owned()));
  }

  #[test]
  fn like_wildcards_are_escaped() {
    assert_eq!(escape_like("50%_a\\b"), "%50\\%\\_a\\\\b%");
  }

  #[test]
  fn visibility_clause_only_when_hiding() {
    let q = parse(ListParams::default());
    let hidden = render(&q, Visibility::HideProtected);
    assert!(hidden.conditions.where_sql().contains("hidden_users"));
    let shown = render(&q, Visibility::ShowAll);
    assert!(!shown.conditions.where_sql().contains("hidden_users"));
    assert!(shown.conditions.where_sql().contains("u.deleted_at IS NULL"));
    assert_eq!(shown.conditions.params(), &[Value::Null]);
    assert!(shown.page_sql(&USERS).starts_with(SCOPE_CTE));
  }

  #[test]
  fn relation_sort_puts_nulls_last_and_ends_with_id() {
    let q = parse(ListParams {
      sort: Some(r#"[{"id":"role","desc":false},{"id":"name","desc":true}]"#.into()),
      ..ListParams::default()
    });
    let rendered = render(&q, Visibility::ShowAll);
    assert_eq!(
      rendered.order_by,
      "ur.role_name IS NULL, ur.role_name ASC, u.name DESC, u.id ASC"
    );
  }

  #[test]
  fn every_schema_column_has_an_expression() {
    for (schema, source) in [
      (&query::USERS, &USERS),
      (&query::ROLES, &ROLES),
      (&query::ACTIVITY_LOGS, &ACTIVITY_LOGS),
    ] {
      for column in schema.columns {
        let mapped = match column.filter {
          query::FilterMode::Relation => (source.relation)(column.id).is_some(),
          _ => (source.column)(column.id).is_some(),
        };
        assert!(mapped, "{}", column.id);
        if column.sortable {
          assert!((source.column)(column.id).is_some(), "{}", column.id);
        }
      }
    }
  }
}
