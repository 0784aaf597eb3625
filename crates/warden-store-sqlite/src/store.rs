//! [`SqliteStore`]: the SQLite implementation of [`AdminStore`] and
//! [`AuditRecorder`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params, params_from_iter, types::Value};
use tracing::debug;

use warden_core::{
  activity::{ActivityEntry, ActivityFacets, AuditRecorder, NewActivity},
  bulk::{BulkMutation, BulkOutcome, IdSet},
  identity::{
    Caller, Credentials, NewUser, PROTECTED_ROLE, PermissionView, Role, RoleId, RoleView,
    User, UserChanges, UserId,
  },
  invitation::{AcceptOutcome, Invitation, NewInvitation, ReplaceOutcome},
  permission::{Ability, DefaultRole},
  query::{DeletedScope, ListQuery, Page, Pagination},
  store::AdminStore,
  visibility::Visibility,
};

use crate::{
  Error, Result,
  encode::{
    RawActivity, RawInvitation, RawPermission, RawRoleView, RawUser, decode_status,
    encode_dt, encode_status,
  },
  query::{self, Conditions, Rendered, Source},
  schema::SCHEMA,
};

const INVITATION_SELECT: &str = "SELECT i.id, i.email, i.role_id, r.name, i.invited_by, \
   i.expires_at, i.accepted_at, i.created_at, i.updated_at
   FROM invitations i JOIN roles r ON r.id = i.role_id";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Warden store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, run schema initialisation and seed
  /// the permission catalog and default roles.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  pub(crate) async fn init_schema(&self) -> Result<()> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;
        let tx = conn.transaction()?;
        for ability in Ability::all() {
          tx.execute(
            "INSERT OR IGNORE INTO permissions (name, created_at, updated_at)
             VALUES (?1, ?2, ?2)",
            params![ability.as_str(), now],
          )?;
        }
        // Permissions are attached only when the role row is first created,
        // so edits made through the admin surface survive restarts.
        for role in DefaultRole::all() {
          let created = tx.execute(
            "INSERT OR IGNORE INTO roles (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![role.name(), now],
          )?;
          if created == 1 {
            let role_id = tx.last_insert_rowid();
            attach_abilities(&tx, role_id, &role.abilities())?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a user directly, assigning `user.role_id` if present.
  pub async fn create_user(&self, user: NewUser) -> Result<User> {
    let now = encode_dt(Utc::now());
    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = insert_user(&tx, &user, &now)?;
        tx.commit()?;
        Ok(id)
      })
      .await?;
    self.user_by_id(id).await
  }

  /// A user in any scope, ignoring visibility. Only for re-reading rows this
  /// store has just written.
  async fn user_by_id(&self, id: UserId) -> Result<User> {
    let raw = self
      .conn
      .call(move |conn| {
        let mut conditions = Conditions::default();
        conditions.ids(query::USERS.id, &[id]);
        Ok(select_users(conn, &conditions, query::USERS.id)?.pop())
      })
      .await?;
    raw.ok_or(Error::Missing("user"))?.into_user()
  }

  /// Re-read a role just written. `visibility` only scopes its user count.
  async fn role_by_id(&self, id: RoleId, visibility: Visibility) -> Result<RoleView> {
    let raw = self
      .conn
      .call(move |conn| {
        let mut conditions = Conditions::default();
        conditions.ids(query::ROLES.id, &[id]);
        conditions.scope_only(visibility);
        select_one(conn, &query::ROLES, &conditions, RawRoleView::from_row)
      })
      .await?;
    raw.ok_or(Error::Missing("role"))?.into_view()
  }

  async fn invitation_where(&self, clause: &'static str, value: String) -> Result<Option<Invitation>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("{INVITATION_SELECT} WHERE {clause}"),
            params![value],
            RawInvitation::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawInvitation::into_invitation).transpose()
  }

  /// Run a rendered list query: total count, then one page.
  async fn fetch_page<R, T>(
    &self,
    source: &'static Source,
    rendered: Rendered,
    pagination: Pagination,
    from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
    decode: fn(R) -> Result<T>,
  ) -> Result<Page<T>>
  where
    R: Send + 'static,
  {
    debug!(sql = %rendered.page_sql(source), "list query");
    let (total, raws) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &rendered.count_sql(source),
          params_from_iter(rendered.conditions.params()),
          |r| r.get(0),
        )?;

        // An offset SQLite cannot bind lies past every row.
        let (Ok(limit), Ok(offset)) =
          (i64::try_from(pagination.per_page), i64::try_from(pagination.offset()))
        else {
          return Ok((total, Vec::new()));
        };
        let mut bound = rendered.conditions.params().to_vec();
        bound.push(Value::Integer(limit));
        bound.push(Value::Integer(offset));

        let mut stmt = conn.prepare(&rendered.page_sql(source))?;
        let rows = stmt
          .query_map(params_from_iter(bound.iter()), from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    let data = raws.into_iter().map(decode).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(data, total.max(0) as u64, pagination))
  }
}

// ─── Connection-thread helpers ───────────────────────────────────────────────

/// What the acceptance transaction found.
enum Stamp {
  Created(UserId),
  Accepted,
  Expired,
}

fn select_users(
  conn: &rusqlite::Connection,
  conditions: &Conditions,
  order_by: &str,
) -> rusqlite::Result<Vec<RawUser>> {
  let sql = query::scoped(&format!(
    "SELECT {} FROM {} {} ORDER BY {order_by}",
    query::USERS.select,
    query::USERS.from,
    conditions.where_sql()
  ));
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(params_from_iter(conditions.params()), RawUser::from_row)?
    .collect();
  rows
}

fn select_one<R>(
  conn: &rusqlite::Connection,
  source: &Source,
  conditions: &Conditions,
  from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
) -> tokio_rusqlite::Result<Option<R>> {
  let sql = query::scoped(&format!(
    "SELECT {} FROM {} {} LIMIT 1",
    source.select,
    source.from,
    conditions.where_sql()
  ));
  Ok(
    conn
      .query_row(&sql, params_from_iter(conditions.params()), from_row)
      .optional()?,
  )
}

fn insert_user(conn: &rusqlite::Connection, user: &NewUser, now: &str) -> rusqlite::Result<i64> {
  let verified_at = user.verified.then_some(now);
  conn.execute(
    "INSERT INTO users (name, email, password, status, email_verified_at, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    params![
      user.name,
      user.email,
      user.password_hash,
      encode_status(user.status),
      verified_at,
      now
    ],
  )?;
  let id = conn.last_insert_rowid();
  if let Some(role_id) = user.role_id {
    conn.execute(
      "INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
      params![id, role_id],
    )?;
  }
  Ok(id)
}

fn attach_abilities(
  conn: &rusqlite::Connection,
  role_id: RoleId,
  abilities: &[Ability],
) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare(
    "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
     SELECT ?1, id FROM permissions WHERE name = ?2",
  )?;
  for ability in abilities {
    stmt.execute(params![role_id, ability.as_str()])?;
  }
  Ok(())
}

fn apply_mutation(
  conn: &rusqlite::Connection,
  ids: &[UserId],
  mutation: BulkMutation,
  now: &str,
) -> rusqlite::Result<()> {
  let in_list = query::placeholders(ids.len());
  let mut bound: Vec<Value> = vec![Value::Text(now.to_owned())];
  bound.extend(ids.iter().map(|id| Value::Integer(*id)));

  match mutation {
    BulkMutation::Update { role_id, status } => {
      if let Some(status) = status {
        let mut with_status = vec![Value::Text(encode_status(status).to_owned())];
        with_status.extend(bound.iter().cloned());
        conn.execute(
          &format!("UPDATE users SET status = ?, updated_at = ? WHERE id IN ({in_list})"),
          params_from_iter(with_status.iter()),
        )?;
      }
      if let Some(role_id) = role_id {
        conn.execute(
          &format!("UPDATE users SET updated_at = ? WHERE id IN ({in_list})"),
          params_from_iter(bound.iter()),
        )?;
        conn.execute(
          &format!("DELETE FROM user_roles WHERE user_id IN ({in_list})"),
          params_from_iter(ids.iter()),
        )?;
        let mut stmt =
          conn.prepare("INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)")?;
        for id in ids {
          stmt.execute(params![id, role_id])?;
        }
      }
    }
    BulkMutation::Delete => {
      conn.execute(
        &format!("UPDATE users SET deleted_at = ?1, updated_at = ?1 WHERE id IN ({in_list})"),
        params_from_iter(bound.iter()),
      )?;
    }
    BulkMutation::Restore => {
      conn.execute(
        &format!("UPDATE users SET deleted_at = NULL, updated_at = ? WHERE id IN ({in_list})"),
        params_from_iter(bound.iter()),
      )?;
    }
    BulkMutation::ForceDelete => {
      conn.execute(
        &format!("DELETE FROM users WHERE id IN ({in_list})"),
        params_from_iter(ids.iter()),
      )?;
    }
  }
  Ok(())
}

fn decode_in_call<T>(result: Result<T>) -> tokio_rusqlite::Result<T> {
  result.map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

// ─── AdminStore ──────────────────────────────────────────────────────────────

impl AdminStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────

  async fn list_users(&self, query: &ListQuery, visibility: Visibility) -> Result<Page<User>> {
    let rendered = query::render(query, visibility);
    self
      .fetch_page(&query::USERS, rendered, query.pagination, RawUser::from_row, RawUser::into_user)
      .await
  }

  async fn find_user(
    &self,
    id: UserId,
    visibility: Visibility,
    scope: DeletedScope,
  ) -> Result<Option<User>> {
    let raw = self
      .conn
      .call(move |conn| {
        let mut conditions = Conditions::default();
        conditions.ids(query::USERS.id, &[id]);
        conditions.deleted(&query::USERS, scope);
        conditions.visibility(&query::USERS, visibility);
        Ok(select_users(conn, &conditions, query::USERS.id)?.pop())
      })
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn email_in_use(&self, email: &str, except: Option<UserId>) -> Result<bool> {
    let email = email.to_owned();
    let taken = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM users WHERE email = ?1 AND (?2 IS NULL OR id <> ?2))",
          params![email, except],
          |r| r.get::<_, bool>(0),
        )?)
      })
      .await?;
    Ok(taken)
  }

  async fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
    let email = email.to_owned();
    let raw: Option<(i64, String, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, password, status FROM users WHERE email = ?1 AND deleted_at IS NULL",
            params![email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?)
      })
      .await?;

    raw
      .map(|(user_id, password_hash, status)| -> Result<Credentials> {
        Ok(Credentials { user_id, password_hash, status: decode_status(&status)? })
      })
      .transpose()
  }

  async fn load_caller(&self, id: UserId) -> Result<Option<Caller>> {
    let loaded = self
      .conn
      .call(move |conn| {
        let Some((name, email)) = conn
          .query_row(
            "SELECT name, email FROM users WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
          )
          .optional()?
        else {
          return Ok(None);
        };

        let roles = conn
          .prepare(
            "SELECT r.name FROM user_roles x JOIN roles r ON r.id = x.role_id
             WHERE x.user_id = ?1 ORDER BY r.name",
          )?
          .query_map(params![id], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let permissions = conn
          .prepare(
            "SELECT DISTINCT p.name FROM user_roles x
             JOIN role_permissions rp ON rp.role_id = x.role_id
             JOIN permissions p ON p.id = rp.permission_id
             WHERE x.user_id = ?1",
          )?
          .query_map(params![id], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((name, email, roles, permissions)))
      })
      .await?;

    Ok(loaded.map(|(name, email, roles, permissions)| Caller {
      id,
      name,
      email,
      roles,
      abilities: permissions.iter().filter_map(|p| Ability::parse(p)).collect(),
    }))
  }

  async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE users SET name = ?1, email = ?2, status = ?3, updated_at = ?4,
             email_verified_at = CASE WHEN ?5 THEN NULL ELSE email_verified_at END
           WHERE id = ?6",
          params![
            changes.name,
            changes.email,
            encode_status(changes.status),
            now,
            changes.clear_verification,
            id
          ],
        )?;
        tx.execute("DELETE FROM user_roles WHERE user_id = ?1", params![id])?;
        tx.execute(
          "INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
          params![id, changes.role_id],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    self.user_by_id(id).await
  }

  async fn bulk_apply<A>(
    &self,
    visibility: Visibility,
    ids: &IdSet,
    mutation: BulkMutation,
    authorize: A,
  ) -> Result<BulkOutcome>
  where
    A: FnOnce(&[User]) -> bool + Send + 'static,
  {
    let ids = ids.as_slice().to_vec();
    let now = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        // Dropping `tx` without committing rolls everything back.
        let tx = conn.transaction()?;

        let mut conditions = Conditions::default();
        conditions.ids(query::USERS.id, &ids);
        conditions.deleted(&query::USERS, mutation.scope());
        conditions.visibility(&query::USERS, visibility);
        let raws = select_users(&tx, &conditions, query::USERS.id)?;

        if raws.len() != ids.len() {
          return Ok(BulkOutcome::CountMismatch {
            requested: ids.len(),
            resolved:  raws.len(),
          });
        }

        let users = decode_in_call(
          raws.into_iter().map(RawUser::into_user).collect::<Result<Vec<_>>>(),
        )?;
        if !authorize(&users) {
          return Ok(BulkOutcome::Denied);
        }

        apply_mutation(&tx, &ids, mutation, &now)?;
        tx.commit()?;
        Ok(BulkOutcome::Applied(users))
      })
      .await?;

    debug!(?mutation, ?outcome, "bulk apply");
    Ok(outcome)
  }

  // ── Roles and permissions ─────────────────────────────────────────────

  async fn list_roles(&self, query: &ListQuery, visibility: Visibility) -> Result<Page<RoleView>> {
    let rendered = query::render(query, visibility);
    self
      .fetch_page(
        &query::ROLES,
        rendered,
        query.pagination,
        RawRoleView::from_row,
        RawRoleView::into_view,
      )
      .await
  }

  async fn find_role(&self, id: RoleId, visibility: Visibility) -> Result<Option<RoleView>> {
    let raw = self
      .conn
      .call(move |conn| {
        let mut conditions = Conditions::default();
        conditions.ids(query::ROLES.id, &[id]);
        conditions.visibility(&query::ROLES, visibility);
        select_one(conn, &query::ROLES, &conditions, RawRoleView::from_row)
      })
      .await?;
    raw.map(RawRoleView::into_view).transpose()
  }

  async fn find_role_by_name(&self, name: &str, visibility: Visibility) -> Result<Option<Role>> {
    let name = name.to_owned();
    let role = self
      .conn
      .call(move |conn| {
        let mut conditions = Conditions::default();
        conditions.push("r.name = ?", [Value::Text(name)]);
        conditions.visibility(&query::ROLES, visibility);
        Ok(conn
          .query_row(
            &query::scoped(&format!("SELECT r.id, r.name FROM roles r {}", conditions.where_sql())),
            params_from_iter(conditions.params()),
            |r| Ok(Role { id: r.get(0)?, name: r.get(1)? }),
          )
          .optional()?)
      })
      .await?;
    Ok(role)
  }

  async fn role_exists(
    &self,
    name: &str,
    except: Option<RoleId>,
    visibility: Visibility,
  ) -> Result<bool> {
    let name = name.to_owned();
    let exists = self
      .conn
      .call(move |conn| {
        let mut conditions = Conditions::default();
        conditions.push("r.name = ?", [Value::Text(name)]);
        if let Some(except) = except {
          conditions.push("r.id <> ?", [Value::Integer(except)]);
        }
        conditions.visibility(&query::ROLES, visibility);
        Ok(conn.query_row(
          &query::scoped(&format!(
            "SELECT EXISTS (SELECT 1 FROM roles r {})",
            conditions.where_sql()
          )),
          params_from_iter(conditions.params()),
          |r| r.get::<_, bool>(0),
        )?)
      })
      .await?;
    Ok(exists)
  }

  async fn create_role(
    &self,
    name: String,
    abilities: Vec<Ability>,
    visibility: Visibility,
  ) -> Result<RoleView> {
    let now = encode_dt(Utc::now());
    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO roles (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
          params![name, now],
        )?;
        let id = tx.last_insert_rowid();
        attach_abilities(&tx, id, &abilities)?;
        tx.commit()?;
        Ok(id)
      })
      .await?;
    self.role_by_id(id, visibility).await
  }

  async fn update_role(
    &self,
    id: RoleId,
    name: String,
    abilities: Vec<Ability>,
    visibility: Visibility,
  ) -> Result<RoleView> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE roles SET name = ?1, updated_at = ?2 WHERE id = ?3",
          params![name, now, id],
        )?;
        tx.execute("DELETE FROM role_permissions WHERE role_id = ?1", params![id])?;
        attach_abilities(&tx, id, &abilities)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    self.role_by_id(id, visibility).await
  }

  async fn delete_role(&self, id: RoleId) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM roles WHERE id = ?1", params![id])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_permissions(&self, visibility: Visibility) -> Result<Vec<PermissionView>> {
    let raws = self
      .conn
      .call(move |conn| {
        let hide = if visibility.hides_protected() { "AND r.name <> ?1" } else { "" };
        let sql = format!(
          "SELECT p.id, p.name,
             (SELECT group_concat(r.name) FROM role_permissions rp
                JOIN roles r ON r.id = rp.role_id
                WHERE rp.permission_id = p.id {hide})
           FROM permissions p ORDER BY p.id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |r: &rusqlite::Row<'_>| {
          Ok(RawPermission { id: r.get(0)?, name: r.get(1)?, roles: r.get(2)? })
        };
        let rows = if visibility.hides_protected() {
          stmt.query_map(params![PROTECTED_ROLE], map)?.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawPermission::into_view).collect())
  }

  // ── Activity log ──────────────────────────────────────────────────────

  async fn list_activity(
    &self,
    query: &ListQuery,
    visibility: Visibility,
  ) -> Result<Page<ActivityEntry>> {
    let rendered = query::render(query, visibility);
    self
      .fetch_page(
        &query::ACTIVITY_LOGS,
        rendered,
        query.pagination,
        RawActivity::from_row,
        RawActivity::into_entry,
      )
      .await
  }

  async fn activity_facets(&self) -> Result<ActivityFacets> {
    let facets = self
      .conn
      .call(|conn| {
        let events = conn
          .prepare(
            "SELECT DISTINCT event FROM activity_log WHERE event IS NOT NULL ORDER BY event",
          )?
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let log_names = conn
          .prepare("SELECT DISTINCT log_name FROM activity_log ORDER BY log_name")?
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ActivityFacets { events, log_names })
      })
      .await?;
    Ok(facets)
  }

  // ── Invitations ───────────────────────────────────────────────────────

  async fn find_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>> {
    self.invitation_where("i.token_hash = ?1", token_hash.to_owned()).await
  }

  async fn find_invitation_by_email(&self, email: &str) -> Result<Option<Invitation>> {
    self.invitation_where("i.email = ?1", email.to_owned()).await
  }

  async fn replace_invitation(
    &self,
    invitation: NewInvitation,
    now: DateTime<Utc>,
  ) -> Result<ReplaceOutcome> {
    let now = encode_dt(now);
    let expires_at = encode_dt(invitation.expires_at);
    let email = invitation.email.clone();

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let live: bool = tx.query_row(
          "SELECT EXISTS (SELECT 1 FROM invitations
             WHERE email = ?1 AND accepted_at IS NULL AND expires_at >= ?2)",
          params![invitation.email, now],
          |r| r.get(0),
        )?;
        if live {
          return Ok(None);
        }
        tx.execute("DELETE FROM invitations WHERE email = ?1", params![invitation.email])?;
        tx.execute(
          "INSERT INTO invitations
             (email, role_id, invited_by, token_hash, expires_at, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          params![
            invitation.email,
            invitation.role_id,
            invitation.invited_by,
            invitation.token_hash,
            expires_at,
            now
          ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(id))
      })
      .await?;

    match id {
      None => Ok(ReplaceOutcome::Pending),
      Some(_) => self
        .find_invitation_by_email(&email)
        .await?
        .map(ReplaceOutcome::Created)
        .ok_or(Error::Missing("invitation")),
    }
  }

  async fn accept_invitation(
    &self,
    invitation_id: i64,
    user: NewUser,
    now: DateTime<Utc>,
  ) -> Result<AcceptOutcome> {
    let now = encode_dt(now);
    let stamped = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let stamped = tx.execute(
          "UPDATE invitations SET accepted_at = ?1, updated_at = ?1
           WHERE id = ?2 AND accepted_at IS NULL AND expires_at >= ?1",
          params![now, invitation_id],
        )?;
        if stamped == 0 {
          let accepted: Option<bool> = tx
            .query_row(
              "SELECT accepted_at IS NOT NULL FROM invitations WHERE id = ?1",
              params![invitation_id],
              |r| r.get(0),
            )
            .optional()?;
          return Ok(if accepted == Some(true) { Stamp::Accepted } else { Stamp::Expired });
        }
        let id = insert_user(&tx, &user, &now)?;
        tx.commit()?;
        Ok(Stamp::Created(id))
      })
      .await?;

    match stamped {
      Stamp::Created(id) => Ok(AcceptOutcome::Accepted(self.user_by_id(id).await?)),
      Stamp::Accepted => Ok(AcceptOutcome::AlreadyAccepted),
      Stamp::Expired => Ok(AcceptOutcome::Expired),
    }
  }

  // ── Bootstrap ─────────────────────────────────────────────────────────

  async fn ensure_super_admin(&self, user: NewUser) -> Result<(User, bool)> {
    let now = encode_dt(Utc::now());
    let (id, created) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
          .query_row("SELECT id FROM users WHERE email = ?1", params![user.email], |r| {
            r.get(0)
          })
          .optional()?;
        if let Some(id) = existing {
          return Ok((id, false));
        }
        let role_id: i64 = tx.query_row(
          "SELECT id FROM roles WHERE name = ?1",
          params![PROTECTED_ROLE],
          |r| r.get(0),
        )?;
        let id = insert_user(&tx, &NewUser { role_id: Some(role_id), ..user }, &now)?;
        tx.commit()?;
        Ok((id, true))
      })
      .await?;
    Ok((self.user_by_id(id).await?, created))
  }
}

// ─── AuditRecorder ───────────────────────────────────────────────────────────

impl AuditRecorder for SqliteStore {
  type Error = Error;

  async fn record(&self, entry: NewActivity) -> Result<()> {
    let now = encode_dt(Utc::now());
    let properties = entry.properties.to_string();
    let batch = entry.batch_uuid.map(|u| u.hyphenated().to_string());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO activity_log
             (log_name, description, event, subject_type, subject_id, causer_id,
              properties, batch_uuid, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
          params![
            entry.log_name,
            entry.description,
            entry.event,
            entry.subject_type,
            entry.subject_id,
            entry.causer_id,
            properties,
            batch,
            now
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
