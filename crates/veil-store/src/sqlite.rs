//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the Veil engine. It uses
//! rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. The connection mutex serializes all
//! access, so the multi-statement primitives (`consume_view`,
//! `terminate_grant`) are atomic with respect to each other; transactions
//! additionally keep them atomic on disk.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use veil_core::{
    AccessGrant, AccessRequest, DurationPolicy, GrantId, GrantState, RequestId, RequestStatus,
    ResourceRef, ResourceType, Username, VisibilityPolicy,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ConsumeResult, InsertGrantResult, InsertRequestResult, Store, TerminateResult};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// Column list shared by every grant SELECT.
const GRANT_COLUMNS: &str = "id, owner, grantee, resource_type, resource_ref, duration, \
     views_consumed, state, granted_at, terminated_at, termination_reason, \
     warning_sent, original_duration_ms";

const REQUEST_COLUMNS: &str =
    "id, owner, requester, resource_type, message, status, created_at, responded_at";

/// Wrap a conversion failure so it can flow through rusqlite's row mapper.
fn conv_err(
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn bad_tag(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unknown {} tag: {}", column, value).into(),
    )
}

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<AccessGrant> {
    let id: String = row.get("id")?;
    let resource_type: String = row.get("resource_type")?;
    let duration: String = row.get("duration")?;
    let state: String = row.get("state")?;
    let resource_ref: Option<String> = row.get("resource_ref")?;

    Ok(AccessGrant {
        id: GrantId::parse(&id).map_err(conv_err)?,
        owner: Username(row.get("owner")?),
        grantee: Username(row.get("grantee")?),
        resource_type: ResourceType::parse(&resource_type)
            .ok_or_else(|| bad_tag("resource_type", &resource_type))?,
        resource_ref: resource_ref.map(ResourceRef),
        duration: serde_json::from_str(&duration).map_err(conv_err)?,
        views_consumed: row.get("views_consumed")?,
        state: GrantState::parse(&state).ok_or_else(|| bad_tag("state", &state))?,
        granted_at: row.get("granted_at")?,
        terminated_at: row.get("terminated_at")?,
        termination_reason: row.get("termination_reason")?,
        warning_sent: row.get::<_, i64>("warning_sent")? != 0,
        original_duration_ms: row.get("original_duration_ms")?,
    })
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<AccessRequest> {
    let id: String = row.get("id")?;
    let resource_type: String = row.get("resource_type")?;
    let status: String = row.get("status")?;

    Ok(AccessRequest {
        id: RequestId::parse(&id).map_err(conv_err)?,
        owner: Username(row.get("owner")?),
        requester: Username(row.get("requester")?),
        resource_type: ResourceType::parse(&resource_type)
            .ok_or_else(|| bad_tag("resource_type", &resource_type))?,
        message: row.get("message")?,
        status: RequestStatus::parse(&status).ok_or_else(|| bad_tag("status", &status))?,
        created_at: row.get("created_at")?,
        responded_at: row.get("responded_at")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
    ) -> Result<Option<VisibilityPolicy>> {
        let owner = owner.clone();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT policy FROM policies WHERE owner = ?1 AND resource_type = ?2",
                    params![owner.as_str(), resource_type.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
        policy: &VisibilityPolicy,
        now: i64,
    ) -> Result<()> {
        let owner = owner.clone();
        let json = serde_json::to_string(policy)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO policies (owner, resource_type, policy, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(owner, resource_type) DO UPDATE
                 SET policy = excluded.policy, updated_at = excluded.updated_at",
                params![owner.as_str(), resource_type.as_str(), json, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_request(&self, request: &AccessRequest) -> Result<InsertRequestResult> {
        let request = request.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM requests
                     WHERE owner = ?1 AND requester = ?2 AND resource_type = ?3
                       AND status = 'pending'",
                    params![
                        request.owner.as_str(),
                        request.requester.as_str(),
                        request.resource_type.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                let existing = RequestId::parse(&existing)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                return Ok(InsertRequestResult::DuplicatePending { existing });
            }

            tx.execute(
                "INSERT INTO requests
                     (id, owner, requester, resource_type, message, status,
                      created_at, responded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    request.id.to_string(),
                    request.owner.as_str(),
                    request.requester.as_str(),
                    request.resource_type.as_str(),
                    request.message,
                    request.status.as_str(),
                    request.created_at,
                    request.responded_at,
                ],
            )?;

            tx.commit()?;
            Ok(InsertRequestResult::Inserted)
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<AccessRequest>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![id], row_to_request)
                .optional()?)
        })
        .await
    }

    async fn update_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        responded_at: i64,
    ) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE requests SET status = ?2, responded_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, status.as_str(), responded_at],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_requests_by_owner(
        &self,
        owner: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        let owner = owner.clone();
        self.with_conn(move |conn| {
            list_requests(conn, "owner", owner.as_str(), status)
        })
        .await
    }

    async fn list_requests_by_requester(
        &self,
        requester: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        let requester = requester.clone();
        self.with_conn(move |conn| {
            list_requests(conn, "requester", requester.as_str(), status)
        })
        .await
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> Result<InsertGrantResult> {
        let grant = grant.clone();
        let duration_json = serde_json::to_string(&grant.duration)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let resource_ref = grant.resource_ref.as_ref().map(|r| r.as_str().to_string());
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM grants
                     WHERE owner = ?1 AND grantee = ?2 AND resource_type = ?3
                       AND COALESCE(resource_ref, '') = COALESCE(?4, '')
                       AND state = 'active'",
                    params![
                        grant.owner.as_str(),
                        grant.grantee.as_str(),
                        grant.resource_type.as_str(),
                        resource_ref,
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                let existing = GrantId::parse(&existing)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                return Ok(InsertGrantResult::ActiveExists { existing });
            }

            tx.execute(
                "INSERT INTO grants
                     (id, owner, grantee, resource_type, resource_ref, duration,
                      expires_at, views_consumed, state, granted_at, terminated_at,
                      termination_reason, warning_sent, original_duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    grant.id.to_string(),
                    grant.owner.as_str(),
                    grant.grantee.as_str(),
                    grant.resource_type.as_str(),
                    resource_ref,
                    duration_json,
                    grant.duration.expires_at(),
                    grant.views_consumed,
                    grant.state.as_str(),
                    grant.granted_at,
                    grant.terminated_at,
                    grant.termination_reason,
                    grant.warning_sent as i64,
                    grant.original_duration_ms,
                ],
            )?;

            tx.commit()?;
            Ok(InsertGrantResult::Inserted)
        })
        .await
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<AccessGrant>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {GRANT_COLUMNS} FROM grants WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], row_to_grant).optional()?)
        })
        .await
    }

    async fn find_active_grant(
        &self,
        owner: &Username,
        grantee: &Username,
        resource_type: ResourceType,
        resource_ref: Option<&ResourceRef>,
    ) -> Result<Option<AccessGrant>> {
        let owner = owner.clone();
        let grantee = grantee.clone();
        let resource_ref = resource_ref.map(|r| r.as_str().to_string());
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {GRANT_COLUMNS} FROM grants
                 WHERE owner = ?1 AND grantee = ?2 AND resource_type = ?3
                   AND COALESCE(resource_ref, '') = COALESCE(?4, '')
                   AND state = 'active'"
            );
            Ok(conn
                .query_row(
                    &sql,
                    params![
                        owner.as_str(),
                        grantee.as_str(),
                        resource_type.as_str(),
                        resource_ref
                    ],
                    row_to_grant,
                )
                .optional()?)
        })
        .await
    }

    async fn list_grants_by_owner(
        &self,
        owner: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>> {
        let owner = owner.clone();
        self.with_conn(move |conn| list_grants(conn, "owner", owner.as_str(), state))
            .await
    }

    async fn list_grants_by_grantee(
        &self,
        grantee: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>> {
        let grantee = grantee.clone();
        self.with_conn(move |conn| list_grants(conn, "grantee", grantee.as_str(), state))
            .await
    }

    async fn terminate_grant(
        &self,
        id: &GrantId,
        state: GrantState,
        reason: &str,
        now: i64,
    ) -> Result<TerminateResult> {
        let id = id.to_string();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            // Guarded update: only the first writer flips the row out of
            // 'active'; everyone else matches zero rows.
            let changed = conn.execute(
                "UPDATE grants
                 SET state = ?2, terminated_at = ?3, termination_reason = ?4
                 WHERE id = ?1 AND state = 'active'",
                params![id, state.as_str(), now, reason],
            )?;

            if changed > 0 {
                return Ok(TerminateResult::Terminated);
            }

            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM grants WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(if exists.is_some() {
                TerminateResult::AlreadyTerminal
            } else {
                TerminateResult::NotFound
            })
        })
        .await
    }

    async fn expire_overdue(&self, id: &GrantId, now: i64) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            // The deadline guard makes a stale caller lose to a renewal
            // that already pushed expires_at into the future.
            let changed = conn.execute(
                "UPDATE grants
                 SET state = 'expired', terminated_at = ?2,
                     termination_reason = 'duration elapsed'
                 WHERE id = ?1 AND state = 'active'
                   AND expires_at IS NOT NULL AND expires_at <= ?2",
                params![id, now],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn consume_view(&self, id: &GrantId, now: i64) -> Result<ConsumeResult> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let row: Option<(String, String, u32)> = tx
                .query_row(
                    "SELECT state, duration, views_consumed FROM grants WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let (state, duration, views) = match row {
                None => return Ok(ConsumeResult::NotFound),
                Some(row) => row,
            };

            let state = GrantState::parse(&state)
                .ok_or_else(|| StoreError::InvalidData(format!("unknown state: {state}")))?;
            if state != GrantState::Active {
                return Ok(ConsumeResult::Terminated { state });
            }

            let duration: DurationPolicy = serde_json::from_str(&duration)?;
            let limit = match duration.view_limit() {
                None => {
                    return Ok(ConsumeResult::Granted {
                        views_remaining: None,
                        exhausted: false,
                    })
                }
                Some(limit) => limit,
            };

            if views >= limit {
                tx.execute(
                    "UPDATE grants
                     SET state = 'expired', terminated_at = ?2,
                         termination_reason = 'view limit reached'
                     WHERE id = ?1 AND state = 'active'",
                    params![id, now],
                )?;
                tx.commit()?;
                return Ok(ConsumeResult::Exhausted);
            }

            let new_views = views + 1;
            let exhausted = new_views >= limit;
            if exhausted {
                // The final view succeeds and retires the grant in the
                // same transaction.
                tx.execute(
                    "UPDATE grants
                     SET views_consumed = ?2, state = 'expired', terminated_at = ?3,
                         termination_reason = 'view limit reached'
                     WHERE id = ?1 AND state = 'active'",
                    params![id, new_views, now],
                )?;
            } else {
                tx.execute(
                    "UPDATE grants SET views_consumed = ?2 WHERE id = ?1 AND state = 'active'",
                    params![id, new_views],
                )?;
            }

            tx.commit()?;
            Ok(ConsumeResult::Granted {
                views_remaining: Some(limit - new_views),
                exhausted,
            })
        })
        .await
    }

    async fn renew_grant(&self, id: &GrantId, new_expires_at: i64) -> Result<bool> {
        let id = id.to_string();
        let duration_json =
            serde_json::to_string(&DurationPolicy::ExpiresAt { at: new_expires_at })?;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE grants
                 SET duration = ?2, expires_at = ?3, views_consumed = 0, warning_sent = 0
                 WHERE id = ?1 AND state = 'active' AND expires_at IS NOT NULL",
                params![id, duration_json, new_expires_at],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn mark_warning_sent(&self, id: &GrantId) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE grants SET warning_sent = 1
                 WHERE id = ?1 AND state = 'active' AND warning_sent = 0",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_active_timed(&self) -> Result<Vec<AccessGrant>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {GRANT_COLUMNS} FROM grants
                 WHERE state = 'active' AND expires_at IS NOT NULL
                 ORDER BY expires_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let grants = stmt
                .query_map([], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(grants)
        })
        .await
    }
}

fn list_requests(
    conn: &Connection,
    column: &str,
    value: &str,
    status: Option<RequestStatus>,
) -> Result<Vec<AccessRequest>> {
    let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE {column} = ?1");
    if status.is_some() {
        sql.push_str(" AND status = ?2");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = match status {
        Some(status) => stmt.query_map(params![value, status.as_str()], row_to_request)?,
        None => stmt.query_map(params![value], row_to_request)?,
    };
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn list_grants(
    conn: &Connection,
    column: &str,
    value: &str,
    state: Option<GrantState>,
) -> Result<Vec<AccessGrant>> {
    let mut sql = format!("SELECT {GRANT_COLUMNS} FROM grants WHERE {column} = ?1");
    if state.is_some() {
        sql.push_str(" AND state = ?2");
    }
    sql.push_str(" ORDER BY granted_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = match state {
        Some(state) => stmt.query_map(params![value, state.as_str()], row_to_grant)?,
        None => stmt.query_map(params![value], row_to_grant)?,
    };
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{BlurLevel, PolicyMode};

    fn make_grant(grantee: &str, rref: Option<&str>, duration: DurationPolicy) -> AccessGrant {
        AccessGrant::new(
            Username::from("amara"),
            Username::from(grantee),
            ResourceType::Images,
            rref.map(ResourceRef::from),
            duration,
            1_000,
        )
    }

    #[tokio::test]
    async fn test_policy_upsert_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let owner = Username::from("amara");

        assert!(store
            .get_policy(&owner, ResourceType::Images)
            .await
            .unwrap()
            .is_none());

        let policy = VisibilityPolicy::with_mode(PolicyMode::Blurred {
            level: BlurLevel::Heavy,
        });
        store
            .set_policy(&owner, ResourceType::Images, &policy, 1_000)
            .await
            .unwrap();

        let stored = store
            .get_policy(&owner, ResourceType::Images)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, policy);

        // Replace is atomic and total.
        let replacement = VisibilityPolicy::with_mode(PolicyMode::Clear);
        store
            .set_policy(&owner, ResourceType::Images, &replacement, 2_000)
            .await
            .unwrap();
        let stored = store
            .get_policy(&owner, ResourceType::Images)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.mode, PolicyMode::Clear);
    }

    #[tokio::test]
    async fn test_grant_roundtrip_all_fields() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = make_grant("bilal", Some("img-7"), DurationPolicy::ExpiresAt { at: 99_000 });
        store.insert_grant(&grant).await.unwrap();

        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored, grant);
        assert_eq!(stored.original_duration_ms, Some(98_000));
    }

    #[tokio::test]
    async fn test_active_uniqueness_distinguishes_refs() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_grant(&make_grant("bilal", Some("img-1"), DurationPolicy::Permanent))
            .await
            .unwrap();

        // Same tuple, different ref: allowed.
        assert_eq!(
            store
                .insert_grant(&make_grant("bilal", Some("img-2"), DurationPolicy::Permanent))
                .await
                .unwrap(),
            InsertGrantResult::Inserted
        );

        // Exact tuple: rejected.
        assert!(matches!(
            store
                .insert_grant(&make_grant("bilal", Some("img-1"), DurationPolicy::Permanent))
                .await
                .unwrap(),
            InsertGrantResult::ActiveExists { .. }
        ));

        // Scalar (NULL ref) tuples are also unique.
        let scalar = AccessGrant::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::ContactEmail,
            None,
            DurationPolicy::Permanent,
            1_000,
        );
        store.insert_grant(&scalar).await.unwrap();
        let scalar_dup = AccessGrant::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::ContactEmail,
            None,
            DurationPolicy::Permanent,
            1_001,
        );
        assert!(matches!(
            store.insert_grant(&scalar_dup).await.unwrap(),
            InsertGrantResult::ActiveExists { .. }
        ));
    }

    #[tokio::test]
    async fn test_consume_view_limited() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = make_grant("bilal", Some("img-1"), DurationPolicy::ViewLimited { limit: 2 });
        store.insert_grant(&grant).await.unwrap();

        assert_eq!(
            store.consume_view(&grant.id, 2_000).await.unwrap(),
            ConsumeResult::Granted {
                views_remaining: Some(1),
                exhausted: false,
            }
        );
        assert_eq!(
            store.consume_view(&grant.id, 2_001).await.unwrap(),
            ConsumeResult::Granted {
                views_remaining: Some(0),
                exhausted: true,
            }
        );
        assert_eq!(
            store.consume_view(&grant.id, 2_002).await.unwrap(),
            ConsumeResult::Terminated {
                state: GrantState::Expired
            }
        );

        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.views_consumed, 2);
        assert_eq!(stored.state, GrantState::Expired);
    }

    #[tokio::test]
    async fn test_terminate_then_regrant() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = make_grant("bilal", Some("img-1"), DurationPolicy::Permanent);
        store.insert_grant(&grant).await.unwrap();

        assert_eq!(
            store
                .terminate_grant(&grant.id, GrantState::Revoked, "owner action", 5_000)
                .await
                .unwrap(),
            TerminateResult::Terminated
        );
        assert_eq!(
            store
                .terminate_grant(&grant.id, GrantState::Expired, "late sweeper", 5_001)
                .await
                .unwrap(),
            TerminateResult::AlreadyTerminal
        );
        assert_eq!(
            store
                .terminate_grant(&GrantId::generate(), GrantState::Expired, "none", 5_002)
                .await
                .unwrap(),
            TerminateResult::NotFound
        );

        // Terminal rows free the tuple for re-granting.
        assert_eq!(
            store
                .insert_grant(&make_grant("bilal", Some("img-1"), DurationPolicy::Permanent))
                .await
                .unwrap(),
            InsertGrantResult::Inserted
        );
    }

    #[tokio::test]
    async fn test_expire_overdue_loses_to_renewal() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = make_grant("bilal", Some("img-1"), DurationPolicy::ExpiresAt { at: 5_000 });
        store.insert_grant(&grant).await.unwrap();

        // Before the deadline nothing happens.
        assert!(!store.expire_overdue(&grant.id, 4_000).await.unwrap());

        // A renewal lands between a caller's snapshot and its expiry;
        // the stale expiry must match zero rows.
        assert!(store.renew_grant(&grant.id, 9_000).await.unwrap());
        assert!(!store.expire_overdue(&grant.id, 6_000).await.unwrap());
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Active);

        // Past the renewed deadline it expires exactly once.
        assert!(store.expire_overdue(&grant.id, 9_000).await.unwrap());
        assert!(!store.expire_overdue(&grant.id, 9_001).await.unwrap());
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Expired);
        assert_eq!(stored.termination_reason.as_deref(), Some("duration elapsed"));
    }

    #[tokio::test]
    async fn test_renew_and_warning_flags() {
        let store = SqliteStore::open_memory().unwrap();
        let grant = make_grant("bilal", Some("img-1"), DurationPolicy::ExpiresAt { at: 5_000 });
        store.insert_grant(&grant).await.unwrap();

        assert!(store.mark_warning_sent(&grant.id).await.unwrap());
        assert!(!store.mark_warning_sent(&grant.id).await.unwrap());

        assert!(store.renew_grant(&grant.id, 9_000).await.unwrap());
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.duration, DurationPolicy::ExpiresAt { at: 9_000 });
        assert!(!stored.warning_sent);

        // Renewal re-armed the warning.
        assert!(store.mark_warning_sent(&grant.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_active_timed_ordered() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_grant(&make_grant("bilal", Some("a"), DurationPolicy::ExpiresAt { at: 9_000 }))
            .await
            .unwrap();
        store
            .insert_grant(&make_grant("chen", Some("b"), DurationPolicy::ExpiresAt { at: 3_000 }))
            .await
            .unwrap();
        store
            .insert_grant(&make_grant("dana", Some("c"), DurationPolicy::Permanent))
            .await
            .unwrap();

        let timed = store.list_active_timed().await.unwrap();
        let expiries: Vec<_> = timed.iter().filter_map(|g| g.duration.expires_at()).collect();
        assert_eq!(expiries, vec![3_000, 9_000]);
    }

    #[tokio::test]
    async fn test_requests_roundtrip_and_listing() {
        let store = SqliteStore::open_memory().unwrap();
        let req = AccessRequest::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::DateOfBirth,
            Some("hi".to_string()),
            1_000,
        );
        store.insert_request(&req).await.unwrap();

        let stored = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(stored, req);

        let pending = store
            .list_requests_by_owner(&Username::from("amara"), Some(RequestStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        assert!(store
            .update_request(&req.id, RequestStatus::Cancelled, 2_000)
            .await
            .unwrap());
        let pending = store
            .list_requests_by_owner(&Username::from("amara"), Some(RequestStatus::Pending))
            .await
            .unwrap();
        assert!(pending.is_empty());

        let all = store
            .list_requests_by_requester(&Username::from("bilal"), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("veil.db");

        let grant_id;
        {
            let store = SqliteStore::open(&path).unwrap();
            let grant = make_grant("bilal", Some("img-1"), DurationPolicy::Permanent);
            grant_id = grant.id;
            store.insert_grant(&grant).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let stored = store.get_grant(&grant_id).await.unwrap().unwrap();
        assert_eq!(stored.grantee.as_str(), "bilal");
    }
}
