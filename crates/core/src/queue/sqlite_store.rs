//! SQLite-backed work queue implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use super::{
    ElementData, Failure, NewQueueElement, PushOutcome, QueueElement, QueueError, QueueEvent,
    QueueFilter, QueueState, RetryPolicy, WorkQueue,
};

const SELECT_COLUMNS: &str = "id, queue_name, reference, data, state, retryable, attempt_count, message, retry_after, created_at, updated_at";

/// SQLite-backed work queue serving one queue name.
pub struct SqliteWorkQueue {
    conn: Mutex<Connection>,
    name: String,
}

impl SqliteWorkQueue {
    /// Open the queue database, creating the file and tables if needed.
    pub fn new(path: &Path, name: impl Into<String>) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            name: name.into(),
        })
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory(name: impl Into<String>) -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            name: name.into(),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_elements (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                queue_name TEXT NOT NULL,
                reference TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                data TEXT NOT NULL,
                state TEXT NOT NULL,
                retryable INTEGER NOT NULL DEFAULT 0,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                message TEXT,
                retry_after INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (queue_name, fingerprint)
            );

            CREATE INDEX IF NOT EXISTS idx_queue_elements_reference ON queue_elements(queue_name, reference);

            CREATE INDEX IF NOT EXISTS idx_queue_elements_state ON queue_elements(queue_name, state);
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("queue connection lock poisoned".to_string()))
    }

    fn build_where_clause(
        &self,
        filter: &QueueFilter,
    ) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["queue_name = ?"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(self.name.clone())];

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
            if let QueueState::Failed { retryable } = state {
                conditions.push("retryable = ?");
                params.push(Box::new(retryable));
            }
        }

        if let Some(ref reference) = filter.reference {
            conditions.push("reference = ?");
            params.push(Box::new(reference.clone()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    fn row_to_element(row: &rusqlite::Row) -> rusqlite::Result<QueueElement> {
        let id: String = row.get(0)?;
        let queue_name: String = row.get(1)?;
        let reference: String = row.get(2)?;
        let data_json: String = row.get(3)?;
        let state_str: String = row.get(4)?;
        let retryable: bool = row.get(5)?;
        let attempt_count: u32 = row.get(6)?;
        let message: Option<String> = row.get(7)?;
        let retry_after_ms: Option<i64> = row.get(8)?;
        let created_at_str: String = row.get(9)?;
        let updated_at_str: String = row.get(10)?;

        let data: ElementData = serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        let state = QueueState::from_parts(&state_str, retryable).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Text,
                format!("unknown queue state: {}", state_str).into(),
            )
        })?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let retry_after = retry_after_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(QueueElement {
            id,
            queue_name,
            reference,
            data,
            state,
            attempt_count,
            message,
            retry_after,
            created_at,
            updated_at,
        })
    }

    fn load(conn: &Connection, queue_name: &str, id: &str) -> Result<QueueElement, QueueError> {
        let sql = format!(
            "SELECT {} FROM queue_elements WHERE queue_name = ? AND id = ?",
            SELECT_COLUMNS
        );

        match conn.query_row(&sql, params![queue_name, id], Self::row_to_element) {
            Ok(element) => Ok(element),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(QueueError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_fingerprint(
        conn: &Connection,
        queue_name: &str,
        fingerprint: &str,
    ) -> Result<Option<QueueElement>, QueueError> {
        let sql = format!(
            "SELECT {} FROM queue_elements WHERE queue_name = ? AND fingerprint = ?",
            SELECT_COLUMNS
        );

        match conn.query_row(&sql, params![queue_name, fingerprint], Self::row_to_element) {
            Ok(element) => Ok(Some(element)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert(
        conn: &Connection,
        queue_name: &str,
        element: NewQueueElement,
    ) -> Result<PushOutcome, QueueError> {
        if let Some(existing) = Self::find_by_fingerprint(conn, queue_name, &element.fingerprint)? {
            return Ok(PushOutcome::AlreadyQueued(existing));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = QueueState::New;

        let data_json =
            serde_json::to_string(&element.data).map_err(|e| QueueError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO queue_elements (id, queue_name, reference, fingerprint, data, state, retryable, attempt_count, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
            params![
                id,
                queue_name,
                element.reference,
                element.fingerprint,
                data_json,
                state.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(PushOutcome::Queued(QueueElement {
            id,
            queue_name: queue_name.to_string(),
            reference: element.reference,
            data: element.data,
            state,
            attempt_count: 0,
            message: None,
            retry_after: None,
            created_at: now,
            updated_at: now,
        }))
    }

    fn save(conn: &Connection, element: &QueueElement) -> Result<(), QueueError> {
        let retryable = matches!(element.state, QueueState::Failed { retryable: true });

        conn.execute(
            "UPDATE queue_elements SET state = ?, retryable = ?, attempt_count = ?, message = ?, retry_after = ?, updated_at = ? WHERE id = ?",
            params![
                element.state.as_str(),
                retryable,
                element.attempt_count,
                element.message,
                element.retry_after.map(|t| t.timestamp_millis()),
                element.updated_at.to_rfc3339(),
                element.id,
            ],
        )?;

        Ok(())
    }

    fn transition(
        element: &QueueElement,
        state: QueueState,
        event: QueueEvent,
    ) -> Result<QueueState, QueueError> {
        state
            .on(event)
            .map_err(|transition| QueueError::InvalidState {
                element_id: element.id.clone(),
                transition,
            })
    }

    fn fail_locked(
        conn: &Connection,
        queue_name: &str,
        id: &str,
        failure: &Failure,
        policy: &RetryPolicy,
    ) -> Result<QueueElement, QueueError> {
        let mut element = Self::load(conn, queue_name, id)?;
        let now = Utc::now();

        let (retryable, message) = if failure.retryable {
            element.attempt_count += 1;
            if element.attempt_count >= policy.max_attempts {
                (
                    false,
                    format!(
                        "{} (retries exhausted after {} attempts)",
                        failure.message, element.attempt_count
                    ),
                )
            } else {
                (true, failure.message.clone())
            }
        } else {
            (false, failure.message.clone())
        };

        element.state = Self::transition(&element, element.state, QueueEvent::Fail { retryable })?;
        element.message = Some(message);
        element.retry_after = if retryable {
            let delay = chrono::Duration::from_std(policy.retry_delay)
                .unwrap_or_else(|_| chrono::Duration::zero());
            Some(now + delay)
        } else {
            None
        };
        element.updated_at = now;

        Self::save(conn, &element)?;
        Ok(element)
    }
}

impl WorkQueue for SqliteWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, element: NewQueueElement) -> Result<PushOutcome, QueueError> {
        let conn = self.lock()?;
        Self::insert(&conn, &self.name, element)
    }

    fn push_batch(&self, elements: Vec<NewQueueElement>) -> Result<Vec<PushOutcome>, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut outcomes = Vec::with_capacity(elements.len());
        for element in elements {
            outcomes.push(Self::insert(&tx, &self.name, element)?);
        }

        tx.commit()?;
        Ok(outcomes)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueueElement>, QueueError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM queue_elements WHERE queue_name = ? AND (state = 'new' OR (state = 'failed' AND retryable = 1 AND (retry_after IS NULL OR retry_after <= ?))) ORDER BY seq ASC LIMIT 1",
            SELECT_COLUMNS
        );

        let mut element = match conn.query_row(
            &sql,
            params![self.name, now.timestamp_millis()],
            Self::row_to_element,
        ) {
            Ok(element) => element,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut state = element.state;
        if matches!(state, QueueState::Failed { .. }) {
            state = Self::transition(&element, state, QueueEvent::Requeue)?;
        }
        element.state = Self::transition(&element, state, QueueEvent::Claim)?;
        element.retry_after = None;
        element.updated_at = Utc::now();

        Self::save(&conn, &element)?;
        Ok(Some(element))
    }

    fn complete(&self, id: &str, message: &str) -> Result<QueueElement, QueueError> {
        let conn = self.lock()?;

        let mut element = Self::load(&conn, &self.name, id)?;
        element.state = Self::transition(&element, element.state, QueueEvent::Succeed)?;
        element.message = Some(message.to_string());
        element.retry_after = None;
        element.updated_at = Utc::now();

        Self::save(&conn, &element)?;
        Ok(element)
    }

    fn fail(
        &self,
        id: &str,
        failure: &Failure,
        policy: &RetryPolicy,
    ) -> Result<QueueElement, QueueError> {
        let conn = self.lock()?;
        Self::fail_locked(&conn, &self.name, id, failure, policy)
    }

    fn release(&self, id: &str, message: &str) -> Result<QueueElement, QueueError> {
        let conn = self.lock()?;

        let mut element = Self::load(&conn, &self.name, id)?;
        element.state = Self::transition(&element, element.state, QueueEvent::Release)?;
        element.message = Some(message.to_string());
        element.retry_after = None;
        element.updated_at = Utc::now();

        Self::save(&conn, &element)?;
        Ok(element)
    }

    fn get(&self, id: &str) -> Result<Option<QueueElement>, QueueError> {
        let conn = self.lock()?;

        match Self::load(&conn, &self.name, id) {
            Ok(element) => Ok(Some(element)),
            Err(QueueError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueElement>, QueueError> {
        let conn = self.lock()?;

        let (where_clause, params) = self.build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM queue_elements {} ORDER BY seq ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_element)?;

        let mut elements = Vec::new();
        for row_result in rows {
            elements.push(row_result?);
        }

        Ok(elements)
    }

    fn count(&self, filter: &QueueFilter) -> Result<i64, QueueError> {
        let conn = self.lock()?;

        let (where_clause, params) = self.build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM queue_elements {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn next_retry_at(&self) -> Result<Option<DateTime<Utc>>, QueueError> {
        let conn = self.lock()?;

        let earliest: Option<i64> = conn.query_row(
            "SELECT MIN(retry_after) FROM queue_elements WHERE queue_name = ? AND state = 'failed' AND retryable = 1",
            params![self.name],
            |row| row.get(0),
        )?;

        Ok(earliest.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    fn recover_interrupted(&self, policy: &RetryPolicy) -> Result<Vec<QueueElement>, QueueError> {
        let conn = self.lock()?;

        let ids: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM queue_elements WHERE queue_name = ? AND state = 'in_progress' ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![self.name], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let failure = Failure::recoverable("interrupted while in progress");
        let mut recovered = Vec::with_capacity(ids.len());
        for id in ids {
            recovered.push(Self::fail_locked(&conn, &self.name, &id, &failure, policy)?);
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::registry::{AgreementStatus, InstitutionKind, InstitutionRef, TargetStatus};

    const QUEUE: &str = "Databehandlingsaftale_Status_Queue";

    fn create_test_queue() -> SqliteWorkQueue {
        SqliteWorkQueue::in_memory(QUEUE).unwrap()
    }

    fn element(agreement_id: &str, target: TargetStatus) -> NewQueueElement {
        NewQueueElement::from(ElementData {
            agreement_id: agreement_id.to_string(),
            institution: InstitutionRef::new(InstitutionKind::Institution, "751001"),
            system_name: "Aula".to_string(),
            service_name: "Elevdata".to_string(),
            current_status: AgreementStatus::Pending,
            requested_status: target,
        })
    }

    fn policy(max_attempts: u32, retry_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay,
        }
    }

    fn queued(outcome: PushOutcome) -> QueueElement {
        match outcome {
            PushOutcome::Queued(e) => e,
            PushOutcome::AlreadyQueued(e) => panic!("Expected Queued, got duplicate {}", e.id),
        }
    }

    #[test]
    fn test_push_element() {
        let queue = create_test_queue();
        let pushed = queued(queue.push(element("101", TargetStatus::Approve)).unwrap());

        assert!(!pushed.id.is_empty());
        assert_eq!(pushed.queue_name, QUEUE);
        assert_eq!(pushed.state, QueueState::New);
        assert_eq!(pushed.attempt_count, 0);
        assert!(pushed.reference.starts_with("Godkend_"));

        let fetched = queue.get(&pushed.id).unwrap().unwrap();
        assert_eq!(fetched.data, pushed.data);
        assert_eq!(fetched.reference, pushed.reference);
    }

    #[test]
    fn test_get_nonexistent_element() {
        let queue = create_test_queue();
        assert!(queue.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_push_same_reference_is_idempotent() {
        let queue = create_test_queue();
        let first = queued(queue.push(element("101", TargetStatus::Delete)).unwrap());

        let second = queue.push(element("101", TargetStatus::Delete)).unwrap();
        assert!(!second.is_queued());
        assert_eq!(second.element().id, first.id);
        assert_eq!(queue.count(&QueueFilter::new()).unwrap(), 1);
    }

    #[test]
    fn test_colliding_references_are_both_queued() {
        let queue = create_test_queue();
        // Same 8-char reference, different agreements
        let outcomes = queue
            .push_batch(vec![
                element("208640", TargetStatus::Approve),
                element("249693", TargetStatus::Approve),
            ])
            .unwrap();

        assert!(outcomes.iter().all(PushOutcome::is_queued));
        assert_eq!(outcomes[0].element().reference, outcomes[1].element().reference);

        let stored = queue
            .list(&QueueFilter::new().with_reference("Godkend_a69b170b"))
            .unwrap();
        let ids: Vec<&str> = stored.iter().map(|e| e.data.agreement_id.as_str()).collect();
        assert_eq!(ids, vec!["208640", "249693"]);
    }

    #[test]
    fn test_release_returns_element_without_attempt() {
        let queue = create_test_queue();
        let pushed = queued(queue.push(element("101", TargetStatus::Delete)).unwrap());
        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();

        let released = queue.release(&claimed.id, "session lost").unwrap();
        assert_eq!(released.state, QueueState::New);
        assert_eq!(released.attempt_count, 0);
        assert_eq!(released.message.as_deref(), Some("session lost"));

        let again = queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(again.id, pushed.id);
    }

    #[test]
    fn test_cannot_release_unclaimed() {
        let queue = create_test_queue();
        let pushed = queued(queue.push(element("101", TargetStatus::Delete)).unwrap());

        let result = queue.release(&pushed.id, "session lost");
        assert!(matches!(result, Err(QueueError::InvalidState { .. })));
    }

    #[test]
    fn test_push_batch() {
        let queue = create_test_queue();
        let outcomes = queue
            .push_batch(vec![
                element("101", TargetStatus::Delete),
                element("102", TargetStatus::Approve),
                element("101", TargetStatus::Delete),
            ])
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_queued());
        assert!(outcomes[1].is_queued());
        assert!(!outcomes[2].is_queued());
        assert_eq!(queue.count(&QueueFilter::new()).unwrap(), 2);
    }

    #[test]
    fn test_claim_in_creation_order() {
        let queue = create_test_queue();
        let a = queued(queue.push(element("103", TargetStatus::Approve)).unwrap());
        let b = queued(queue.push(element("101", TargetStatus::Delete)).unwrap());

        let first = queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(first.state, QueueState::InProgress);

        let second = queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(second.id, b.id);

        assert!(queue.claim_next(Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_complete_marks_done() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Approve)).unwrap();

        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        let done = queue.complete(&claimed.id, "Aftale godkendt.").unwrap();

        assert_eq!(done.state, QueueState::Done);
        assert_eq!(done.message.as_deref(), Some("Aftale godkendt."));
        assert!(queue.claim_next(Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_cannot_complete_twice() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Approve)).unwrap();
        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        queue.complete(&claimed.id, "Aftale godkendt.").unwrap();

        let result = queue.complete(&claimed.id, "Aftale godkendt.");
        assert!(matches!(result, Err(QueueError::InvalidState { .. })));
    }

    #[test]
    fn test_cannot_complete_unclaimed() {
        let queue = create_test_queue();
        let pushed = queued(queue.push(element("101", TargetStatus::Approve)).unwrap());

        let result = queue.complete(&pushed.id, "Aftale godkendt.");
        assert!(matches!(result, Err(QueueError::InvalidState { .. })));
    }

    #[test]
    fn test_complete_nonexistent_element() {
        let queue = create_test_queue();
        let result = queue.complete("nope", "done");
        assert!(matches!(result, Err(QueueError::NotFound(_))));
    }

    #[test]
    fn test_recoverable_failure_waits_for_retry_time() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Await)).unwrap();
        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();

        let failed = queue
            .fail(
                &claimed.id,
                &Failure::recoverable("HTTP 502"),
                &policy(3, Duration::from_secs(60)),
            )
            .unwrap();

        assert_eq!(failed.state, QueueState::Failed { retryable: true });
        assert_eq!(failed.attempt_count, 1);
        let retry_after = failed.retry_after.unwrap();
        assert_eq!(queue.next_retry_at().unwrap().unwrap(), retry_after);

        // Not claimable before its retry time
        assert!(queue.claim_next(Utc::now()).unwrap().is_none());

        let retried = queue
            .claim_next(retry_after + chrono::Duration::seconds(1))
            .unwrap()
            .unwrap();
        assert_eq!(retried.id, claimed.id);
        assert_eq!(retried.state, QueueState::InProgress);
        assert_eq!(retried.attempt_count, 1);
        assert!(retried.retry_after.is_none());
    }

    #[test]
    fn test_retries_exhausted_becomes_terminal() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Await)).unwrap();
        let policy = policy(2, Duration::ZERO);

        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        queue
            .fail(&claimed.id, &Failure::recoverable("timeout"), &policy)
            .unwrap();

        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        let failed = queue
            .fail(&claimed.id, &Failure::recoverable("timeout"), &policy)
            .unwrap();

        assert_eq!(failed.state, QueueState::Failed { retryable: false });
        assert_eq!(failed.attempt_count, 2);
        assert!(failed.message.unwrap().contains("retries exhausted"));
        assert!(queue.claim_next(Utc::now()).unwrap().is_none());
        assert!(queue.next_retry_at().unwrap().is_none());
    }

    #[test]
    fn test_terminal_failure_is_never_retried() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Delete)).unwrap();
        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();

        let failed = queue
            .fail(
                &claimed.id,
                &Failure::terminal("Aftalen er allerede slettet"),
                &policy(3, Duration::ZERO),
            )
            .unwrap();

        assert_eq!(failed.state, QueueState::Failed { retryable: false });
        assert_eq!(failed.attempt_count, 0);
        assert!(queue
            .claim_next(Utc::now() + chrono::Duration::days(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_recover_interrupted() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Delete)).unwrap();
        queue.push(element("102", TargetStatus::Approve)).unwrap();
        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();

        let recovered = queue
            .recover_interrupted(&policy(3, Duration::ZERO))
            .unwrap();

        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].id, claimed.id);
        assert_eq!(recovered[0].state, QueueState::Failed { retryable: true });
        assert_eq!(recovered[0].attempt_count, 1);

        // The interrupted element keeps its place in line
        let next = queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(next.id, claimed.id);
    }

    #[test]
    fn test_list_with_state_filter() {
        let queue = create_test_queue();
        queue.push(element("101", TargetStatus::Delete)).unwrap();
        queue.push(element("102", TargetStatus::Approve)).unwrap();
        queue.push(element("103", TargetStatus::Await)).unwrap();

        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        queue.complete(&claimed.id, "Aftale slettet.").unwrap();
        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        queue
            .fail(
                &claimed.id,
                &Failure::terminal("rejected"),
                &RetryPolicy::default(),
            )
            .unwrap();

        let done = queue
            .list(&QueueFilter::new().with_state(QueueState::Done))
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].data.agreement_id, "101");

        let terminal = QueueFilter::new().with_state(QueueState::Failed { retryable: false });
        assert_eq!(queue.count(&terminal).unwrap(), 1);

        let retryable = QueueFilter::new().with_state(QueueState::Failed { retryable: true });
        assert_eq!(queue.count(&retryable).unwrap(), 0);

        let new = queue
            .list(&QueueFilter::new().with_state(QueueState::New))
            .unwrap();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].data.agreement_id, "103");
    }

    #[test]
    fn test_list_pagination_and_reference() {
        let queue = create_test_queue();
        let mut references = Vec::new();
        for id in ["101", "102", "103", "104"] {
            references.push(queued(queue.push(element(id, TargetStatus::Await)).unwrap()).reference);
        }

        let page = queue
            .list(&QueueFilter::new().with_limit(2).with_offset(1))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].data.agreement_id, "102");

        let by_ref = queue
            .list(&QueueFilter::new().with_reference(references[3].clone()))
            .unwrap();
        assert_eq!(by_ref.len(), 1);
        assert_eq!(by_ref[0].data.agreement_id, "104");
    }

    #[test]
    fn test_queues_are_isolated_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let status = SqliteWorkQueue::new(&path, QUEUE).unwrap();
        let other = SqliteWorkQueue::new(&path, "Other_Queue").unwrap();

        status.push(element("101", TargetStatus::Delete)).unwrap();
        assert!(other.push(element("101", TargetStatus::Delete)).unwrap().is_queued());

        assert_eq!(status.count(&QueueFilter::new()).unwrap(), 1);
        assert_eq!(other.count(&QueueFilter::new()).unwrap(), 1);
        assert_eq!(status.name(), QUEUE);
    }

    #[test]
    fn test_file_based_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let id = {
            let queue = SqliteWorkQueue::new(&path, QUEUE).unwrap();
            queue.push(element("101", TargetStatus::Delete)).unwrap();
            queue.claim_next(Utc::now()).unwrap().unwrap().id
        };

        let queue = SqliteWorkQueue::new(&path, QUEUE).unwrap();
        let element = queue.get(&id).unwrap().unwrap();
        assert_eq!(element.state, QueueState::InProgress);
        assert_eq!(element.data.requested_status, TargetStatus::Delete);
    }
}
