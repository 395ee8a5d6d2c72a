use crate::models::{FormSubmission, PaginatedSubmissions, SubmissionFilter};
use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SubmissionStore {
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

fn lock(db: &Mutex<Connection>) -> anyhow::Result<MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|e| anyhow::anyhow!("db mutex poisoned: {}", e))
}

impl SubmissionStore {
    pub fn new(base_path: &str) -> anyhow::Result<Self> {
        let dir = Path::new(base_path);
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating storage directory {:?}", dir))?;
        }
        let db_path = dir.join("assetshim_submissions.sqlite");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {:?}", db_path))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                form_type TEXT NOT NULL,
                email TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_type_created
                ON submissions(form_type, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_submissions_created
                ON submissions(created_at DESC);
            ",
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub async fn add(&self, submission: FormSubmission) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let payload = serde_json::to_string(&submission)?;
        tokio::task::spawn_blocking(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO submissions (id, form_type, email, created_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    submission.id,
                    submission.form_type.as_str(),
                    submission.email,
                    submission.created_at,
                    payload
                ],
            )
            .context("inserting submission")?;
            Ok::<_, anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    fn build_where_clause(filter: &SubmissionFilter) -> (String, Vec<Value>) {
        match filter.form_type {
            Some(form_type) => (
                "WHERE form_type = ?".to_string(),
                vec![Value::from(form_type.as_str().to_string())],
            ),
            None => (String::new(), Vec::new()),
        }
    }

    /// One page of submissions, newest first. `page` is zero-based.
    pub async fn query(
        &self,
        filter: &SubmissionFilter,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<PaginatedSubmissions> {
        let offset = page as i64 * page_size as i64;
        let (clause, params) = Self::build_where_clause(filter);
        let db = Arc::clone(&self.db);

        let (items, total) = tokio::task::spawn_blocking(move || {
            let conn = lock(&db)?;

            let count_sql = format!("SELECT COUNT(*) FROM submissions {}", clause);
            let total: u64 = conn
                .query_row(&count_sql, rusqlite::params_from_iter(params.iter()), |row| {
                    row.get::<_, i64>(0)
                })?
                .max(0) as u64;

            let mut query_params = params;
            query_params.push(Value::from(page_size as i64));
            query_params.push(Value::from(offset));
            let sql = format!(
                "SELECT data FROM submissions {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(query_params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let data: String = row.get(0)?;
                out.push(serde_json::from_str::<FormSubmission>(&data)?);
            }
            Ok::<_, anyhow::Error>((out, total))
        })
        .await??;

        Ok(PaginatedSubmissions {
            total,
            page,
            page_size,
            items,
        })
    }

    pub async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<FormSubmission>> {
        let db = Arc::clone(&self.db);
        let id_owned = id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<FormSubmission>> {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare("SELECT data FROM submissions WHERE id = ?")?;
            let mut rows = stmt.query(params![id_owned])?;
            match rows.next()? {
                Some(row) => {
                    let data: String = row.get(0)?;
                    Ok(Some(serde_json::from_str(&data)?))
                }
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        let count = tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
            let conn = lock(&db)?;
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await??;
        Ok(count)
    }
}
