use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use buildwatch_core::{
    collab::ProjectSource,
    config::DbConfig,
    models::{
        BuildResult, ParseError, Project, ProjectInfo, ProjectStatus, RequestError,
        RequestErrorKind,
    },
    util::{from_unix_millis, to_unix_millis},
};
use futures_util::TryStreamExt;
use sqlx::{
    Pool, Row, Sqlite, SqliteConnection, SqlitePool, migrate::MigrateDatabase, sqlite::SqliteRow,
};
use time::UtcDateTime;

#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Sqlite>,
}

const PROJECT_COLUMNS: &str = r#"
    project_id, title, url, username, token, ignore_for_summary, list_order, created_at,
    modified_at, deletion_date, last_known_status, had_response, last_build_number,
    failed_build_number, culprits, build_description, building, name, update_date,
    response_status_code, request_error_kind, request_error_description, parse_error_code,
    parse_error_description
"#;

impl Database {
    pub async fn new(config: &DbConfig) -> Result<Self> {
        if !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
            tracing::info!(url = %config.url, "Creating database");
            Sqlite::create_database(&config.url).await.context("Failed to create database")?;
            tracing::info!("Database created");
        }
        let pool =
            SqlitePool::connect(&config.url).await.context("Failed to connect to database")?;
        Self::with_pool(pool).await
    }

    /// Wraps an existing pool, running any pending migrations.
    pub async fn with_pool(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    pub async fn close(&self) { self.pool.close().await }

    /// Active projects in list order. Equal orders keep insertion order.
    pub async fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_projects_in(&mut conn).await
    }

    async fn list_projects_in(conn: &mut SqliteConnection) -> Result<Vec<ProjectInfo>> {
        let sql = format!(
            r#"
            SELECT {PROJECT_COLUMNS}
            FROM projects
            WHERE deletion_date IS NULL
            ORDER BY list_order, created_at, rowid
            "#
        );
        let mut stream = sqlx::query(&sql).fetch(&mut *conn);
        let mut projects = Vec::new();
        while let Some(row) = stream.try_next().await? {
            projects.push(project_info_from_row(&row)?);
        }
        Ok(projects)
    }

    /// Fetches a project by ID, including soft-deleted ones.
    pub async fn get_project(&self, project_id: &str) -> Result<Option<ProjectInfo>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?");
        sqlx::query(&sql)
            .bind(project_id)
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| project_info_from_row(&row))
            .transpose()
    }

    pub async fn create_project(&self, project: &Project) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO projects (project_id, title, url, username, token, ignore_for_summary, list_order, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.project_id)
        .bind(&project.title)
        .bind(&project.url)
        .bind(&project.username)
        .bind(&project.token)
        .bind(project.ignore_for_summary)
        .bind(project.list_order)
        .bind(to_unix_millis(project.created_at))
        .bind(to_unix_millis(project.modified_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Updates the settings of an active project. When the connection settings change the
    /// status starts over at `now`, so replies for the old settings are rejected as stale.
    pub async fn update_project(
        &self,
        project: &Project,
        now: UtcDateTime,
    ) -> Result<Option<ProjectInfo>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ? AND deletion_date IS NULL"
        );
        let Some(row) = sqlx::query(&sql).bind(&project.project_id).fetch_optional(&mut *tx).await?
        else {
            return Ok(None);
        };
        let existing = project_info_from_row(&row)?;
        let status = if existing.project.connection_changed(project) {
            tracing::info!(
                "Connection settings of {} changed, resetting status",
                existing.project.title
            );
            let status = ProjectStatus::reset(now);
            Self::write_status(&mut tx, &project.project_id, &status, false).await?;
            status
        } else {
            existing.status
        };
        sqlx::query(
            r#"
            UPDATE projects
            SET title = ?, url = ?, username = ?, token = ?, ignore_for_summary = ?, modified_at = ?
            WHERE project_id = ?
            "#,
        )
        .bind(&project.title)
        .bind(&project.url)
        .bind(&project.username)
        .bind(&project.token)
        .bind(project.ignore_for_summary)
        .bind(to_unix_millis(now))
        .bind(&project.project_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        let project = Project { modified_at: now, ..project.clone() };
        Ok(Some(ProjectInfo { project, status }))
    }

    /// Marks a project as deleted. Returns false if it was not active.
    pub async fn delete_project(&self, project_id: &str, at: UtcDateTime) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET deletion_date = ?, modified_at = ?
            WHERE project_id = ? AND deletion_date IS NULL
            "#,
        )
        .bind(to_unix_millis(at))
        .bind(to_unix_millis(at))
        .bind(project_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Moves the active project at index `from` so that it ends up at index `to`, then
    /// renumbers all active projects from zero. Returns false if `from` is out of range.
    pub async fn move_project(&self, from: usize, to: usize) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut projects = Self::list_projects_in(&mut tx).await?;
        if from >= projects.len() {
            return Ok(false);
        }
        let moved = projects.remove(from);
        projects.insert(to.min(projects.len()), moved);
        for (list_order, info) in projects.iter().enumerate() {
            sqlx::query("UPDATE projects SET list_order = ? WHERE project_id = ?")
                .bind(list_order as i64)
                .bind(&info.project.project_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Stores a status unless the stored one is at least as recent. Returns false if the
    /// stored status was kept, such as after a reset for new connection settings.
    pub async fn save_status(&self, project_id: &str, status: &ProjectStatus) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::write_status(&mut conn, project_id, status, true).await
    }

    async fn write_status(
        conn: &mut SqliteConnection,
        project_id: &str,
        status: &ProjectStatus,
        only_if_newer: bool,
    ) -> Result<bool> {
        let mut sql = r#"
            UPDATE projects
            SET last_known_status = ?, had_response = ?, last_build_number = ?, failed_build_number = ?,
                culprits = ?, build_description = ?, building = ?, name = ?, update_date = ?,
                response_status_code = ?, request_error_kind = ?, request_error_description = ?,
                parse_error_code = ?, parse_error_description = ?
            WHERE project_id = ?
            "#
        .to_string();
        if only_if_newer {
            sql.push_str("AND (update_date IS NULL OR update_date < ?)");
        }
        let update_date = status.update_date.map(to_unix_millis);
        let mut query = sqlx::query(&sql)
            .bind(status.last_known_status.as_str())
            .bind(status.had_response)
            .bind(status.last_build_number)
            .bind(status.failed_build_number)
            .bind(&status.culprits)
            .bind(&status.build_description)
            .bind(status.building)
            .bind(&status.name)
            .bind(update_date)
            .bind(status.response_status_code.map(i64::from))
            .bind(status.request_error.as_ref().map(|e| e.kind.as_str()))
            .bind(status.request_error.as_ref().map(|e| e.description.as_str()))
            .bind(status.parse_error.as_ref().map(|e| e.code))
            .bind(status.parse_error.as_ref().map(|e| e.description.as_str()))
            .bind(project_id);
        if only_if_newer {
            query = query.bind(update_date);
        }
        let result = query.execute(&mut *conn).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes projects deleted at or before `cutoff`.
    pub async fn purge_projects_deleted_before(&self, cutoff: UtcDateTime) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            DELETE FROM projects
            WHERE deletion_date IS NOT NULL AND deletion_date <= ?
            "#,
        )
        .bind(to_unix_millis(cutoff))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// The first `"Project N"` title not used by an active project.
    pub async fn unique_project_title(&self) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        let titles: Vec<String> =
            sqlx::query_scalar("SELECT title FROM projects WHERE deletion_date IS NULL")
                .fetch_all(&mut *conn)
                .await?;
        let title = (0..)
            .map(|n| format!("Project {n}"))
            .find(|title| !titles.contains(title))
            .ok_or_else(|| anyhow!("No free project title"))?;
        Ok(title)
    }
}

impl ProjectSource for Database {
    async fn list_active_projects(&self) -> Result<Vec<ProjectInfo>> { self.list_projects().await }

    async fn purge_projects_deleted_before(&self, cutoff: UtcDateTime) -> Result<u64> {
        Database::purge_projects_deleted_before(self, cutoff).await
    }

    async fn save_status(&self, project_id: &str, status: &ProjectStatus) -> Result<bool> {
        Database::save_status(self, project_id, status).await
    }
}

fn project_info_from_row(row: &SqliteRow) -> Result<ProjectInfo> {
    let project = Project {
        project_id: row.try_get("project_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        username: row.try_get("username")?,
        token: row.try_get("token")?,
        ignore_for_summary: row.try_get("ignore_for_summary")?,
        list_order: row.try_get("list_order")?,
        created_at: from_unix_millis(row.try_get("created_at")?),
        modified_at: from_unix_millis(row.try_get("modified_at")?),
        deletion_date: row.try_get::<Option<i64>, _>("deletion_date")?.map(from_unix_millis),
    };
    let last_known_status: String = row.try_get("last_known_status")?;
    let request_error = match (
        row.try_get::<Option<String>, _>("request_error_kind")?,
        row.try_get::<Option<String>, _>("request_error_description")?,
    ) {
        (Some(kind), description) => Some(RequestError {
            kind: RequestErrorKind::from_str(&kind).unwrap_or(RequestErrorKind::Other),
            description: description.unwrap_or_default(),
        }),
        (None, _) => None,
    };
    let parse_error = match (
        row.try_get::<Option<i32>, _>("parse_error_code")?,
        row.try_get::<Option<String>, _>("parse_error_description")?,
    ) {
        (Some(code), description) => {
            Some(ParseError { code, description: description.unwrap_or_default() })
        }
        (None, _) => None,
    };
    let status = ProjectStatus {
        last_known_status: BuildResult::from_str(&last_known_status).unwrap_or_default(),
        had_response: row.try_get("had_response")?,
        last_build_number: row.try_get("last_build_number")?,
        failed_build_number: row.try_get("failed_build_number")?,
        culprits: row.try_get("culprits")?,
        build_description: row.try_get("build_description")?,
        building: row.try_get("building")?,
        name: row.try_get("name")?,
        update_date: row.try_get::<Option<i64>, _>("update_date")?.map(from_unix_millis),
        response_status_code: row
            .try_get::<Option<i64>, _>("response_status_code")?
            .and_then(|code| u16::try_from(code).ok()),
        request_error,
        parse_error,
    };
    Ok(ProjectInfo { project, status })
}
