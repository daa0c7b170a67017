pub mod ai_cache;
pub mod ai_usage;
pub mod comment;
pub mod issue;
pub mod label;
pub mod profile;
pub mod project;
pub mod status;

#[cfg(test)]
pub(crate) mod test_support {
    use uuid::Uuid;

    use crate::DBService;
    use crate::models::{
        issue::{CreateIssue, Issue},
        project::Project,
        status::ProjectStatus,
    };

    pub async fn db() -> DBService {
        DBService::new_in_memory()
            .await
            .expect("in-memory database")
    }

    /// One project with a single "Backlog" column.
    pub async fn seed_board(pool: &sqlx::SqlitePool) -> (Uuid, Uuid) {
        let project = Project::create(pool, Uuid::new_v4(), "test project")
            .await
            .expect("project");
        let status = ProjectStatus::create(pool, Uuid::new_v4(), project.id, "Backlog", 0, None)
            .await
            .expect("status");
        (project.id, status.id)
    }

    pub async fn seed_issue(
        pool: &sqlx::SqlitePool,
        project_id: Uuid,
        status_id: Uuid,
        title: &str,
    ) -> Issue {
        Issue::create(
            pool,
            Uuid::new_v4(),
            project_id,
            status_id,
            &CreateIssue {
                title: title.to_string(),
                description: None,
                priority: None,
                assignee_id: None,
                owner_id: None,
                due_date: None,
            },
        )
        .await
        .expect("issue")
    }
}
