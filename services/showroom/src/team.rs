use crate::catalog::Repository;
use crate::document_store::StoreError;
use crate::models::TeamMember;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};
use uuid::Uuid;

/// What a reconciliation pass changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeamChanges {
    pub created: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub deleted: Vec<Uuid>,
    pub unchanged: Vec<Uuid>,
}

/// Bring the stored team in line with `next` by per-member writes.
///
/// Creates and updates go first and deletes last, so every member the
/// submission keeps stays readable throughout.
#[instrument(skip_all, fields(previous = previous.len(), next = next.len()))]
pub async fn reconcile_team(
    repo: &Repository<TeamMember>,
    previous: &[TeamMember],
    next: &[TeamMember],
) -> Result<TeamChanges, StoreError> {
    let existing: HashMap<Uuid, &TeamMember> = previous.iter().map(|m| (m.id, m)).collect();
    let kept: HashSet<Uuid> = next.iter().map(|m| m.id).collect();
    let mut changes = TeamChanges::default();

    for member in next {
        match existing.get(&member.id) {
            Some(current) if current.same_content(member) => changes.unchanged.push(member.id),
            Some(_) => {
                repo.update(member).await?;
                changes.updated.push(member.id);
            }
            None => {
                repo.create(member).await?;
                changes.created.push(member.id);
            }
        }
    }

    for member in previous.iter().filter(|m| !kept.contains(&m.id)) {
        repo.delete(&member.id.to_string()).await?;
        changes.deleted.push(member.id);
    }

    info!(
        created = changes.created.len(),
        updated = changes.updated.len(),
        deleted = changes.deleted.len(),
        "Team reconciled"
    );

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::memory_catalog;
    use chrono::Utc;

    fn member(name: &str, order: i32) -> TeamMember {
        let now = Utc::now();
        TeamMember {
            id: Uuid::new_v4(),
            name: name.to_string(),
            role: None,
            bio: None,
            order,
            photo: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_reconcile_only_touches_changed_members() {
        let (catalog, _) = memory_catalog();
        let repo = &catalog.team_members;

        let ana = member("Ana", 0);
        let ben = member("Ben", 1);
        let cleo = member("Cleo", 2);
        for m in [&ana, &ben, &cleo] {
            repo.create(m).await.unwrap();
        }
        let previous = repo.list().await.unwrap();

        let mut ben_promoted = ben.clone();
        ben_promoted.role = Some("Lead designer".to_string());
        let dara = member("Dara", 3);
        let next = vec![ana.clone(), ben_promoted, dara.clone()];

        let changes = reconcile_team(repo, &previous, &next).await.unwrap();

        assert_eq!(changes.unchanged, vec![ana.id]);
        assert_eq!(changes.updated, vec![ben.id]);
        assert_eq!(changes.created, vec![dara.id]);
        assert_eq!(changes.deleted, vec![cleo.id]);

        let stored = repo.list().await.unwrap();
        let names: Vec<_> = stored.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben", "Dara"]);
        assert_eq!(stored[1].role.as_deref(), Some("Lead designer"));
    }

    #[tokio::test]
    async fn test_reconcile_empty_submission_clears_team() {
        let (catalog, _) = memory_catalog();
        let repo = &catalog.team_members;
        let ana = member("Ana", 0);
        repo.create(&ana).await.unwrap();

        let changes = reconcile_team(repo, &[ana.clone()], &[]).await.unwrap();

        assert_eq!(changes.deleted, vec![ana.id]);
        assert!(repo.list().await.unwrap().is_empty());
    }
}
