//! Actor management and the baseline-score write hook.

pub mod model;

use chainrisk_db::queries::actors as queries;
use chainrisk_db::{DbError, DbPool, StoreEvent};
use model::{Actor, ActorRole};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ChainError, ChainResult};

/// Create an actor under a tenant.
pub fn create_actor(
    pool: &DbPool,
    tenant_id: &str,
    name: &str,
    role: ActorRole,
    baseline_risk_score: Option<f64>,
) -> ChainResult<Actor> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChainError::validation("Actor name cannot be empty"));
    }
    crate::tenant::get_tenant(pool, tenant_id)?;

    let id = Uuid::new_v4().to_string();
    queries::create_actor(pool, &id, tenant_id, name, role.as_str(), baseline_risk_score)?;
    info!(actor_id = %id, tenant_id, name, role = role.as_str(), "Actor created");

    get_actor(pool, &id)
}

/// Get an actor by ID.
pub fn get_actor(pool: &DbPool, id: &str) -> ChainResult<Actor> {
    match queries::get_actor(pool, id) {
        Ok(row) => Ok(Actor::from_row(row)),
        Err(DbError::NotFound(_)) => Err(ChainError::ActorNotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Get an actor, requiring it to belong to `tenant_id`.
pub fn get_tenant_actor(pool: &DbPool, tenant_id: &str, id: &str) -> ChainResult<Actor> {
    let actor = get_actor(pool, id)?;
    if actor.tenant_id != tenant_id {
        return Err(ChainError::ActorNotFound(id.to_string()));
    }
    Ok(actor)
}

/// List a tenant's actors ordered by ID.
pub fn list_actors(pool: &DbPool, tenant_id: &str) -> ChainResult<Vec<Actor>> {
    let rows = queries::list_actors(pool, tenant_id)?;
    Ok(rows.into_iter().map(Actor::from_row).collect())
}

/// Record a new baseline risk score from the analytics feed.
///
/// The value is stored as given. Malformed baselines are reported per vertex
/// by the next scoring run rather than rejected here.
pub fn set_baseline(pool: &DbPool, actor_id: &str, score: Option<f64>) -> ChainResult<Actor> {
    let actor = get_actor(pool, actor_id)?;
    queries::set_baseline_risk_score(pool, actor_id, score)?;
    debug!(actor_id, ?score, "Baseline risk score updated");

    pool.publish(StoreEvent::BaselineUpdated {
        tenant_id: actor.tenant_id.clone(),
        actor_id: actor_id.to_string(),
    });

    get_actor(pool, actor_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_baseline_publishes() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let tenant = crate::tenant::create_tenant(&pool, "Acme", false).unwrap();
        let actor = create_actor(&pool, &tenant.id, "Farm", ActorRole::Producer, None).unwrap();
        assert_eq!(actor.baseline(), 0.0);

        let mut rx = pool.subscribe();
        let actor = set_baseline(&pool, &actor.id, Some(42.5)).unwrap();
        assert_eq!(actor.baseline_risk_score, Some(42.5));

        match rx.recv().await.unwrap() {
            StoreEvent::BaselineUpdated { actor_id, .. } => assert_eq!(actor_id, actor.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_tenant_scoping() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let t1 = crate::tenant::create_tenant(&pool, "One", false).unwrap();
        let t2 = crate::tenant::create_tenant(&pool, "Two", false).unwrap();
        let actor = create_actor(&pool, &t1.id, "Farm", ActorRole::Producer, None).unwrap();

        assert!(get_tenant_actor(&pool, &t1.id, &actor.id).is_ok());
        assert!(matches!(
            get_tenant_actor(&pool, &t2.id, &actor.id),
            Err(ChainError::ActorNotFound(_))
        ));
    }
}
