//! Connection workflow: creation, pairing, activation and revocation.
//!
//! The store is authoritative. Every committed change publishes a
//! [`StoreEvent`] so the graph mirror can follow.

pub mod model;

use std::collections::BTreeMap;

use chainrisk_db::queries::connections::{self as queries, ConnectionRow};
use chainrisk_db::queries::vertices;
use chainrisk_db::{DbError, DbPool, StoreEvent};
use model::{ConnectedActor, Connection, ConnectionStatus, Initiation, NewConnection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ChainError, ChainResult};

/// Create a connection, and its reverse pair when the tenant is symmetric.
///
/// Both endpoint vertices are created on first use. Everything commits in one
/// transaction.
pub fn create_connection(pool: &DbPool, tenant_id: &str, new: &NewConnection) -> ChainResult<Connection> {
    if new.source_id == new.target_id {
        return Err(ChainError::validation("An actor cannot connect to itself"));
    }
    if !new.is_buyer && !new.is_supplier {
        return Err(ChainError::validation(
            "A connection must mark the target as buyer, supplier, or both",
        ));
    }
    if new.status == ConnectionStatus::Revoked {
        return Err(ChainError::validation("A connection cannot be created revoked"));
    }

    let tenant = crate::tenant::get_tenant(pool, tenant_id)?;
    crate::actor::get_tenant_actor(pool, tenant_id, &new.source_id)?;
    crate::actor::get_tenant_actor(pool, tenant_id, &new.target_id)?;
    crate::supply_chain::get_tenant_supply_chain(pool, tenant_id, &new.supply_chain_id)?;

    let now = chainrisk_db::now_rfc3339();
    let primary = ConnectionRow {
        id: Uuid::new_v4().to_string(),
        source_id: new.source_id.clone(),
        target_id: new.target_id.clone(),
        supply_chain_id: new.supply_chain_id.clone(),
        is_buyer: new.is_buyer,
        is_supplier: new.is_supplier,
        status: new.status.as_str().to_string(),
        initiation: new.initiation.as_str().to_string(),
        paired_with: None,
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    let result = pool.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        vertices::ensure_vertex(&tx, &Uuid::new_v4().to_string(), &primary.source_id, &primary.supply_chain_id)?;
        vertices::ensure_vertex(&tx, &Uuid::new_v4().to_string(), &primary.target_id, &primary.supply_chain_id)?;
        queries::insert_connection(&tx, &primary)?;

        let mut written = vec![primary.id.clone()];
        if tenant.symmetric_connections {
            match queries::find_by_endpoints(&tx, &primary.target_id, &primary.source_id, &primary.supply_chain_id)? {
                // A reverse connection made by hand becomes the pair if it is free.
                Some(existing) if existing.paired_with.is_none() => {
                    queries::set_paired_with(&tx, &primary.id, &existing.id)?;
                    queries::set_paired_with(&tx, &existing.id, &primary.id)?;
                }
                Some(_) => {}
                None => {
                    let reverse = ConnectionRow {
                        id: Uuid::new_v4().to_string(),
                        source_id: primary.target_id.clone(),
                        target_id: primary.source_id.clone(),
                        supply_chain_id: primary.supply_chain_id.clone(),
                        is_buyer: primary.is_supplier,
                        is_supplier: primary.is_buyer,
                        status: primary.status.clone(),
                        initiation: Initiation::System.as_str().to_string(),
                        paired_with: Some(primary.id.clone()),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    queries::insert_connection(&tx, &reverse)?;
                    queries::set_paired_with(&tx, &primary.id, &reverse.id)?;
                    written.push(reverse.id);
                }
            }
        }

        tx.commit()?;
        Ok(written)
    });

    let written = match result {
        Ok(written) => written,
        Err(DbError::Conflict(msg)) => return Err(ChainError::ConnectionExists(msg)),
        Err(e) => return Err(e.into()),
    };

    info!(
        tenant_id,
        connection_id = %primary.id,
        source = %primary.source_id,
        target = %primary.target_id,
        paired = written.len() > 1,
        "Connection created"
    );
    for connection_id in written {
        pool.publish(StoreEvent::ConnectionUpserted {
            tenant_id: tenant_id.to_string(),
            connection_id,
        });
    }

    get_connection(pool, tenant_id, &primary.id)
}

/// Get a connection, requiring it to belong to `tenant_id`.
pub fn get_connection(pool: &DbPool, tenant_id: &str, id: &str) -> ChainResult<Connection> {
    let row = match queries::get_connection(pool, id) {
        Ok(row) => row,
        Err(DbError::NotFound(_)) => return Err(ChainError::ConnectionNotFound(id.to_string())),
        Err(e) => return Err(e.into()),
    };
    let chain = crate::supply_chain::get_supply_chain(pool, &row.supply_chain_id)?;
    if chain.tenant_id != tenant_id {
        return Err(ChainError::ConnectionNotFound(id.to_string()));
    }
    Ok(Connection::from_row(row))
}

/// List every connection of a supply chain, revoked ones included.
pub fn list_connections(pool: &DbPool, tenant_id: &str, supply_chain_id: &str) -> ChainResult<Vec<Connection>> {
    crate::supply_chain::get_tenant_supply_chain(pool, tenant_id, supply_chain_id)?;
    let rows = queries::list_connections(pool, supply_chain_id)?;
    Ok(rows.into_iter().map(Connection::from_row).collect())
}

/// Counterparts of an actor within a supply chain.
///
/// Direction is read from both sides: a supplier of `actor_id` is the target
/// of an outgoing `is_supplier` connection or the source of an incoming
/// `is_buyer` one (buyers symmetrically). Counterparts appear once, ordered by
/// actor ID.
pub fn get_connections(
    pool: &DbPool,
    tenant_id: &str,
    actor_id: &str,
    supply_chain_id: &str,
    want_buyers: bool,
    want_suppliers: bool,
    include_revoked: bool,
) -> ChainResult<Vec<ConnectedActor>> {
    crate::actor::get_tenant_actor(pool, tenant_id, actor_id)?;
    crate::supply_chain::get_tenant_supply_chain(pool, tenant_id, supply_chain_id)?;

    let rows = queries::list_actor_connections(pool, actor_id, supply_chain_id)?;
    Ok(connected_actors(&rows, actor_id, want_buyers, want_suppliers, include_revoked))
}

/// Resolve connection rows into counterparts of `actor_id`.
///
/// When several rows link the same counterpart (a symmetric pair, or two
/// hand-made connections) the highest-status row represents it and only rows
/// with that status contribute direction flags.
pub(crate) fn connected_actors(
    rows: &[ConnectionRow],
    actor_id: &str,
    want_buyers: bool,
    want_suppliers: bool,
    include_revoked: bool,
) -> Vec<ConnectedActor> {
    let mut by_actor: BTreeMap<String, ConnectedActor> = BTreeMap::new();

    for row in rows {
        let status = ConnectionStatus::from_str(&row.status);
        if status == ConnectionStatus::Revoked && !include_revoked {
            continue;
        }

        let (counterpart, is_buyer, is_supplier) = if row.source_id == actor_id {
            (&row.target_id, row.is_buyer, row.is_supplier)
        } else if row.target_id == actor_id {
            (&row.source_id, row.is_supplier, row.is_buyer)
        } else {
            continue;
        };

        let is_buyer = is_buyer && want_buyers;
        let is_supplier = is_supplier && want_suppliers;
        if !is_buyer && !is_supplier {
            continue;
        }

        let candidate = ConnectedActor {
            actor_id: counterpart.clone(),
            connection_id: row.id.clone(),
            is_buyer,
            is_supplier,
            status,
        };

        match by_actor.get_mut(counterpart) {
            None => {
                by_actor.insert(counterpart.clone(), candidate);
            }
            Some(current) if status.rank() > current.status.rank() => *current = candidate,
            Some(current) if status == current.status => {
                current.is_buyer |= is_buyer;
                current.is_supplier |= is_supplier;
            }
            Some(_) => {}
        }
    }

    by_actor.into_values().collect()
}

/// Approve a connection (also re-activates a revoked one).
pub fn activate(pool: &DbPool, tenant_id: &str, connection_id: &str) -> ChainResult<Connection> {
    transition(pool, tenant_id, connection_id, ConnectionStatus::Approved)
}

/// Revoke a connection. The row is kept.
pub fn revoke(pool: &DbPool, tenant_id: &str, connection_id: &str) -> ChainResult<Connection> {
    transition(pool, tenant_id, connection_id, ConnectionStatus::Revoked)
}

fn transition(
    pool: &DbPool,
    tenant_id: &str,
    connection_id: &str,
    target: ConnectionStatus,
) -> ChainResult<Connection> {
    let current = get_connection(pool, tenant_id, connection_id)?;
    if current.status == target {
        debug!(connection_id, status = target.as_str(), "Status unchanged");
        return Ok(current);
    }
    if !current.status.can_transition_to(&target) {
        return Err(ChainError::InvalidTransition {
            from: current.status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }

    let now = chainrisk_db::now_rfc3339();
    let changed = pool.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        queries::update_status(&tx, connection_id, target.as_str(), &now)?;

        let mut changed = vec![connection_id.to_string()];
        if let Some(pair_id) = &current.paired_with {
            let pair = queries::get_connection_tx(&tx, pair_id)?;
            let pair_status = ConnectionStatus::from_str(&pair.status);
            if pair_status != target && pair_status.can_transition_to(&target) {
                queries::update_status(&tx, pair_id, target.as_str(), &now)?;
                changed.push(pair_id.clone());
            }
        }

        tx.commit()?;
        Ok(changed)
    })?;

    info!(
        tenant_id,
        connection_id,
        from = current.status.as_str(),
        to = target.as_str(),
        rows = changed.len(),
        "Connection status changed"
    );
    for id in changed {
        pool.publish(StoreEvent::ConnectionUpserted {
            tenant_id: tenant_id.to_string(),
            connection_id: id,
        });
    }

    get_connection(pool, tenant_id, connection_id)
}

/// Deactivate an actor's vertex in a supply chain.
///
/// The vertex stops being scored and stops counting as anyone's supplier; its
/// mirrored relationships are dropped by the graph syncer.
pub fn retire_vertex(pool: &DbPool, tenant_id: &str, actor_id: &str, supply_chain_id: &str) -> ChainResult<()> {
    crate::actor::get_tenant_actor(pool, tenant_id, actor_id)?;
    crate::supply_chain::get_tenant_supply_chain(pool, tenant_id, supply_chain_id)?;

    let vertex = vertices::find_vertex(pool, actor_id, supply_chain_id)?.ok_or_else(|| {
        ChainError::VertexNotFound {
            actor_id: actor_id.to_string(),
            supply_chain_id: supply_chain_id.to_string(),
        }
    })?;
    vertices::set_active(pool, &vertex.id, false)?;
    info!(tenant_id, vertex_id = %vertex.id, actor_id, "Vertex retired");

    pool.publish(StoreEvent::VertexRetired {
        tenant_id: tenant_id.to_string(),
        vertex_id: vertex.id,
    });
    Ok(())
}
