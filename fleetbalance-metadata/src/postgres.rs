//! PostgreSQL-backed fleet store
//!
//! Reads the controller's agent (`vtap`), node and AZ tables using SQLx.

use crate::store::{FleetStore, Result, StoreError};
use fleetbalance_core::{Agent, AvailabilityZone, Node, NodeState, Role, ZoneBinding, WILDCARD_AZ};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/fleetbalance".to_string(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl DbConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, FromRow)]
struct AzRow {
    lcuuid: String,
    region: String,
}

#[derive(Debug, FromRow)]
struct NodeRow {
    ip: String,
    state: i32,
    vtap_max: i32,
}

#[derive(Debug, FromRow)]
struct ConnectionRow {
    node_ip: String,
    az: String,
    region: String,
}

#[derive(Debug, FromRow)]
struct AgentRow {
    id: i64,
    name: String,
    az: String,
    controller_ip: String,
    analyzer_ip: String,
    enable: i32,
}

impl TryFrom<AgentRow> for Agent {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self> {
        let id = u64::try_from(row.id)
            .map_err(|_| StoreError::Invalid(format!("negative vtap id {}", row.id)))?;
        Ok(Agent {
            id,
            name: row.name,
            az: row.az,
            controller_ip: row.controller_ip,
            analyzer_ip: row.analyzer_ip,
            enabled: row.enable != 0,
        })
    }
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node {
            ip: row.ip,
            state: NodeState::from_code(row.state),
            max_agents: u32::try_from(row.vtap_max).unwrap_or(0),
        }
    }
}

impl From<ConnectionRow> for ZoneBinding {
    fn from(row: ConnectionRow) -> Self {
        if row.az == WILDCARD_AZ {
            ZoneBinding::region(row.node_ip, row.region)
        } else {
            ZoneBinding::az(row.node_ip, row.az)
        }
    }
}

fn node_table(role: Role) -> &'static str {
    match role {
        Role::Controller => "controller",
        Role::Analyzer => "analyzer",
    }
}

fn connection_table(role: Role) -> &'static str {
    match role {
        Role::Controller => "az_controller_connection",
        Role::Analyzer => "az_analyzer_connection",
    }
}

fn agent_column(role: Role) -> &'static str {
    match role {
        Role::Controller => "controller_ip",
        Role::Analyzer => "analyzer_ip",
    }
}

/// PostgreSQL fleet store
#[derive(Clone)]
pub struct PostgresFleetStore {
    pool: PgPool,
}

impl PostgresFleetStore {
    /// Create a new database connection pool
    pub async fn connect(config: DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl FleetStore for PostgresFleetStore {
    #[instrument(skip(self))]
    async fn list_azs(&self) -> Result<Vec<AvailabilityZone>> {
        let rows = sqlx::query_as::<_, AzRow>(
            "SELECT lcuuid, COALESCE(region, '') AS region FROM az ORDER BY lcuuid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AvailabilityZone {
                id: r.lcuuid,
                region: r.region,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_nodes(&self, role: Role) -> Result<Vec<Node>> {
        let query = format!(
            "SELECT ip, state, vtap_max FROM {} ORDER BY ip",
            node_table(role)
        );
        let rows = sqlx::query_as::<_, NodeRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), %role, "Loaded nodes");
        Ok(rows.into_iter().map(Node::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_zone_bindings(&self, role: Role) -> Result<Vec<ZoneBinding>> {
        let query = format!(
            "SELECT {col} AS node_ip, az, COALESCE(region, '') AS region FROM {table}",
            col = agent_column(role),
            table = connection_table(role)
        );
        let rows = sqlx::query_as::<_, ConnectionRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ZoneBinding::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_agents(&self, role: Role) -> Result<Vec<Agent>> {
        let query = format!(
            "SELECT id, name, COALESCE(az, '') AS az, \
             COALESCE(controller_ip, '') AS controller_ip, \
             COALESCE(analyzer_ip, '') AS analyzer_ip, enable \
             FROM vtap WHERE {col} IS NOT NULL AND {col} != '' ORDER BY id",
            col = agent_column(role)
        );
        let rows = sqlx::query_as::<_, AgentRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), %role, "Loaded agents");
        rows.into_iter().map(Agent::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn update_agent_node(&self, role: Role, agent_id: u64, node_ip: &str) -> Result<()> {
        let id = i64::try_from(agent_id)
            .map_err(|_| StoreError::Invalid(format!("agent id {} out of range", agent_id)))?;
        let query = format!("UPDATE vtap SET {} = $1 WHERE id = $2", agent_column(role));

        let result = sqlx::query(&query)
            .bind(node_ip)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("vtap {}", agent_id)));
        }
        Ok(())
    }
}
