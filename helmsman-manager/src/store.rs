use helmsman_core::error::{HelmsmanError, HelmsmanResult};
use helmsman_core::types::{
    now_ts, new_business_template_id, new_component_template_id, BusinessRecord, BusinessStatus,
    BusinessTemplate, ComponentMetric, ComponentRecord, ComponentSpec, ComponentStatus,
    ComponentTemplate, ComponentType, ComponentUsage, NodeRecord, NodeStatus, RegisterRequest,
    TemplateConfig, TemplateRef,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};

/// Durable state: nodes, businesses, components, templates and the
/// per-component metric history. A single-connection pool keeps writers
/// serialised; multi-statement mutations run inside transactions.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    pub async fn new(db_path: &str) -> HelmsmanResult<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        if !std::path::Path::new(db_path).exists() {
            tokio::fs::write(db_path, "").await?;
        }

        let db_url = format!("sqlite:{}", db_path);
        tracing::debug!("Database URL: {}", db_url);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> HelmsmanResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node (
                node_id TEXT PRIMARY KEY,
                hostname TEXT NOT NULL,
                ip_address TEXT NOT NULL,
                os_info TEXT NOT NULL,
                cpu_model TEXT NOT NULL DEFAULT '',
                gpu_count INTEGER NOT NULL DEFAULT 0,
                port INTEGER NOT NULL DEFAULT 8081,
                parent_chassis_id TEXT,
                slot_index INTEGER,
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'online'
            );

            CREATE TABLE IF NOT EXISTS businesses (
                business_id TEXT PRIMARY KEY,
                business_name TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS business_components (
                component_id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                component_name TEXT NOT NULL,
                type TEXT NOT NULL,
                image_url TEXT,
                image_name TEXT,
                binary_path TEXT,
                binary_url TEXT,
                environment_variables TEXT NOT NULL DEFAULT '{}',
                resource_requirements TEXT NOT NULL DEFAULT '{}',
                config_files TEXT NOT NULL DEFAULT '[]',
                affinity TEXT NOT NULL DEFAULT '{}',
                node_id TEXT,
                container_id TEXT,
                process_id TEXT,
                status TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (business_id) REFERENCES businesses (business_id),
                FOREIGN KEY (node_id) REFERENCES node (node_id)
            );

            CREATE TABLE IF NOT EXISTS component_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                component_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                cpu_percent REAL NOT NULL,
                memory_mb INTEGER NOT NULL,
                gpu_percent REAL,
                FOREIGN KEY (component_id) REFERENCES business_components (component_id)
            );

            CREATE TABLE IF NOT EXISTS component_templates (
                component_template_id TEXT PRIMARY KEY,
                template_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL,
                config TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS business_templates (
                business_template_id TEXT PRIMARY KEY,
                template_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                components TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_business_components_business_id
                ON business_components (business_id);
            CREATE INDEX IF NOT EXISTS idx_business_components_node_id
                ON business_components (node_id);
            CREATE INDEX IF NOT EXISTS idx_component_metrics_component_id
                ON component_metrics (component_id, timestamp);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- nodes ----

    /// Insert or refresh a node row. The descriptor may change across
    /// re-registrations (notably `ip_address`); identity is the node_id.
    pub async fn upsert_node(&self, node_id: &str, req: &RegisterRequest) -> HelmsmanResult<()> {
        let now = now_ts();
        let existing = sqlx::query("SELECT node_id FROM node WHERE node_id = ?")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            sqlx::query(
                "UPDATE node SET hostname = ?, ip_address = ?, os_info = ?, cpu_model = ?, \
                 gpu_count = ?, port = ?, parent_chassis_id = ?, slot_index = ?, \
                 last_seen_at = ?, status = 'online' WHERE node_id = ?",
            )
            .bind(&req.hostname)
            .bind(&req.ip_address)
            .bind(&req.os_info)
            .bind(&req.cpu_model)
            .bind(req.gpu_count)
            .bind(req.port as i64)
            .bind(&req.parent_chassis_id)
            .bind(req.slot_index)
            .bind(now)
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO node (node_id, hostname, ip_address, os_info, cpu_model, gpu_count, \
                 port, parent_chassis_id, slot_index, created_at, last_seen_at, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'online')",
            )
            .bind(node_id)
            .bind(&req.hostname)
            .bind(&req.ip_address)
            .bind(&req.os_info)
            .bind(&req.cpu_model)
            .bind(req.gpu_count)
            .bind(req.port as i64)
            .bind(&req.parent_chassis_id)
            .bind(req.slot_index)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Refresh `last_seen_at` and flip the node back online. Returns
    /// whether the node existed.
    pub async fn touch_node(&self, node_id: &str) -> HelmsmanResult<bool> {
        let result = sqlx::query(
            "UPDATE node SET last_seen_at = ?, status = 'online' WHERE node_id = ?",
        )
        .bind(now_ts())
        .bind(node_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> HelmsmanResult<()> {
        sqlx::query("UPDATE node SET status = ? WHERE node_id = ?")
            .bind(status.as_str())
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_node(&self, node_id: &str) -> HelmsmanResult<Option<NodeRecord>> {
        let row = sqlx::query("SELECT * FROM node WHERE node_id = ?")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(node_from_row).transpose()
    }

    pub async fn list_nodes(&self) -> HelmsmanResult<Vec<NodeRecord>> {
        let rows = sqlx::query("SELECT * FROM node ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(node_from_row).collect()
    }

    /// Node ids that are not offline yet but have been silent longer than
    /// the liveness threshold.
    pub async fn stale_online_nodes(&self, now: i64, threshold_secs: i64) -> HelmsmanResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT node_id FROM node WHERE status != 'offline' AND ? - last_seen_at > ?",
        )
        .bind(now)
        .bind(threshold_secs)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("node_id")).collect())
    }

    // ---- businesses ----

    pub async fn save_business(&self, business: &BusinessRecord) -> HelmsmanResult<()> {
        sqlx::query(
            "INSERT INTO businesses (business_id, business_name, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (business_id) DO UPDATE SET \
                 business_name = excluded.business_name, \
                 status = excluded.status, \
                 updated_at = excluded.updated_at",
        )
        .bind(&business.business_id)
        .bind(&business.business_name)
        .bind(business.status.as_str())
        .bind(business.created_at)
        .bind(business.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_business_status(
        &self,
        business_id: &str,
        status: BusinessStatus,
    ) -> HelmsmanResult<()> {
        sqlx::query("UPDATE businesses SET status = ?, updated_at = ? WHERE business_id = ?")
            .bind(status.as_str())
            .bind(now_ts())
            .bind(business_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_abnormal_components(&self, business_id: &str) -> HelmsmanResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM business_components \
             WHERE business_id = ? AND status != 'running'",
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Business row with the read-side status overlay: `error` whenever
    /// any component is not running, otherwise the stored status.
    pub async fn get_business(&self, business_id: &str) -> HelmsmanResult<Option<BusinessRecord>> {
        let row = sqlx::query(
            "SELECT business_id, business_name, status, created_at, updated_at \
             FROM businesses WHERE business_id = ?",
        )
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let mut business = business_from_row(row);
        if self.count_abnormal_components(business_id).await? > 0 {
            business.status = BusinessStatus::Error;
        }
        Ok(Some(business))
    }

    pub async fn list_businesses(&self) -> HelmsmanResult<Vec<BusinessRecord>> {
        let rows = sqlx::query(
            "SELECT business_id, business_name, status, created_at, updated_at \
             FROM businesses ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut businesses = Vec::new();
        for row in rows {
            let mut business = business_from_row(row);
            if self.count_abnormal_components(&business.business_id).await? > 0 {
                business.status = BusinessStatus::Error;
            }
            businesses.push(business);
        }
        Ok(businesses)
    }

    /// Cascade delete: metric history, components, then the business row,
    /// all in one transaction.
    pub async fn delete_business(&self, business_id: &str) -> HelmsmanResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM component_metrics WHERE component_id IN \
             (SELECT component_id FROM business_components WHERE business_id = ?)",
        )
        .bind(business_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM business_components WHERE business_id = ?")
            .bind(business_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM businesses WHERE business_id = ?")
            .bind(business_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(HelmsmanError::NotFound("Business not found".to_string()));
        }
        Ok(())
    }

    // ---- components ----

    pub async fn save_component(&self, component: &ComponentRecord) -> HelmsmanResult<()> {
        let spec = &component.spec;
        sqlx::query(
            "INSERT INTO business_components (component_id, business_id, component_name, type, \
             image_url, image_name, binary_path, binary_url, environment_variables, \
             resource_requirements, config_files, affinity, node_id, container_id, process_id, \
             status, started_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (component_id) DO UPDATE SET \
                 business_id = excluded.business_id, \
                 component_name = excluded.component_name, \
                 type = excluded.type, \
                 image_url = excluded.image_url, \
                 image_name = excluded.image_name, \
                 binary_path = excluded.binary_path, \
                 binary_url = excluded.binary_url, \
                 environment_variables = excluded.environment_variables, \
                 resource_requirements = excluded.resource_requirements, \
                 config_files = excluded.config_files, \
                 affinity = excluded.affinity, \
                 node_id = excluded.node_id, \
                 container_id = excluded.container_id, \
                 process_id = excluded.process_id, \
                 status = excluded.status, \
                 updated_at = excluded.updated_at",
        )
        .bind(&spec.component_id)
        .bind(&component.business_id)
        .bind(&spec.component_name)
        .bind(spec.kind.as_str())
        .bind(&spec.image_url)
        .bind(&spec.image_name)
        .bind(&spec.binary_path)
        .bind(&spec.binary_url)
        .bind(serde_json::to_string(&spec.environment_variables)?)
        .bind(serde_json::to_string(&spec.resource_requirements)?)
        .bind(serde_json::to_string(&spec.config_files)?)
        .bind(serde_json::to_string(&spec.affinity)?)
        .bind(&component.node_id)
        .bind(&component.container_id)
        .bind(&component.process_id)
        .bind(component.status.as_str())
        .bind(component.started_at)
        .bind(component.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Status + handle update from a telemetry push. The handle column is
    /// chosen by component type, mirroring the running-implies-handle rule.
    pub async fn update_component_runtime(
        &self,
        component_id: &str,
        kind: ComponentType,
        status: ComponentStatus,
        container_id: Option<&str>,
        process_id: Option<&str>,
    ) -> HelmsmanResult<()> {
        let now = now_ts();
        match kind {
            ComponentType::Docker => {
                sqlx::query(
                    "UPDATE business_components SET status = ?, container_id = ?, updated_at = ? \
                     WHERE component_id = ?",
                )
                .bind(status.as_str())
                .bind(container_id.unwrap_or(""))
                .bind(now)
                .bind(component_id)
                .execute(&self.pool)
                .await?;
            }
            ComponentType::Binary => {
                sqlx::query(
                    "UPDATE business_components SET status = ?, process_id = ?, updated_at = ? \
                     WHERE component_id = ?",
                )
                .bind(status.as_str())
                .bind(process_id.unwrap_or(""))
                .bind(now)
                .bind(component_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn set_component_status(
        &self,
        component_id: &str,
        status: ComponentStatus,
    ) -> HelmsmanResult<()> {
        sqlx::query(
            "UPDATE business_components SET status = ?, updated_at = ? WHERE component_id = ?",
        )
        .bind(status.as_str())
        .bind(now_ts())
        .bind(component_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_component(&self, component_id: &str) -> HelmsmanResult<Option<ComponentRecord>> {
        let row = sqlx::query("SELECT * FROM business_components WHERE component_id = ?")
            .bind(component_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(component_from_row).transpose()
    }

    pub async fn component_exists(&self, component_id: &str) -> HelmsmanResult<bool> {
        let row = sqlx::query("SELECT component_id FROM business_components WHERE component_id = ?")
            .bind(component_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn components_for_business(
        &self,
        business_id: &str,
    ) -> HelmsmanResult<Vec<ComponentRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM business_components WHERE business_id = ? ORDER BY started_at",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(component_from_row).collect()
    }

    /// Components placed on a node, returned to a re-registering agent so
    /// it can resume supervising them.
    pub async fn components_for_node(&self, node_id: &str) -> HelmsmanResult<Vec<ComponentRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM business_components WHERE node_id = ? ORDER BY started_at",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(component_from_row).collect()
    }

    // ---- templates ----

    pub async fn save_component_template(
        &self,
        template: &ComponentTemplate,
    ) -> HelmsmanResult<String> {
        let template_id = template
            .component_template_id
            .clone()
            .unwrap_or_else(new_component_template_id);
        let now = now_ts();

        let created_at = sqlx::query(
            "SELECT created_at FROM component_templates WHERE component_template_id = ?",
        )
        .bind(&template_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row.get::<i64, _>("created_at"))
        .unwrap_or(now);

        sqlx::query(
            "INSERT OR REPLACE INTO component_templates \
             (component_template_id, template_name, description, type, config, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&template_id)
        .bind(&template.template_name)
        .bind(&template.description)
        .bind(template.kind.as_str())
        .bind(serde_json::to_string(&template.config)?)
        .bind(created_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(template_id)
    }

    pub async fn get_component_template(
        &self,
        template_id: &str,
    ) -> HelmsmanResult<Option<ComponentTemplate>> {
        let row = sqlx::query(
            "SELECT * FROM component_templates WHERE component_template_id = ?",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(component_template_from_row).transpose()
    }

    pub async fn list_component_templates(&self) -> HelmsmanResult<Vec<ComponentTemplate>> {
        let rows = sqlx::query("SELECT * FROM component_templates ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(component_template_from_row).collect()
    }

    /// Refuses while any business template still references the component
    /// template.
    pub async fn delete_component_template(&self, template_id: &str) -> HelmsmanResult<()> {
        let referencing = sqlx::query(
            "SELECT business_template_id FROM business_templates WHERE components LIKE ?",
        )
        .bind(format!("%{}%", template_id))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = referencing {
            let business_template_id: String = row.get("business_template_id");
            return Err(HelmsmanError::Validation(format!(
                "Cannot delete component template: it is referenced by business template {}",
                business_template_id
            )));
        }

        let result = sqlx::query(
            "DELETE FROM component_templates WHERE component_template_id = ?",
        )
        .bind(template_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HelmsmanError::NotFound(
                "Component template not found".to_string(),
            ));
        }
        Ok(())
    }

    /// Every referenced component template must exist at save time.
    pub async fn save_business_template(
        &self,
        template: &BusinessTemplate,
    ) -> HelmsmanResult<String> {
        if template.components.is_empty() {
            return Err(HelmsmanError::Validation(
                "Missing or invalid components array".to_string(),
            ));
        }
        for reference in &template.components {
            if self
                .get_component_template(&reference.component_template_id)
                .await?
                .is_none()
            {
                return Err(HelmsmanError::Validation(format!(
                    "Component template not found: {}",
                    reference.component_template_id
                )));
            }
        }

        let template_id = template
            .business_template_id
            .clone()
            .unwrap_or_else(new_business_template_id);
        let now = now_ts();

        let created_at = sqlx::query(
            "SELECT created_at FROM business_templates WHERE business_template_id = ?",
        )
        .bind(&template_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row.get::<i64, _>("created_at"))
        .unwrap_or(now);

        sqlx::query(
            "INSERT OR REPLACE INTO business_templates \
             (business_template_id, template_name, description, components, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&template_id)
        .bind(&template.template_name)
        .bind(&template.description)
        .bind(serde_json::to_string(&template.components)?)
        .bind(created_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(template_id)
    }

    pub async fn get_business_template(
        &self,
        template_id: &str,
    ) -> HelmsmanResult<Option<BusinessTemplate>> {
        let row = sqlx::query(
            "SELECT * FROM business_templates WHERE business_template_id = ?",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(business_template_from_row).transpose()
    }

    pub async fn list_business_templates(&self) -> HelmsmanResult<Vec<BusinessTemplate>> {
        let rows = sqlx::query("SELECT * FROM business_templates ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(business_template_from_row).collect()
    }

    pub async fn delete_business_template(&self, template_id: &str) -> HelmsmanResult<()> {
        let result = sqlx::query(
            "DELETE FROM business_templates WHERE business_template_id = ?",
        )
        .bind(template_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HelmsmanError::NotFound(
                "Business template not found".to_string(),
            ));
        }
        Ok(())
    }

    // ---- component metrics ----

    pub async fn append_component_metric(
        &self,
        component_id: &str,
        timestamp: i64,
        usage: &ComponentUsage,
    ) -> HelmsmanResult<()> {
        sqlx::query(
            "INSERT INTO component_metrics (component_id, timestamp, cpu_percent, memory_mb, gpu_percent) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(component_id)
        .bind(timestamp)
        .bind(usage.cpu_percent)
        .bind(usage.memory_mb)
        .bind(usage.gpu_percent.unwrap_or(0.0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_component_metrics(
        &self,
        component_id: &str,
        limit: i64,
    ) -> HelmsmanResult<Vec<ComponentMetric>> {
        let rows = sqlx::query(
            "SELECT timestamp, cpu_percent, memory_mb, gpu_percent FROM component_metrics \
             WHERE component_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(component_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ComponentMetric {
                timestamp: row.get("timestamp"),
                cpu_percent: row.get("cpu_percent"),
                memory_mb: row.get("memory_mb"),
                gpu_percent: row.get::<Option<f64>, _>("gpu_percent").unwrap_or(0.0),
            })
            .collect())
    }

    pub async fn count_component_metrics(&self, component_id: &str) -> HelmsmanResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM component_metrics WHERE component_id = ?")
            .bind(component_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Back-date a node's last_seen_at. Test-support hook for liveness
    /// checks; not part of the runtime surface.
    #[doc(hidden)]
    pub async fn force_last_seen(&self, node_id: &str, last_seen_at: i64) -> HelmsmanResult<()> {
        sqlx::query("UPDATE node SET last_seen_at = ? WHERE node_id = ?")
            .bind(last_seen_at)
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn node_from_row(row: sqlx::sqlite::SqliteRow) -> HelmsmanResult<NodeRecord> {
    Ok(NodeRecord {
        node_id: row.get("node_id"),
        hostname: row.get("hostname"),
        ip_address: row.get("ip_address"),
        os_info: row.get("os_info"),
        cpu_model: row.get("cpu_model"),
        gpu_count: row.get("gpu_count"),
        port: row.get::<i64, _>("port") as u16,
        parent_chassis_id: row.get("parent_chassis_id"),
        slot_index: row.get("slot_index"),
        created_at: row.get("created_at"),
        last_seen_at: row.get("last_seen_at"),
        status: NodeStatus::parse(row.get::<String, _>("status").as_str()),
    })
}

fn business_from_row(row: sqlx::sqlite::SqliteRow) -> BusinessRecord {
    BusinessRecord {
        business_id: row.get("business_id"),
        business_name: row.get("business_name"),
        status: BusinessStatus::parse(row.get::<String, _>("status").as_str()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn component_from_row(row: sqlx::sqlite::SqliteRow) -> HelmsmanResult<ComponentRecord> {
    let kind = ComponentType::parse(row.get::<String, _>("type").as_str()).ok_or_else(|| {
        HelmsmanError::Database(format!(
            "Unknown component type for {}",
            row.get::<String, _>("component_id")
        ))
    })?;

    let spec = ComponentSpec {
        component_id: row.get("component_id"),
        component_name: row.get("component_name"),
        kind,
        image_url: row.get("image_url"),
        image_name: row.get("image_name"),
        binary_path: row.get("binary_path"),
        binary_url: row.get("binary_url"),
        environment_variables: serde_json::from_str(row.get::<String, _>("environment_variables").as_str())?,
        resource_requirements: serde_json::from_str(row.get::<String, _>("resource_requirements").as_str())?,
        config_files: serde_json::from_str(row.get::<String, _>("config_files").as_str())?,
        affinity: serde_json::from_str(row.get::<String, _>("affinity").as_str())?,
    };

    Ok(ComponentRecord {
        spec,
        business_id: row.get("business_id"),
        node_id: non_empty(row.get("node_id")),
        container_id: non_empty(row.get("container_id")),
        process_id: non_empty(row.get("process_id")),
        status: ComponentStatus::parse(row.get::<String, _>("status").as_str()),
        started_at: row.get("started_at"),
        updated_at: row.get("updated_at"),
    })
}

fn component_template_from_row(row: sqlx::sqlite::SqliteRow) -> HelmsmanResult<ComponentTemplate> {
    let kind = ComponentType::parse(row.get::<String, _>("type").as_str()).ok_or_else(|| {
        HelmsmanError::Database("Unknown component template type".to_string())
    })?;
    let config: TemplateConfig = serde_json::from_str(row.get::<String, _>("config").as_str())?;

    Ok(ComponentTemplate {
        component_template_id: Some(row.get("component_template_id")),
        template_name: row.get("template_name"),
        description: row.get("description"),
        kind,
        config,
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    })
}

fn business_template_from_row(row: sqlx::sqlite::SqliteRow) -> HelmsmanResult<BusinessTemplate> {
    let components: Vec<TemplateRef> =
        serde_json::from_str(row.get::<String, _>("components").as_str())?;

    Ok(BusinessTemplate {
        business_template_id: Some(row.get("business_template_id")),
        template_name: row.get("template_name"),
        description: row.get("description"),
        components,
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_core::types::{new_business_id, new_component_id};

    async fn scratch_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = Store::new(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn register_request(hostname: &str, ip: &str) -> RegisterRequest {
        RegisterRequest {
            node_id: None,
            hostname: hostname.to_string(),
            ip_address: ip.to_string(),
            os_info: "Linux 6.1 x86_64".to_string(),
            cpu_model: "TestCPU".to_string(),
            gpu_count: 0,
            port: 8081,
            parent_chassis_id: None,
            slot_index: None,
        }
    }

    fn docker_spec(id: &str, name: &str) -> ComponentSpec {
        ComponentSpec {
            component_id: id.to_string(),
            component_name: name.to_string(),
            kind: ComponentType::Docker,
            image_url: None,
            image_name: Some("nginx".to_string()),
            binary_path: None,
            binary_url: None,
            environment_variables: Default::default(),
            resource_requirements: Default::default(),
            config_files: Vec::new(),
            affinity: Default::default(),
        }
    }

    fn component(business_id: &str, spec: ComponentSpec, node_id: Option<&str>) -> ComponentRecord {
        ComponentRecord {
            spec,
            business_id: business_id.to_string(),
            node_id: node_id.map(str::to_string),
            container_id: None,
            process_id: None,
            status: ComponentStatus::Scheduled,
            started_at: now_ts(),
            updated_at: now_ts(),
        }
    }

    fn business(id: &str, name: &str) -> BusinessRecord {
        BusinessRecord {
            business_id: id.to_string(),
            business_name: name.to_string(),
            status: BusinessStatus::Running,
            created_at: now_ts(),
            updated_at: now_ts(),
        }
    }

    #[tokio::test]
    async fn node_upsert_is_idempotent_and_descriptor_refreshes() {
        let (store, _dir) = scratch_store().await;

        store.upsert_node("node-1", &register_request("h1", "10.0.0.1")).await.unwrap();
        store.upsert_node("node-1", &register_request("h1", "10.0.0.1")).await.unwrap();

        let nodes = store.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].hostname, "h1");

        // Re-registration may change the address; identity stays.
        store.upsert_node("node-1", &register_request("h1", "10.0.0.9")).await.unwrap();
        let node = store.get_node("node-1").await.unwrap().unwrap();
        assert_eq!(node.ip_address, "10.0.0.9");
        assert_eq!(node.status, NodeStatus::Online);
    }

    #[tokio::test]
    async fn touch_flips_offline_nodes_back_online() {
        let (store, _dir) = scratch_store().await;
        store.upsert_node("node-1", &register_request("h1", "10.0.0.1")).await.unwrap();

        store.set_node_status("node-1", NodeStatus::Offline).await.unwrap();
        assert_eq!(
            store.get_node("node-1").await.unwrap().unwrap().status,
            NodeStatus::Offline
        );

        assert!(store.touch_node("node-1").await.unwrap());
        assert_eq!(
            store.get_node("node-1").await.unwrap().unwrap().status,
            NodeStatus::Online
        );

        // Touching an unknown node is a no-op.
        assert!(!store.touch_node("node-missing").await.unwrap());
    }

    #[tokio::test]
    async fn stale_online_nodes_respects_threshold() {
        let (store, _dir) = scratch_store().await;
        store.upsert_node("node-1", &register_request("h1", "10.0.0.1")).await.unwrap();
        store.upsert_node("node-2", &register_request("h2", "10.0.0.2")).await.unwrap();

        let now = now_ts();
        store.force_last_seen("node-1", now - 10).await.unwrap();

        let stale = store.stale_online_nodes(now, 5).await.unwrap();
        assert_eq!(stale, vec!["node-1".to_string()]);

        // Already-offline nodes are not reported again.
        store.set_node_status("node-1", NodeStatus::Offline).await.unwrap();
        assert!(store.stale_online_nodes(now, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn business_status_is_derived_on_read() {
        let (store, _dir) = scratch_store().await;
        let business_id = new_business_id();
        store.save_business(&business(&business_id, "web")).await.unwrap();

        let c1 = new_component_id();
        let c2 = new_component_id();
        store.save_component(&component(&business_id, docker_spec(&c1, "a"), None)).await.unwrap();
        store.save_component(&component(&business_id, docker_spec(&c2, "b"), None)).await.unwrap();

        // Both scheduled -> derived error.
        let read = store.get_business(&business_id).await.unwrap().unwrap();
        assert_eq!(read.status, BusinessStatus::Error);

        store.set_component_status(&c1, ComponentStatus::Running).await.unwrap();
        store.set_component_status(&c2, ComponentStatus::Running).await.unwrap();
        let read = store.get_business(&business_id).await.unwrap().unwrap();
        assert_eq!(read.status, BusinessStatus::Running);

        store.set_component_status(&c2, ComponentStatus::Stopped).await.unwrap();
        let read = store.get_business(&business_id).await.unwrap().unwrap();
        assert_eq!(read.status, BusinessStatus::Error);
    }

    #[tokio::test]
    async fn component_roundtrip_preserves_config_bags() {
        let (store, _dir) = scratch_store().await;
        let business_id = new_business_id();
        store.save_business(&business(&business_id, "web")).await.unwrap();

        let mut spec = docker_spec(&new_component_id(), "api");
        spec.environment_variables.insert("PORT".into(), "8080".into());
        spec.affinity.insert("ip_address".into(), serde_json::json!("10.0.0.2"));
        let id = spec.component_id.clone();

        store.save_component(&component(&business_id, spec, Some("node-1"))).await.unwrap();

        let read = store.get_component(&id).await.unwrap().unwrap();
        assert_eq!(read.spec.environment_variables["PORT"], "8080");
        assert_eq!(read.spec.affinity["ip_address"], "10.0.0.2");
        assert_eq!(read.node_id.as_deref(), Some("node-1"));
        assert_eq!(read.status, ComponentStatus::Scheduled);
    }

    #[tokio::test]
    async fn runtime_update_sets_handle_by_type() {
        let (store, _dir) = scratch_store().await;
        let business_id = new_business_id();
        store.save_business(&business(&business_id, "web")).await.unwrap();

        let id = new_component_id();
        store.save_component(&component(&business_id, docker_spec(&id, "api"), Some("node-1"))).await.unwrap();

        store
            .update_component_runtime(&id, ComponentType::Docker, ComponentStatus::Running, Some("abc123"), None)
            .await
            .unwrap();
        let read = store.get_component(&id).await.unwrap().unwrap();
        assert_eq!(read.status, ComponentStatus::Running);
        assert_eq!(read.container_id.as_deref(), Some("abc123"));

        store
            .update_component_runtime(&id, ComponentType::Docker, ComponentStatus::Stopped, Some(""), None)
            .await
            .unwrap();
        let read = store.get_component(&id).await.unwrap().unwrap();
        assert_eq!(read.status, ComponentStatus::Stopped);
        assert!(read.container_id.is_none());
    }

    #[tokio::test]
    async fn delete_business_cascades_components_and_metrics() {
        let (store, _dir) = scratch_store().await;
        let business_id = new_business_id();
        store.save_business(&business(&business_id, "web")).await.unwrap();

        let usage = ComponentUsage { cpu_percent: 1.0, memory_mb: 64, gpu_percent: None };
        let mut component_ids = Vec::new();
        for i in 0..3 {
            let id = new_component_id();
            store
                .save_component(&component(&business_id, docker_spec(&id, &format!("c{}", i)), None))
                .await
                .unwrap();
            for t in 0..100 {
                store.append_component_metric(&id, 1000 + t, &usage).await.unwrap();
            }
            component_ids.push(id);
        }

        store.delete_business(&business_id).await.unwrap();

        assert!(store.get_business(&business_id).await.unwrap().is_none());
        for id in &component_ids {
            assert!(store.get_component(id).await.unwrap().is_none());
            assert_eq!(store.count_component_metrics(id).await.unwrap(), 0);
        }

        // Deleting again reports not-found.
        assert!(matches!(
            store.delete_business(&business_id).await,
            Err(HelmsmanError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn component_metrics_return_newest_first() {
        let (store, _dir) = scratch_store().await;
        let business_id = new_business_id();
        store.save_business(&business(&business_id, "web")).await.unwrap();
        let id = new_component_id();
        store.save_component(&component(&business_id, docker_spec(&id, "api"), None)).await.unwrap();

        for t in [100, 300, 200] {
            let usage = ComponentUsage { cpu_percent: t as f64, memory_mb: 10, gpu_percent: Some(1.5) };
            store.append_component_metric(&id, t, &usage).await.unwrap();
        }

        let metrics = store.recent_component_metrics(&id, 2).await.unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].timestamp, 300);
        assert_eq!(metrics[1].timestamp, 200);
        assert_eq!(metrics[0].gpu_percent, 1.5);
    }

    #[tokio::test]
    async fn component_template_delete_refused_while_referenced() {
        let (store, _dir) = scratch_store().await;

        let ct = ComponentTemplate {
            component_template_id: None,
            template_name: "nginx".to_string(),
            description: String::new(),
            kind: ComponentType::Docker,
            config: TemplateConfig {
                image_name: Some("nginx".to_string()),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        };
        let ct_id = store.save_component_template(&ct).await.unwrap();
        assert!(ct_id.starts_with("ct-"));

        let bt = BusinessTemplate {
            business_template_id: None,
            template_name: "web".to_string(),
            description: String::new(),
            components: vec![TemplateRef { component_template_id: ct_id.clone() }],
            created_at: None,
            updated_at: None,
        };
        let bt_id = store.save_business_template(&bt).await.unwrap();

        // Referenced -> refused.
        assert!(matches!(
            store.delete_component_template(&ct_id).await,
            Err(HelmsmanError::Validation(_))
        ));

        // Drop the reference, then the delete goes through.
        store.delete_business_template(&bt_id).await.unwrap();
        store.delete_component_template(&ct_id).await.unwrap();
        assert!(store.get_component_template(&ct_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn business_template_requires_existing_references() {
        let (store, _dir) = scratch_store().await;

        let bt = BusinessTemplate {
            business_template_id: None,
            template_name: "web".to_string(),
            description: String::new(),
            components: vec![TemplateRef { component_template_id: "ct-missing".to_string() }],
            created_at: None,
            updated_at: None,
        };
        assert!(matches!(
            store.save_business_template(&bt).await,
            Err(HelmsmanError::Validation(_))
        ));
        assert!(store.list_business_templates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_update_keeps_created_at() {
        let (store, _dir) = scratch_store().await;

        let mut ct = ComponentTemplate {
            component_template_id: None,
            template_name: "worker".to_string(),
            description: String::new(),
            kind: ComponentType::Binary,
            config: TemplateConfig {
                binary_path: Some("/opt/worker".to_string()),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        };
        let id = store.save_component_template(&ct).await.unwrap();
        let first = store.get_component_template(&id).await.unwrap().unwrap();

        ct.component_template_id = Some(id.clone());
        ct.template_name = "worker-v2".to_string();
        store.save_component_template(&ct).await.unwrap();

        let second = store.get_component_template(&id).await.unwrap().unwrap();
        assert_eq!(second.template_name, "worker-v2");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn components_for_node_supports_agent_recovery() {
        let (store, _dir) = scratch_store().await;
        store.upsert_node("node-1", &register_request("h1", "10.0.0.1")).await.unwrap();

        let business_id = new_business_id();
        store.save_business(&business(&business_id, "web")).await.unwrap();
        let id = new_component_id();
        store
            .save_component(&component(&business_id, docker_spec(&id, "api"), Some("node-1")))
            .await
            .unwrap();

        let assigned = store.components_for_node("node-1").await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].spec.component_id, id);
        assert!(store.components_for_node("node-2").await.unwrap().is_empty());
    }
}
