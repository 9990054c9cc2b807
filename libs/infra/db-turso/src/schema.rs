// [libs/infra/db-turso/src/schema.rs]
/**
 * =================================================================
 * APARATO: PLATFORM DATABASE SCHEMA (V4.4 - CONTROL PLANE STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. LEDGER STRATA: Transacciones append-only con unicidad de reference_id.
 * 2. FLEET STRATA: Nodos, transiciones auditadas, credenciales y bots.
 * 3. METER STRATA: Eventos crudos, agregados por ventana y por periodo.
 * 4. IDEMPOTENCIA: Toda sentencia es re-ejecutable en caliente.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del plano de control WOPR.
 */
const PLATFORM_TABLES: &[(&str, &str)] = &[
    ("TABLE_LEDGER_TRANSACTIONS", r#"
        CREATE TABLE IF NOT EXISTS ledger_transactions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            delta_raw INTEGER NOT NULL,
            transaction_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            reference_id TEXT UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_METER_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS meter_events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            cost_raw INTEGER NOT NULL,
            charge_raw INTEGER NOT NULL,
            capability TEXT NOT NULL,
            provider TEXT NOT NULL,
            event_timestamp DATETIME NOT NULL,
            session_id TEXT,
            duration_ms INTEGER,
            usage_units INTEGER,
            usage_unit_type TEXT,
            tier TEXT,
            metadata_json TEXT,
            inserted_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_USAGE_SUMMARIES", r#"
        CREATE TABLE IF NOT EXISTS usage_summaries (
            tenant_id TEXT NOT NULL,
            capability TEXT NOT NULL,
            provider TEXT NOT NULL,
            window_start DATETIME NOT NULL,
            event_count INTEGER NOT NULL DEFAULT 0,
            total_cost_raw INTEGER NOT NULL DEFAULT 0,
            total_charge_raw INTEGER NOT NULL DEFAULT 0,
            total_duration_ms INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tenant_id, capability, provider, window_start)
        );
    "#),
    ("TABLE_BILLING_PERIOD_SUMMARIES", r#"
        CREATE TABLE IF NOT EXISTS billing_period_summaries (
            tenant_id TEXT NOT NULL,
            capability TEXT NOT NULL,
            provider TEXT NOT NULL,
            period_start DATETIME NOT NULL,
            event_count INTEGER NOT NULL DEFAULT 0,
            total_cost_raw INTEGER NOT NULL DEFAULT 0,
            total_charge_raw INTEGER NOT NULL DEFAULT 0,
            total_duration_ms INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tenant_id, capability, provider, period_start)
        );
    "#),
    ("TABLE_AGGREGATION_WATERMARKS", r#"
        CREATE TABLE IF NOT EXISTS aggregation_watermarks (
            aggregator_id TEXT PRIMARY KEY,
            high_watermark DATETIME NOT NULL
        );
    "#),
    ("TABLE_NODES", r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            host TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'registering',
            capacity_mb INTEGER NOT NULL DEFAULT 0,
            used_mb INTEGER NOT NULL DEFAULT 0,
            agent_version TEXT,
            last_heartbeat_at DATETIME,
            registered_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_NODE_TRANSITIONS", r#"
        CREATE TABLE IF NOT EXISTS node_transitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            reason TEXT NOT NULL,
            actor TEXT NOT NULL,
            occurred_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_NODE_SECRETS", r#"
        CREATE TABLE IF NOT EXISTS node_secrets (
            node_id TEXT PRIMARY KEY,
            hashed_secret TEXT NOT NULL UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_REGISTRATION_TOKENS", r#"
        CREATE TABLE IF NOT EXISTS registration_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            consumed_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_BOT_INSTANCES", r#"
        CREATE TABLE IF NOT EXISTS bot_instances (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            node_id TEXT,
            billing_state TEXT NOT NULL DEFAULT 'active',
            suspended_at DATETIME,
            estimated_mb INTEGER NOT NULL DEFAULT 512,
            stateful INTEGER NOT NULL DEFAULT 1,
            image_reference TEXT NOT NULL DEFAULT '',
            release_channel TEXT NOT NULL DEFAULT 'pinned',
            update_policy TEXT NOT NULL DEFAULT 'manual',
            last_node_change_from TEXT,
            last_node_change_to TEXT,
            last_node_change_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_RECOVERY_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS recovery_events (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            trigger_kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'in_progress',
            tenants_total INTEGER NOT NULL DEFAULT 0,
            tenants_recovered INTEGER NOT NULL DEFAULT 0,
            tenants_failed INTEGER NOT NULL DEFAULT 0,
            tenants_waiting INTEGER NOT NULL DEFAULT 0,
            started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME,
            report_json TEXT
        );
    "#),
    ("TABLE_RECOVERY_ITEMS", r#"
        CREATE TABLE IF NOT EXISTS recovery_items (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES recovery_events(id) ON DELETE CASCADE,
            tenant_id TEXT NOT NULL,
            bot_id TEXT NOT NULL,
            source_node TEXT NOT NULL,
            target_node TEXT,
            backup_key TEXT,
            status TEXT NOT NULL,
            reason TEXT,
            started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME
        );
    "#),
    ("TABLE_RATE_LIMIT_COUNTERS", r#"
        CREATE TABLE IF NOT EXISTS rate_limit_counters (
            scope TEXT NOT NULL,
            counter_key TEXT NOT NULL,
            window_start INTEGER NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (scope, counter_key, window_start)
        );
    "#),
    ("TABLE_CIRCUIT_BREAKER_STATES", r#"
        CREATE TABLE IF NOT EXISTS circuit_breaker_states (
            instance_id TEXT PRIMARY KEY,
            error_count INTEGER NOT NULL DEFAULT 0,
            window_start INTEGER NOT NULL DEFAULT 0,
            tripped_at DATETIME
        );
    "#),
    ("TABLE_SPENDING_LIMITS", r#"
        CREATE TABLE IF NOT EXISTS spending_limits (
            tenant_id TEXT PRIMARY KEY,
            daily_alert_at_raw INTEGER,
            daily_hard_cap_raw INTEGER,
            monthly_alert_at_raw INTEGER,
            monthly_hard_cap_raw INTEGER,
            per_capability_json TEXT NOT NULL DEFAULT '{}',
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_WEBHOOK_SEEN", r#"
        CREATE TABLE IF NOT EXISTS webhook_seen (
            event_id TEXT NOT NULL,
            source TEXT NOT NULL,
            seen_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (event_id, source)
        );
    "#),
    ("TABLE_SNAPSHOT_RECORDS", r#"
        CREATE TABLE IF NOT EXISTS snapshot_records (
            id TEXT PRIMARY KEY,
            instance_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            size_mb REAL NOT NULL DEFAULT 0,
            trigger_kind TEXT NOT NULL,
            plugins_json TEXT NOT NULL DEFAULT '[]',
            config_hash TEXT NOT NULL DEFAULT '',
            storage_path TEXT NOT NULL
        );
    "#),
    ("TABLE_DELETION_REQUESTS", r#"
        CREATE TABLE IF NOT EXISTS deletion_requests (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            delete_after DATETIME NOT NULL,
            cancel_reason TEXT,
            completion_summary_json TEXT,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SERVICE_KEYS", r#"
        CREATE TABLE IF NOT EXISTS service_keys (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            hashed_key TEXT NOT NULL UNIQUE,
            label TEXT NOT NULL DEFAULT '',
            revoked_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_PROVIDER_HEALTH_OVERRIDES", r#"
        CREATE TABLE IF NOT EXISTS provider_health_overrides (
            provider TEXT PRIMARY KEY,
            healthy INTEGER NOT NULL,
            expires_at DATETIME NOT NULL,
            noted_reason TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_TENANT_ADDONS", r#"
        CREATE TABLE IF NOT EXISTS tenant_addons (
            tenant_id TEXT NOT NULL,
            addon TEXT NOT NULL,
            daily_cost_raw INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (tenant_id, addon)
        );
    "#),
    ("TABLE_AUDIT_LOG", r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            subject TEXT NOT NULL,
            detail_json TEXT,
            occurred_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que las tablas existentes se adapten a capacidades nuevas.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("WEBHOOK_PENALTY", "ALTER TABLE webhook_seen ADD COLUMN penalty_count INTEGER NOT NULL DEFAULT 0"),
    ("NODE_DRAIN_NOTE", "ALTER TABLE nodes ADD COLUMN drain_note TEXT"),
    ("BOT_RUNNING_DIGEST", "ALTER TABLE bot_instances ADD COLUMN running_digest TEXT"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Optimiza el acceso para ráfagas del gateway y del agregador.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_LEDGER_TENANT", "CREATE INDEX IF NOT EXISTS idx_ledger_tenant ON ledger_transactions(tenant_id, created_at);"),
    ("IDX_METER_TENANT_TS", "CREATE INDEX IF NOT EXISTS idx_meter_tenant_ts ON meter_events(tenant_id, event_timestamp);"),
    ("IDX_METER_TS", "CREATE INDEX IF NOT EXISTS idx_meter_ts ON meter_events(event_timestamp);"),
    ("IDX_BOTS_NODE", "CREATE INDEX IF NOT EXISTS idx_bots_node ON bot_instances(node_id);"),
    ("IDX_BOTS_TENANT", "CREATE INDEX IF NOT EXISTS idx_bots_tenant ON bot_instances(tenant_id, billing_state);"),
    ("IDX_RECOVERY_ITEMS_EVENT", "CREATE INDEX IF NOT EXISTS idx_recovery_items_event ON recovery_items(event_id, status);"),
    ("IDX_DELETION_EXPIRY", "CREATE INDEX IF NOT EXISTS idx_deletion_expiry ON deletion_requests(status, delete_after);"),
    ("IDX_NODE_TRANSITIONS", "CREATE INDEX IF NOT EXISTS idx_node_transitions ON node_transitions(node_id, occurred_at);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con el sustrato de persistencia.
 */
#[instrument(skip(database_connection))]
pub async fn apply_full_platform_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V4.4...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Platform Ledger V4.4 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in PLATFORM_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        // Las mutaciones fallan en caliente cuando la columna ya existe;
        // ese rechazo es la señal de idempotencia, no un fallo.
        if let Err(mutation_rejection) = db.execute(*sql, ()).await {
            debug!("  ↳ Evolution [{}] already applied: {}", identifier, mutation_rejection);
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        if let Err(index_fault) = db.execute(*sql, ()).await {
            warn!("  ↳ Index [{}] rejected: {}", identifier, index_fault);
        }
    }
    Ok(())
}
