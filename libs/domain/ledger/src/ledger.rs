// [libs/domain/ledger/src/ledger.rs]
/*!
 * =================================================================
 * APARATO: CREDIT LEDGER ENGINE (V4.4 - LINEARIZED TENANT LANES)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: CRÉDITOS/DÉBITOS IDEMPOTENTES Y BALANCE CACHEADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TENANT LANES: Un candado asíncrono por tenant serializa la
 *    secuencia leer-sumar-escribir; tenants distintos no se bloquean.
 * 2. CACHE DISCIPLINE: La caché de balance (TTL) se invalida bajo el
 *    MISMO candado que la escritura que la ensucia.
 * 3. REPLAY SHIELD: El reference_id convierte todo replay en la
 *    devolución de la transacción original.
 *
 * # Mathematical Proof (Non-Negative Invariant):
 * Bajo el candado del tenant: debit solo cristaliza si
 * balance − amount ≥ 0; como ninguna otra escritura del tenant puede
 * intercalarse, el invariante balance ≥ 0 sobrevive a la concurrencia.
 * =================================================================
 */

use crate::errors::LedgerError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use wopr_core_credit::Credit;
use wopr_domain_models::{LedgerTransaction, TransactionType};
use wopr_infra_db::repositories::ledger::HistoryFilter;
use wopr_infra_db::repositories::LedgerRepository;
use wopr_infra_db::DbError;

/// Vida nominal de una entrada de caché de balance.
const BALANCE_CACHE_TTL: Duration = Duration::from_secs(30);

struct CachedBalance {
    value: Credit,
    cached_at: Instant,
}

pub struct CreditLedger {
    ledger_repository: Arc<LedgerRepository>,
    /// Carriles de serialización por tenant.
    tenant_lanes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Caché de balance con TTL, invalidada en cada escritura.
    balance_cache: Mutex<HashMap<String, CachedBalance>>,
}

impl CreditLedger {
    #[must_use]
    pub fn new(ledger_repository: Arc<LedgerRepository>) -> Self {
        Self {
            ledger_repository,
            tenant_lanes: Mutex::new(HashMap::new()),
            balance_cache: Mutex::new(HashMap::new()),
        }
    }

    /**
     * Anexa un delta positivo al Ledger del tenant.
     *
     * # Logic:
     * Replay por reference_id retorna la transacción original sin
     * alterar Σ delta.
     *
     * # Errors:
     * - `NegativeAmount` si amount < 0.
     * - `Persistence` ante el rechazo del sustrato.
     */
    #[instrument(skip(self, amount))]
    pub async fn credit(
        &self,
        tenant_id: &str,
        amount: Credit,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::NegativeAmount);
        }

        let tenant_lane = self.lane_for(tenant_id).await;
        let _lane_guard = tenant_lane.lock().await;

        if let Some(reference) = reference_id {
            if let Some(existing) = self.ledger_repository.find_by_reference(reference).await? {
                debug!("💳 [LEDGER_REPLAY]: credit reference [{}] already sealed.", reference);
                return Ok(existing);
            }
        }

        let transaction = self
            .append_under_lane(tenant_id, amount, transaction_type, description, reference_id)
            .await?;

        info!(
            "💰 [LEDGER_CREDIT]: Tenant [{}] +{} ({})",
            tenant_id,
            amount,
            transaction_type.as_str()
        );
        Ok(transaction)
    }

    /**
     * Anexa un delta negativo al Ledger del tenant.
     *
     * # Errors:
     * - `InsufficientBalance` cuando balance − amount < 0.
     * - `NegativeAmount` si amount < 0.
     */
    #[instrument(skip(self, amount))]
    pub async fn debit(
        &self,
        tenant_id: &str,
        amount: Credit,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::NegativeAmount);
        }

        let tenant_lane = self.lane_for(tenant_id).await;
        let _lane_guard = tenant_lane.lock().await;

        if let Some(reference) = reference_id {
            if let Some(existing) = self.ledger_repository.find_by_reference(reference).await? {
                debug!("💳 [LEDGER_REPLAY]: debit reference [{}] already sealed.", reference);
                return Ok(existing);
            }
        }

        let current_balance = self.balance_under_lane(tenant_id).await?;
        if current_balance.checked_sub(amount)?.is_negative() {
            return Err(LedgerError::InsufficientBalance {
                balance: current_balance,
                required: amount,
            });
        }

        let transaction = self
            .append_under_lane(tenant_id, amount.negated(), transaction_type, description, reference_id)
            .await?;

        info!(
            "💸 [LEDGER_DEBIT]: Tenant [{}] -{} ({})",
            tenant_id,
            amount,
            transaction_type.as_str()
        );
        Ok(transaction)
    }

    /// Balance del tenant (caché TTL con read-through).
    pub async fn balance(&self, tenant_id: &str) -> Result<Credit, LedgerError> {
        {
            let cache_guard = self.balance_cache.lock().await;
            if let Some(cached) = cache_guard.get(tenant_id) {
                if cached.cached_at.elapsed() < BALANCE_CACHE_TTL {
                    return Ok(cached.value);
                }
            }
        }
        let fresh_balance = self.ledger_repository.sum_deltas(tenant_id).await?;
        self.store_cached_balance(tenant_id, fresh_balance).await;
        Ok(fresh_balance)
    }

    /// Historial del tenant, más reciente primero.
    pub async fn history(
        &self,
        tenant_id: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        Ok(self.ledger_repository.history(tenant_id, filter).await?)
    }

    /// Sonda rápida de idempotencia para receptores de webhooks.
    pub async fn has_reference_id(&self, reference_id: &str) -> Result<bool, LedgerError> {
        Ok(self.ledger_repository.has_reference_id(reference_id).await?)
    }

    // --- MECÁNICA INTERNA (BAJO CARRIL) ---

    async fn lane_for(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut lanes_guard = self.tenant_lanes.lock().await;
        lanes_guard
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Balance fresco leído DENTRO del carril (sin caché intermedia).
    async fn balance_under_lane(&self, tenant_id: &str) -> Result<Credit, LedgerError> {
        Ok(self.ledger_repository.sum_deltas(tenant_id).await?)
    }

    async fn append_under_lane(
        &self,
        tenant_id: &str,
        delta: Credit,
        transaction_type: TransactionType,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let transaction = LedgerTransaction {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            delta,
            transaction_type,
            description: description.to_string(),
            reference_id: reference_id.map(str::to_string),
            created_at: Utc::now(),
        };

        match self.ledger_repository.append_transaction(&transaction).await {
            Ok(()) => {}
            // Carrera entre réplicas: el índice UNIQUE decidió por nosotros.
            Err(DbError::DuplicateReference) => {
                if let Some(reference) = reference_id {
                    if let Some(existing) = self.ledger_repository.find_by_reference(reference).await? {
                        return Ok(existing);
                    }
                }
                return Err(LedgerError::Persistence(DbError::DuplicateReference));
            }
            Err(other_fault) => return Err(LedgerError::Persistence(other_fault)),
        }

        // Invalidación bajo el mismo carril que la escritura.
        self.invalidate_cached_balance(tenant_id).await;
        Ok(transaction)
    }

    async fn invalidate_cached_balance(&self, tenant_id: &str) {
        let mut cache_guard = self.balance_cache.lock().await;
        cache_guard.remove(tenant_id);
    }

    async fn store_cached_balance(&self, tenant_id: &str, value: Credit) {
        let mut cache_guard = self.balance_cache.lock().await;
        cache_guard.insert(tenant_id.to_string(), CachedBalance { value, cached_at: Instant::now() });
    }
}
