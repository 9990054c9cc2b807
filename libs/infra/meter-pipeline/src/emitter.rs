// [libs/infra/meter-pipeline/src/emitter.rs]
/*!
 * =================================================================
 * APARATO: METER EMITTER (V4.5 - WRITE-AHEAD DISCIPLINE)
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L3/L4)
 * RESPONSABILIDAD: WAL -> BUFFER -> LOTE -> DLQ SIN PÉRDIDA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. WAL FIRST: La línea JSONL se cristaliza en disco ANTES de que el
 *    evento entre al buffer; un crash posterior se repara con replay.
 * 2. AT-LEAST-ONCE: La compactación del WAL ocurre DESPUÉS del COMMIT
 *    del lote; el sustrato deduplica por id pre-generado.
 * 3. DLQ TERMINAL: Un evento que agota sus reintentos migra a la DLQ
 *    JSONL y abandona el buffer; jamás bloquea a sus hermanos.
 * 4. NEVER FAIL THE CALLER: 'emit' degrada todo fallo a warn; la
 *    petición del gateway que lo originó ya es exitosa.
 *
 * # Mathematical Proof (No-Loss Window):
 * Sea E un evento con línea WAL durable. E vive en exactamente uno de
 * {WAL+buffer, meter_events, DLQ}. Toda transición entre conjuntos es
 * atómica respecto del candado del journal, por lo que ningún estado
 * intermedio pierde a E.
 * =================================================================
 */

use crate::errors::MeterPipelineError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use wopr_core_credit::Credit;
use wopr_domain_models::MeterEvent;
use wopr_infra_db::repositories::MeterRepository;

/// Configuración del pipeline (valores nominales del plano de control).
#[derive(Debug, Clone)]
pub struct MeterPipelineConfig {
    pub wal_path: PathBuf,
    pub dlq_path: PathBuf,
    pub flush_interval_ms: u64,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl MeterPipelineConfig {
    #[must_use]
    pub fn with_data_dir(data_dir: &std::path::Path) -> Self {
        Self {
            wal_path: data_dir.join("meter.wal"),
            dlq_path: data_dir.join("meter.dlq"),
            flush_interval_ms: 250,
            batch_size: 64,
            max_retries: 5,
        }
    }
}

/// Línea del journal: el evento más su contador de reintentos.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalLine {
    #[serde(flatten)]
    event: MeterEvent,
    #[serde(default)]
    retries: u32,
}

pub struct MeterEmitter {
    meter_repository: Arc<MeterRepository>,
    config: MeterPipelineConfig,
    /// Buffer en RAM; el frente son los eventos más antiguos.
    buffer: Mutex<VecDeque<JournalLine>>,
    /// Candado del journal: serializa append y compactación del WAL.
    journal_lock: Mutex<()>,
    closed: AtomicBool,
}

impl MeterEmitter {
    #[must_use]
    pub fn new(meter_repository: Arc<MeterRepository>, config: MeterPipelineConfig) -> Self {
        Self {
            meter_repository,
            config,
            buffer: Mutex::new(VecDeque::new()),
            journal_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /**
     * Acepta un evento de forma síncrona (durable en WAL al retornar).
     *
     * Tras 'close()' la emisión es un descarte silencioso.
     */
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn emit(&self, event: MeterEvent) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("🕳️ [METER_DROP]: Emitter sealed; event discarded silently.");
            return;
        }

        let journal_line = JournalLine { event, retries: 0 };

        // 1. CRISTALIZACIÓN WAL (crash-recovery, no es una cola).
        if let Err(journal_fault) = self.append_wal_line(&journal_line).await {
            // El WAL degradado no veta la contabilidad en RAM.
            warn!("⚠️ [METER_WAL_DEGRADED]: Journal append failed: {}", journal_fault);
        }

        // 2. ENCOLADO EN RAM.
        let should_flush = {
            let mut buffer_guard = self.buffer.lock().await;
            buffer_guard.push_back(journal_line);
            buffer_guard.len() >= self.config.batch_size
        };

        // 3. DESCARGA POR PRESIÓN DE LOTE.
        if should_flush {
            self.flush().await;
        }
    }

    /**
     * Descarga el buffer hacia el sustrato en una sola transacción.
     *
     * # Logic:
     * Éxito -> compactar el WAL al contenido restante del buffer.
     * Fallo -> devolver los eventos al FRENTE con retries+1; los que
     * exceden max_retries migran a la DLQ.
     */
    #[instrument(skip(self))]
    pub async fn flush(&self) {
        let drained_events: Vec<JournalLine> = {
            let mut buffer_guard = self.buffer.lock().await;
            buffer_guard.drain(..).collect()
        };

        if drained_events.is_empty() {
            return;
        }

        let batch: Vec<MeterEvent> = drained_events.iter().map(|line| line.event.clone()).collect();

        match self.meter_repository.insert_batch(&batch).await {
            Ok(()) => {
                debug!("📊 [METER_FLUSH]: {} events committed.", batch.len());
                self.compact_wal().await;
            }
            Err(batch_fault) => {
                warn!("⚠️ [METER_FLUSH_FAULT]: Batch rejected: {}", batch_fault);
                let mut poisoned = Vec::new();
                {
                    let mut buffer_guard = self.buffer.lock().await;
                    // Reinserción al frente en orden original.
                    for mut line in drained_events.into_iter().rev() {
                        line.retries += 1;
                        if line.retries > self.config.max_retries {
                            poisoned.push(line);
                        } else {
                            buffer_guard.push_front(line);
                        }
                    }
                }

                for terminal_line in poisoned {
                    self.banish_to_dlq(&terminal_line).await;
                }
                self.compact_wal().await;
            }
        }
    }

    /// Rehidrata el buffer desde el WAL tras un reinicio del proceso.
    #[instrument(skip(self))]
    pub async fn replay_wal(&self) -> Result<usize, MeterPipelineError> {
        let _journal_guard = self.journal_lock.lock().await;

        let journal_content = match fs::read_to_string(&self.config.wal_path).await {
            Ok(content) => content,
            Err(read_fault) if read_fault.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(read_fault) => return Err(MeterPipelineError::JournalIo(read_fault)),
        };

        let mut replayed = 0usize;
        let mut buffer_guard = self.buffer.lock().await;
        for journal_line_raw in journal_content.lines() {
            if journal_line_raw.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalLine>(journal_line_raw) {
                Ok(journal_line) => {
                    buffer_guard.push_back(journal_line);
                    replayed += 1;
                }
                Err(parse_fault) => {
                    warn!("⚠️ [METER_REPLAY]: Corrupt journal line skipped: {}", parse_fault);
                }
            }
        }

        if replayed > 0 {
            info!("♻️ [METER_REPLAY]: {} events rehydrated from journal.", replayed);
        }
        Ok(replayed)
    }

    /// Sella el emisor con una descarga final; emisiones futuras se descartan.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.flush().await;
        info!("🔒 [METER_SEALED]: Emitter closed after final flush.");
    }

    /// Cargo aún no cristalizado del tenant (insumo del centinela de topes).
    pub async fn buffered_charge(&self, tenant_id: &str) -> Credit {
        let buffer_guard = self.buffer.lock().await;
        let total_raw: i64 = buffer_guard
            .iter()
            .filter(|line| line.event.tenant == tenant_id)
            .map(|line| line.event.charge.raw())
            .sum();
        Credit::from_raw(total_raw).unwrap_or_else(|_| Credit::zero())
    }

    /// Lanza el daemon de descarga periódica.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let emitter = Arc::clone(self);
        let cadence = Duration::from_millis(emitter.config.flush_interval_ms.max(25));

        tokio::spawn(async move {
            let mut flush_ticker = tokio::time::interval(cadence);
            flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("📊 [METER_FLUSHER]: Periodic flush daemon active ({:?}).", cadence);

            loop {
                flush_ticker.tick().await;
                if emitter.closed.load(Ordering::SeqCst) {
                    break;
                }
                emitter.flush().await;
            }
        })
    }

    // --- MECÁNICA DEL JOURNAL ---

    async fn append_wal_line(&self, journal_line: &JournalLine) -> Result<(), MeterPipelineError> {
        let _journal_guard = self.journal_lock.lock().await;

        if let Some(parent_dir) = self.config.wal_path.parent() {
            fs::create_dir_all(parent_dir).await?;
        }

        let mut journal_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.wal_path)
            .await?;

        let mut serialized = serde_json::to_string(journal_line)?;
        serialized.push('\n');
        journal_file.write_all(serialized.as_bytes()).await?;
        journal_file.flush().await?;
        Ok(())
    }

    /// Reescribe el WAL desde el contenido vigente del buffer.
    async fn compact_wal(&self) {
        let _journal_guard = self.journal_lock.lock().await;

        let surviving_lines: Vec<String> = {
            let buffer_guard = self.buffer.lock().await;
            buffer_guard
                .iter()
                .filter_map(|line| serde_json::to_string(line).ok())
                .collect()
        };

        let journal_body = if surviving_lines.is_empty() {
            String::new()
        } else {
            format!("{}\n", surviving_lines.join("\n"))
        };

        if let Err(compaction_fault) = fs::write(&self.config.wal_path, journal_body).await {
            warn!("⚠️ [METER_WAL_COMPACT]: Rewrite failed: {}", compaction_fault);
        }
    }

    async fn banish_to_dlq(&self, terminal_line: &JournalLine) {
        error!(
            "💀 [METER_DLQ]: Event [{}] exhausted {} retries; banished to dead-letter queue.",
            terminal_line.event.id, terminal_line.retries
        );

        let serialized = match serde_json::to_string(terminal_line) {
            Ok(serialized) => serialized,
            Err(serialization_fault) => {
                error!("💀 [METER_DLQ_FAULT]: Serialization collapse: {}", serialization_fault);
                return;
            }
        };

        if let Some(parent_dir) = self.config.dlq_path.parent() {
            let _ = fs::create_dir_all(parent_dir).await;
        }

        let open_result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.dlq_path)
            .await;

        match open_result {
            Ok(mut dlq_file) => {
                let body = format!("{}\n", serialized);
                if let Err(write_fault) = dlq_file.write_all(body.as_bytes()).await {
                    error!("💀 [METER_DLQ_FAULT]: Append collapse: {}", write_fault);
                }
            }
            Err(open_fault) => {
                error!("💀 [METER_DLQ_FAULT]: Open collapse: {}", open_fault);
            }
        }
    }
}
