// [apps/orchestrator/src/services/snapshot_vault.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT VAULT (V4.4 - SAFETY RENAME)
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: TAR CONTENT-ADDRESSED + RESTAURACIÓN ATÓMICA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SAFE-ID SHIELD: El instance_id se valida contra [A-Za-z0-9_-]+
 *    ANTES de tocar el shell; cualquier metacarácter es rechazado.
 * 2. METADATA-OR-NOTHING: Si la fila de metadatos es rechazada, el
 *    tar recién creado se elimina y el fallo propaga.
 * 3. PRE-RESTORE PIVOT: La restauración renombra el destino a
 *    '<dst>.pre-restore-<ts>'; el éxito lo purga, el fallo lo
 *    restituye.
 * =================================================================
 */

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use wopr_domain_models::snapshot::is_safe_instance_id;
use wopr_domain_models::{SnapshotRecord, SnapshotTrigger};
use wopr_infra_db::repositories::SnapshotRepository;
use wopr_infra_db::DbError;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("[L4_SNAPSHOT_FAULT]: UNSAFE_INSTANCE_ID -> {0}")]
    UnsafeInstanceId(String),

    #[error("[L4_SNAPSHOT_FAULT]: SNAPSHOT_NOT_FOUND -> {0}")]
    SnapshotNotFound(String),

    #[error("[L4_SNAPSHOT_FAULT]: ARCHIVE_TOOL -> {0}")]
    ArchiveTool(String),

    #[error("[L4_SNAPSHOT_FAULT]: FILESYSTEM -> {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("[L4_SNAPSHOT_FAULT]: METADATA -> {0}")]
    Metadata(#[from] DbError),
}

pub struct SnapshotVault {
    snapshot_repository: Arc<SnapshotRepository>,
    snapshot_dir: PathBuf,
}

impl SnapshotVault {
    #[must_use]
    pub fn new(snapshot_repository: Arc<SnapshotRepository>, snapshot_dir: PathBuf) -> Self {
        Self { snapshot_repository, snapshot_dir }
    }

    /**
     * Captura el directorio de estado de una instancia en un tar.gz
     * content-addressed y sella su fila de metadatos.
     */
    #[instrument(skip(self, plugins))]
    pub async fn create(
        &self,
        instance_id: &str,
        user_id: &str,
        src_dir: &Path,
        trigger: SnapshotTrigger,
        plugins: Vec<String>,
    ) -> Result<SnapshotRecord, SnapshotError> {
        if !is_safe_instance_id(instance_id) {
            return Err(SnapshotError::UnsafeInstanceId(instance_id.to_string()));
        }

        // 1. HUELLA DE CONFIGURACIÓN ("" si el archivo no existe).
        let config_hash = match fs::read(src_dir.join("config.json")).await {
            Ok(config_bytes) => hex::encode(Sha256::digest(&config_bytes)),
            Err(read_fault) if read_fault.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(read_fault) => return Err(SnapshotError::Filesystem(read_fault)),
        };

        // 2. EMPAQUETADO TAR (padre + basename, un solo directorio raíz).
        let snapshot_id = Uuid::new_v4().to_string();
        let instance_vault_dir = self.snapshot_dir.join(instance_id);
        fs::create_dir_all(&instance_vault_dir).await?;
        let tar_path = instance_vault_dir.join(format!("{}.tar.gz", snapshot_id));

        let src_parent = src_dir.parent().unwrap_or_else(|| Path::new("."));
        let src_basename = src_dir
            .file_name()
            .ok_or_else(|| SnapshotError::ArchiveTool("source directory has no basename".to_string()))?;

        let tar_status = Command::new("tar")
            .arg("-czf")
            .arg(&tar_path)
            .arg("-C")
            .arg(src_parent)
            .arg(src_basename)
            .status()
            .await?;

        if !tar_status.success() {
            let _ = fs::remove_file(&tar_path).await;
            return Err(SnapshotError::ArchiveTool(format!("tar exited with {}", tar_status)));
        }

        // 3. TAMAÑO REDONDEADO A 0.01 MB.
        let tar_metadata = fs::metadata(&tar_path).await?;
        let size_mb = ((tar_metadata.len() as f64 / (1024.0 * 1024.0)) * 100.0).round() / 100.0;

        let record = SnapshotRecord {
            id: snapshot_id,
            instance_id: instance_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            size_mb,
            trigger,
            plugins,
            config_hash,
            storage_path: tar_path.to_string_lossy().into_owned(),
        };

        // 4. METADATA-OR-NOTHING.
        if let Err(metadata_fault) = self.snapshot_repository.insert(&record).await {
            error!("❌ [SNAPSHOT_METADATA_FAULT]: Row rejected; purging tar. {}", metadata_fault);
            let _ = fs::remove_file(&tar_path).await;
            return Err(SnapshotError::Metadata(metadata_fault));
        }

        info!("📸 [SNAPSHOT_SEALED]: [{}] {} MB for instance [{}].", record.id, size_mb, instance_id);
        Ok(record)
    }

    /**
     * Restauración atómica con pivote de seguridad.
     */
    #[instrument(skip(self))]
    pub async fn restore(&self, snapshot_id: &str, dst_dir: &Path) -> Result<(), SnapshotError> {
        let record = self
            .snapshot_repository
            .find(snapshot_id)
            .await?
            .ok_or_else(|| SnapshotError::SnapshotNotFound(snapshot_id.to_string()))?;

        // 1. PIVOTE: apartar el destino vigente (ENOENT es aceptable).
        let pivot_path = PathBuf::from(format!(
            "{}.pre-restore-{}",
            dst_dir.to_string_lossy(),
            Utc::now().timestamp()
        ));
        let pivot_existed = match fs::rename(dst_dir, &pivot_path).await {
            Ok(()) => true,
            Err(rename_fault) if rename_fault.kind() == std::io::ErrorKind::NotFound => false,
            Err(rename_fault) => return Err(SnapshotError::Filesystem(rename_fault)),
        };

        // 2. EXTRACCIÓN AL DESTINO LIMPIO.
        let extraction_result = self.extract_into(&record.storage_path, dst_dir).await;

        match extraction_result {
            Ok(()) => {
                // 3. ÉXITO: el pivote de seguridad se purga.
                if pivot_existed {
                    if let Err(cleanup_fault) = fs::remove_dir_all(&pivot_path).await {
                        warn!("⚠️ [SNAPSHOT_PIVOT_RESIDUE]: {}", cleanup_fault);
                    }
                }
                info!("📼 [SNAPSHOT_RESTORED]: [{}] -> {}.", snapshot_id, dst_dir.display());
                Ok(())
            }
            Err(extraction_fault) => {
                // 4. FALLO: destino purgado y pivote restituido.
                let _ = fs::remove_dir_all(dst_dir).await;
                if pivot_existed {
                    if let Err(rollback_fault) = fs::rename(&pivot_path, dst_dir).await {
                        error!("❌ [SNAPSHOT_ROLLBACK_FAULT]: {}", rollback_fault);
                    }
                }
                Err(extraction_fault)
            }
        }
    }

    async fn extract_into(&self, tar_path: &str, dst_dir: &Path) -> Result<(), SnapshotError> {
        fs::create_dir_all(dst_dir).await?;

        let extraction_status = Command::new("tar")
            .arg("-xzf")
            .arg(tar_path)
            .arg("-C")
            .arg(dst_dir)
            .arg("--strip-components=1")
            .status()
            .await?;

        if !extraction_status.success() {
            return Err(SnapshotError::ArchiveTool(format!("tar exited with {}", extraction_status)));
        }
        Ok(())
    }

    // --- CONSULTAS TRIVIALES DE METADATOS ---

    pub async fn list(&self, instance_id: &str) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        Ok(self.snapshot_repository.list(instance_id).await?)
    }

    pub async fn get(&self, snapshot_id: &str) -> Result<Option<SnapshotRecord>, SnapshotError> {
        Ok(self.snapshot_repository.find(snapshot_id).await?)
    }

    /// Borra la fila y su tar (la fila es dueña del artefacto).
    pub async fn delete(&self, snapshot_id: &str) -> Result<(), SnapshotError> {
        let record = self
            .snapshot_repository
            .find(snapshot_id)
            .await?
            .ok_or_else(|| SnapshotError::SnapshotNotFound(snapshot_id.to_string()))?;

        self.snapshot_repository.delete(snapshot_id).await?;
        if let Err(tar_fault) = fs::remove_file(&record.storage_path).await {
            warn!("⚠️ [SNAPSHOT_TAR_RESIDUE]: {}", tar_fault);
        }
        Ok(())
    }

    pub async fn count(&self, instance_id: &str) -> Result<i64, SnapshotError> {
        Ok(self.snapshot_repository.count(instance_id).await?)
    }

    pub async fn get_oldest(&self, instance_id: &str, n: i64) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        Ok(self.snapshot_repository.oldest(instance_id, n).await?)
    }
}
