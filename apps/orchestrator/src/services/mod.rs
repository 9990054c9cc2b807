// [apps/orchestrator/src/services/mod.rs]
/*!
 * =================================================================
 * APARATO: SERVICE STRATA MATRIX (V4.2 - DAEMON TOPOLOGY)
 * CLASIFICACIÓN: ORCHESTRATION LAYER (ESTRATO L4)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE LOS SERVICIOS DEL PLANO
 * =================================================================
 */

// --- ESTRATO 1: PLANO DE NODOS ---

/// Bus de mando petición/respuesta sobre sockets persistentes.
pub mod command_bus;
/// Selección del mejor nodo destino (most-free-first).
pub mod placement;
/// Movimiento ordenado de bots y drenado de nodos.
pub mod migration;
/// Re-colocación de bots de nodos caídos.
pub mod recovery;
/// Vigilancia de latidos y sentencia de nodos.
pub mod reaper;
/// Sondeo de digests de imagen y disparo de actualizaciones.
pub mod image_poller;

// --- ESTRATO 2: GOBERNANZA DEL GATEWAY ---

/// Cupos por (tenant, capacidad) en ventanas persistidas.
pub mod rate_limiter;
/// Corte de circuito por instancia desbocada.
pub mod breaker;
/// Topes duros y alertas de gasto.
pub mod spending_sentinel;

// --- ESTRATO 3: CICLO DE VIDA Y SEÑALES ---

/// Pacemaker del cron de costos y del barrido de reactivación.
pub mod runtime_driver;
/// Ejecutor del flujo de borrado con gracia.
pub mod deletion_cron;
/// Tar content-addressed y restauración con pivote.
pub mod snapshot_vault;
/// Señales best-effort hacia el operador.
pub mod notifier;

// --- RE-EXPORTACIONES SOBERANAS ---

pub use breaker::CircuitBreakerShield;
pub use command_bus::{CommandBusError, CommandChannel, NodeCommandBus};
pub use deletion_cron::DeletionCron;
pub use image_poller::ImagePoller;
pub use migration::{DrainReport, MigrationOrchestrator, MigrationOutcome};
pub use notifier::{AdminNotifier, TracingNotifier};
pub use placement::PlacementEngine;
pub use rate_limiter::{GatewayRateLimiter, RateDecision};
pub use reaper::spawn_reaper;
pub use recovery::FleetRecoveryService;
pub use runtime_driver::spawn_runtime_driver;
pub use snapshot_vault::{SnapshotError, SnapshotVault};
pub use spending_sentinel::{CapBlock, SpendingSentinel};
