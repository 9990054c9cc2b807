// [apps/orchestrator/src/services/placement.rs]
/*!
 * =================================================================
 * APARATO: PLACEMENT ENGINE (V4.2 - MOST-FREE-FIRST)
 * CLASIFICACIÓN: DOMAIN SERVICE (ESTRATO L2/L4)
 * RESPONSABILIDAD: SELECCIÓN DEL MEJOR NODO PARA UNA COLOCACIÓN
 *
 * # Mathematical Proof (Deterministic Scoring):
 * score(n) = capacity − used. El orden (score DESC, id ASC) es total;
 * para un estado de flota dado la selección es única y reproducible.
 * Nodos en draining/offline jamás entran al conjunto candidato.
 * =================================================================
 */

use std::sync::Arc;
use tracing::{debug, instrument};
use wopr_domain_models::NodeRecord;
use wopr_infra_db::repositories::NodeRepository;
use wopr_infra_db::DbError;

pub struct PlacementEngine {
    node_repository: Arc<NodeRepository>,
}

impl PlacementEngine {
    #[must_use]
    pub fn new(node_repository: Arc<NodeRepository>) -> Self {
        Self { node_repository }
    }

    /**
     * Encuentra el mejor nodo destino para una colocación.
     *
     * Solo considera nodos 'active' con capacidad libre suficiente.
     * Desempate alfabético por id. `None` cuando nada alcanza.
     */
    #[instrument(skip(self))]
    pub async fn find_best_target(
        &self,
        exclude_node_id: Option<&str>,
        required_mb: i64,
    ) -> Result<Option<NodeRecord>, DbError> {
        let mut candidates: Vec<NodeRecord> = self
            .node_repository
            .list_active()
            .await?
            .into_iter()
            .filter(|node| Some(node.id.as_str()) != exclude_node_id)
            .filter(|node| node.free_capacity_mb() >= required_mb)
            .collect();

        candidates.sort_by(|left, right| {
            right
                .free_capacity_mb()
                .cmp(&left.free_capacity_mb())
                .then(left.id.cmp(&right.id))
        });

        let winner = candidates.into_iter().next();
        debug!(
            "🎯 [PLACEMENT]: required={}MB exclude={:?} -> {:?}",
            required_mb,
            exclude_node_id,
            winner.as_ref().map(|node| node.id.clone())
        );
        Ok(winner)
    }
}
