// [tests/mirror/apps/orchestrator/services/placement_scoring.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: PLACEMENT ENGINE
 * CERTIFICA: scoring most-free-first, desempate alfabético, filtros
 *            de exclusión/capacidad y el veto de estados no-active.
 * =================================================================
 */

use std::sync::Arc;
use wopr_domain_models::node::NodeLifecycleEvent;
use wopr_infra_db::repositories::NodeRepository;
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::PlacementEngine;

struct PlacementFixture {
    node_repository: Arc<NodeRepository>,
    engine: PlacementEngine,
}

async fn build_fixture() -> PlacementFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let node_repository = Arc::new(NodeRepository::new(client));
    let engine = PlacementEngine::new(Arc::clone(&node_repository));
    PlacementFixture { node_repository, engine }
}

#[tokio::test]
async fn certify_most_free_first_with_alpha_tiebreak() {
    let fixture = build_fixture().await;
    fixture.node_repository.register_or_refresh("n-bravo", "b.fleet", 8192, "agent").await.unwrap();
    fixture.node_repository.register_or_refresh("n-alpha", "a.fleet", 8192, "agent").await.unwrap();
    fixture.node_repository.register_or_refresh("n-small", "s.fleet", 1024, "agent").await.unwrap();

    // Empate de capacidad libre entre alpha y bravo: gana el id menor.
    let winner = fixture.engine.find_best_target(None, 512).await.unwrap().unwrap();
    assert_eq!(winner.id, "n-alpha");

    // La ocupación reportada por latidos reordena el scoring.
    fixture.node_repository.record_heartbeat("n-alpha", 6000, "agent").await.unwrap();
    let reordered = fixture.engine.find_best_target(None, 512).await.unwrap().unwrap();
    assert_eq!(reordered.id, "n-bravo");
}

#[tokio::test]
async fn certify_exclusion_and_capacity_filters() {
    let fixture = build_fixture().await;
    fixture.node_repository.register_or_refresh("n-alpha", "a.fleet", 2048, "agent").await.unwrap();
    fixture.node_repository.register_or_refresh("n-bravo", "b.fleet", 1024, "agent").await.unwrap();

    // La exclusión del mejor candidato cede el turno al siguiente.
    let fallback = fixture.engine.find_best_target(Some("n-alpha"), 512).await.unwrap().unwrap();
    assert_eq!(fallback.id, "n-bravo");

    // Nada alcanza: None.
    assert!(fixture.engine.find_best_target(None, 100_000).await.unwrap().is_none());
}

#[tokio::test]
async fn certify_non_active_states_never_place() {
    let fixture = build_fixture().await;
    fixture.node_repository.register_or_refresh("n-alpha", "a.fleet", 8192, "agent").await.unwrap();

    fixture
        .node_repository
        .transition("n-alpha", NodeLifecycleEvent::AdminDrain, "maintenance", "admin")
        .await
        .unwrap();

    // Un nodo en draining jamás recibe colocaciones nuevas.
    assert!(fixture.engine.find_best_target(None, 1).await.unwrap().is_none());
}
