//! Policy selection.

use std::sync::Arc;

use tracing::debug;

use flow_core::{Clock, ClusterSnapshot, CostModelConfig, CostModelKind};

use crate::interface::CostModel;
use crate::knowledge_base::KnowledgeBase;
use crate::sjf::SjfCostModel;
use crate::trivial::TrivialCostModel;

/// Build the configured cost model over one round's snapshot.
pub fn build_cost_model(
    config: &CostModelConfig,
    snapshot: Arc<ClusterSnapshot>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn CostModel> {
    debug!(
        policy = %config.kind,
        generation = snapshot.generation,
        tasks = snapshot.tasks.len(),
        leaves = snapshot.leaf_resources.len(),
        "building cost model"
    );
    match config.kind {
        CostModelKind::Sjf => Arc::new(SjfCostModel::with_config(
            snapshot,
            knowledge_base,
            clock,
            &config.sjf,
            config.preference_arc_seed,
        )),
        CostModelKind::Trivial => Arc::new(TrivialCostModel::new(snapshot, &config.trivial)),
    }
}
