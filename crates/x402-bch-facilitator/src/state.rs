use x402_bch::{BchFacilitator, CoalescingChainClient, SqliteLedgerStore};

use crate::node::BchNodeClient;

/// Concrete facilitator type as wired by the server: SQLite ledger, node
/// adapters for the chain/signature/wallet seams, chain reads behind the
/// coalescing retry gate.
pub type NodeFacilitator = BchFacilitator<
    SqliteLedgerStore,
    CoalescingChainClient<BchNodeClient>,
    BchNodeClient,
    BchNodeClient,
>;

/// Shared application state for the facilitator server.
pub struct AppState {
    pub facilitator: NodeFacilitator,
}
