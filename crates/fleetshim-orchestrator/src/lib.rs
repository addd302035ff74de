//! fleetshim-orchestrator: the external orchestrator behind a narrow
//! capability interface.
//!
//! The rest of fleetshim only sees [`Orchestrator`]: "set the replica
//! count to N" and "list live replicas". [`ComposeOrchestrator`] maps
//! those onto docker compose / docker CLI invocations.
//!
//! Live replica counts can come from several interchangeable
//! [`ReplicaCountSource`]s, tried in configured order by a
//! [`ReplicaCountChain`].

pub mod compose;
pub mod error;
pub mod orchestrator;
pub mod replicas;

pub use compose::ComposeOrchestrator;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Orchestrator, ReplicaNode, ScaleAck};
pub use replicas::{CountFile, OrchestratorReplicaCount, ReplicaCountChain, ReplicaCountSource};
