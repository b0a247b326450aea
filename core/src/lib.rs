//! # SecureNet Core
//!
//! Policy evaluation and segmentation analysis for SecureNet Designer
//! topologies.
//!
//! A topology is an undirected graph of devices (routers, firewalls, servers,
//! switches, hosts) grouped into security zones. Policies are directional
//! firewall rules addressed at a zone or a single node. Given a snapshot of
//! both, the engine answers two questions:
//!
//! - would a hypothetical flow between two endpoints be permitted?
//! - where is the topology structurally weak (VLAN reuse, unprotected DMZ)?
//!
//! ## Example
//!
//! ```text
//! [R1 internal] ── [FW1 firewall, dmz] ── [SRV dmz]
//!
//! zone internal -> zone dmz, tcp/80, deny
//! node R1 -> node SRV, tcp/80            => denied at FW1
//! ```
//!
//! ## Modules
//!
//! - `model` - Snapshot records: nodes, links, policies, scenarios, findings
//! - `topology` - Graph indexed by id and zone
//! - `endpoint` - Zone/node endpoint resolution
//! - `path` - Deterministic shortest-path search
//! - `policy` - Specificity-ranked policy matching, fail-closed
//! - `simulator` - Parallel scenario evaluation with cancellation
//! - `segmentation` - Structural checks
//! - `wasm` - WebAssembly bindings for the editor

mod error;
mod model;
mod topology;
mod endpoint;
mod path;
mod policy;
mod simulator;
mod segmentation;
pub mod wasm;

pub use error::*;
pub use model::*;
pub use topology::*;
pub use endpoint::{resolve, ResolvedEndpoint};
pub use path::{find_path, hops};
pub use policy::*;
pub use simulator::*;
pub use segmentation::*;

/// Engine name reported by `inspect` and the editor bindings.
pub const ENGINE_NAME: &str = "securenet";

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
